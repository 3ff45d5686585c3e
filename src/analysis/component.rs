//! analysis::component
//!
//! The component tree under analysis and its traversal.
//!
//! An analysis sees one project as a tree of components: the project root,
//! directories, and files. Issue reconciliation visits every component in
//! depth-first post-order — children before parents, each component exactly
//! once — via an explicit traversal function.

/// Kind of a component in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Project,
    Directory,
    File,
}

/// Scanner-reported status of a file relative to the previous analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Changed,
    Unchanged,
}

/// One node of the component tree.
#[derive(Debug, Clone)]
pub struct Component {
    pub uuid: String,
    pub key: String,
    pub kind: ComponentKind,
    /// Only meaningful for files.
    pub file_status: Option<FileStatus>,
    pub children: Vec<Component>,
}

impl Component {
    pub fn project(uuid: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            key: key.into(),
            kind: ComponentKind::Project,
            file_status: None,
            children: Vec::new(),
        }
    }

    pub fn directory(uuid: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            key: key.into(),
            kind: ComponentKind::Directory,
            file_status: None,
            children: Vec::new(),
        }
    }

    pub fn file(uuid: impl Into<String>, key: impl Into<String>, status: FileStatus) -> Self {
        Self {
            uuid: uuid.into(),
            key: key.into(),
            kind: ComponentKind::File,
            file_status: Some(status),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Component>) -> Self {
        self.children = children;
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == ComponentKind::File
    }

    /// Whether the file did not exist in the previous analysis.
    pub fn is_new_file(&self) -> bool {
        self.file_status == Some(FileStatus::Added)
    }
}

/// Visit every component depth-first, children before parents.
///
/// The callback's first error aborts the traversal and is returned.
pub fn walk_post_order<E>(
    root: &Component,
    visit: &mut impl FnMut(&Component) -> Result<(), E>,
) -> Result<(), E> {
    for child in &root.children {
        walk_post_order(child, visit)?;
    }
    visit(root)
}
