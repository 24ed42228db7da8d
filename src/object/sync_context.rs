use crate::mapi::{FolderId, PropTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Contents,
    Hierarchy,
}

/// Synchronisation download state opened on a folder. The transfer itself
/// happens above this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub kind: SyncKind,
    pub folder: FolderId,
    pub tags: Vec<PropTag>,
}
