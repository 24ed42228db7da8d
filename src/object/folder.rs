use crate::{
    backend::{ContextId, ContextLease},
    mapi::{FolderId, PropertyRow},
    metadata::SystemIndex,
};

/// Where the content of a folder lives.
#[derive(Debug)]
pub enum FolderBacking {
    /// Served by the metadata store.
    System,
    /// Inside the subtree of a backend root further up.
    Inherited,
    /// A backend root still waiting for its container class and display
    /// name. Properties set meanwhile are buffered.
    Pending { buffer: PropertyRow },
    /// A provisioned backend root.
    Committed { lease: ContextLease, uri: String },
}

#[derive(Debug)]
pub struct Folder {
    pub fid: FolderId,
    pub system_idx: Option<SystemIndex>,
    pub backing: FolderBacking,
}

impl Folder {
    pub fn is_backend_root(&self) -> bool {
        matches!(
            self.backing,
            FolderBacking::Pending { .. } | FolderBacking::Committed { .. }
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.backing, FolderBacking::Pending { .. })
    }

    pub fn context(&self) -> Option<ContextId> {
        match &self.backing {
            FolderBacking::Committed { lease, .. } => Some(lease.id()),
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.backing {
            FolderBacking::Committed { uri, .. } => Some(uri),
            _ => None,
        }
    }
}
