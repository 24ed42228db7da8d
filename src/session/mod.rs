//! One logon's view of the stores: the open objects and the collaborators
//! every operation dispatches to.

mod open;
mod stream;

use std::sync::Arc;

use log::{debug, warn};

pub use stream::SeekOrigin;

use crate::{
    backend::{Backend, ContextRegistry, Provisioner},
    mapi::MapiError,
    metadata::{SharedStore, StoreKind},
    object::{Handle, Mailbox, Node, ObjectTree, TableSource},
};

/// Who is logged on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub display_name: String,
    /// Distinguished name of the organisation, the prefix of address book
    /// entry ids.
    pub organization: String,
}

pub struct Session {
    pub(crate) tree: ObjectTree,
    pub(crate) store: SharedStore,
    pub(crate) contexts: Arc<ContextRegistry>,
    pub(crate) provisioner: Arc<dyn Provisioner>,
    pub(crate) identity: Identity,
}

impl Session {
    pub fn new(
        store: SharedStore,
        contexts: Arc<ContextRegistry>,
        provisioner: Arc<dyn Provisioner>,
        identity: Identity,
    ) -> Self {
        Self {
            tree: ObjectTree::new(),
            store,
            contexts,
            provisioner,
            identity,
        }
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    /// Opens the mailbox of `owner`.
    pub fn logon(&mut self, owner: &str, kind: StoreKind) -> Result<Handle, MapiError> {
        let record = self.store.mailbox(owner, kind)?;
        debug!("{} logged on to {kind:?} store of {owner}", self.identity.username);
        Ok(self.tree.insert(None, Node::Mailbox(Mailbox::from(record))))
    }

    /// The backend serving `handle`, if it is backend-owned and provisioned.
    pub(crate) fn backend_of(&self, handle: Handle) -> Option<Arc<dyn Backend>> {
        let context = self.tree.context_of(handle)?;
        Some(
            self.contexts
                .backend(context)
                .expect("context of an open root should be registered"),
        )
    }

    /// Releases `handle` and everything opened below it. Dirty streams get
    /// committed to their objects first; the first failure is reported after
    /// the whole subtree is gone.
    pub fn release(&mut self, handle: Handle) -> Result<(), MapiError> {
        if !self.tree.contains(handle) {
            return Err(MapiError::InvalidObject);
        }
        let mut outcome = Ok(());
        for current in self.tree.post_order(handle) {
            let dirty = matches!(self.tree.get(current)?, Node::Stream(stream) if stream.dirty);
            if dirty && let Err(error) = self.commit_stream(current) {
                warn!("committing stream {current} on release failed: {error}");
                if outcome.is_ok() {
                    outcome = Err(error);
                }
            }
            if let Node::Table(table) = self.tree.get(current)?
                && let TableSource::Backend { lease, cursor } = &table.source
            {
                lease.backend().close_table(*cursor);
            }
        }
        let released = self.tree.remove_subtree(handle);
        debug!("released {handle} with {} objects", released.len());
        outcome
    }
}
