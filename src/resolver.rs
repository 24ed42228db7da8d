//! Which backend, if any, serves an open object. All answers come from
//! walking parent links up to the mailbox.

use crate::{
    backend::ContextId,
    object::{Handle, Mailbox, Node, ObjectTree},
};

impl ObjectTree {
    fn ancestry(&self, handle: Handle) -> impl Iterator<Item = (Handle, &Node)> {
        std::iter::successors(Some(handle), |current| match self.node(*current) {
            Node::Mailbox(_) => None,
            _ => self.parent(*current),
        })
        .map(|current| (current, self.node(current)))
    }

    /// The nearest backend root at or above `handle`.
    ///
    /// # Panics
    ///
    /// Panics if a parent link points at a released object.
    pub fn backend_root_of(&self, handle: Handle) -> Option<Handle> {
        self.ancestry(handle).find_map(|(current, node)| match node {
            Node::Folder(folder) if folder.is_backend_root() => Some(current),
            _ => None,
        })
    }

    pub fn is_backend_owned(&self, handle: Handle) -> bool {
        self.backend_root_of(handle).is_some()
    }

    /// The context serving `handle`. A pending root has none yet.
    pub fn context_of(&self, handle: Handle) -> Option<ContextId> {
        let root = self.backend_root_of(handle)?;
        match self.node(root) {
            Node::Folder(folder) => folder.context(),
            _ => None,
        }
    }

    /// # Panics
    ///
    /// Panics if `handle` is not linked to a mailbox.
    pub fn owning_mailbox(&self, handle: Handle) -> (Handle, &Mailbox) {
        self.ancestry(handle)
            .find_map(|(current, node)| match node {
                Node::Mailbox(mailbox) => Some((current, mailbox)),
                _ => None,
            })
            .unwrap_or_else(|| panic!("{handle} should be owned by a mailbox"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::{
        backend::{BackendFactory, ContextRegistry, MemoryBackendFactory},
        mapi::{FolderId, MessageId, PropertyRow, ReplicaId},
        metadata::StoreKind,
        object::{Folder, FolderBacking, Message, MessageMode},
    };

    struct Fixture {
        tree: ObjectTree,
        registry: Arc<ContextRegistry>,
        logon: Handle,
        top: Handle,
    }

    fn fid(counter: u64) -> FolderId {
        FolderId::new(counter, ReplicaId::PRIVATE)
    }

    fn folder(counter: u64, backing: FolderBacking) -> Node {
        Node::Folder(Folder {
            fid: fid(counter),
            system_idx: None,
            backing,
        })
    }

    #[fixture]
    fn fixture() -> Fixture {
        let factory: Arc<dyn BackendFactory> = Arc::new(MemoryBackendFactory::default());
        let registry = ContextRegistry::new([factory]);
        let mut tree = ObjectTree::new();
        let logon = tree.insert(
            None,
            Node::Mailbox(Mailbox {
                owner: "jdoe".into(),
                kind: StoreKind::Private,
                root: fid(1),
                replica_id: ReplicaId::PRIVATE,
                replica_guid: [0; 16],
            }),
        );
        let root = tree.insert(Some(logon), folder(1, FolderBacking::System));
        let top = tree.insert(Some(root), folder(2, FolderBacking::System));
        Fixture {
            tree,
            registry,
            logon,
            top,
        }
    }

    #[rstest]
    fn test_system_folders_are_not_backend_owned(fixture: Fixture) {
        assert!(!fixture.tree.is_backend_owned(fixture.logon));
        assert!(!fixture.tree.is_backend_owned(fixture.top));
        assert_none!(fixture.tree.context_of(fixture.top));
    }

    #[rstest]
    fn test_descendants_inherit_the_root_context(mut fixture: Fixture) {
        let lease = assert_ok!(fixture.registry.acquire("memory://jdoe/mail/"));
        let context = lease.id();
        let root = fixture.tree.insert(
            Some(fixture.top),
            folder(
                3,
                FolderBacking::Committed {
                    lease,
                    uri: "memory://jdoe/mail/".into(),
                },
            ),
        );
        let child = fixture
            .tree
            .insert(Some(root), folder(4, FolderBacking::Inherited));
        let message = fixture.tree.insert(
            Some(child),
            Node::Message(Message {
                mid: MessageId::new(5, ReplicaId::PRIVATE),
                folder: fid(4),
                mode: MessageMode::Open,
                read_write: false,
                associated: false,
                freebusy: None,
            }),
        );
        for handle in [root, child, message] {
            assert!(fixture.tree.is_backend_owned(handle));
            assert_eq!(fixture.tree.context_of(handle), Some(context));
            assert_eq!(fixture.tree.backend_root_of(handle), Some(root));
        }
        assert_eq!(fixture.tree.owning_mailbox(message).0, fixture.logon);
    }

    #[rstest]
    fn test_pending_root_is_owned_without_context(mut fixture: Fixture) {
        let pending = fixture.tree.insert(
            Some(fixture.top),
            folder(
                3,
                FolderBacking::Pending {
                    buffer: PropertyRow::new(),
                },
            ),
        );
        assert!(fixture.tree.is_backend_owned(pending));
        assert_none!(fixture.tree.context_of(pending));
    }

    #[rstest]
    #[should_panic(expected = "should be owned by a mailbox")]
    fn test_orphan_has_no_mailbox() {
        let mut tree = ObjectTree::new();
        let orphan = tree.insert(None, folder(1, FolderBacking::System));
        tree.owning_mailbox(orphan);
    }
}
