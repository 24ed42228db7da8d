use log::debug;

use crate::{
    backend::{BackendObject, ContainerRole, ContextLease},
    mapi::{
        FolderId, MapiError, PropValue, PropertyRow,
        tags::{PR_CHANGE_NUM, PR_CONTAINER_CLASS, PR_DISPLAY_NAME},
    },
    metadata::{ChildFilter, MetadataStore, RecordAttrs, StoreKind},
    object::{Folder, FolderBacking, Handle, Node},
    session::Session,
};

/// What [`Session::maybe_commit`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The folder was provisioned just now.
    Committed,
    /// Container class or display name are still missing.
    Pending,
    AlreadyCommitted,
    /// Not a backend root.
    NotApplicable,
}

impl Session {
    /// Provisions a pending backend root once its buffer holds both a
    /// container class and a display name. On failure the folder stays
    /// pending.
    pub fn maybe_commit(&mut self, handle: Handle) -> Result<CommitOutcome, MapiError> {
        let (fid, buffer) = match self.tree.get(handle)? {
            Node::Folder(Folder {
                fid,
                backing: FolderBacking::Pending { buffer },
                ..
            }) => (*fid, buffer.clone()),
            Node::Folder(Folder {
                backing: FolderBacking::Committed { .. },
                ..
            }) => return Ok(CommitOutcome::AlreadyCommitted),
            _ => return Ok(CommitOutcome::NotApplicable),
        };
        let (Some(class), Some(name)) = (
            buffer.get_str(PR_CONTAINER_CLASS),
            buffer.get_str(PR_DISPLAY_NAME),
        ) else {
            return Ok(CommitOutcome::Pending);
        };

        let role = ContainerRole::from_container_class(class);
        let mailbox = self.tree.owning_mailbox(handle).1;
        let root = mailbox.root;
        let uri = self.provisioner.backend_uri(&mailbox.owner, role, fid)?;

        let lease = self.lease(&uri)?;
        self.store.transaction(&mut |store| {
            let parent = store.get_parent(fid.into())?;
            let clash = store
                .find_children(parent, ChildFilter::folders().named(name))?
                .into_iter()
                .any(|sibling| sibling != u64::from(fid));
            if clash {
                return Err(MapiError::Collision);
            }
            write_root(store, fid, root, &uri, &lease, &buffer)
        })?;

        debug!("committed {role} folder {fid} to {uri}");
        self.tree.folder_mut(handle)?.backing = FolderBacking::Committed { lease, uri };
        Ok(CommitOutcome::Committed)
    }

    /// Commits `handle` if it is a pending root, failing with
    /// `NotInitialized` while it cannot be.
    pub(crate) fn ensure_committed(&mut self, handle: Handle) -> Result<(), MapiError> {
        match self.maybe_commit(handle)? {
            CommitOutcome::Pending => Err(MapiError::NotInitialized),
            _ => Ok(()),
        }
    }

    /// Creates a folder below `parent`. `props` must carry a display name.
    ///
    /// Below a system folder of a private store the new folder becomes a
    /// backend root of its own, provisioned as soon as it also has a container
    /// class.
    pub fn create_folder(
        &mut self,
        parent: Handle,
        props: PropertyRow,
    ) -> Result<Handle, MapiError> {
        let name = props
            .get_str(PR_DISPLAY_NAME)
            .ok_or(MapiError::InvalidParameter)?
            .to_string();
        let parent_fid = match self.tree.get(parent)? {
            Node::Folder(folder) => folder.fid,
            _ => return Err(MapiError::InvalidParameter),
        };
        self.ensure_committed(parent)?;
        let mailbox = self.tree.owning_mailbox(parent).1;
        let (root, replica, kind) = (mailbox.root, mailbox.replica_id, mailbox.kind);

        if let Some(backend) = self.backend_of(parent) {
            if backend.lookup_child(parent_fid, &name)?.is_some() {
                return Err(MapiError::Collision);
            }
            let fid = FolderId::new(self.store.allocate_change_number(root)?, replica);
            let uri = backend.create_folder(parent_fid, fid, &props)?;
            self.store.index_register(root, fid.into(), &uri)?;
            debug!("created {name:?} as {fid} at {uri}");
            let folder = Folder {
                fid,
                system_idx: None,
                backing: FolderBacking::Inherited,
            };
            return Ok(self.tree.insert(Some(parent), Node::Folder(folder)));
        }

        let siblings = self
            .store
            .find_children(parent_fid, ChildFilter::folders().named(&name))?;
        if !siblings.is_empty() {
            return Err(MapiError::Collision);
        }
        let fid = FolderId::new(self.store.allocate_change_number(root)?, replica);
        match kind {
            StoreKind::Private => {
                let attrs = RecordAttrs::folder(root)
                    .backend_root(true)
                    .display_name(name)
                    .build()?;
                self.store.create_record(Some(parent_fid), fid.into(), &attrs)?;
                let folder = Folder {
                    fid,
                    system_idx: None,
                    backing: FolderBacking::Pending { buffer: props },
                };
                let handle = self.tree.insert(Some(parent), Node::Folder(folder));
                if let Err(error) = self.maybe_commit(handle) {
                    self.tree.remove_subtree(handle);
                    self.store.delete_record(fid.into())?;
                    return Err(error);
                }
                Ok(handle)
            }
            StoreKind::Public => {
                let attrs = RecordAttrs::folder(root).display_name(name).build()?;
                self.store.create_record(Some(parent_fid), fid.into(), &attrs)?;
                self.store.set_properties(fid.into(), &props)?;
                let folder = Folder {
                    fid,
                    system_idx: None,
                    backing: FolderBacking::System,
                };
                Ok(self.tree.insert(Some(parent), Node::Folder(folder)))
            }
        }
    }
}

fn write_root(
    store: &dyn MetadataStore,
    fid: FolderId,
    mailbox: FolderId,
    uri: &str,
    lease: &ContextLease,
    buffer: &PropertyRow,
) -> Result<(), MapiError> {
    store.set_backend_uri(fid.into(), Some(uri))?;
    let change_number = store.allocate_change_number(mailbox)?;
    let mut record = PropertyRow::new().with(PR_CHANGE_NUM, PropValue::from_id(change_number));
    for tag in [PR_DISPLAY_NAME, PR_CONTAINER_CLASS] {
        if let Some(value) = buffer.get(tag) {
            record.set(tag, value.clone());
        }
    }
    store.set_properties(fid.into(), &record)?;
    store.index_register(mailbox, fid.into(), uri)?;
    let backend = lease.backend();
    backend.bind_root(fid)?;
    backend.set_properties(BackendObject::Folder(fid), buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::{
        mapi::tags::{PR_COMMENT, PR_FOLDER_CHILD_COUNT},
        metadata::SystemIndex,
        session::tests::{OWNER, TestSession, session},
    };

    fn named(name: &str) -> PropertyRow {
        PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode(name.into()))
    }

    #[rstest]
    fn test_two_phase_creation(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let top = assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
        let contexts_before = session.contexts().len();

        let folder = assert_ok!(session.create_folder(top, named("Projects")));
        let fid = assert_ok!(session.tree().folder(folder)).fid;
        assert!(assert_ok!(session.tree().folder(folder)).is_pending());
        assert_none!(session.tree().context_of(folder));
        assert_none!(assert_ok!(session.store.record(fid.into())).uri);
        assert_eq!(session.contexts().len(), contexts_before);

        let comment = PropertyRow::new().with(PR_COMMENT, PropValue::Unicode("q3".into()));
        assert_ok!(session.set_properties(folder, &comment));
        assert_eq!(assert_ok!(session.maybe_commit(folder)), CommitOutcome::Pending);

        let class =
            PropertyRow::new().with(PR_CONTAINER_CLASS, PropValue::Unicode("IPF.Task".into()));
        assert_ok!(session.set_properties(folder, &class));
        assert_eq!(
            assert_ok!(session.maybe_commit(folder)),
            CommitOutcome::AlreadyCommitted
        );
        let record = assert_ok!(session.store.record(fid.into()));
        let uri = assert_some!(record.uri);
        assert_starts_with!(uri, "memory://jdoe/tasks/");
        assert_eq!(assert_ok!(session.store.find_by_uri(&uri)), u64::from(fid));
        assert_some!(session.tree().context_of(folder));
        assert_eq!(session.contexts().len(), contexts_before + 1);

        let values = assert_ok!(session.get_properties(folder, &[PR_COMMENT]));
        assert_eq!(values[0], Ok(PropValue::Unicode("q3".into())));
    }

    #[rstest]
    fn test_pending_folder_refuses_children(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let top = assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
        let folder = assert_ok!(session.create_folder(top, named("Projects")));
        assert_matches!(
            session.create_folder(folder, named("Child")),
            Err(MapiError::NotInitialized)
        );
        assert_matches!(session.create_message(folder, false), Err(MapiError::NotInitialized));
        let values = assert_ok!(session.get_properties(folder, &[PR_FOLDER_CHILD_COUNT]));
        assert_eq!(values[0], Ok(PropValue::Long(0)));
    }

    #[rstest]
    fn test_sibling_names_collide(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let top = assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
        assert_matches!(
            session.create_folder(top, named("INBOX")),
            Err(MapiError::Collision)
        );
        let inbox = assert_ok!(session.open_special_folder(logon, SystemIndex::Inbox));
        assert_ok!(session.create_folder(inbox, named("Work")));
        assert_matches!(
            session.create_folder(inbox, named("work")),
            Err(MapiError::Collision)
        );
        assert_matches!(
            session.create_folder(inbox, PropertyRow::new()),
            Err(MapiError::InvalidParameter)
        );
    }

    #[rstest]
    fn test_public_folders_stay_in_the_store(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Public));
        let top = assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
        let folder = assert_ok!(session.create_folder(top, named("Announcements")));
        assert!(!session.tree().is_backend_owned(folder));
        let fid = assert_ok!(session.tree().folder(folder)).fid;
        let record = assert_ok!(session.store.record(fid.into()));
        assert!(!record.backend_root);
        assert_eq!(record.display_name.as_deref(), Some("Announcements"));
    }

    #[rstest]
    fn test_backend_folders_are_indexed(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let inbox = assert_ok!(session.open_special_folder(logon, SystemIndex::Inbox));
        let work = assert_ok!(session.create_folder(inbox, named("Work")));
        let fid = assert_ok!(session.tree().folder(work)).fid;
        let inbox_uri = assert_some!(assert_ok!(session.tree().folder(inbox)).uri()).to_string();
        let uri = assert_ok!(session.store.index_uri(fid.into()));
        assert_starts_with!(uri, inbox_uri.as_str());
        assert_matches!(session.store.record(fid.into()), Err(_));
        assert_eq!(session.tree().context_of(work), session.tree().context_of(inbox));
    }

    #[rstest]
    fn test_concurrent_sessions_commit_their_own_roots(session: TestSession) {
        const WORKERS: usize = 4;
        const ROUNDS: usize = 25;
        let shared = session.session;
        std::thread::scope(|scope| {
            for worker in 0..WORKERS {
                let store = Arc::clone(&shared.store);
                let contexts = Arc::clone(&shared.contexts);
                let provisioner = Arc::clone(&shared.provisioner);
                let identity = shared.identity.clone();
                scope.spawn(move || {
                    let mut session = Session::new(store, contexts, provisioner, identity);
                    let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
                    let top =
                        assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
                    for round in 0..ROUNDS {
                        let props = named(&format!("Project {worker}-{round}"))
                            .with(PR_CONTAINER_CLASS, PropValue::Unicode("IPF.Note".into()));
                        let folder = assert_ok!(session.create_folder(top, props));
                        assert_ok!(session.release(folder));
                    }
                    assert_ok!(session.release(logon));
                });
            }
        });

        let mailbox = assert_ok!(shared.store.mailbox(OWNER, StoreKind::Private));
        let top = assert_ok!(
            shared
                .store
                .find_system_folder(mailbox.root, SystemIndex::TopOfStore)
        );
        let children = assert_ok!(shared.store.find_children(top, ChildFilter::folders()));
        assert_eq!(children.len(), 10 + WORKERS * ROUNDS);
        for child in children {
            let record = assert_ok!(shared.store.record(child));
            let uri = assert_some!(record.uri);
            assert_eq!(assert_ok!(shared.store.find_by_uri(&uri)), child);
        }
        assert!(shared.contexts().is_empty());
    }
}
