//! Uniform property access. Every get and set is dispatched to the metadata
//! store or the backend owning the object, with a handful of properties
//! computed on the way.

mod freebusy;
mod synth;

use log::trace;

use crate::{
    backend::{BackendObject, ChildKind},
    mapi::{
        FolderId, MapiError, PropResult, PropTag, PropValue, PropertyRow,
        tags::{
            FOLDER_GENERIC, PR_ASSOC_CONTENT_COUNT, PR_ASSOCIATED, PR_CONTENT_COUNT,
            PR_CONTENT_UNREAD, PR_DISPLAY_NAME, PR_FID, PR_FOLDER_CHILD_COUNT, PR_FOLDER_TYPE,
            PR_LOCAL_COMMIT_TIME_MAX, PR_MAILBOX_OWNER_ENTRYID, PR_MAILBOX_OWNER_NAME,
            PR_MAPPING_SIGNATURE, PR_MID, PR_PARENT_FID, PR_SOURCE_KEY, PR_SUBFOLDERS,
        },
    },
    metadata::{ChildFilter, StoreError, StoreKind},
    object::{FolderBacking, Handle, Mailbox, Node},
    session::Session,
};

fn count(value: Result<u32, MapiError>) -> PropResult {
    value.map(|count| PropValue::Long(count.cast_signed()))
}

impl Session {
    fn stored_property(&self, id: impl Into<u64>, tag: PropTag) -> PropResult {
        self.store.get_property(id.into(), tag).map_err(MapiError::from)
    }

    /// Fails with `Collision` if `row` would give the stored folder `fid` the
    /// name of one of its siblings.
    fn ensure_unique_name(&self, fid: FolderId, row: &PropertyRow) -> Result<(), MapiError> {
        let Some(name) = row.get_str(PR_DISPLAY_NAME) else {
            return Ok(());
        };
        let parent = match self.store.get_parent(fid.into()) {
            Ok(parent) => parent,
            Err(StoreError::NotFound) => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        let clash = self
            .store
            .find_children(parent, ChildFilter::folders().named(name))?
            .into_iter()
            .any(|sibling| sibling != u64::from(fid));
        if clash {
            return Err(MapiError::Collision);
        }
        Ok(())
    }

    fn forward(
        &self,
        handle: Handle,
        object: BackendObject,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        let backend = self.backend_of(handle).ok_or(MapiError::NotInitialized)?;
        trace!("forwarding {} tags of {object:?} to {}", tags.len(), backend.uri());
        backend.get_properties(object, tags)
    }

    /// Folder id of the open folder `handle` hangs off, as known from the
    /// tree.
    fn parent_fid(&self, handle: Handle) -> PropResult {
        match self.tree.parent(handle).map(|parent| self.tree.node(parent)) {
            Some(Node::Folder(parent)) => Ok(PropValue::from_id(parent.fid)),
            _ => Err(MapiError::NotFound),
        }
    }

    /// Tags every backend root answers on its own, pending or not.
    fn root_local(&self, handle: Handle, fid: FolderId, tag: PropTag) -> Option<PropResult> {
        let value = match tag {
            PR_PARENT_FID => return Some(self.parent_fid(handle)),
            PR_FOLDER_TYPE => PropValue::Long(FOLDER_GENERIC),
            PR_SOURCE_KEY => {
                PropValue::Binary(self.tree.owning_mailbox(handle).1.source_key(fid))
            }
            PR_FID => PropValue::from_id(fid),
            _ => return None,
        };
        Some(Ok(value))
    }

    /// Reads properties of any open mailbox, folder, message or attachment.
    /// Each tag fails on its own; the call as a whole only fails when the
    /// object is unusable.
    ///
    /// # Panics
    ///
    /// Panics when `handle` is a table, stream, subscription or sync context.
    pub fn get_properties(
        &mut self,
        handle: Handle,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        if let Err(error) = self.maybe_commit(handle) {
            trace!("{handle} stays pending: {error}");
        }
        match self.tree.get(handle)? {
            Node::Mailbox(mailbox) => Ok(self.mailbox_properties(mailbox, tags)),
            Node::Folder(folder) => {
                let fid = folder.fid;
                match &folder.backing {
                    FolderBacking::Committed { .. } => {
                        self.committed_root_properties(handle, fid, tags)
                    }
                    FolderBacking::Pending { buffer } => Ok(tags
                        .iter()
                        .map(|tag| match *tag {
                            PR_CONTENT_COUNT | PR_ASSOC_CONTENT_COUNT | PR_FOLDER_CHILD_COUNT => {
                                Ok(PropValue::Long(0))
                            }
                            PR_SUBFOLDERS => Ok(PropValue::Boolean(false)),
                            _ => self.root_local(handle, fid, *tag).unwrap_or_else(|| {
                                buffer.get(*tag).cloned().ok_or(MapiError::NotFound)
                            }),
                        })
                        .collect()),
                    FolderBacking::Inherited => {
                        self.forward(handle, BackendObject::Folder(fid), tags)
                    }
                    FolderBacking::System => Ok(self.system_folder_properties(handle, fid, tags)),
                }
            }
            Node::Message(message) => {
                let mid = message.mid;
                if self.tree.is_backend_owned(handle) {
                    return self.forward(handle, BackendObject::Message(mid), tags);
                }
                Ok(tags
                    .iter()
                    .map(|tag| {
                        if let Some(value) =
                            message.freebusy.as_ref().and_then(|block| block.property(*tag))
                        {
                            return Ok(value);
                        }
                        match *tag {
                            PR_MID => Ok(PropValue::from_id(mid)),
                            PR_ASSOCIATED => Ok(PropValue::Boolean(message.associated)),
                            _ => self.stored_property(mid, *tag),
                        }
                    })
                    .collect())
            }
            Node::Attachment(attachment) => {
                let object = BackendObject::Attachment(attachment.mid, attachment.num);
                if self.tree.is_backend_owned(handle) {
                    self.forward(handle, object, tags)
                } else {
                    Ok(tags.iter().map(|_| Err(MapiError::NotFound)).collect())
                }
            }
            other => panic!("{handle} is a {} and has no properties", other.kind()),
        }
    }

    fn mailbox_properties(&self, mailbox: &Mailbox, tags: &[PropTag]) -> Vec<PropResult> {
        tags.iter()
            .map(|tag| match (*tag, mailbox.kind) {
                (PR_MAILBOX_OWNER_ENTRYID | PR_MAILBOX_OWNER_NAME, StoreKind::Public) => {
                    Err(MapiError::Denied)
                }
                (PR_MAILBOX_OWNER_ENTRYID, StoreKind::Private) => Ok(PropValue::Binary(
                    synth::owner_entry_id(&self.identity.organization, &mailbox.owner),
                )),
                (PR_MAILBOX_OWNER_NAME, StoreKind::Private) => {
                    let name = if mailbox.owner == self.identity.username {
                        self.identity.display_name.clone()
                    } else {
                        mailbox.owner.clone()
                    };
                    Ok(PropValue::Unicode(name))
                }
                (PR_MAPPING_SIGNATURE, _) => Ok(PropValue::Binary(mailbox.replica_guid.to_vec())),
                _ => self.stored_property(mailbox.root, *tag),
            })
            .collect()
    }

    fn committed_root_properties(
        &self,
        handle: Handle,
        fid: FolderId,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        let backend = self.backend_of(handle).ok_or(MapiError::NotInitialized)?;
        let mut results = synth::answer(
            tags,
            |tag| match tag {
                PR_CONTENT_COUNT => Some(count(backend.child_count(fid, ChildKind::Messages))),
                PR_ASSOC_CONTENT_COUNT => Some(count(
                    backend.child_count(fid, ChildKind::AssociatedMessages),
                )),
                PR_FOLDER_CHILD_COUNT => Some(count(backend.child_count(fid, ChildKind::Folders))),
                PR_SUBFOLDERS => Some(backend.has_subfolders(fid).map(PropValue::Boolean)),
                _ => self.root_local(handle, fid, tag),
            },
            |missing| backend.get_properties(BackendObject::Folder(fid), missing),
        )?;
        // The record of a root keeps what it was provisioned with.
        for (tag, result) in tags.iter().zip(results.iter_mut()) {
            if *result == Err(MapiError::NotFound)
                && let Ok(value) = self.stored_property(fid, *tag)
            {
                *result = Ok(value);
            }
        }
        Ok(results)
    }

    fn system_folder_properties(
        &self,
        handle: Handle,
        fid: FolderId,
        tags: &[PropTag],
    ) -> Vec<PropResult> {
        tags.iter()
            .map(|tag| match *tag {
                PR_FOLDER_CHILD_COUNT => count(
                    self.store
                        .count_children(fid, ChildFilter::folders())
                        .map_err(MapiError::from),
                ),
                PR_SUBFOLDERS => self
                    .store
                    .count_children(fid, ChildFilter::folders())
                    .map(|count| PropValue::Boolean(count > 0))
                    .map_err(MapiError::from),
                PR_CONTENT_COUNT | PR_ASSOC_CONTENT_COUNT | PR_CONTENT_UNREAD => {
                    Ok(PropValue::Long(0))
                }
                PR_SOURCE_KEY => Ok(PropValue::Binary(
                    self.tree.owning_mailbox(handle).1.source_key(fid),
                )),
                PR_LOCAL_COMMIT_TIME_MAX => Ok(PropValue::now()),
                PR_FID => Ok(PropValue::from_id(fid)),
                PR_PARENT_FID => self
                    .store
                    .get_parent(fid.into())
                    .map(PropValue::from_id)
                    .map_err(MapiError::from),
                _ => self.stored_property(fid, *tag),
            })
            .collect()
    }

    /// Writes properties to whoever stores the object. A pending backend root
    /// buffers them and is committed as soon as it knows its container class
    /// and display name.
    ///
    /// # Panics
    ///
    /// Panics when `handle` is a table, stream, subscription or sync context.
    pub fn set_properties(&mut self, handle: Handle, row: &PropertyRow) -> Result<(), MapiError> {
        if let Node::Folder(folder) = self.tree.get(handle)?
            && matches!(
                folder.backing,
                FolderBacking::Committed { .. } | FolderBacking::System
            )
        {
            self.ensure_unique_name(folder.fid, row)?;
        }
        match self.tree.get_mut(handle)? {
            Node::Mailbox(mailbox) => {
                let root = mailbox.root;
                self.store.set_properties(root.into(), row)?;
            }
            Node::Folder(folder) => {
                let fid = folder.fid;
                match &mut folder.backing {
                    FolderBacking::Pending { buffer } => {
                        buffer.merge(row);
                        trace!("buffered {} properties on pending {fid}", row.len());
                        self.maybe_commit(handle)?;
                    }
                    FolderBacking::Committed { lease, .. } => {
                        lease
                            .backend()
                            .set_properties(BackendObject::Folder(fid), row)?;
                        if let Some(name) = row.get(PR_DISPLAY_NAME) {
                            let mirrored = PropertyRow::new().with(PR_DISPLAY_NAME, name.clone());
                            self.store.set_properties(fid.into(), &mirrored)?;
                        }
                    }
                    FolderBacking::Inherited => {
                        let backend = self.backend_of(handle).ok_or(MapiError::NotInitialized)?;
                        backend.set_properties(BackendObject::Folder(fid), row)?;
                    }
                    FolderBacking::System => self.store.set_properties(fid.into(), row)?,
                }
            }
            Node::Message(message) => {
                if !message.read_write {
                    return Err(MapiError::Denied);
                }
                let mid = message.mid;
                match self.backend_of(handle) {
                    Some(backend) => backend.set_properties(BackendObject::Message(mid), row)?,
                    None => self.store.set_properties(mid.into(), row)?,
                }
            }
            Node::Attachment(attachment) => {
                let object = BackendObject::Attachment(attachment.mid, attachment.num);
                let backend = self.backend_of(handle).ok_or(MapiError::Denied)?;
                backend.set_properties(object, row)?;
            }
            other => panic!("{handle} is a {} and has no properties", other.kind()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::{
        mapi::tags::{
            PR_COMMENT, PR_CONTAINER_CLASS, PR_FREEBUSY_EMAIL_ADDRESS, PR_SUBJECT,
        },
        metadata::SystemIndex,
        object::FreeBusyBlockBuilder,
        session::tests::{OWNER, TestSession, session},
    };

    fn folder_props(name: &str, class: &str) -> PropertyRow {
        PropertyRow::new()
            .with(PR_DISPLAY_NAME, PropValue::Unicode(name.into()))
            .with(PR_CONTAINER_CLASS, PropValue::Unicode(class.into()))
    }

    #[rstest]
    fn test_private_mailbox_identity(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let values = assert_ok!(session.get_properties(
            logon,
            &[PR_MAILBOX_OWNER_NAME, PR_MAILBOX_OWNER_ENTRYID, PR_MAPPING_SIGNATURE]
        ));
        assert_eq!(values[0], Ok(PropValue::Unicode("John Doe".into())));
        let Ok(PropValue::Binary(entry_id)) = &values[1] else {
            panic!("owner entry id should be binary, got {:?}", values[1]);
        };
        assert!(entry_id.ends_with(b"/cn=Recipients/cn=jdoe\0"));
        let guid = assert_ok!(session.tree().mailbox(logon)).replica_guid;
        assert_eq!(values[2], Ok(PropValue::Binary(guid.to_vec())));
    }

    #[rstest]
    fn test_public_mailbox_hides_owner(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Public));
        let values = assert_ok!(session.get_properties(
            logon,
            &[PR_MAILBOX_OWNER_NAME, PR_MAILBOX_OWNER_ENTRYID, PR_COMMENT]
        ));
        assert_eq!(values[0], Err(MapiError::Denied));
        assert_eq!(values[1], Err(MapiError::Denied));
        assert_eq!(values[2], Err(MapiError::NotFound));
    }

    #[rstest]
    fn test_system_folder_counts_are_live(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let top = assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
        let root_fid = assert_ok!(session.tree().mailbox(logon)).root;
        let values = assert_ok!(session.get_properties(
            top,
            &[
                PR_FOLDER_CHILD_COUNT,
                PR_SUBFOLDERS,
                PR_CONTENT_COUNT,
                PR_PARENT_FID,
                PR_DISPLAY_NAME,
                PR_SOURCE_KEY,
            ]
        ));
        assert_eq!(values[0], Ok(PropValue::Long(10)));
        assert_eq!(values[1], Ok(PropValue::Boolean(true)));
        assert_eq!(values[2], Ok(PropValue::Long(0)));
        assert_eq!(values[3], Ok(PropValue::from_id(root_fid)));
        assert_eq!(values[4], Ok(PropValue::Unicode("Top of Information Store".into())));
        assert_matches!(&values[5], Ok(PropValue::Binary(key)) if key.len() == 22);

        assert_ok!(session.create_folder(top, folder_props("Archive", "IPF.Note")));
        let values = assert_ok!(session.get_properties(top, &[PR_FOLDER_CHILD_COUNT]));
        assert_eq!(values[0], Ok(PropValue::Long(11)));
    }

    #[rstest]
    fn test_committed_root_synthesizes_counts(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let inbox = assert_ok!(session.open_special_folder(logon, SystemIndex::Inbox));
        let top = assert_some!(session.tree().parent(inbox));
        let top_fid = assert_ok!(session.tree().folder(top)).fid;
        assert_ok!(session.create_folder(inbox, folder_props("Work", "IPF.Note")));
        let message = assert_ok!(session.create_message(inbox, false));
        assert_ok!(session.save_message(message));

        let values = assert_ok!(session.get_properties(
            inbox,
            &[
                PR_FOLDER_CHILD_COUNT,
                PR_SUBFOLDERS,
                PR_CONTENT_COUNT,
                PR_ASSOC_CONTENT_COUNT,
                PR_PARENT_FID,
                PR_FOLDER_TYPE,
                PR_DISPLAY_NAME,
            ]
        ));
        assert_eq!(values[0], Ok(PropValue::Long(1)));
        assert_eq!(values[1], Ok(PropValue::Boolean(true)));
        assert_eq!(values[2], Ok(PropValue::Long(1)));
        assert_eq!(values[3], Ok(PropValue::Long(0)));
        assert_eq!(values[4], Ok(PropValue::from_id(top_fid)));
        assert_eq!(values[5], Ok(PropValue::Long(FOLDER_GENERIC)));
        assert_eq!(values[6], Ok(PropValue::Unicode("Inbox".into())));
    }

    #[rstest]
    fn test_backend_properties_round_trip(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let inbox = assert_ok!(session.open_special_folder(logon, SystemIndex::Inbox));
        let work = assert_ok!(session.create_folder(inbox, folder_props("Work", "IPF.Note")));
        let row = PropertyRow::new().with(PR_COMMENT, PropValue::Unicode("projects".into()));
        assert_ok!(session.set_properties(work, &row));
        let values = assert_ok!(session.get_properties(work, &[PR_COMMENT, PR_SUBJECT]));
        assert_eq!(values[0], Ok(PropValue::Unicode("projects".into())));
        assert_eq!(values[1], Err(MapiError::NotFound));

        let message = assert_ok!(session.create_message(work, false));
        let subject = PropertyRow::new().with(PR_SUBJECT, PropValue::Unicode("hello".into()));
        assert_ok!(session.set_properties(message, &subject));
        let values = assert_ok!(session.get_properties(message, &[PR_SUBJECT]));
        assert_eq!(values[0], Ok(PropValue::Unicode("hello".into())));
    }

    #[rstest]
    fn test_system_properties_round_trip(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let views = assert_ok!(session.open_special_folder(logon, SystemIndex::Views));
        let row = PropertyRow::new().with(PR_COMMENT, PropValue::Unicode("saved views".into()));
        assert_ok!(session.set_properties(views, &row));
        let values = assert_ok!(session.get_properties(views, &[PR_COMMENT]));
        assert_eq!(values[0], Ok(PropValue::Unicode("saved views".into())));

        assert_ok!(session.set_properties(logon, &row));
        let values = assert_ok!(session.get_properties(logon, &[PR_COMMENT]));
        assert_eq!(values[0], Ok(PropValue::Unicode("saved views".into())));
    }

    #[rstest]
    fn test_renaming_a_root_mirrors_into_the_store(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let notes = assert_ok!(session.open_special_folder(logon, SystemIndex::Notes));
        let fid = assert_ok!(session.tree().folder(notes)).fid;
        let row = PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode("Memos".into()));
        assert_ok!(session.set_properties(notes, &row));
        let record = assert_ok!(session.store.record(fid.into()));
        assert_eq!(record.display_name.as_deref(), Some("Memos"));
    }

    #[rstest]
    fn test_renaming_a_root_onto_a_sibling_collides(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let top = assert_ok!(session.open_special_folder(logon, SystemIndex::TopOfStore));
        let top_fid = assert_ok!(session.tree().folder(top)).fid;
        assert_ok!(session.create_folder(top, folder_props("Alpha", "IPF.Note")));
        let beta = assert_ok!(session.create_folder(top, folder_props("Beta", "IPF.Note")));
        let beta_fid = assert_ok!(session.tree().folder(beta)).fid;

        let rename = PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode("alpha".into()));
        assert_matches!(session.set_properties(beta, &rename), Err(MapiError::Collision));
        let named = assert_ok!(
            session
                .store
                .find_children(top_fid, ChildFilter::folders().named("Alpha"))
        );
        assert_eq!(named.len(), 1);
        let record = assert_ok!(session.store.record(beta_fid.into()));
        assert_eq!(record.display_name.as_deref(), Some("Beta"));
        let values = assert_ok!(session.get_properties(beta, &[PR_DISPLAY_NAME]));
        assert_eq!(values[0], Ok(PropValue::Unicode("Beta".into())));

        let recased = PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode("BETA".into()));
        assert_ok!(session.set_properties(beta, &recased));
    }

    #[rstest]
    fn test_renaming_a_system_folder_onto_a_sibling_collides(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let views = assert_ok!(session.open_special_folder(logon, SystemIndex::Views));
        let rename = PropertyRow::new()
            .with(PR_DISPLAY_NAME, PropValue::Unicode(SystemIndex::Search.display_name().into()));
        assert_matches!(session.set_properties(views, &rename), Err(MapiError::Collision));
    }

    #[rstest]
    fn test_freebusy_block_answers_first(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Public));
        let freebusy = assert_ok!(session.open_special_folder(logon, SystemIndex::FreeBusy));
        let message = assert_ok!(session.create_message(freebusy, false));
        let subject =
            PropertyRow::new().with(PR_SUBJECT, PropValue::Unicode("USER-/CN=JDOE".into()));
        assert_ok!(session.set_properties(message, &subject));
        let block = assert_ok!(
            FreeBusyBlockBuilder::default()
                .email("jdoe@example.org")
                .build()
        );
        assert_ok!(session.attach_freebusy(message, block));
        let values =
            assert_ok!(session.get_properties(message, &[PR_FREEBUSY_EMAIL_ADDRESS, PR_SUBJECT]));
        assert_eq!(values[0], Ok(PropValue::Unicode("jdoe@example.org".into())));
        assert_eq!(values[1], Ok(PropValue::Unicode("USER-/CN=JDOE".into())));
    }

    #[rstest]
    #[should_panic(expected = "has no properties")]
    fn test_subscriptions_have_no_properties(session: TestSession) {
        let mut session = session.session;
        let logon = assert_ok!(session.logon(OWNER, StoreKind::Private));
        let subscription = assert_ok!(session.subscribe(logon, enumflags2::BitFlags::all()));
        let _ = session.get_properties(subscription, &[PR_SUBJECT]);
    }
}
