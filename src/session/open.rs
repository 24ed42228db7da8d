use enumflags2::BitFlags;
use log::{debug, trace};

use crate::{
    backend::{BackendObject, ContextLease},
    mapi::{
        FolderId, MapiError, MessageId, PropTag, PropValue, PropertyRow,
        tags::{PR_ASSOCIATED, PR_CONTAINER_CLASS, PR_DISPLAY_NAME, PR_PARENT_FID},
    },
    metadata::{RecordAttrs, RecordKind, StoreError, SystemIndex},
    object::{
        Attachment, Folder, FolderBacking, FreeBusyBlock, Handle, Message, MessageMode, Node,
        NotificationEvent, Subscription, SyncContext, SyncKind,
    },
    session::Session,
};

/// Strips the last path segment off a backend URI, or answers `None` once
/// only the scheme is left.
fn parent_uri(uri: &str) -> Option<&str> {
    let trimmed = uri.strip_suffix('/').unwrap_or(uri);
    let cut = trimmed.rfind('/')?;
    let parent = &uri[..=cut];
    if parent.ends_with("://") {
        None
    } else {
        Some(parent)
    }
}

impl Session {
    pub(crate) fn lease(&self, uri: &str) -> Result<ContextLease, MapiError> {
        if let Some(id) = self.contexts.lookup_uri(uri)
            && let Ok(lease) = self.contexts.acquire_by_id(id)
        {
            return Ok(lease);
        }
        self.contexts.acquire(uri)
    }

    /// Builds the node of folder `fid` from what the metadata store knows
    /// about it. Provisioned roots come back holding a lease on their
    /// context.
    pub(crate) fn folder_node(&self, fid: FolderId) -> Result<Folder, MapiError> {
        let record = match self.store.record(fid.into()) {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                self.store.index_uri(fid.into())?;
                return Ok(Folder {
                    fid,
                    system_idx: None,
                    backing: FolderBacking::Inherited,
                });
            }
            Err(error) => return Err(error.into()),
        };
        if record.kind != RecordKind::Folder {
            return Err(MapiError::NotFound);
        }
        let backing = match (record.backend_root, record.uri) {
            (false, _) => FolderBacking::System,
            (true, Some(uri)) => {
                let lease = self.lease(&uri)?;
                lease.backend().bind_root(fid)?;
                FolderBacking::Committed { lease, uri }
            }
            (true, None) => {
                let mut buffer = PropertyRow::new();
                if let Some(name) = record.display_name {
                    buffer.set(PR_DISPLAY_NAME, PropValue::Unicode(name));
                }
                if let Ok(class) = self.store.get_property(fid.into(), PR_CONTAINER_CLASS) {
                    buffer.set(PR_CONTAINER_CLASS, class);
                }
                FolderBacking::Pending { buffer }
            }
        };
        Ok(Folder {
            fid,
            system_idx: record.system_idx,
            backing,
        })
    }

    /// Ids from the mailbox root down to `fid`.
    ///
    /// # Panics
    ///
    /// Panics if the metadata store no longer links `fid` to the root.
    fn folder_chain(&self, root: FolderId, fid: FolderId) -> Result<Vec<FolderId>, MapiError> {
        let mut chain = vec![fid];
        let mut current = fid;
        if matches!(self.store.record(fid.into()), Err(StoreError::NotFound)) {
            let uri = self.store.index_uri(fid.into())?;
            let mut prefix = uri.as_str();
            loop {
                prefix = parent_uri(prefix)
                    .unwrap_or_else(|| panic!("{fid} at {uri} should sit below a backend root"));
                let id = match self.store.find_by_uri(prefix) {
                    Ok(id) => FolderId::from(id),
                    Err(StoreError::NotFound) => continue,
                    Err(error) => return Err(error.into()),
                };
                chain.push(id);
                current = id;
                match self.store.record(id.into()) {
                    Ok(_) => break,
                    Err(StoreError::NotFound) => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
        if self.store.record(current.into())?.mailbox != root {
            return Err(MapiError::NotFound);
        }
        while current != root {
            current = match self.store.get_parent(current.into()) {
                Ok(parent) => parent,
                Err(StoreError::NotFound) => panic!("{current} should be linked to {root}"),
                Err(error) => return Err(error.into()),
            };
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Opens a direct child of a folder, or the root folder of a mailbox.
    pub fn open_folder(&mut self, parent: Handle, fid: FolderId) -> Result<Handle, MapiError> {
        let folder = match self.tree.get(parent)? {
            Node::Mailbox(mailbox) => {
                if mailbox.root != fid {
                    return Err(MapiError::NotFound);
                }
                self.folder_node(fid)?
            }
            Node::Folder(parent_folder) => {
                let parent_fid = parent_folder.fid;
                self.ensure_committed(parent)?;
                if let Some(backend) = self.backend_of(parent) {
                    backend.open_folder(fid)?;
                    let linked = backend
                        .get_properties(BackendObject::Folder(fid), &[PR_PARENT_FID])?
                        .pop()
                        .and_then(Result::ok)
                        .and_then(|value| value.as_id());
                    if linked != Some(parent_fid.into()) {
                        return Err(MapiError::NotFound);
                    }
                    Folder {
                        fid,
                        system_idx: None,
                        backing: FolderBacking::Inherited,
                    }
                } else {
                    if self.store.get_parent(fid.into())? != parent_fid {
                        return Err(MapiError::NotFound);
                    }
                    self.folder_node(fid)?
                }
            }
            _ => return Err(MapiError::InvalidParameter),
        };
        trace!("opening folder {fid} below {parent}");
        Ok(self.tree.insert(Some(parent), Node::Folder(folder)))
    }

    /// Opens any folder of the mailbox `handle` belongs to. The folders
    /// between the mailbox and `fid` are opened implicitly and go away with
    /// their last descendant.
    pub fn open_folder_by_fid(
        &mut self,
        handle: Handle,
        fid: FolderId,
    ) -> Result<Handle, MapiError> {
        self.tree.get(handle)?;
        let (logon, mailbox) = self.tree.owning_mailbox(handle);
        let root = mailbox.root;
        let chain = self.folder_chain(root, fid)?;
        debug!("opening {fid} through {} ancestors", chain.len() - 1);

        let mut parent = logon;
        for (depth, id) in chain.iter().enumerate() {
            let last = depth + 1 == chain.len();
            if !last && let Some(existing) = self.tree.implicit_folder(parent, *id) {
                parent = existing;
                continue;
            }
            let folder = match self.folder_node(*id) {
                Ok(folder) => folder,
                Err(error) => {
                    if self.tree.is_implicit(parent) {
                        self.tree.remove_subtree(parent);
                    }
                    return Err(error);
                }
            };
            parent = if last {
                self.tree.insert(Some(parent), Node::Folder(folder))
            } else {
                self.tree.insert_implicit(Some(parent), Node::Folder(folder))
            };
        }
        Ok(parent)
    }

    pub fn open_special_folder(
        &mut self,
        handle: Handle,
        index: SystemIndex,
    ) -> Result<Handle, MapiError> {
        self.tree.get(handle)?;
        let root = self.tree.owning_mailbox(handle).1.root;
        let fid = self.store.find_system_folder(root, index)?;
        self.open_folder_by_fid(handle, fid)
    }

    pub fn open_message(
        &mut self,
        folder: Handle,
        mid: MessageId,
        read_write: bool,
    ) -> Result<Handle, MapiError> {
        let fid = self.tree.folder(folder)?.fid;
        self.ensure_committed(folder)?;
        let associated = if let Some(backend) = self.backend_of(folder) {
            backend.open_message(fid, mid, read_write)?;
            matches!(
                backend
                    .get_properties(BackendObject::Message(mid), &[PR_ASSOCIATED])?
                    .first(),
                Some(Ok(PropValue::Boolean(true)))
            )
        } else {
            let record = self.store.record(mid.into())?;
            if record.kind != RecordKind::Message || record.parent != Some(fid) {
                return Err(MapiError::NotFound);
            }
            record.associated
        };
        Ok(self.tree.insert(
            Some(folder),
            Node::Message(Message {
                mid,
                folder: fid,
                mode: MessageMode::Open,
                read_write,
                associated,
                freebusy: None,
            }),
        ))
    }

    pub fn create_message(
        &mut self,
        folder: Handle,
        associated: bool,
    ) -> Result<Handle, MapiError> {
        let fid = self.tree.folder(folder)?.fid;
        self.ensure_committed(folder)?;
        let mailbox = self.tree.owning_mailbox(folder).1;
        let (root, replica) = (mailbox.root, mailbox.replica_id);
        let mid = MessageId::new(self.store.allocate_change_number(root)?, replica);
        if let Some(backend) = self.backend_of(folder) {
            backend.create_message(fid, mid, associated)?;
        } else {
            let attrs = RecordAttrs::message(root, associated).build()?;
            self.store.create_record(Some(fid), mid.into(), &attrs)?;
        }
        debug!("created message {mid} in {fid}");
        Ok(self.tree.insert(
            Some(folder),
            Node::Message(Message {
                mid,
                folder: fid,
                mode: MessageMode::Create,
                read_write: true,
                associated,
                freebusy: None,
            }),
        ))
    }

    pub fn save_message(&mut self, message: Handle) -> Result<(), MapiError> {
        let (mid, read_write) = {
            let message = self.tree.message(message)?;
            (message.mid, message.read_write)
        };
        if !read_write {
            return Err(MapiError::Denied);
        }
        if let Some(backend) = self.backend_of(message) {
            backend.save_message(mid)?;
        }
        self.tree.message_mut(message)?.mode = MessageMode::Open;
        Ok(())
    }

    /// Serves the free/busy properties of a message from `block` from now on.
    pub fn attach_freebusy(
        &mut self,
        message: Handle,
        block: FreeBusyBlock,
    ) -> Result<(), MapiError> {
        self.tree.message_mut(message)?.freebusy = Some(block);
        Ok(())
    }

    pub fn open_attachment(&mut self, message: Handle, num: u32) -> Result<Handle, MapiError> {
        let mid = self.tree.message(message)?.mid;
        let backend = self.backend_of(message).ok_or(MapiError::NotFound)?;
        backend.open_attachment(mid, num)?;
        Ok(self
            .tree
            .insert(Some(message), Node::Attachment(Attachment { mid, num })))
    }

    pub fn create_attachment(&mut self, message: Handle) -> Result<Handle, MapiError> {
        let mid = self.tree.message(message)?.mid;
        let backend = self.backend_of(message).ok_or(MapiError::Denied)?;
        let num = backend.create_attachment(mid)?;
        Ok(self
            .tree
            .insert(Some(message), Node::Attachment(Attachment { mid, num })))
    }

    /// Registers for events on the whole store, when `handle` is a mailbox,
    /// or on one folder.
    pub fn subscribe(
        &mut self,
        handle: Handle,
        events: BitFlags<NotificationEvent>,
    ) -> Result<Handle, MapiError> {
        let folder = match self.tree.get(handle)? {
            Node::Mailbox(_) => None,
            Node::Folder(folder) => Some(folder.fid),
            _ => return Err(MapiError::InvalidParameter),
        };
        Ok(self.tree.insert(
            Some(handle),
            Node::Subscription(Subscription { events, folder }),
        ))
    }

    pub fn open_sync_context(
        &mut self,
        folder: Handle,
        kind: SyncKind,
        tags: &[PropTag],
    ) -> Result<Handle, MapiError> {
        let fid = self.tree.folder(folder)?.fid;
        self.ensure_committed(folder)?;
        Ok(self.tree.insert(
            Some(folder),
            Node::SyncContext(SyncContext {
                kind,
                folder: fid,
                tags: tags.to_vec(),
            }),
        ))
    }
}
