//! Operations reshaping the folder hierarchy. Each keeps the metadata store
//! and its discovery index in step with the backends.

mod creation;

use enumflags2::BitFlags;
use log::{debug, trace};

pub use creation::CommitOutcome;

use crate::{
    backend::{Backend, BackendObject, DeleteFlag, MoveDestination},
    mapi::{
        FolderId, MapiError, PropValue, PropertyRow,
        tags::{PR_CHANGE_NUM, PR_CONTAINER_CLASS, PR_DISPLAY_NAME, PR_PARENT_FID},
    },
    metadata::{ChildFilter, RecordAttrs, RecordKind, StoreError, SystemIndex},
    object::{FolderBacking, Handle, Node},
    session::Session,
};

impl Session {
    /// Drops `fid` and `descendants` from the discovery index.
    fn purge_index(&self, fid: FolderId, descendants: &[FolderId]) -> Result<(), MapiError> {
        for id in std::iter::once(&fid).chain(descendants) {
            match self.store.index_unregister((*id).into()) {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(error) => return Err(error.into()),
            }
        }
        trace!("purged {fid} and {} descendants from the index", descendants.len());
        Ok(())
    }

    fn rewrite_index(
        &self,
        mailbox: FolderId,
        remaps: &[(FolderId, String)],
    ) -> Result<(), MapiError> {
        for (id, _) in remaps {
            match self.store.index_unregister((*id).into()) {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(error) => return Err(error.into()),
            }
        }
        for (id, uri) in remaps {
            self.store.index_register(mailbox, (*id).into(), uri)?;
        }
        Ok(())
    }

    /// Deletes the child `fid` of the open folder `parent`.
    pub fn delete_folder(
        &mut self,
        parent: Handle,
        fid: FolderId,
        flags: BitFlags<DeleteFlag>,
    ) -> Result<(), MapiError> {
        let parent_fid = match self.tree.get(parent)? {
            Node::Folder(folder) => folder.fid,
            _ => return Err(MapiError::InvalidParameter),
        };
        self.ensure_committed(parent)?;

        if let Some(backend) = self.backend_of(parent) {
            let linked = backend
                .get_properties(BackendObject::Folder(fid), &[PR_PARENT_FID])?
                .pop()
                .and_then(Result::ok)
                .and_then(|value| value.as_id());
            if linked != Some(parent_fid.into()) {
                return Err(MapiError::NotFound);
            }
            let descendants = backend.delete_folder(fid, flags)?;
            self.purge_index(fid, &descendants)?;
            debug!("deleted backend folder {fid} with {} descendants", descendants.len());
            return Ok(());
        }

        let record = self.store.record(fid.into())?;
        if record.kind != RecordKind::Folder || record.parent != Some(parent_fid) {
            return Err(MapiError::NotFound);
        }
        self.delete_stored_folder(fid, flags)
    }

    fn delete_stored_folder(
        &self,
        fid: FolderId,
        flags: BitFlags<DeleteFlag>,
    ) -> Result<(), MapiError> {
        let record = self.store.record(fid.into())?;
        if record.system_idx.is_some() {
            return Err(MapiError::Denied);
        }
        if record.backend_root {
            if let Some(uri) = &record.uri {
                let lease = self.lease(uri)?;
                let backend = lease.backend();
                backend.bind_root(fid)?;
                let descendants = backend.delete_folder(fid, flags)?;
                self.purge_index(fid, &descendants)?;
            }
        } else {
            let children = self.store.find_children(fid, ChildFilter::folders())?;
            if !children.is_empty() && !flags.contains(DeleteFlag::Folders) {
                return Err(MapiError::HasFolders);
            }
            let messages = self.store.find_children(fid, ChildFilter::all_messages())?;
            if !messages.is_empty() && !flags.contains(DeleteFlag::Messages) {
                return Err(MapiError::HasMessages);
            }
            for child in children {
                self.delete_stored_folder(FolderId::from(child), flags)?;
            }
            for message in messages {
                self.store.delete_record(message)?;
            }
        }
        self.store.delete_record(fid.into())?;
        debug!("deleted folder record {fid}");
        Ok(())
    }

    fn current_name(&self, backend: &dyn Backend, fid: FolderId) -> Result<String, MapiError> {
        backend
            .get_properties(BackendObject::Folder(fid), &[PR_DISPLAY_NAME])?
            .pop()
            .and_then(Result::ok)
            .and_then(|value| value.as_str().map(str::to_string))
            .ok_or(MapiError::NotFound)
    }

    /// Moves the backend folder `folder` below `target`, renaming it on the
    /// way when `new_name` is given.
    ///
    /// Moving to the top of the information store promotes the folder to a
    /// backend root of its own; moving a root below another backend folder
    /// demotes it.
    pub fn move_folder(
        &mut self,
        folder: Handle,
        target: Handle,
        new_name: Option<&str>,
    ) -> Result<(), MapiError> {
        let (fid, special, was_root, pending) = {
            let folder = self.tree.folder(folder)?;
            (
                folder.fid,
                folder.system_idx.is_some(),
                folder.is_backend_root(),
                folder.is_pending(),
            )
        };
        if !self.tree.is_backend_owned(folder) || special {
            return Err(MapiError::Denied);
        }
        if pending {
            return Err(MapiError::NotInitialized);
        }
        let (target_fid, target_idx) = match self.tree.get(target)? {
            Node::Folder(target) => (target.fid, target.system_idx),
            _ => return Err(MapiError::InvalidParameter),
        };
        self.ensure_committed(target)?;
        if self.tree.is_within(target, folder) {
            return Err(MapiError::InvalidParameter);
        }
        let source = self.backend_of(folder).ok_or(MapiError::NotInitialized)?;
        let mailbox = self.tree.owning_mailbox(folder).1.root;
        if self.tree.owning_mailbox(target).1.root != mailbox {
            return Err(MapiError::Denied);
        }
        let name = match new_name {
            Some(name) => name.to_string(),
            None => self.current_name(source.as_ref(), fid)?,
        };

        if let Some(destination) = self.backend_of(target) {
            if destination
                .lookup_child(target_fid, &name)?
                .is_some_and(|existing| existing != fid)
            {
                return Err(MapiError::Collision);
            }
            let target_uri = match self.tree.folder(target)?.uri() {
                Some(uri) => uri.to_string(),
                None => self.store.index_uri(target_fid.into())?,
            };
            let remaps = source.move_folder(
                fid,
                Some(&MoveDestination {
                    uri: &target_uri,
                    parent: target_fid,
                }),
                new_name,
            )?;
            self.rewrite_index(mailbox, &remaps)?;
            if was_root {
                self.store.delete_record(fid.into())?;
                self.tree.folder_mut(folder)?.backing = FolderBacking::Inherited;
                debug!("demoted {fid} below {target_fid}");
            }
        } else if target_idx == Some(SystemIndex::TopOfStore) {
            let clash = self
                .store
                .find_children(target_fid, ChildFilter::folders().named(&name))?
                .into_iter()
                .any(|existing| existing != u64::from(fid));
            if clash {
                return Err(MapiError::Collision);
            }
            let remaps = source.move_folder(fid, None, new_name)?;
            self.rewrite_index(mailbox, &remaps)?;
            let uri = remaps
                .iter()
                .find(|(id, _)| *id == fid)
                .map(|(_, uri)| uri.clone())
                .ok_or(MapiError::CallFailed)?;
            let renamed =
                PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode(name.clone()));
            if was_root {
                self.store.set_parent(fid.into(), target_fid)?;
                self.store.set_backend_uri(fid.into(), Some(&uri))?;
                self.store.set_properties(fid.into(), &renamed)?;
            } else {
                self.promote(mailbox, fid, target_fid, &name, &uri, source.as_ref())?;
                let lease = self.lease(&uri)?;
                lease.backend().bind_root(fid)?;
                self.tree.folder_mut(folder)?.backing = FolderBacking::Committed { lease, uri };
                debug!("promoted {fid} to a root below {target_fid}");
            }
        } else {
            return Err(MapiError::Denied);
        }
        self.tree.reparent(folder, target);
        Ok(())
    }

    /// Gives a folder that just left its backend parent a root record of its
    /// own.
    fn promote(
        &self,
        mailbox: FolderId,
        fid: FolderId,
        parent: FolderId,
        name: &str,
        uri: &str,
        backend: &dyn Backend,
    ) -> Result<(), MapiError> {
        let attrs = RecordAttrs::folder(mailbox)
            .backend_root(true)
            .uri(uri)
            .display_name(name)
            .build()?;
        self.store.create_record(Some(parent), fid.into(), &attrs)?;
        let change_number = self.store.allocate_change_number(mailbox)?;
        let mut props =
            PropertyRow::new().with(PR_CHANGE_NUM, PropValue::from_id(change_number));
        if let Some(Ok(class)) = backend
            .get_properties(BackendObject::Folder(fid), &[PR_CONTAINER_CLASS])?
            .pop()
        {
            props.set(PR_CONTAINER_CLASS, class);
        }
        self.store.set_properties(fid.into(), &props)?;
        Ok(())
    }
}
