use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use enumflags2::BitFlags;
use log::{debug, trace};

use crate::{
    backend::{
        Backend, BackendCursor, BackendFactory, BackendObject, ChildKind, DeleteFlag,
        MoveDestination, TableKind, uri_scheme,
    },
    mapi::{
        FolderId, MapiError, MessageId, PropResult, PropTag, PropValue, PropertyRow, Restriction,
        SortOrder, compare_sort_keys,
        tags::{
            PR_ASSOC_CONTENT_COUNT, PR_ASSOCIATED, PR_ATTACH_NUM, PR_CONTENT_COUNT,
            PR_DISPLAY_NAME, PR_FID, PR_FOLDER_CHILD_COUNT, PR_MID, PR_PARENT_FID, PR_SUBFOLDERS,
        },
    },
};

const SCHEME: &str = "memory";

#[derive(Debug)]
struct Folder {
    uri: String,
    parent: Option<FolderId>,
    props: PropertyRow,
}

#[derive(Debug)]
struct Message {
    folder: FolderId,
    associated: bool,
    saved: bool,
    props: PropertyRow,
    attachments: BTreeMap<u32, PropertyRow>,
}

#[derive(Debug)]
struct Table {
    object: BackendObject,
    kind: TableKind,
    restriction: Option<Restriction>,
    sort: Vec<SortOrder>,
    rows: Vec<u64>,
}

/// Everything stored by the memory backends of one factory. Contexts of the
/// same factory share it, so folders can move between them.
#[derive(Debug, Default)]
struct World {
    folders: BTreeMap<FolderId, Folder>,
    messages: BTreeMap<MessageId, Message>,
    roots: HashMap<String, FolderId>,
    tables: HashMap<BackendCursor, Table>,
    next_cursor: u32,
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl World {
    fn folder(&self, fid: FolderId) -> Result<&Folder, MapiError> {
        self.folders.get(&fid).ok_or(MapiError::NotFound)
    }

    fn message(&self, mid: MessageId) -> Result<&Message, MapiError> {
        self.messages.get(&mid).ok_or(MapiError::NotFound)
    }

    fn subfolders(&self, fid: FolderId) -> impl Iterator<Item = FolderId> + '_ {
        self.folders
            .iter()
            .filter(move |(_, folder)| folder.parent == Some(fid))
            .map(|(id, _)| *id)
    }

    fn messages_of(
        &self,
        fid: FolderId,
        associated: Option<bool>,
    ) -> impl Iterator<Item = MessageId> + '_ {
        self.messages
            .iter()
            .filter(move |(_, message)| {
                message.folder == fid
                    && message.saved
                    && associated.is_none_or(|associated| message.associated == associated)
            })
            .map(|(id, _)| *id)
    }

    /// Every folder below `fid`, parents before their children.
    fn descendants(&self, fid: FolderId) -> Vec<FolderId> {
        let mut found = Vec::new();
        let mut pending = vec![fid];
        while let Some(current) = pending.pop() {
            for child in self.subfolders(current) {
                found.push(child);
                pending.push(child);
            }
        }
        found
    }

    fn child_count(&self, fid: FolderId, kind: ChildKind) -> u32 {
        match kind {
            ChildKind::Folders => count(self.subfolders(fid).count()),
            ChildKind::Messages => count(self.messages_of(fid, Some(false)).count()),
            ChildKind::AssociatedMessages => count(self.messages_of(fid, Some(true)).count()),
        }
    }

    fn sibling_named(&self, parent: FolderId, name: &str) -> Option<FolderId> {
        let name = name.to_lowercase();
        self.subfolders(parent).find(|child| {
            self.folders[child]
                .props
                .get_str(PR_DISPLAY_NAME)
                .is_some_and(|existing| existing.to_lowercase() == name)
        })
    }

    fn property(&self, object: BackendObject, tag: PropTag) -> PropResult {
        match object {
            BackendObject::Folder(fid) => {
                let folder = self.folder(fid)?;
                match tag {
                    PR_FID => Ok(PropValue::from_id(fid)),
                    PR_PARENT_FID => folder
                        .parent
                        .map(PropValue::from_id)
                        .ok_or(MapiError::NotFound),
                    PR_FOLDER_CHILD_COUNT => {
                        Ok(PropValue::Long(self.child_count(fid, ChildKind::Folders).cast_signed()))
                    }
                    PR_SUBFOLDERS => Ok(PropValue::Boolean(self.subfolders(fid).next().is_some())),
                    PR_CONTENT_COUNT => Ok(PropValue::Long(
                        self.child_count(fid, ChildKind::Messages).cast_signed(),
                    )),
                    PR_ASSOC_CONTENT_COUNT => Ok(PropValue::Long(
                        self.child_count(fid, ChildKind::AssociatedMessages)
                            .cast_signed(),
                    )),
                    _ => folder.props.get(tag).cloned().ok_or(MapiError::NotFound),
                }
            }
            BackendObject::Message(mid) => {
                let message = self.message(mid)?;
                match tag {
                    PR_MID => Ok(PropValue::from_id(mid)),
                    PR_ASSOCIATED => Ok(PropValue::Boolean(message.associated)),
                    _ => message.props.get(tag).cloned().ok_or(MapiError::NotFound),
                }
            }
            BackendObject::Attachment(mid, num) => {
                let attachment = self
                    .message(mid)?
                    .attachments
                    .get(&num)
                    .ok_or(MapiError::NotFound)?;
                match tag {
                    PR_ATTACH_NUM => Ok(PropValue::Long(num.cast_signed())),
                    _ => attachment.get(tag).cloned().ok_or(MapiError::NotFound),
                }
            }
        }
    }

    fn table_rows(&self, object: BackendObject, kind: TableKind) -> Result<Vec<u64>, MapiError> {
        let rows = match (object, kind) {
            (BackendObject::Folder(fid), TableKind::Hierarchy) => {
                self.folder(fid)?;
                self.subfolders(fid).map(u64::from).collect()
            }
            (BackendObject::Folder(fid), TableKind::Contents | TableKind::Associated) => {
                self.folder(fid)?;
                let associated = kind == TableKind::Associated;
                self.messages_of(fid, Some(associated))
                    .map(u64::from)
                    .collect()
            }
            (BackendObject::Folder(fid), TableKind::Permissions) => {
                self.folder(fid)?;
                Vec::new()
            }
            (BackendObject::Message(mid), TableKind::Attachments) => self
                .message(mid)?
                .attachments
                .keys()
                .map(|num| u64::from(*num))
                .collect(),
            _ => return Err(MapiError::NoSupport),
        };
        Ok(rows)
    }

    fn row_object(table: &Table, row: u64) -> BackendObject {
        match (table.kind, table.object) {
            (TableKind::Attachments, BackendObject::Message(mid)) => {
                BackendObject::Attachment(mid, u32::try_from(row).unwrap_or(u32::MAX))
            }
            (TableKind::Hierarchy, _) => BackendObject::Folder(FolderId::from(row)),
            _ => BackendObject::Message(MessageId::from(row)),
        }
    }

    fn row_matches(&self, table: &Table, row: u64) -> bool {
        let object = Self::row_object(table, row);
        table.restriction.as_ref().is_none_or(|restriction| {
            restriction.evaluate(&mut |tag| self.property(object, tag).ok())
        })
    }

    /// Rebuilds the rows of a table from scratch, honouring its restriction
    /// and sort order.
    fn refresh_table(&mut self, cursor: BackendCursor) -> Result<u32, MapiError> {
        let table = self.tables.get(&cursor).ok_or(MapiError::InvalidObject)?;
        let mut rows: Vec<u64> = self
            .table_rows(table.object, table.kind)?
            .into_iter()
            .filter(|row| self.row_matches(table, *row))
            .collect();
        if !table.sort.is_empty() {
            let key = |row: u64| -> Vec<Option<PropValue>> {
                let object = Self::row_object(table, row);
                table
                    .sort
                    .iter()
                    .map(|order| self.property(object, order.tag).ok())
                    .collect()
            };
            let mut keyed: Vec<_> = rows.into_iter().map(|row| (key(row), row)).collect();
            keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(&table.sort, a, b));
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }
        let row_count = count(rows.len());
        if let Some(table) = self.tables.get_mut(&cursor) {
            table.rows = rows;
        }
        Ok(row_count)
    }
}

/// A backend keeping its folders and messages in process memory, served
/// under `memory://` URIs.
pub struct MemoryBackend {
    uri: String,
    world: Arc<RwLock<World>>,
    closed: Arc<AtomicUsize>,
}

impl MemoryBackend {
    fn read(&self) -> RwLockReadGuard<'_, World> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.world.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MemoryBackend {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn bind_root(&self, fid: FolderId) -> Result<(), MapiError> {
        let mut world = self.write();
        match world.roots.get(&self.uri) {
            Some(bound) if *bound == fid => return Ok(()),
            Some(_) => return Err(MapiError::Collision),
            None => {}
        }
        trace!("binding {fid} as root of {}", self.uri);
        world.roots.insert(self.uri.clone(), fid);
        world.folders.entry(fid).or_insert_with(|| Folder {
            uri: self.uri.clone(),
            parent: None,
            props: PropertyRow::new(),
        });
        Ok(())
    }

    fn create_folder(
        &self,
        parent: FolderId,
        fid: FolderId,
        props: &PropertyRow,
    ) -> Result<String, MapiError> {
        let mut world = self.write();
        let parent_uri = world.folder(parent)?.uri.clone();
        if world.folders.contains_key(&fid) {
            return Err(MapiError::Collision);
        }
        if let Some(name) = props.get_str(PR_DISPLAY_NAME)
            && world.sibling_named(parent, name).is_some()
        {
            return Err(MapiError::Collision);
        }
        let uri = format!("{parent_uri}{:x}/", u64::from(fid));
        trace!("creating folder {fid} at {uri}");
        world.folders.insert(
            fid,
            Folder {
                uri: uri.clone(),
                parent: Some(parent),
                props: props.clone(),
            },
        );
        Ok(uri)
    }

    fn lookup_child(&self, parent: FolderId, name: &str) -> Result<Option<FolderId>, MapiError> {
        let world = self.read();
        world.folder(parent)?;
        Ok(world.sibling_named(parent, name))
    }

    fn open_folder(&self, fid: FolderId) -> Result<(), MapiError> {
        self.read().folder(fid).map(|_| ())
    }

    fn create_message(
        &self,
        folder: FolderId,
        mid: MessageId,
        associated: bool,
    ) -> Result<(), MapiError> {
        let mut world = self.write();
        world.folder(folder)?;
        if world.messages.contains_key(&mid) {
            return Err(MapiError::Collision);
        }
        world.messages.insert(
            mid,
            Message {
                folder,
                associated,
                saved: false,
                props: PropertyRow::new(),
                attachments: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn open_message(
        &self,
        folder: FolderId,
        mid: MessageId,
        _read_write: bool,
    ) -> Result<(), MapiError> {
        let world = self.read();
        let message = world.message(mid)?;
        if message.folder != folder {
            return Err(MapiError::NotFound);
        }
        Ok(())
    }

    fn save_message(&self, mid: MessageId) -> Result<(), MapiError> {
        let mut world = self.write();
        let message = world.messages.get_mut(&mid).ok_or(MapiError::NotFound)?;
        message.saved = true;
        Ok(())
    }

    fn create_attachment(&self, mid: MessageId) -> Result<u32, MapiError> {
        let mut world = self.write();
        let message = world.messages.get_mut(&mid).ok_or(MapiError::NotFound)?;
        let num = message
            .attachments
            .last_key_value()
            .map_or(0, |(last, _)| last + 1);
        message.attachments.insert(num, PropertyRow::new());
        Ok(num)
    }

    fn open_attachment(&self, mid: MessageId, num: u32) -> Result<(), MapiError> {
        let world = self.read();
        if world.message(mid)?.attachments.contains_key(&num) {
            Ok(())
        } else {
            Err(MapiError::NotFound)
        }
    }

    fn get_properties(
        &self,
        object: BackendObject,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        let world = self.read();
        match object {
            BackendObject::Folder(fid) => world.folder(fid).map(|_| ())?,
            BackendObject::Message(mid) | BackendObject::Attachment(mid, _) => {
                world.message(mid).map(|_| ())?;
            }
        }
        Ok(tags.iter().map(|tag| world.property(object, *tag)).collect())
    }

    fn set_properties(&self, object: BackendObject, row: &PropertyRow) -> Result<(), MapiError> {
        let mut world = self.write();
        let props = match object {
            BackendObject::Folder(fid) => {
                if let Some(name) = row.get_str(PR_DISPLAY_NAME) {
                    let parent = world.folder(fid)?.parent;
                    if let Some(parent) = parent
                        && world
                            .sibling_named(parent, name)
                            .is_some_and(|sibling| sibling != fid)
                    {
                        return Err(MapiError::Collision);
                    }
                }
                &mut world
                    .folders
                    .get_mut(&fid)
                    .ok_or(MapiError::NotFound)?
                    .props
            }
            BackendObject::Message(mid) => {
                &mut world
                    .messages
                    .get_mut(&mid)
                    .ok_or(MapiError::NotFound)?
                    .props
            }
            BackendObject::Attachment(mid, num) => world
                .messages
                .get_mut(&mid)
                .ok_or(MapiError::NotFound)?
                .attachments
                .get_mut(&num)
                .ok_or(MapiError::NotFound)?,
        };
        props.merge(row);
        Ok(())
    }

    fn delete_folder(
        &self,
        fid: FolderId,
        flags: BitFlags<DeleteFlag>,
    ) -> Result<Vec<FolderId>, MapiError> {
        let mut world = self.write();
        world.folder(fid)?;
        let descendants = world.descendants(fid);
        if !descendants.is_empty() && !flags.contains(DeleteFlag::Folders) {
            return Err(MapiError::HasFolders);
        }
        let doomed: Vec<FolderId> = std::iter::once(fid)
            .chain(descendants.iter().copied())
            .collect();
        let has_messages = world
            .messages
            .values()
            .any(|message| doomed.contains(&message.folder));
        if has_messages && !flags.contains(DeleteFlag::Messages) {
            return Err(MapiError::HasMessages);
        }

        debug!("deleting {fid} and {} descendants", descendants.len());
        world
            .messages
            .retain(|_, message| !doomed.contains(&message.folder));
        for id in &doomed {
            if let Some(folder) = world.folders.remove(id)
                && world.roots.get(&folder.uri) == Some(id)
            {
                world.roots.remove(&folder.uri);
            }
        }
        Ok(descendants)
    }

    fn move_folder(
        &self,
        fid: FolderId,
        destination: Option<&MoveDestination<'_>>,
        new_name: Option<&str>,
    ) -> Result<Vec<(FolderId, String)>, MapiError> {
        let mut world = self.write();
        let old_uri = world.folder(fid)?.uri.clone();
        let descendants = world.descendants(fid);

        let new_uri = match destination {
            Some(destination) => {
                if uri_scheme(destination.uri) != Some(SCHEME) {
                    return Err(MapiError::NoSupport);
                }
                if destination.parent == fid || descendants.contains(&destination.parent) {
                    return Err(MapiError::InvalidParameter);
                }
                let parent_uri = world.folder(destination.parent)?.uri.clone();
                let name = match new_name {
                    Some(name) => Some(name.to_string()),
                    None => world
                        .folder(fid)?
                        .props
                        .get_str(PR_DISPLAY_NAME)
                        .map(str::to_string),
                };
                if let Some(name) = name
                    && world
                        .sibling_named(destination.parent, &name)
                        .is_some_and(|sibling| sibling != fid)
                {
                    return Err(MapiError::Collision);
                }
                format!("{parent_uri}{:x}/", u64::from(fid))
            }
            None => old_uri.clone(),
        };

        debug!("moving {fid} from {old_uri} to {new_uri}");
        if world.roots.get(&old_uri) == Some(&fid) {
            world.roots.remove(&old_uri);
        }
        let folder = world.folders.get_mut(&fid).ok_or(MapiError::NotFound)?;
        folder.parent = destination.map(|destination| destination.parent);
        if let Some(name) = new_name {
            folder
                .props
                .set(PR_DISPLAY_NAME, PropValue::Unicode(name.to_string()));
        }
        if destination.is_none() {
            world.roots.insert(new_uri.clone(), fid);
        }

        let mut remaps = Vec::with_capacity(descendants.len() + 1);
        for id in std::iter::once(fid).chain(descendants) {
            let Some(folder) = world.folders.get_mut(&id) else {
                continue;
            };
            if let Some(suffix) = folder.uri.strip_prefix(&old_uri) {
                folder.uri = format!("{new_uri}{suffix}");
            }
            remaps.push((id, folder.uri.clone()));
        }
        Ok(remaps)
    }

    fn child_count(&self, fid: FolderId, kind: ChildKind) -> Result<u32, MapiError> {
        let world = self.read();
        world.folder(fid)?;
        Ok(world.child_count(fid, kind))
    }

    fn has_subfolders(&self, fid: FolderId) -> Result<bool, MapiError> {
        let world = self.read();
        world.folder(fid)?;
        Ok(world.subfolders(fid).next().is_some())
    }

    fn open_table(
        &self,
        object: BackendObject,
        kind: TableKind,
    ) -> Result<(BackendCursor, u32), MapiError> {
        let mut world = self.write();
        let rows = world.table_rows(object, kind)?;
        world.next_cursor += 1;
        let cursor = BackendCursor(world.next_cursor);
        let row_count = count(rows.len());
        trace!("opened {kind:?} table {cursor:?} on {object:?} with {row_count} rows");
        world.tables.insert(
            cursor,
            Table {
                object,
                kind,
                restriction: None,
                sort: Vec::new(),
                rows,
            },
        );
        Ok((cursor, row_count))
    }

    fn set_restriction(
        &self,
        cursor: BackendCursor,
        restriction: Option<&Restriction>,
    ) -> Result<u32, MapiError> {
        let mut world = self.write();
        world
            .tables
            .get_mut(&cursor)
            .ok_or(MapiError::InvalidObject)?
            .restriction = restriction.cloned();
        world.refresh_table(cursor)
    }

    fn set_sort_order(
        &self,
        cursor: BackendCursor,
        order: &[SortOrder],
    ) -> Result<(), MapiError> {
        let mut world = self.write();
        world
            .tables
            .get_mut(&cursor)
            .ok_or(MapiError::InvalidObject)?
            .sort = order.to_vec();
        world.refresh_table(cursor).map(|_| ())
    }

    fn get_row(
        &self,
        cursor: BackendCursor,
        position: u32,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        let world = self.read();
        let table = world.tables.get(&cursor).ok_or(MapiError::InvalidObject)?;
        let row = *table
            .rows
            .get(usize::try_from(position).map_err(|_| MapiError::NotFound)?)
            .ok_or(MapiError::NotFound)?;
        let object = World::row_object(table, row);
        let exists = match object {
            BackendObject::Folder(fid) => world.folders.contains_key(&fid),
            BackendObject::Message(mid) => world.messages.contains_key(&mid),
            BackendObject::Attachment(mid, num) => world
                .messages
                .get(&mid)
                .is_some_and(|message| message.attachments.contains_key(&num)),
        };
        if !exists || !world.row_matches(table, row) {
            return Err(MapiError::NotFound);
        }
        Ok(tags.iter().map(|tag| world.property(object, *tag)).collect())
    }

    fn close_table(&self, cursor: BackendCursor) {
        self.write().tables.remove(&cursor);
    }

    fn close(&self) {
        debug!("closing memory backend {}", self.uri);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens [`MemoryBackend`]s that all share one world.
#[derive(Default)]
pub struct MemoryBackendFactory {
    world: Arc<RwLock<World>>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MemoryBackendFactory {
    /// Number of backends opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of backends closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl BackendFactory for MemoryBackendFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn open(&self, uri: &str) -> Result<Arc<dyn Backend>, MapiError> {
        if uri_scheme(uri) != Some(SCHEME) || !uri.ends_with('/') {
            return Err(MapiError::InvalidParameter);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("opening memory backend {uri}");
        Ok(Arc::new(MemoryBackend {
            uri: uri.to_string(),
            world: Arc::clone(&self.world),
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::mapi::{ReplicaId, Relop, tags::PR_SUBJECT};

    const ROOT_URI: &str = "memory://jdoe/mail/";

    fn fid(counter: u64) -> FolderId {
        FolderId::new(counter, ReplicaId::PRIVATE)
    }

    fn named(name: &str) -> PropertyRow {
        PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode(name.into()))
    }

    #[fixture]
    fn backend() -> Arc<dyn Backend> {
        let factory = MemoryBackendFactory::default();
        let backend = assert_ok!(factory.open(ROOT_URI));
        assert_ok!(backend.bind_root(fid(1)));
        backend
    }

    #[rstest]
    fn test_binding_twice_is_a_no_op(backend: Arc<dyn Backend>) {
        assert_ok!(backend.bind_root(fid(1)));
        assert_matches!(backend.bind_root(fid(2)), Err(MapiError::Collision));
    }

    #[rstest]
    fn test_child_uri_extends_parent_uri(backend: Arc<dyn Backend>) {
        let uri = assert_ok!(backend.create_folder(fid(1), fid(2), &named("Work")));
        assert_eq!(uri, "memory://jdoe/mail/20001/");
        assert_eq!(
            assert_ok!(backend.lookup_child(fid(1), "WORK")),
            Some(fid(2))
        );
        assert_matches!(
            backend.create_folder(fid(1), fid(3), &named("work")),
            Err(MapiError::Collision)
        );
    }

    #[rstest]
    fn test_folder_counts_are_computed(backend: Arc<dyn Backend>) {
        assert_ok!(backend.create_folder(fid(1), fid(2), &named("Work")));
        let mid = MessageId::new(3, ReplicaId::PRIVATE);
        assert_ok!(backend.create_message(fid(1), mid, false));
        assert_eq!(assert_ok!(backend.child_count(fid(1), ChildKind::Messages)), 0);
        assert_ok!(backend.save_message(mid));
        assert_eq!(assert_ok!(backend.child_count(fid(1), ChildKind::Messages)), 1);
        assert_eq!(assert_ok!(backend.child_count(fid(1), ChildKind::Folders)), 1);
        assert!(assert_ok!(backend.has_subfolders(fid(1))));
        assert!(!assert_ok!(backend.has_subfolders(fid(2))));
    }

    #[rstest]
    fn test_delete_reports_descendants(backend: Arc<dyn Backend>) {
        assert_ok!(backend.create_folder(fid(1), fid(2), &named("A")));
        assert_ok!(backend.create_folder(fid(2), fid(3), &named("B")));
        assert_ok!(backend.create_folder(fid(3), fid(4), &named("C")));
        assert_matches!(
            backend.delete_folder(fid(2), BitFlags::empty()),
            Err(MapiError::HasFolders)
        );
        let mut deleted = assert_ok!(backend.delete_folder(fid(2), DeleteFlag::Folders.into()));
        deleted.sort();
        assert_eq!(deleted, vec![fid(3), fid(4)]);
        assert_matches!(backend.open_folder(fid(3)), Err(MapiError::NotFound));
    }

    #[rstest]
    fn test_move_rewrites_subtree_uris(backend: Arc<dyn Backend>) {
        assert_ok!(backend.create_folder(fid(1), fid(2), &named("A")));
        assert_ok!(backend.create_folder(fid(1), fid(3), &named("B")));
        assert_ok!(backend.create_folder(fid(2), fid(4), &named("C")));
        let destination = MoveDestination {
            uri: ROOT_URI,
            parent: fid(3),
        };
        let remaps = assert_ok!(backend.move_folder(fid(2), Some(&destination), None));
        assert_eq!(
            remaps,
            vec![
                (fid(2), "memory://jdoe/mail/30001/20001/".to_string()),
                (fid(4), "memory://jdoe/mail/30001/20001/40001/".to_string()),
            ]
        );
    }

    #[rstest]
    fn test_move_into_own_subtree_is_rejected(backend: Arc<dyn Backend>) {
        assert_ok!(backend.create_folder(fid(1), fid(2), &named("A")));
        assert_ok!(backend.create_folder(fid(2), fid(3), &named("B")));
        let destination = MoveDestination {
            uri: ROOT_URI,
            parent: fid(3),
        };
        assert_matches!(
            backend.move_folder(fid(2), Some(&destination), None),
            Err(MapiError::InvalidParameter)
        );
    }

    #[rstest]
    fn test_detached_folder_becomes_bindable_root(backend: Arc<dyn Backend>) {
        let uri = assert_ok!(backend.create_folder(fid(1), fid(2), &named("A")));
        let remaps = assert_ok!(backend.move_folder(fid(2), None, Some("Archive")));
        assert_eq!(remaps, vec![(fid(2), uri)]);
        let results = assert_ok!(backend.get_properties(
            BackendObject::Folder(fid(2)),
            &[PR_PARENT_FID, PR_DISPLAY_NAME]
        ));
        assert_eq!(results[0], Err(MapiError::NotFound));
        assert_eq!(results[1], Ok(PropValue::Unicode("Archive".into())));
    }

    #[rstest]
    fn test_restricted_table_skips_vanished_rows(backend: Arc<dyn Backend>) {
        for (counter, subject) in [(2, "alpha"), (3, "beta"), (4, "alpha")] {
            let mid = MessageId::new(counter, ReplicaId::PRIVATE);
            assert_ok!(backend.create_message(fid(1), mid, false));
            assert_ok!(backend.set_properties(
                BackendObject::Message(mid),
                &PropertyRow::new().with(PR_SUBJECT, PropValue::Unicode(subject.into()))
            ));
            assert_ok!(backend.save_message(mid));
        }
        let (cursor, rows) =
            assert_ok!(backend.open_table(BackendObject::Folder(fid(1)), TableKind::Contents));
        assert_eq!(rows, 3);
        let restriction = Restriction::Property {
            relop: Relop::Eq,
            tag: PR_SUBJECT,
            value: PropValue::Unicode("alpha".into()),
        };
        assert_eq!(assert_ok!(backend.set_restriction(cursor, Some(&restriction))), 2);
        assert_ok!(backend.set_properties(
            BackendObject::Message(MessageId::new(2, ReplicaId::PRIVATE)),
            &PropertyRow::new().with(PR_SUBJECT, PropValue::Unicode("gamma".into()))
        ));
        assert_err!(backend.get_row(cursor, 0, &[PR_SUBJECT]));
        let row = assert_ok!(backend.get_row(cursor, 1, &[PR_MID]));
        assert_eq!(
            row[0],
            Ok(PropValue::from_id(MessageId::new(4, ReplicaId::PRIVATE)))
        );
    }

    #[rstest]
    fn test_sorted_hierarchy_table(backend: Arc<dyn Backend>) {
        assert_ok!(backend.create_folder(fid(1), fid(2), &named("b")));
        assert_ok!(backend.create_folder(fid(1), fid(3), &named("a")));
        let (cursor, _) =
            assert_ok!(backend.open_table(BackendObject::Folder(fid(1)), TableKind::Hierarchy));
        assert_ok!(backend.set_sort_order(cursor, &[SortOrder::ascending(PR_DISPLAY_NAME)]));
        let row = assert_ok!(backend.get_row(cursor, 0, &[PR_FID]));
        assert_eq!(row[0], Ok(PropValue::from_id(fid(3))));
        backend.close_table(cursor);
        assert_matches!(
            backend.get_row(cursor, 0, &[PR_FID]),
            Err(MapiError::InvalidObject)
        );
    }

    #[rstest]
    fn test_attachments_are_numbered_per_message(backend: Arc<dyn Backend>) {
        let mid = MessageId::new(2, ReplicaId::PRIVATE);
        assert_ok!(backend.create_message(fid(1), mid, false));
        assert_eq!(assert_ok!(backend.create_attachment(mid)), 0);
        assert_eq!(assert_ok!(backend.create_attachment(mid)), 1);
        assert_ok!(backend.open_attachment(mid, 1));
        assert_matches!(backend.open_attachment(mid, 2), Err(MapiError::NotFound));
    }
}
