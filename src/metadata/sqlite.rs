use std::{
    fs::create_dir_all,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use include_dir::{Dir, include_dir};
use log::{debug, trace};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params,
    types::{Type, Value},
};
use rusqlite_migration::Migrations;

use crate::{
    mapi::{
        FolderId, MapiError, PropTag, PropValue, PropertyRow, ReplicaId, tags::PR_DISPLAY_NAME,
    },
    metadata::{
        ChildFilter, MailboxRecord, MetadataStore, Record, RecordAttrs, StoreError, StoreKind,
        SystemIndex, sql_value,
    },
};

static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/migrations");

fn sql_id(id: u64) -> i64 {
    i64::from_ne_bytes(id.to_ne_bytes())
}

fn native_id(id: i64) -> u64 {
    u64::from_ne_bytes(id.to_ne_bytes())
}

fn conversion_error(index: usize, message: &'static str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, message.into())
}

fn collision_aware(error: rusqlite::Error) -> StoreError {
    match error.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Collision,
        _ => StoreError::Sqlite(error),
    }
}

const RECORD_COLUMNS: &str =
    "id, kind, mailbox, parent, system_idx, backend_root, uri, associated, display_name";

impl TryFrom<&Row<'_>> for Record {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        let kind: i64 = row.get(1)?;
        let system_idx: Option<u32> = row.get(4)?;
        Ok(Self {
            id: native_id(row.get(0)?),
            kind: kind.try_into().map_err(|msg| conversion_error(1, msg))?,
            mailbox: FolderId::from(native_id(row.get(2)?)),
            parent: row
                .get::<_, Option<i64>>(3)?
                .map(|parent| FolderId::from(native_id(parent))),
            system_idx: system_idx
                .map(SystemIndex::try_from)
                .transpose()
                .map_err(|msg| conversion_error(4, msg))?,
            backend_root: row.get(5)?,
            uri: row.get(6)?,
            associated: row.get(7)?,
            display_name: row.get(8)?,
        })
    }
}

impl TryFrom<&Row<'_>> for MailboxRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        let kind: i64 = row.get(1)?;
        let guid: Vec<u8> = row.get(4)?;
        Ok(Self {
            owner: row.get(0)?,
            kind: StoreKind::try_from(kind).map_err(|msg| conversion_error(1, msg))?,
            root: FolderId::from(native_id(row.get(2)?)),
            replica_id: ReplicaId::new(row.get(3)?),
            replica_guid: guid
                .try_into()
                .map_err(|_| conversion_error(4, "replica guid should be 16 bytes"))?,
        })
    }
}

/// Metadata store kept in a single SQLite database.
#[derive(Debug)]
pub struct SqliteMetadataStore {
    db: Mutex<Connection>,
}

impl SqliteMetadataStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        debug!("opening metadata store {}", path.to_string_lossy());
        let db = Connection::open(path)?;
        db.pragma_update(None, "journal_mode", "wal")?;
        Self::try_new(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        trace!("opening in-memory metadata store");
        Self::try_new(Connection::open_in_memory()?)
    }

    fn try_new(mut db: Connection) -> Result<Self, StoreError> {
        db.pragma_update(None, "foreign_keys", true)?;
        db.pragma_update(None, "synchronous", 1)?;
        Migrations::from_directory(&MIGRATIONS_DIR)?.to_latest(&mut db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_record(db: &Connection, id: u64) -> Result<(), StoreError> {
    db.query_one("select 1 from records where id = ?1", [sql_id(id)], |_| Ok(()))
        .optional()?
        .ok_or(StoreError::NotFound)
}

/// The store operations on one locked connection, or on an open transaction.
struct Connected<'a>(&'a Connection);

impl MetadataStore for Connected<'_> {
    fn create_mailbox(&self, mailbox: &MailboxRecord) -> Result<(), StoreError> {
        trace!("creating mailbox of {} rooted at {}", mailbox.owner, mailbox.root);
        self.0
            .execute(
                "insert into mailboxes (root_fid, owner, kind, replica_id, replica_guid) \
                 values (?1, ?2, ?3, ?4, ?5)",
                params![
                    sql_id(mailbox.root.into()),
                    mailbox.owner,
                    i64::from(mailbox.kind),
                    u16::from(mailbox.replica_id),
                    mailbox.replica_guid.to_vec(),
                ],
            )
            .map_err(collision_aware)?;
        Ok(())
    }

    fn mailbox(&self, owner: &str, kind: StoreKind) -> Result<MailboxRecord, StoreError> {
        self.0
            .query_one(
                "select owner, kind, root_fid, replica_id, replica_guid \
                 from mailboxes where owner = ?1 and kind = ?2",
                params![owner, i64::from(kind)],
                |row| MailboxRecord::try_from(row),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    fn allocate_global_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self.0.query_one(
            "update server set next_global_count = next_global_count + 1 \
             returning next_global_count - 1",
            [],
            |row| row.get(0),
        )?;
        Ok(native_id(count))
    }

    fn allocate_change_number(&self, mailbox: FolderId) -> Result<u64, StoreError> {
        self.0
            .query_one(
                "select 1 from mailboxes where root_fid = ?1",
                [sql_id(mailbox.into())],
                |_| Ok(()),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        let change_number = self.allocate_global_count()?;
        trace!("allocated change number {change_number} in mailbox {mailbox}");
        Ok(change_number)
    }

    fn create_record(
        &self,
        parent: Option<FolderId>,
        id: u64,
        attrs: &RecordAttrs,
    ) -> Result<(), StoreError> {
        trace!("creating record {id:#x} below {parent:?}");
        let db = self.0;
        if let Some(parent) = parent {
            ensure_record(db, parent.into())?;
        }
        db.execute(
            &format!(
                "insert into records ({RECORD_COLUMNS}) values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                sql_id(id),
                i64::from(attrs.kind),
                sql_id(attrs.mailbox.into()),
                parent.map(|parent| sql_id(parent.into())),
                attrs.system_idx.map(u32::from),
                attrs.backend_root,
                attrs.uri,
                attrs.associated,
                attrs.display_name,
            ],
        )
        .map_err(collision_aware)?;
        if let Some(name) = &attrs.display_name {
            db.execute(
                "insert into properties (id, tag, value) values (?1, ?2, ?3)",
                params![sql_id(id), u32::from(PR_DISPLAY_NAME), name],
            )?;
        }
        Ok(())
    }

    fn record(&self, id: u64) -> Result<Record, StoreError> {
        self.0
            .query_one(
                &format!("select {RECORD_COLUMNS} from records where id = ?1"),
                [sql_id(id)],
                |row| Record::try_from(row),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    fn delete_record(&self, id: u64) -> Result<(), StoreError> {
        trace!("deleting record {id:#x}");
        let deleted = self
            .0
            .execute("delete from records where id = ?1", [sql_id(id)])
            .map_err(|error| match error.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => {
                    StoreError::Inconsistent("record still has children")
                }
                _ => StoreError::Sqlite(error),
            })?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn get_parent(&self, id: u64) -> Result<FolderId, StoreError> {
        let parent: Option<i64> = self
            .0
            .query_one("select parent from records where id = ?1", [sql_id(id)], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(StoreError::NotFound)?;
        parent
            .map(|parent| FolderId::from(native_id(parent)))
            .ok_or(StoreError::NotFound)
    }

    fn set_parent(&self, id: u64, parent: FolderId) -> Result<(), StoreError> {
        let db = self.0;
        ensure_record(db, parent.into())?;
        let updated = db.execute(
            "update records set parent = ?2 where id = ?1",
            [sql_id(id), sql_id(parent.into())],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn set_backend_uri(&self, id: u64, uri: Option<&str>) -> Result<(), StoreError> {
        trace!("setting backend uri of {id:#x} to {uri:?}");
        let updated = self.0.execute(
            "update records set uri = ?2 where id = ?1",
            params![sql_id(id), uri],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn find_children(
        &self,
        parent: FolderId,
        filter: ChildFilter<'_>,
    ) -> Result<Vec<u64>, StoreError> {
        let db = self.0;
        let mut stmt = db.prepare_cached(
            "select id from records where parent = ?1 and kind = ?2 \
             and (?3 is null or associated = ?3) \
             and (?4 is null or display_name = ?4 collate nocase) \
             order by id",
        )?;
        let rows = stmt.query_map(
            params![
                sql_id(parent.into()),
                i64::from(filter.kind),
                filter.associated,
                filter.display_name,
            ],
            |row| row.get::<_, i64>(0),
        )?;
        let mut children = Vec::new();
        for row in rows {
            children.push(native_id(row?));
        }
        Ok(children)
    }

    fn find_system_folder(
        &self,
        mailbox: FolderId,
        index: SystemIndex,
    ) -> Result<FolderId, StoreError> {
        self.0
            .query_one(
                "select id from records where mailbox = ?1 and system_idx = ?2",
                params![sql_id(mailbox.into()), u32::from(index)],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(|id| FolderId::from(native_id(id)))
            .ok_or(StoreError::NotFound)
    }

    fn get_property(&self, id: u64, tag: PropTag) -> Result<PropValue, StoreError> {
        let db = self.0;
        let value: Option<Value> = db
            .query_one(
                "select value from properties where id = ?1 and tag = ?2",
                params![sql_id(id), u32::from(tag)],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(value) => sql_value::decode(tag.prop_type(), value),
            None => Err(StoreError::NotFound),
        }
    }

    fn set_properties(&self, id: u64, row: &PropertyRow) -> Result<(), StoreError> {
        let db = self.0;
        ensure_record(db, id)?;
        let mut stmt = db.prepare_cached(
            "insert into properties (id, tag, value) values (?1, ?2, ?3) \
             on conflict (id, tag) do update set value = excluded.value",
        )?;
        for (tag, value) in row.iter() {
            if !value.matches(tag.prop_type()) {
                return Err(StoreError::InvalidValue);
            }
            stmt.execute(params![sql_id(id), u32::from(tag), sql_value::encode(value)])?;
        }
        if let Some(name) = row.get_str(PR_DISPLAY_NAME) {
            db.execute(
                "update records set display_name = ?2 where id = ?1",
                params![sql_id(id), name],
            )?;
        }
        Ok(())
    }

    fn index_register(&self, mailbox: FolderId, id: u64, uri: &str) -> Result<(), StoreError> {
        trace!("indexing {id:#x} at {uri}");
        self.0
            .execute(
                "insert into uri_index (id, mailbox, uri) values (?1, ?2, ?3) \
                 on conflict (id) do update set uri = excluded.uri",
                params![sql_id(id), sql_id(mailbox.into()), uri],
            )
            .map_err(collision_aware)?;
        Ok(())
    }

    fn index_unregister(&self, id: u64) -> Result<(), StoreError> {
        trace!("removing {id:#x} from index");
        let deleted = self
            .0
            .execute("delete from uri_index where id = ?1", [sql_id(id)])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn index_uri(&self, id: u64) -> Result<String, StoreError> {
        self.0
            .query_one("select uri from uri_index where id = ?1", [sql_id(id)], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    fn find_by_uri(&self, uri: &str) -> Result<u64, StoreError> {
        self.0
            .query_one("select id from uri_index where uri = ?1", [uri], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
            .map(native_id)
            .ok_or(StoreError::NotFound)
    }

    fn index_entries(&self, mailbox: FolderId) -> Result<Vec<(u64, String)>, StoreError> {
        let mut stmt = self
            .0
            .prepare_cached("select id, uri from uri_index where mailbox = ?1 order by uri")?;
        let rows = stmt.query_map([sql_id(mailbox.into())], |row| {
            Ok((native_id(row.get(0)?), row.get(1)?))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Joins the transaction the connection is already in.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn MetadataStore) -> Result<(), MapiError>,
    ) -> Result<(), MapiError> {
        work(self)
    }
}

/// Forwards every call to [`Connected`] while holding the connection lock.
impl MetadataStore for SqliteMetadataStore {
    fn create_mailbox(&self, mailbox: &MailboxRecord) -> Result<(), StoreError> {
        Connected(&self.db()).create_mailbox(mailbox)
    }

    fn mailbox(&self, owner: &str, kind: StoreKind) -> Result<MailboxRecord, StoreError> {
        Connected(&self.db()).mailbox(owner, kind)
    }

    fn allocate_global_count(&self) -> Result<u64, StoreError> {
        Connected(&self.db()).allocate_global_count()
    }

    fn allocate_change_number(&self, mailbox: FolderId) -> Result<u64, StoreError> {
        Connected(&self.db()).allocate_change_number(mailbox)
    }

    fn create_record(
        &self,
        parent: Option<FolderId>,
        id: u64,
        attrs: &RecordAttrs,
    ) -> Result<(), StoreError> {
        Connected(&self.db()).create_record(parent, id, attrs)
    }

    fn record(&self, id: u64) -> Result<Record, StoreError> {
        Connected(&self.db()).record(id)
    }

    fn delete_record(&self, id: u64) -> Result<(), StoreError> {
        Connected(&self.db()).delete_record(id)
    }

    fn get_parent(&self, id: u64) -> Result<FolderId, StoreError> {
        Connected(&self.db()).get_parent(id)
    }

    fn set_parent(&self, id: u64, parent: FolderId) -> Result<(), StoreError> {
        Connected(&self.db()).set_parent(id, parent)
    }

    fn set_backend_uri(&self, id: u64, uri: Option<&str>) -> Result<(), StoreError> {
        Connected(&self.db()).set_backend_uri(id, uri)
    }

    fn find_children(
        &self,
        parent: FolderId,
        filter: ChildFilter<'_>,
    ) -> Result<Vec<u64>, StoreError> {
        Connected(&self.db()).find_children(parent, filter)
    }

    fn find_system_folder(
        &self,
        mailbox: FolderId,
        index: SystemIndex,
    ) -> Result<FolderId, StoreError> {
        Connected(&self.db()).find_system_folder(mailbox, index)
    }

    fn get_property(&self, id: u64, tag: PropTag) -> Result<PropValue, StoreError> {
        Connected(&self.db()).get_property(id, tag)
    }

    fn set_properties(&self, id: u64, row: &PropertyRow) -> Result<(), StoreError> {
        Connected(&self.db()).set_properties(id, row)
    }

    fn index_register(&self, mailbox: FolderId, id: u64, uri: &str) -> Result<(), StoreError> {
        Connected(&self.db()).index_register(mailbox, id, uri)
    }

    fn index_unregister(&self, id: u64) -> Result<(), StoreError> {
        Connected(&self.db()).index_unregister(id)
    }

    fn index_uri(&self, id: u64) -> Result<String, StoreError> {
        Connected(&self.db()).index_uri(id)
    }

    fn find_by_uri(&self, uri: &str) -> Result<u64, StoreError> {
        Connected(&self.db()).find_by_uri(uri)
    }

    fn index_entries(&self, mailbox: FolderId) -> Result<Vec<(u64, String)>, StoreError> {
        Connected(&self.db()).index_entries(mailbox)
    }

    /// Holds the connection for the whole of `work`, so other sessions queue
    /// behind it. Dropping the transaction without committing rolls it back,
    /// also when the commit itself fails.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn MetadataStore) -> Result<(), MapiError>,
    ) -> Result<(), MapiError> {
        let mut db = self.db();
        let tx = db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        work(&Connected(&tx))?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assertables::*;
    use rstest::*;
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::mapi::tags::{PR_COMMENT, PR_CONTENT_COUNT};

    const OWNER: &str = "jdoe";

    struct TestStore {
        store: SqliteMetadataStore,
        root: FolderId,
    }

    #[fixture]
    fn store() -> TestStore {
        let store = assert_ok!(SqliteMetadataStore::open_in_memory());
        let root = FolderId::new(assert_ok!(store.allocate_global_count()), ReplicaId::PRIVATE);
        assert_ok!(store.create_mailbox(&MailboxRecord {
            owner: OWNER.into(),
            kind: StoreKind::Private,
            root,
            replica_id: ReplicaId::PRIVATE,
            replica_guid: [7; 16],
        }));
        assert_ok!(store.create_record(
            None,
            root.into(),
            &assert_ok!(RecordAttrs::folder(root).system_idx(SystemIndex::Root).build()),
        ));
        TestStore { store, root }
    }

    fn add_folder(store: &TestStore, name: &str) -> u64 {
        let id = u64::from(FolderId::new(
            assert_ok!(store.store.allocate_change_number(store.root)),
            ReplicaId::PRIVATE,
        ));
        assert_ok!(store.store.create_record(
            Some(store.root),
            id,
            &assert_ok!(RecordAttrs::folder(store.root).display_name(name).build()),
        ));
        id
    }

    #[rstest]
    fn test_open_creates_database_file() {
        let dir: TempDir = assert_ok!(tempdir());
        let path = dir.path().join("state").join("openchange.db");
        assert_ok!(SqliteMetadataStore::open(&path));
        assert!(assert_ok!(fs::exists(path)));
    }

    #[rstest]
    fn test_mailbox_is_found_by_owner_and_kind(store: TestStore) {
        let mailbox = assert_ok!(store.store.mailbox(OWNER, StoreKind::Private));
        assert_eq!(mailbox.root, store.root);
        assert_eq!(mailbox.replica_guid, [7; 16]);
        assert_matches!(
            store.store.mailbox(OWNER, StoreKind::Public),
            Err(StoreError::NotFound)
        );
    }

    #[rstest]
    fn test_change_numbers_increase_monotonically(store: TestStore) {
        let first = assert_ok!(store.store.allocate_change_number(store.root));
        let second = assert_ok!(store.store.allocate_change_number(store.root));
        assert_eq!(first, 2);
        assert_eq!(second, 3);
    }

    #[rstest]
    fn test_children_are_filtered_by_name_ignoring_case(store: TestStore) {
        let inbox = add_folder(&store, "Inbox");
        add_folder(&store, "Drafts");
        let named = assert_ok!(
            store
                .store
                .find_children(store.root, ChildFilter::folders().named("INBOX"))
        );
        assert_eq!(named, vec![inbox]);
        assert_eq!(
            assert_ok!(store.store.count_children(store.root, ChildFilter::folders())),
            2
        );
        assert_eq!(
            assert_ok!(store.store.count_children(store.root, ChildFilter::all_messages())),
            0
        );
    }

    #[rstest]
    fn test_properties_round_trip_and_track_display_name(store: TestStore) {
        let id = add_folder(&store, "Inbox");
        let row = PropertyRow::new()
            .with(PR_COMMENT, PropValue::Unicode("incoming".into()))
            .with(PR_DISPLAY_NAME, PropValue::Unicode("Mail".into()));
        assert_ok!(store.store.set_properties(id, &row));
        assert_eq!(
            assert_ok!(store.store.get_property(id, PR_COMMENT)),
            PropValue::Unicode("incoming".into())
        );
        let record = assert_ok!(store.store.record(id));
        assert_eq!(record.display_name.as_deref(), Some("Mail"));
        assert_matches!(
            store.store.get_property(id, PR_CONTENT_COUNT),
            Err(StoreError::NotFound)
        );
    }

    #[rstest]
    fn test_mistyped_value_is_rejected(store: TestStore) {
        let id = add_folder(&store, "Inbox");
        let row = PropertyRow::new().with(PR_COMMENT, PropValue::Long(1));
        assert_matches!(
            store.store.set_properties(id, &row),
            Err(StoreError::InvalidValue)
        );
    }

    #[rstest]
    fn test_record_with_children_cannot_be_deleted(store: TestStore) {
        add_folder(&store, "Inbox");
        assert_matches!(
            store.store.delete_record(store.root.into()),
            Err(StoreError::Inconsistent(_))
        );
    }

    #[rstest]
    fn test_parent_of_root_is_not_found(store: TestStore) {
        let id = add_folder(&store, "Inbox");
        assert_eq!(assert_ok!(store.store.get_parent(id)), store.root);
        assert_matches!(
            store.store.get_parent(store.root.into()),
            Err(StoreError::NotFound)
        );
    }

    #[rstest]
    fn test_system_folders_are_found_by_role(store: TestStore) {
        assert_eq!(
            assert_ok!(store.store.find_system_folder(store.root, SystemIndex::Root)),
            store.root
        );
        assert_matches!(
            store.store.find_system_folder(store.root, SystemIndex::Inbox),
            Err(StoreError::NotFound)
        );
    }

    #[rstest]
    fn test_index_maps_ids_and_uris_both_ways(store: TestStore) {
        let id = add_folder(&store, "Inbox");
        assert_ok!(store.store.index_register(store.root, id, "memory://jdoe/mail/"));
        assert_eq!(assert_ok!(store.store.find_by_uri("memory://jdoe/mail/")), id);
        assert_ok!(store.store.index_register(store.root, id, "memory://jdoe/mail2/"));
        assert_eq!(assert_ok!(store.store.index_uri(id)), "memory://jdoe/mail2/");
        assert_ok!(store.store.index_unregister(id));
        assert_matches!(store.store.index_uri(id), Err(StoreError::NotFound));
    }

    #[rstest]
    fn test_index_entries_are_scoped_to_their_mailbox(store: TestStore) {
        let a = add_folder(&store, "A");
        let b = add_folder(&store, "B");
        assert_ok!(store.store.index_register(store.root, b, "memory://jdoe/b/"));
        assert_ok!(store.store.index_register(store.root, a, "memory://jdoe/a/"));
        assert_ok!(store.store.index_register(FolderId::from(99), 7, "memory://other/"));
        assert_eq!(
            assert_ok!(store.store.index_entries(store.root)),
            vec![(a, "memory://jdoe/a/".to_string()), (b, "memory://jdoe/b/".to_string())]
        );
    }

    #[rstest]
    fn test_duplicate_uri_is_a_collision(store: TestStore) {
        let a = add_folder(&store, "A");
        let b = add_folder(&store, "B");
        assert_ok!(store.store.index_register(store.root, a, "memory://jdoe/a/"));
        assert_matches!(
            store.store.index_register(store.root, b, "memory://jdoe/a/"),
            Err(StoreError::Collision)
        );
    }

    #[rstest]
    fn test_failed_transaction_discards_changes(store: TestStore) {
        let id = add_folder(&store, "Inbox");
        assert_matches!(
            store.store.transaction(&mut |tx| {
                tx.set_backend_uri(id, Some("memory://jdoe/mail/"))?;
                Err(MapiError::Collision)
            }),
            Err(MapiError::Collision)
        );
        assert_none!(assert_ok!(store.store.record(id)).uri);

        assert_ok!(store.store.transaction(&mut |tx| {
            tx.set_backend_uri(id, Some("memory://jdoe/mail/"))?;
            Ok(())
        }));
        assert_eq!(
            assert_ok!(store.store.record(id)).uri.as_deref(),
            Some("memory://jdoe/mail/")
        );
    }

    #[rstest]
    fn test_transactions_of_concurrent_callers_do_not_interleave(store: TestStore) {
        let TestStore { store, root } = store;
        let ids = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|worker| {
                    let store = &store;
                    scope.spawn(move || {
                        let mut ids = Vec::new();
                        for round in 0..25 {
                            let mut created = 0;
                            let outcome = store.transaction(&mut |tx| {
                                created = tx.allocate_change_number(root)?;
                                let attrs = RecordAttrs::folder(root)
                                    .display_name(format!("{worker}-{round}"))
                                    .build()?;
                                tx.create_record(Some(root), created, &attrs)?;
                                if round % 5 == 0 {
                                    return Err(MapiError::Denied);
                                }
                                Ok(())
                            });
                            match outcome {
                                Ok(()) => ids.push(created),
                                Err(error) => assert_matches!(error, MapiError::Denied),
                            }
                        }
                        ids
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().expect("worker should not panic"))
                .collect::<Vec<_>>()
        });
        assert_eq!(ids.len(), 4 * 20);
        let mut stored = assert_ok!(store.find_children(root, ChildFilter::folders()));
        let mut ids = ids;
        stored.sort_unstable();
        ids.sort_unstable();
        assert_eq!(stored, ids);
    }
}
