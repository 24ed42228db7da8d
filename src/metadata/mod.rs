//! The directory-backed metadata store ("openchangedb"): records for system
//! folders, backend roots and system messages, plus the URI discovery index.

mod records;
mod sql_value;
mod sqlite;

use std::{io, sync::Arc};

use log::warn;
use thiserror::Error;

pub use records::ChildFilter;
pub use records::MailboxRecord;
pub use records::Record;
pub use records::RecordAttrs;
pub use records::RecordAttrsBuilder;
pub use records::RecordKind;
pub use records::StoreKind;
pub use records::SystemIndex;
pub use sqlite::SqliteMetadataStore;

use crate::mapi::{FolderId, MapiError, PropTag, PropValue, PropertyRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Collision,
    #[error("stored value does not match its property type")]
    InvalidValue,
    #[error("encountered inconsistent metadata: {0}")]
    Inconsistent(&'static str),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
    #[error("IO issue when opening metadata store {0}")]
    Io(#[from] io::Error),
}

impl From<StoreError> for MapiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => MapiError::NotFound,
            StoreError::Collision => MapiError::Collision,
            other => {
                warn!("metadata store failure: {other}");
                MapiError::CallFailed
            }
        }
    }
}

/// Capability set of the metadata store. Ids are raw 64 bit folder or
/// message ids; folders and messages of every mailbox share one id space.
pub trait MetadataStore {
    fn create_mailbox(&self, mailbox: &MailboxRecord) -> Result<(), StoreError>;

    fn mailbox(&self, owner: &str, kind: StoreKind) -> Result<MailboxRecord, StoreError>;

    /// Atomically hands out the next server-wide global counter value.
    fn allocate_global_count(&self) -> Result<u64, StoreError>;

    /// Like [`MetadataStore::allocate_global_count`], for an existing
    /// mailbox.
    fn allocate_change_number(&self, mailbox: FolderId) -> Result<u64, StoreError>;

    fn create_record(
        &self,
        parent: Option<FolderId>,
        id: u64,
        attrs: &RecordAttrs,
    ) -> Result<(), StoreError>;

    fn record(&self, id: u64) -> Result<Record, StoreError>;

    fn delete_record(&self, id: u64) -> Result<(), StoreError>;

    fn get_parent(&self, id: u64) -> Result<FolderId, StoreError>;

    fn set_parent(&self, id: u64, parent: FolderId) -> Result<(), StoreError>;

    fn set_backend_uri(&self, id: u64, uri: Option<&str>) -> Result<(), StoreError>;

    fn find_children(
        &self,
        parent: FolderId,
        filter: ChildFilter<'_>,
    ) -> Result<Vec<u64>, StoreError>;

    fn count_children(&self, parent: FolderId, filter: ChildFilter<'_>) -> Result<u32, StoreError> {
        let children = self.find_children(parent, filter)?;
        u32::try_from(children.len()).map_err(|_| StoreError::Inconsistent("too many children"))
    }

    /// The folder playing a well-known role in a mailbox.
    fn find_system_folder(
        &self,
        mailbox: FolderId,
        index: SystemIndex,
    ) -> Result<FolderId, StoreError>;

    fn get_property(&self, id: u64, tag: PropTag) -> Result<PropValue, StoreError>;

    fn set_properties(&self, id: u64, row: &PropertyRow) -> Result<(), StoreError>;

    /// Records that `id` is served by the backend at `uri`, replacing any
    /// previous URI of `id`.
    fn index_register(&self, mailbox: FolderId, id: u64, uri: &str) -> Result<(), StoreError>;

    fn index_unregister(&self, id: u64) -> Result<(), StoreError>;

    fn index_uri(&self, id: u64) -> Result<String, StoreError>;

    fn find_by_uri(&self, uri: &str) -> Result<u64, StoreError>;

    /// Every indexed object of `mailbox` with its URI, ordered by URI.
    fn index_entries(&self, mailbox: FolderId) -> Result<Vec<(u64, String)>, StoreError>;

    /// Runs `work` as one transaction: committed if it succeeds, rolled back
    /// otherwise. `work` must reach the store only through its argument.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn MetadataStore) -> Result<(), MapiError>,
    ) -> Result<(), MapiError>;
}

/// A metadata store shared by every session of the server.
pub type SharedStore = Arc<dyn MetadataStore + Send + Sync>;
