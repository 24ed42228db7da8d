use enumflags2::{BitFlags, bitflags};

use crate::{
    backend::{BackendCursor, ContextLease, TableKind},
    mapi::{FolderId, PropTag, Restriction, SortOrder},
};

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum TableFlag {
    /// Re-check the restriction whenever a row is read instead of filtering
    /// once up front.
    LiveFilter,
}

#[derive(Debug)]
pub enum TableSource {
    Backend {
        lease: ContextLease,
        cursor: BackendCursor,
    },
    /// Rows come from the metadata store. `rows` holds the ids found under
    /// `container`.
    System { container: FolderId, rows: Vec<u64> },
    Empty,
}

#[derive(Debug)]
pub struct Table {
    pub kind: TableKind,
    pub columns: Vec<PropTag>,
    pub restriction: Option<Restriction>,
    pub sort: Vec<SortOrder>,
    /// Row count the position arithmetic works against.
    pub denominator: u32,
    pub position: u32,
    pub flags: BitFlags<TableFlag>,
    pub source: TableSource,
}

impl Table {
    pub fn new(kind: TableKind, flags: BitFlags<TableFlag>, source: TableSource) -> Self {
        let denominator = match &source {
            TableSource::System { rows, .. } => u32::try_from(rows.len()).unwrap_or(u32::MAX),
            TableSource::Backend { .. } | TableSource::Empty => 0,
        };
        Self {
            kind,
            columns: Vec::new(),
            restriction: None,
            sort: Vec::new(),
            denominator,
            position: 0,
            flags,
            source,
        }
    }

    pub fn is_live(&self) -> bool {
        self.flags.contains(TableFlag::LiveFilter)
    }
}
