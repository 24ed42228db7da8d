//! Position-indexed enumeration of the folders, messages or attachments below
//! an open container.

mod position;

use std::sync::Arc;

use enumflags2::BitFlags;
use log::{debug, trace};

pub use position::Bookmark;
pub use position::Position;
pub use position::position_in_table;

use crate::{
    backend::{Backend, BackendCursor, BackendObject, TableKind},
    mapi::{
        FolderId, MapiError, MessageId, PropResult, PropTag, Restriction, SortOrder,
        compare_sort_keys,
    },
    metadata::ChildFilter,
    object::{Handle, Message, MessageMode, Node, Table, TableFlag, TableSource},
    session::Session,
};

fn row_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Evaluates `restriction` against `values`, fetched for `tags` in order.
fn satisfies(restriction: &Restriction, tags: &[PropTag], values: &[PropResult]) -> bool {
    restriction.evaluate(&mut |tag| {
        tags.iter()
            .position(|candidate| *candidate == tag)
            .and_then(|index| values.get(index))
            .and_then(|value| value.clone().ok())
    })
}

/// Where the rows of a table come from, detached from the tree borrow.
enum Rows {
    Backend(Arc<dyn Backend>, BackendCursor),
    System(FolderId),
    Empty,
}

impl Session {
    fn rows_of(&self, table: Handle) -> Result<Rows, MapiError> {
        Ok(match &self.tree.table(table)?.source {
            TableSource::Backend { lease, cursor } => Rows::Backend(lease.backend(), *cursor),
            TableSource::System { container, .. } => Rows::System(*container),
            TableSource::Empty => Rows::Empty,
        })
    }

    fn container_of(&self, table: Handle) -> Handle {
        self.tree
            .parent(table)
            .expect("table should hang off its container")
    }

    fn system_rows(&self, container: FolderId, kind: TableKind) -> Result<Vec<u64>, MapiError> {
        let filter = match kind {
            TableKind::Hierarchy => ChildFilter::folders(),
            TableKind::Contents => ChildFilter::messages(false),
            TableKind::Associated => ChildFilter::messages(true),
            TableKind::Attachments | TableKind::Permissions => return Ok(Vec::new()),
        };
        Ok(self.store.find_children(container, filter)?)
    }

    /// Reads one row of a store-backed table by opening the object for the
    /// duration of the call.
    fn system_row(
        &mut self,
        owner: Handle,
        container: FolderId,
        kind: TableKind,
        id: u64,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        let node = match kind {
            TableKind::Hierarchy => Node::Folder(self.folder_node(FolderId::from(id))?),
            _ => Node::Message(Message {
                mid: MessageId::from(id),
                folder: container,
                mode: MessageMode::Open,
                read_write: false,
                associated: kind == TableKind::Associated,
                freebusy: None,
            }),
        };
        let transient = self.tree.insert(Some(owner), node);
        let values = self.get_properties(transient, tags);
        self.tree.remove_subtree(transient);
        values
    }

    /// Opens a table of the children of `container`: folders, messages or
    /// associated messages of a folder, or the attachments of a message.
    pub fn open_table(
        &mut self,
        container: Handle,
        kind: TableKind,
        flags: BitFlags<TableFlag>,
    ) -> Result<Handle, MapiError> {
        let object = match (self.tree.get(container)?, kind) {
            (
                Node::Folder(folder),
                TableKind::Hierarchy
                | TableKind::Contents
                | TableKind::Associated
                | TableKind::Permissions,
            ) => BackendObject::Folder(folder.fid),
            (Node::Message(message), TableKind::Attachments) => BackendObject::Message(message.mid),
            _ => return Err(MapiError::InvalidParameter),
        };
        self.ensure_committed(container)?;

        let table = if let Some(context) = self.tree.context_of(container) {
            let lease = self.contexts.acquire_by_id(context)?;
            let (cursor, rows) = lease.backend().open_table(object, kind)?;
            let mut table = Table::new(kind, flags, TableSource::Backend { lease, cursor });
            table.denominator = rows;
            table
        } else {
            let source = match object {
                BackendObject::Folder(fid) if kind != TableKind::Permissions => {
                    TableSource::System {
                        container: fid,
                        rows: self.system_rows(fid, kind)?,
                    }
                }
                _ => TableSource::Empty,
            };
            Table::new(kind, flags, source)
        };
        debug!("opened {kind:?} table on {container} with {} rows", table.denominator);
        Ok(self.tree.insert(Some(container), Node::Table(table)))
    }

    pub fn set_columns(&mut self, table: Handle, columns: Vec<PropTag>) -> Result<(), MapiError> {
        if columns.is_empty() {
            return Err(MapiError::InvalidParameter);
        }
        self.tree.table_mut(table)?.columns = columns;
        Ok(())
    }

    /// Requeries a store-backed table, applying its restriction unless it is
    /// checked row by row, then its sort order.
    fn refresh_system(&mut self, table: Handle, container: FolderId) -> Result<u32, MapiError> {
        let (kind, restriction, sort) = {
            let table = self.tree.table(table)?;
            let restriction = table.restriction.clone().filter(|_| !table.is_live());
            (table.kind, restriction, table.sort.clone())
        };
        let owner = self.container_of(table);
        let mut rows = self.system_rows(container, kind)?;

        if let Some(restriction) = restriction {
            let tags = restriction.tags();
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                let values = self.system_row(owner, container, kind, row, &tags)?;
                if satisfies(&restriction, &tags, &values) {
                    kept.push(row);
                }
            }
            rows = kept;
        }
        if !sort.is_empty() {
            let tags: Vec<PropTag> = sort.iter().map(|order| order.tag).collect();
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let key: Vec<_> = self
                    .system_row(owner, container, kind, row, &tags)?
                    .into_iter()
                    .map(Result::ok)
                    .collect();
                keyed.push((key, row));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(&sort, a, b));
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        let count = row_count(rows.len());
        let table = self.tree.table_mut(table)?;
        if let TableSource::System { rows: slot, .. } = &mut table.source {
            *slot = rows;
        }
        table.denominator = count;
        table.position = 0;
        Ok(count)
    }

    /// Replaces the restriction of a table and rewinds it. Answers the new
    /// row count.
    pub fn restrict(
        &mut self,
        table: Handle,
        restriction: Option<Restriction>,
    ) -> Result<u32, MapiError> {
        self.tree.table_mut(table)?.restriction = restriction;
        match self.rows_of(table)? {
            Rows::Backend(backend, cursor) => {
                let table = self.tree.table_mut(table)?;
                let count = backend.set_restriction(cursor, table.restriction.as_ref())?;
                table.denominator = count;
                table.position = 0;
                Ok(count)
            }
            Rows::System(container) => self.refresh_system(table, container),
            Rows::Empty => Ok(0),
        }
    }

    /// Replaces the sort order of a table and rewinds it.
    pub fn sort_table(&mut self, table: Handle, order: Vec<SortOrder>) -> Result<(), MapiError> {
        self.tree.table_mut(table)?.sort = order;
        match self.rows_of(table)? {
            Rows::Backend(backend, cursor) => {
                let table = self.tree.table_mut(table)?;
                backend.set_sort_order(cursor, &table.sort)?;
                table.position = 0;
            }
            Rows::System(container) => {
                self.refresh_system(table, container)?;
            }
            Rows::Empty => {}
        }
        Ok(())
    }

    /// Reads the row at `position`. `NotFound` means the row is gone or no
    /// longer matches the restriction.
    pub fn get_row(
        &mut self,
        table: Handle,
        position: u32,
        tags: &[PropTag],
    ) -> Result<Vec<PropResult>, MapiError> {
        let (container, kind, id, live) = {
            let table = self.tree.table(table)?;
            match &table.source {
                TableSource::Backend { lease, cursor } => {
                    return lease.backend().get_row(*cursor, position, tags);
                }
                TableSource::Empty => return Err(MapiError::NotFound),
                TableSource::System { container, rows } => {
                    let index = usize::try_from(position).map_err(|_| MapiError::NotFound)?;
                    let id = *rows.get(index).ok_or(MapiError::NotFound)?;
                    let live = table.restriction.clone().filter(|_| table.is_live());
                    (*container, table.kind, id, live)
                }
            }
        };
        let owner = self.container_of(table);

        let Some(restriction) = live else {
            return self.system_row(owner, container, kind, id, tags);
        };
        let mut wanted = tags.to_vec();
        for tag in restriction.tags() {
            if !wanted.contains(&tag) {
                wanted.push(tag);
            }
        }
        let mut values = self.system_row(owner, container, kind, id, &wanted)?;
        if !satisfies(&restriction, &wanted, &values) {
            trace!("row {position} of {table} no longer matches");
            return Err(MapiError::NotFound);
        }
        values.truncate(tags.len());
        Ok(values)
    }

    /// Reads up to `count` rows with the table's columns, forwards from the
    /// current position or backwards before it, and moves the position past
    /// them. Reading stops early at the first row that cannot be read;
    /// live-filtered tables skip rows that no longer match instead.
    pub fn query_rows(
        &mut self,
        table: Handle,
        count: u32,
        forward: bool,
    ) -> Result<Vec<Vec<PropResult>>, MapiError> {
        let (columns, mut position, denominator, live) = {
            let table = self.tree.table(table)?;
            (
                table.columns.clone(),
                table.position,
                table.denominator,
                table.is_live(),
            )
        };
        if columns.is_empty() {
            return Err(MapiError::NotInitialized);
        }

        let wanted = usize::try_from(count).unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        while rows.len() < wanted {
            let at = if forward {
                if position >= denominator {
                    break;
                }
                position
            } else {
                match position.checked_sub(1) {
                    Some(previous) => previous,
                    None => break,
                }
            };
            match self.get_row(table, at, &columns) {
                Ok(row) => rows.push(row),
                Err(MapiError::NotFound) if live => {}
                Err(error) => {
                    trace!("stopping at row {at} of {table}: {error}");
                    break;
                }
            }
            position = if forward { at + 1 } else { at };
        }
        self.tree.table_mut(table)?.position = position;
        Ok(rows)
    }

    /// Moves the position `delta` rows away from `origin` and answers how
    /// many rows were actually sought.
    pub fn seek_row(
        &mut self,
        table: Handle,
        origin: Bookmark,
        delta: i64,
    ) -> Result<i64, MapiError> {
        let table = self.tree.table_mut(table)?;
        let from = position_in_table(table.denominator, table.position, &Position::at(origin));
        let to = position_in_table(
            table.denominator,
            table.position,
            &Position::at(origin).moved(delta),
        );
        table.position = to;
        Ok(i64::from(to) - i64::from(from))
    }

    /// Moves to roughly `numerator / denominator` of the way through the
    /// table.
    pub fn seek_row_approx(
        &mut self,
        table: Handle,
        numerator: u32,
        denominator: u32,
    ) -> Result<(), MapiError> {
        if denominator == 0 {
            return Err(MapiError::InvalidParameter);
        }
        let table = self.tree.table_mut(table)?;
        let position = Position {
            origin: Bookmark::Current,
            fraction: Some((numerator, denominator)),
            delta: 0,
        };
        table.position = position_in_table(table.denominator, table.position, &position);
        Ok(())
    }

    /// Current position and row count.
    pub fn query_position(&self, table: Handle) -> Result<(u32, u32), MapiError> {
        let table = self.tree.table(table)?;
        Ok((table.position, table.denominator))
    }
}
