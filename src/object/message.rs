use derive_builder::Builder;

use crate::mapi::{FolderId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageMode {
    Create,
    Open,
}

#[derive(Debug)]
pub struct Message {
    pub mid: MessageId,
    pub folder: FolderId,
    pub mode: MessageMode,
    pub read_write: bool,
    pub associated: bool,
    pub freebusy: Option<FreeBusyBlock>,
}

/// Precomputed free/busy data of a mailbox, attached to the free/busy
/// message of the public store. Months are encoded as `year * 16 + month`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
#[builder(default, setter(into))]
pub struct FreeBusyBlock {
    pub email: String,
    pub publish_start: i32,
    pub publish_end: i32,
    pub range_timestamp: i64,
    pub months_merged: Vec<i32>,
    pub freebusy_merged: Vec<Vec<u8>>,
    pub months_tentative: Vec<i32>,
    pub freebusy_tentative: Vec<Vec<u8>>,
    pub months_busy: Vec<i32>,
    pub freebusy_busy: Vec<Vec<u8>>,
    pub months_away: Vec<i32>,
    pub freebusy_away: Vec<Vec<u8>>,
}
