use enumflags2::{BitFlags, bitflags};

use crate::mapi::FolderId;

#[bitflags]
#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum NotificationEvent {
    NewMail,
    ObjectCreated,
    ObjectDeleted,
    ObjectModified,
    ObjectMoved,
    ObjectCopied,
    SearchComplete,
    TableModified,
}

/// Registered interest in store events, either for the whole store or for
/// one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    pub events: BitFlags<NotificationEvent>,
    pub folder: Option<FolderId>,
}

impl Subscription {
    pub fn matches(&self, event: NotificationEvent, folder: FolderId) -> bool {
        self.events.contains(event) && self.folder.is_none_or(|watched| watched == folder)
    }
}
