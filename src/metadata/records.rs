use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::mapi::{FolderId, MapiError, ReplicaId};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Private,
    Public,
}

impl From<StoreKind> for i64 {
    fn from(value: StoreKind) -> Self {
        match value {
            StoreKind::Private => 0,
            StoreKind::Public => 1,
        }
    }
}

impl TryFrom<i64> for StoreKind {
    type Error = &'static str;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Private),
            1 => Ok(Self::Public),
            _ => Err("unknown store kind"),
        }
    }
}

/// Well-known roles of the folders laid out when a mailbox is provisioned.
///
/// DO NOT RENUMBER! The discriminants are persisted in the metadata store.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[repr(u32)]
pub enum SystemIndex {
    Root = 1,
    DeferredAction = 2,
    SpoolerQueue = 3,
    TopOfStore = 4,
    Inbox = 5,
    Outbox = 6,
    SentItems = 7,
    DeletedItems = 8,
    CommonViews = 9,
    Schedule = 10,
    Search = 11,
    Views = 12,
    Shortcuts = 13,
    Reminders = 14,
    Calendar = 15,
    Contacts = 16,
    Journal = 17,
    Notes = 18,
    Tasks = 19,
    Drafts = 20,
    NonIpmSubtree = 32,
    EFormsRegistry = 33,
    FreeBusy = 34,
    OfflineAddressBook = 35,
}

impl SystemIndex {
    const ALL: [SystemIndex; 24] = [
        Self::Root,
        Self::DeferredAction,
        Self::SpoolerQueue,
        Self::TopOfStore,
        Self::Inbox,
        Self::Outbox,
        Self::SentItems,
        Self::DeletedItems,
        Self::CommonViews,
        Self::Schedule,
        Self::Search,
        Self::Views,
        Self::Shortcuts,
        Self::Reminders,
        Self::Calendar,
        Self::Contacts,
        Self::Journal,
        Self::Notes,
        Self::Tasks,
        Self::Drafts,
        Self::NonIpmSubtree,
        Self::EFormsRegistry,
        Self::FreeBusy,
        Self::OfflineAddressBook,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::DeferredAction => "Deferred Action",
            Self::SpoolerQueue => "Spooler Queue",
            Self::TopOfStore => "Top of Information Store",
            Self::Inbox => "Inbox",
            Self::Outbox => "Outbox",
            Self::SentItems => "Sent Items",
            Self::DeletedItems => "Deleted Items",
            Self::CommonViews => "Common Views",
            Self::Schedule => "Schedule",
            Self::Search => "Finder",
            Self::Views => "Views",
            Self::Shortcuts => "Shortcuts",
            Self::Reminders => "Reminders",
            Self::Calendar => "Calendar",
            Self::Contacts => "Contacts",
            Self::Journal => "Journal",
            Self::Notes => "Notes",
            Self::Tasks => "Tasks",
            Self::Drafts => "Drafts",
            Self::NonIpmSubtree => "NON_IPM_SUBTREE",
            Self::EFormsRegistry => "EFORMS REGISTRY",
            Self::FreeBusy => "SCHEDULE+ FREE BUSY",
            Self::OfflineAddressBook => "OFFLINE ADDRESS BOOK",
        }
    }

    /// Container class of folders whose content is served by a backend.
    pub fn container_class(self) -> Option<&'static str> {
        match self {
            Self::Inbox | Self::Outbox | Self::SentItems | Self::DeletedItems | Self::Drafts => {
                Some("IPF.Note")
            }
            Self::Calendar => Some("IPF.Appointment"),
            Self::Contacts => Some("IPF.Contact"),
            Self::Journal => Some("IPF.Journal"),
            Self::Notes => Some("IPF.StickyNote"),
            Self::Tasks => Some("IPF.Task"),
            _ => None,
        }
    }
}

impl From<SystemIndex> for u32 {
    fn from(value: SystemIndex) -> Self {
        value as u32
    }
}

impl TryFrom<u32> for SystemIndex {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|index| u32::from(*index) == value)
            .ok_or("unknown system index")
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum RecordKind {
    Folder,
    Message,
}

impl From<RecordKind> for i64 {
    fn from(value: RecordKind) -> Self {
        match value {
            RecordKind::Folder => 0,
            RecordKind::Message => 1,
        }
    }
}

impl TryFrom<i64> for RecordKind {
    type Error = &'static str;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Folder),
            1 => Ok(Self::Message),
            _ => Err("unknown record kind"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRecord {
    pub owner: String,
    pub kind: StoreKind,
    pub root: FolderId,
    pub replica_id: ReplicaId,
    pub replica_guid: [u8; 16],
}

/// A folder or message row of the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    pub kind: RecordKind,
    pub mailbox: FolderId,
    pub parent: Option<FolderId>,
    pub system_idx: Option<SystemIndex>,
    /// Set for folders whose subtree is served by a backend, including the
    /// ones still waiting for their URI.
    pub backend_root: bool,
    pub uri: Option<String>,
    pub associated: bool,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Builder)]
pub struct RecordAttrs {
    pub kind: RecordKind,
    pub mailbox: FolderId,
    #[builder(default, setter(strip_option))]
    pub system_idx: Option<SystemIndex>,
    #[builder(default)]
    pub backend_root: bool,
    #[builder(default, setter(into, strip_option))]
    pub uri: Option<String>,
    #[builder(default)]
    pub associated: bool,
    #[builder(default, setter(into, strip_option))]
    pub display_name: Option<String>,
}

impl RecordAttrs {
    pub fn folder(mailbox: FolderId) -> RecordAttrsBuilder {
        let mut builder = RecordAttrsBuilder::default();
        builder.kind(RecordKind::Folder).mailbox(mailbox);
        builder
    }

    pub fn message(mailbox: FolderId, associated: bool) -> RecordAttrsBuilder {
        let mut builder = RecordAttrsBuilder::default();
        builder
            .kind(RecordKind::Message)
            .mailbox(mailbox)
            .associated(associated);
        builder
    }
}

impl From<RecordAttrsBuilderError> for MapiError {
    fn from(_: RecordAttrsBuilderError) -> Self {
        MapiError::InvalidParameter
    }
}

/// Selects the children of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildFilter<'a> {
    pub kind: RecordKind,
    pub associated: Option<bool>,
    pub display_name: Option<&'a str>,
}

impl ChildFilter<'_> {
    pub fn folders() -> ChildFilter<'static> {
        ChildFilter {
            kind: RecordKind::Folder,
            associated: None,
            display_name: None,
        }
    }

    pub fn messages(associated: bool) -> ChildFilter<'static> {
        ChildFilter {
            kind: RecordKind::Message,
            associated: Some(associated),
            display_name: None,
        }
    }

    pub fn all_messages() -> ChildFilter<'static> {
        ChildFilter {
            kind: RecordKind::Message,
            associated: None,
            display_name: None,
        }
    }

    /// Restricts to children whose display name matches case-insensitively.
    pub fn named(self, name: &str) -> ChildFilter<'_> {
        ChildFilter {
            kind: self.kind,
            associated: self.associated,
            display_name: Some(name),
        }
    }
}
