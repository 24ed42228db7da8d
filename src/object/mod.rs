//! The objects a logon can hold open, and the tree that owns them.

mod attachment;
mod folder;
mod mailbox;
mod message;
mod notify;
mod stream;
mod sync_context;
mod table;
mod tree;

pub use attachment::Attachment;
pub use folder::Folder;
pub use folder::FolderBacking;
pub use mailbox::Mailbox;
pub use message::FreeBusyBlock;
pub use message::FreeBusyBlockBuilder;
pub use message::Message;
pub use message::MessageMode;
pub use notify::NotificationEvent;
pub use notify::Subscription;
pub use stream::Stream;
pub use stream::StreamMode;
pub use sync_context::SyncContext;
pub use sync_context::SyncKind;
pub use table::Table;
pub use table::TableFlag;
pub use table::TableSource;
pub use tree::Handle;
pub use tree::ObjectTree;

#[derive(Debug)]
pub enum Node {
    Mailbox(Mailbox),
    Folder(Folder),
    Message(Message),
    Table(Table),
    Stream(Stream),
    Attachment(Attachment),
    Subscription(Subscription),
    SyncContext(SyncContext),
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Mailbox(_) => "mailbox",
            Node::Folder(_) => "folder",
            Node::Message(_) => "message",
            Node::Table(_) => "table",
            Node::Stream(_) => "stream",
            Node::Attachment(_) => "attachment",
            Node::Subscription(_) => "subscription",
            Node::SyncContext(_) => "sync context",
        }
    }
}
