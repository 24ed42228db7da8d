use crate::mapi::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub mid: MessageId,
    pub num: u32,
}
