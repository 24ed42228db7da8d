use bytes::BytesMut;

use crate::mapi::PropTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    ReadOnly,
    ReadWrite,
    /// Starts empty whatever the property held before.
    Create,
}

/// A property opened for byte-wise access. Writes land in the buffer and
/// reach the parent object on commit or release.
#[derive(Debug)]
pub struct Stream {
    pub tag: PropTag,
    pub mode: StreamMode,
    pub buffer: BytesMut,
    pub position: usize,
    pub dirty: bool,
}

impl Stream {
    pub fn new(tag: PropTag, mode: StreamMode, contents: &[u8]) -> Self {
        Self {
            tag,
            mode,
            buffer: BytesMut::from(contents),
            position: 0,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
