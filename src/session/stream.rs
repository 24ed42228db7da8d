use bytes::Bytes;
use log::trace;

use crate::{
    mapi::{MapiError, PropTag, PropType, PropValue, PropertyRow},
    object::{Handle, Node, Stream, StreamMode},
    session::Session,
};

/// Streams are addressed with 32 bit offsets.
const MAX_STREAM_SIZE: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Beginning,
    Current,
    End,
}

fn encode(value: PropValue) -> Result<Vec<u8>, MapiError> {
    match value {
        PropValue::Binary(bytes) => Ok(bytes),
        PropValue::String8(text) => Ok(text.into_bytes()),
        PropValue::Unicode(text) => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        _ => Err(MapiError::InvalidParameter),
    }
}

fn decode(tag: PropTag, bytes: &[u8]) -> Result<PropValue, MapiError> {
    match tag.prop_type() {
        PropType::Binary => Ok(PropValue::Binary(bytes.to_vec())),
        PropType::String8 => Ok(PropValue::String8(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        PropType::Unicode => {
            if bytes.len() % 2 != 0 {
                return Err(MapiError::InvalidParameter);
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units)
                .map(PropValue::Unicode)
                .map_err(|_| MapiError::InvalidParameter)
        }
        _ => Err(MapiError::InvalidParameter),
    }
}

impl Session {
    /// Opens property `tag` of a mailbox, folder, message or attachment for
    /// byte-wise access. Unicode properties are exposed as UTF-16LE.
    pub fn open_stream(
        &mut self,
        parent: Handle,
        tag: PropTag,
        mode: StreamMode,
    ) -> Result<Handle, MapiError> {
        if !matches!(
            tag.prop_type(),
            PropType::Binary | PropType::Unicode | PropType::String8
        ) {
            return Err(MapiError::InvalidParameter);
        }
        match self.tree.get(parent)? {
            Node::Mailbox(_) | Node::Folder(_) | Node::Message(_) | Node::Attachment(_) => {}
            _ => return Err(MapiError::InvalidParameter),
        }
        self.ensure_committed(parent)?;

        let contents = match mode {
            StreamMode::Create => Vec::new(),
            StreamMode::ReadOnly | StreamMode::ReadWrite => {
                match self.get_properties(parent, &[tag])?.pop() {
                    Some(Ok(value)) => encode(value)?,
                    Some(Err(MapiError::NotFound)) | None if mode == StreamMode::ReadWrite => {
                        Vec::new()
                    }
                    Some(Err(error)) => return Err(error),
                    None => return Err(MapiError::NotFound),
                }
            }
        };
        trace!("opening {tag} of {parent} as a {mode:?} stream of {} bytes", contents.len());
        Ok(self
            .tree
            .insert(Some(parent), Node::Stream(Stream::new(tag, mode, &contents))))
    }

    /// Reads up to `max` bytes from the current position.
    pub fn read_stream(&mut self, handle: Handle, max: usize) -> Result<Bytes, MapiError> {
        let stream = self.tree.stream_mut(handle)?;
        let start = stream.position.min(stream.len());
        let end = start.saturating_add(max).min(stream.len());
        stream.position = end;
        Ok(Bytes::copy_from_slice(&stream.buffer[start..end]))
    }

    /// Writes at the current position, growing the stream as needed but
    /// never past [`MAX_STREAM_SIZE`].
    pub fn write_stream(&mut self, handle: Handle, data: &[u8]) -> Result<usize, MapiError> {
        let stream = self.tree.stream_mut(handle)?;
        if stream.mode == StreamMode::ReadOnly {
            return Err(MapiError::Denied);
        }
        let start = stream.position;
        let end = start
            .checked_add(data.len())
            .filter(|end| *end <= MAX_STREAM_SIZE)
            .ok_or(MapiError::NotEnoughMemory)?;
        if end > stream.len() {
            stream.buffer.resize(end, 0);
        }
        stream.buffer[start..end].copy_from_slice(data);
        stream.position = end;
        stream.dirty = true;
        Ok(data.len())
    }

    /// Moves the cursor and answers the new absolute position.
    pub fn seek_stream(
        &mut self,
        handle: Handle,
        origin: SeekOrigin,
        offset: i64,
    ) -> Result<usize, MapiError> {
        let stream = self.tree.stream_mut(handle)?;
        let base = match origin {
            SeekOrigin::Beginning => 0,
            SeekOrigin::Current => stream.position,
            SeekOrigin::End => stream.len(),
        };
        let base = i64::try_from(base).map_err(|_| MapiError::InvalidParameter)?;
        let target = base
            .checked_add(offset)
            .and_then(|target| usize::try_from(target).ok())
            .filter(|target| *target <= MAX_STREAM_SIZE)
            .ok_or(MapiError::InvalidParameter)?;
        stream.position = target;
        Ok(target)
    }

    pub fn set_stream_size(&mut self, handle: Handle, size: usize) -> Result<(), MapiError> {
        let stream = self.tree.stream_mut(handle)?;
        if stream.mode == StreamMode::ReadOnly {
            return Err(MapiError::Denied);
        }
        if size > MAX_STREAM_SIZE {
            return Err(MapiError::NotEnoughMemory);
        }
        stream.buffer.resize(size, 0);
        stream.position = stream.position.min(size);
        stream.dirty = true;
        Ok(())
    }

    /// Writes the stream back to the property it was opened on.
    pub fn commit_stream(&mut self, handle: Handle) -> Result<(), MapiError> {
        let stream = self.tree.stream(handle)?;
        if !stream.dirty {
            return Ok(());
        }
        let row = PropertyRow::new().with(stream.tag, decode(stream.tag, &stream.buffer)?);
        let parent = self
            .tree
            .parent(handle)
            .expect("stream should hang off the object it was opened on");
        self.set_properties(parent, &row)?;
        self.tree.stream_mut(handle)?.dirty = false;
        Ok(())
    }
}
