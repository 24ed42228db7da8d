use bytes::{Buf, BufMut, BytesMut};
use rusqlite::types::Value;

use crate::{
    mapi::{PropType, PropValue},
    metadata::StoreError,
};

/// Converts a property value into the column value stored in `properties`.
/// Multi-valued properties are packed into a length-prefixed blob.
pub fn encode(value: &PropValue) -> Value {
    match value {
        PropValue::Short(value) => Value::Integer((*value).into()),
        PropValue::Long(value) => Value::Integer((*value).into()),
        PropValue::Boolean(value) => Value::Integer((*value).into()),
        PropValue::LongLong(value) | PropValue::SysTime(value) => Value::Integer(*value),
        PropValue::Double(value) => Value::Real(*value),
        PropValue::String8(value) | PropValue::Unicode(value) => Value::Text(value.clone()),
        PropValue::Guid(value) => Value::Blob(value.to_vec()),
        PropValue::Binary(value) => Value::Blob(value.clone()),
        PropValue::MvLong(values) => {
            let mut buf = BytesMut::with_capacity(4 + 4 * values.len());
            put_len(&mut buf, values.len());
            for value in values {
                buf.put_i32_le(*value);
            }
            Value::Blob(buf.to_vec())
        }
        PropValue::MvUnicode(values) => {
            let mut buf = BytesMut::new();
            put_len(&mut buf, values.len());
            for value in values {
                put_len(&mut buf, value.len());
                buf.put_slice(value.as_bytes());
            }
            Value::Blob(buf.to_vec())
        }
        PropValue::MvBinary(values) => {
            let mut buf = BytesMut::new();
            put_len(&mut buf, values.len());
            for value in values {
                put_len(&mut buf, value.len());
                buf.put_slice(value);
            }
            Value::Blob(buf.to_vec())
        }
    }
}

fn put_len(buf: &mut BytesMut, len: usize) {
    buf.put_u32_le(u32::try_from(len).unwrap_or(u32::MAX));
}

/// Reads a column value back as a property of the given type.
pub fn decode(prop_type: PropType, value: Value) -> Result<PropValue, StoreError> {
    let decoded = match (prop_type, value) {
        (PropType::Short, Value::Integer(value)) => {
            PropValue::Short(i16::try_from(value).map_err(|_| StoreError::InvalidValue)?)
        }
        (PropType::Long, Value::Integer(value)) => {
            PropValue::Long(i32::try_from(value).map_err(|_| StoreError::InvalidValue)?)
        }
        (PropType::Boolean, Value::Integer(value)) => PropValue::Boolean(value != 0),
        (PropType::LongLong, Value::Integer(value)) => PropValue::LongLong(value),
        (PropType::SysTime, Value::Integer(value)) => PropValue::SysTime(value),
        (PropType::Double, Value::Real(value)) => PropValue::Double(value),
        (PropType::String8, Value::Text(value)) => PropValue::String8(value),
        (PropType::Unicode, Value::Text(value)) => PropValue::Unicode(value),
        (PropType::Guid, Value::Blob(value)) => {
            PropValue::Guid(value.try_into().map_err(|_| StoreError::InvalidValue)?)
        }
        (PropType::Binary, Value::Blob(value)) => PropValue::Binary(value),
        (PropType::MvLong, Value::Blob(value)) => {
            let mut buf = value.as_slice();
            let count = get_len(&mut buf)?;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                if buf.remaining() < 4 {
                    return Err(StoreError::InvalidValue);
                }
                values.push(buf.get_i32_le());
            }
            PropValue::MvLong(values)
        }
        (PropType::MvUnicode, Value::Blob(value)) => {
            let mut buf = value.as_slice();
            let count = get_len(&mut buf)?;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let bytes = get_chunk(&mut buf)?;
                values.push(String::from_utf8(bytes).map_err(|_| StoreError::InvalidValue)?);
            }
            PropValue::MvUnicode(values)
        }
        (PropType::MvBinary, Value::Blob(value)) => {
            let mut buf = value.as_slice();
            let count = get_len(&mut buf)?;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(get_chunk(&mut buf)?);
            }
            PropValue::MvBinary(values)
        }
        _ => return Err(StoreError::InvalidValue),
    };
    Ok(decoded)
}

fn get_len(buf: &mut &[u8]) -> Result<usize, StoreError> {
    if buf.remaining() < 4 {
        return Err(StoreError::InvalidValue);
    }
    usize::try_from(buf.get_u32_le()).map_err(|_| StoreError::InvalidValue)
}

fn get_chunk(buf: &mut &[u8]) -> Result<Vec<u8>, StoreError> {
    let len = get_len(buf)?;
    if buf.remaining() < len {
        return Err(StoreError::InvalidValue);
    }
    let chunk = buf[..len].to_vec();
    buf.advance(len);
    Ok(chunk)
}
