use std::{cmp::Ordering, collections::BTreeMap};

use jiff::Timestamp;

use crate::mapi::{MapiError, PropTag, PropType};

/// The unix epoch expressed as a FILETIME.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Short(i16),
    Long(i32),
    Double(f64),
    Boolean(bool),
    LongLong(i64),
    String8(String),
    Unicode(String),
    /// FILETIME: 100ns intervals since 1601-01-01.
    SysTime(i64),
    Guid([u8; 16]),
    Binary(Vec<u8>),
    MvLong(Vec<i32>),
    MvUnicode(Vec<String>),
    MvBinary(Vec<Vec<u8>>),
}

/// Outcome of fetching a single property.
pub type PropResult = Result<PropValue, MapiError>;

impl PropValue {
    pub fn now() -> Self {
        Self::from_timestamp(Timestamp::now())
    }

    pub fn from_timestamp(timestamp: Timestamp) -> Self {
        let intervals = timestamp.as_nanosecond() / 100;
        let intervals = i64::try_from(intervals).unwrap_or(i64::MAX);
        Self::SysTime(intervals.saturating_add(FILETIME_UNIX_EPOCH))
    }

    /// Folder and message ids travel as unsigned 64 bit values in `LongLong`
    /// properties.
    pub fn from_id(id: impl Into<u64>) -> Self {
        Self::LongLong(i64::from_ne_bytes(id.into().to_ne_bytes()))
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            Self::LongLong(value) => Some(u64::from_ne_bytes(value.to_ne_bytes())),
            _ => None,
        }
    }

    /// Whether this value may be stored under a tag of the given type.
    pub fn matches(&self, prop_type: PropType) -> bool {
        matches!(
            (self, prop_type),
            (Self::Short(_), PropType::Short)
                | (Self::Long(_), PropType::Long)
                | (Self::Double(_), PropType::Double)
                | (Self::Boolean(_), PropType::Boolean)
                | (Self::LongLong(_), PropType::LongLong)
                | (Self::String8(_), PropType::String8)
                | (Self::Unicode(_), PropType::Unicode)
                | (Self::SysTime(_), PropType::SysTime)
                | (Self::Guid(_), PropType::Guid)
                | (Self::Binary(_), PropType::Binary)
                | (Self::MvLong(_), PropType::MvLong)
                | (Self::MvUnicode(_), PropType::MvUnicode)
                | (Self::MvBinary(_), PropType::MvBinary)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Unicode(value) | Self::String8(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Short(value) => Some((*value).into()),
            Self::Long(value) => Some((*value).into()),
            Self::LongLong(value) | Self::SysTime(value) => Some(*value),
            Self::Boolean(value) => Some((*value).into()),
            _ => None,
        }
    }

    /// Orders values of the same kind; strings compare case-insensitively.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (Self::Guid(a), Self::Guid(b)) => Some(a.cmp(b)),
            (a, b) if a.as_str().is_some() && b.as_str().is_some() => {
                let a = a.as_str()?.to_lowercase();
                let b = b.as_str()?.to_lowercase();
                Some(a.cmp(&b))
            }
            (a, b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        }
    }
}

/// A set of property values keyed by tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyRow(BTreeMap<PropTag, PropValue>);

impl PropertyRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: PropTag, value: PropValue) -> Self {
        self.set(tag, value);
        self
    }

    pub fn set(&mut self, tag: PropTag, value: PropValue) -> Option<PropValue> {
        self.0.insert(tag, value)
    }

    pub fn get(&self, tag: PropTag) -> Option<&PropValue> {
        self.0.get(&tag)
    }

    pub fn get_str(&self, tag: PropTag) -> Option<&str> {
        self.get(tag).and_then(PropValue::as_str)
    }

    pub fn remove(&mut self, tag: PropTag) -> Option<PropValue> {
        self.0.remove(&tag)
    }

    pub fn contains(&self, tag: PropTag) -> bool {
        self.0.contains_key(&tag)
    }

    /// Later values win.
    pub fn merge(&mut self, other: &PropertyRow) {
        for (tag, value) in other.iter() {
            self.0.insert(tag, value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropTag, &PropValue)> {
        self.0.iter().map(|(tag, value)| (*tag, value))
    }

    /// Looks up every tag, answering `NotFound` for the missing ones.
    pub fn lookup(&self, tags: &[PropTag]) -> Vec<PropResult> {
        tags.iter()
            .map(|tag| self.get(*tag).cloned().ok_or(MapiError::NotFound))
            .collect()
    }
}

impl FromIterator<(PropTag, PropValue)> for PropertyRow {
    fn from_iter<T: IntoIterator<Item = (PropTag, PropValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::mapi::tags::{PR_COMMENT, PR_DISPLAY_NAME};

    #[fixture]
    fn row() -> PropertyRow {
        PropertyRow::new()
            .with(PR_DISPLAY_NAME, PropValue::Unicode("Inbox".into()))
            .with(PR_COMMENT, PropValue::Unicode("incoming".into()))
    }

    #[rstest]
    fn test_merge_lets_later_values_win(mut row: PropertyRow) {
        let update = PropertyRow::new().with(PR_DISPLAY_NAME, PropValue::Unicode("Mail".into()));
        row.merge(&update);
        assert_eq!(row.get_str(PR_DISPLAY_NAME), Some("Mail"));
        assert_eq!(row.len(), 2);
    }

    #[rstest]
    fn test_lookup_reports_missing_tags_individually(row: PropertyRow) {
        let results = row.lookup(&[PR_COMMENT, PropTag::new(0x1000_001F)]);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(MapiError::NotFound));
    }

    #[rstest]
    fn test_string_compare_ignores_case() {
        let a = PropValue::Unicode("inbox".into());
        let b = PropValue::Unicode("INBOX".into());
        assert_eq!(a.compare(&b), Some(Ordering::Equal));
    }

    #[rstest]
    fn test_mismatched_kinds_do_not_compare() {
        let a = PropValue::Unicode("1".into());
        let b = PropValue::Long(1);
        assert_none!(a.compare(&b));
    }

    #[rstest]
    fn test_unix_epoch_converts_to_filetime() {
        assert_eq!(
            PropValue::from_timestamp(Timestamp::UNIX_EPOCH),
            PropValue::SysTime(FILETIME_UNIX_EPOCH)
        );
    }
}
