use std::fmt::Display;

/// Property types encoded in the low word of a property tag.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum PropType {
    Short,
    Long,
    Double,
    Boolean,
    LongLong,
    String8,
    Unicode,
    SysTime,
    Guid,
    Binary,
    MvLong,
    MvUnicode,
    MvBinary,
    Unspecified(u16),
}

impl From<u16> for PropType {
    fn from(value: u16) -> Self {
        match value {
            0x0002 => Self::Short,
            0x0003 => Self::Long,
            0x0005 => Self::Double,
            0x000B => Self::Boolean,
            0x0014 => Self::LongLong,
            0x001E => Self::String8,
            0x001F => Self::Unicode,
            0x0040 => Self::SysTime,
            0x0048 => Self::Guid,
            0x0102 => Self::Binary,
            0x1003 => Self::MvLong,
            0x101F => Self::MvUnicode,
            0x1102 => Self::MvBinary,
            other => Self::Unspecified(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PropTag(u32);

impl PropTag {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn prop_type(self) -> PropType {
        PropType::from((self.0 & 0xffff) as u16)
    }
}

impl From<u32> for PropTag {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<PropTag> for u32 {
    fn from(value: PropTag) -> Self {
        value.0
    }
}

impl Display for PropTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

pub const PR_SUBJECT: PropTag = PropTag::new(0x0037_001F);
pub const PR_MESSAGE_FLAGS: PropTag = PropTag::new(0x0E07_0003);
pub const PR_ATTACH_NUM: PropTag = PropTag::new(0x0E21_0003);
pub const PR_ACCESS: PropTag = PropTag::new(0x0FF4_0003);
pub const PR_ACCESS_LEVEL: PropTag = PropTag::new(0x0FF7_0003);
pub const PR_MAPPING_SIGNATURE: PropTag = PropTag::new(0x0FF8_0102);
pub const PR_DISPLAY_NAME: PropTag = PropTag::new(0x3001_001F);
pub const PR_COMMENT: PropTag = PropTag::new(0x3004_001F);
pub const PR_CREATION_TIME: PropTag = PropTag::new(0x3007_0040);
pub const PR_LAST_MODIFICATION_TIME: PropTag = PropTag::new(0x3008_0040);
pub const PR_FOLDER_TYPE: PropTag = PropTag::new(0x3601_0003);
pub const PR_CONTENT_COUNT: PropTag = PropTag::new(0x3602_0003);
pub const PR_CONTENT_UNREAD: PropTag = PropTag::new(0x3603_0003);
pub const PR_SUBFOLDERS: PropTag = PropTag::new(0x360A_000B);
pub const PR_CONTAINER_CLASS: PropTag = PropTag::new(0x3613_001F);
pub const PR_ASSOC_CONTENT_COUNT: PropTag = PropTag::new(0x3617_0003);
pub const PR_ATTACH_DATA_BIN: PropTag = PropTag::new(0x3701_0102);
pub const PR_ATTACH_FILENAME: PropTag = PropTag::new(0x3704_001F);
pub const PR_MAILBOX_OWNER_ENTRYID: PropTag = PropTag::new(0x661B_0102);
pub const PR_MAILBOX_OWNER_NAME: PropTag = PropTag::new(0x661C_001F);
pub const PR_FOLDER_CHILD_COUNT: PropTag = PropTag::new(0x6638_0003);
pub const PR_RIGHTS: PropTag = PropTag::new(0x6639_0003);
pub const PR_SOURCE_KEY: PropTag = PropTag::new(0x65E0_0102);
pub const PR_PARENT_SOURCE_KEY: PropTag = PropTag::new(0x65E1_0102);
pub const PR_LOCAL_COMMIT_TIME_MAX: PropTag = PropTag::new(0x670A_0040);
pub const PR_FID: PropTag = PropTag::new(0x6748_0014);
pub const PR_PARENT_FID: PropTag = PropTag::new(0x6749_0014);
pub const PR_MID: PropTag = PropTag::new(0x674A_0014);
pub const PR_CHANGE_NUM: PropTag = PropTag::new(0x67A4_0014);
pub const PR_ASSOCIATED: PropTag = PropTag::new(0x67AA_000B);

pub const PR_FREEBUSY_PUBLISH_START: PropTag = PropTag::new(0x6847_0003);
pub const PR_FREEBUSY_PUBLISH_END: PropTag = PropTag::new(0x6848_0003);
pub const PR_FREEBUSY_EMAIL_ADDRESS: PropTag = PropTag::new(0x6849_001F);
pub const PR_SCHEDULE_INFO_MONTHS_MERGED: PropTag = PropTag::new(0x684F_1003);
pub const PR_SCHEDULE_INFO_FREEBUSY_MERGED: PropTag = PropTag::new(0x6850_1102);
pub const PR_SCHEDULE_INFO_MONTHS_TENTATIVE: PropTag = PropTag::new(0x6851_1003);
pub const PR_SCHEDULE_INFO_FREEBUSY_TENTATIVE: PropTag = PropTag::new(0x6852_1102);
pub const PR_SCHEDULE_INFO_MONTHS_BUSY: PropTag = PropTag::new(0x6853_1003);
pub const PR_SCHEDULE_INFO_FREEBUSY_BUSY: PropTag = PropTag::new(0x6854_1102);
pub const PR_SCHEDULE_INFO_MONTHS_AWAY: PropTag = PropTag::new(0x6855_1003);
pub const PR_SCHEDULE_INFO_FREEBUSY_AWAY: PropTag = PropTag::new(0x6856_1102);
pub const PR_FREEBUSY_RANGE_TIMESTAMP: PropTag = PropTag::new(0x6868_0040);

/// `PR_FOLDER_TYPE` values.
pub const FOLDER_ROOT: i32 = 0;
pub const FOLDER_GENERIC: i32 = 1;

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case(PR_DISPLAY_NAME, PropType::Unicode)]
    #[case(PR_SUBFOLDERS, PropType::Boolean)]
    #[case(PR_FID, PropType::LongLong)]
    #[case(PR_SOURCE_KEY, PropType::Binary)]
    #[case(PR_SCHEDULE_INFO_MONTHS_BUSY, PropType::MvLong)]
    #[case(PropTag::new(0x1234_0099), PropType::Unspecified(0x0099))]
    fn test_prop_type_comes_from_low_word(#[case] tag: PropTag, #[case] expected: PropType) {
        assert_eq!(tag.prop_type(), expected);
    }

    #[rstest]
    fn test_prop_tag_displays_as_upper_hex() {
        assert_eq!("0x3001001F", PR_DISPLAY_NAME.to_string());
        assert_eq!(0x3001, PR_DISPLAY_NAME.id());
    }
}
