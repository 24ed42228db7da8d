use crate::{
    mapi::{
        PropTag, PropValue,
        tags::{
            PR_FREEBUSY_EMAIL_ADDRESS, PR_FREEBUSY_PUBLISH_END, PR_FREEBUSY_PUBLISH_START,
            PR_FREEBUSY_RANGE_TIMESTAMP, PR_SCHEDULE_INFO_FREEBUSY_AWAY,
            PR_SCHEDULE_INFO_FREEBUSY_BUSY, PR_SCHEDULE_INFO_FREEBUSY_MERGED,
            PR_SCHEDULE_INFO_FREEBUSY_TENTATIVE, PR_SCHEDULE_INFO_MONTHS_AWAY,
            PR_SCHEDULE_INFO_MONTHS_BUSY, PR_SCHEDULE_INFO_MONTHS_MERGED,
            PR_SCHEDULE_INFO_MONTHS_TENTATIVE,
        },
    },
    object::FreeBusyBlock,
};

impl FreeBusyBlock {
    /// The value of a free/busy tag, or `None` for tags the block does not
    /// cover.
    pub fn property(&self, tag: PropTag) -> Option<PropValue> {
        let value = match tag {
            PR_FREEBUSY_EMAIL_ADDRESS => PropValue::Unicode(self.email.clone()),
            PR_FREEBUSY_PUBLISH_START => PropValue::Long(self.publish_start),
            PR_FREEBUSY_PUBLISH_END => PropValue::Long(self.publish_end),
            PR_FREEBUSY_RANGE_TIMESTAMP => PropValue::SysTime(self.range_timestamp),
            PR_SCHEDULE_INFO_MONTHS_MERGED => PropValue::MvLong(self.months_merged.clone()),
            PR_SCHEDULE_INFO_FREEBUSY_MERGED => PropValue::MvBinary(self.freebusy_merged.clone()),
            PR_SCHEDULE_INFO_MONTHS_TENTATIVE => PropValue::MvLong(self.months_tentative.clone()),
            PR_SCHEDULE_INFO_FREEBUSY_TENTATIVE => {
                PropValue::MvBinary(self.freebusy_tentative.clone())
            }
            PR_SCHEDULE_INFO_MONTHS_BUSY => PropValue::MvLong(self.months_busy.clone()),
            PR_SCHEDULE_INFO_FREEBUSY_BUSY => PropValue::MvBinary(self.freebusy_busy.clone()),
            PR_SCHEDULE_INFO_MONTHS_AWAY => PropValue::MvLong(self.months_away.clone()),
            PR_SCHEDULE_INFO_FREEBUSY_AWAY => PropValue::MvBinary(self.freebusy_away.clone()),
            _ => return None,
        };
        Some(value)
    }
}
