use std::fmt::Display;

/// Replica identifier stored in the low 16 bits of every folder and message id.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ReplicaId(u16);

impl ReplicaId {
    pub const PRIVATE: Self = Self(1);

    pub fn new(value: u16) -> Self {
        Self(value)
    }
}

impl From<ReplicaId> for u16 {
    fn from(value: ReplicaId) -> Self {
        value.0
    }
}

impl Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

const GLOBCNT_SHIFT: u32 = 16;
const GLOBCNT_MAX: u64 = (1 << 48) - 1;

fn compose(counter: u64, replica: ReplicaId) -> u64 {
    debug_assert!(counter <= GLOBCNT_MAX, "change number should fit in 48 bits");
    (counter << GLOBCNT_SHIFT) | u64::from(replica.0)
}

macro_rules! object_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            pub fn new(counter: u64, replica: ReplicaId) -> Self {
                Self(compose(counter, replica))
            }

            /// The global counter part of the id, as used in source keys.
            pub fn globcnt(self) -> u64 {
                self.0 >> GLOBCNT_SHIFT
            }

            pub fn replica(self) -> ReplicaId {
                ReplicaId((self.0 & 0xffff) as u16)
            }

            /// The 6 byte big-endian GLOBCNT encoding.
            pub fn globcnt_bytes(self) -> [u8; 6] {
                let bytes = self.globcnt().to_be_bytes();
                [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl From<&$name> for u64 {
            fn from(value: &$name) -> Self {
                value.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "0x{:016x}", self.0)
            }
        }
    };
}

object_id!(FolderId);
object_id!(MessageId);

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_folder_id_keeps_replica_in_low_bits() {
        let fid = FolderId::new(0x1234, ReplicaId::new(7));
        assert_eq!(u64::from(fid), 0x1234_0007);
        assert_eq!(fid.globcnt(), 0x1234);
        assert_eq!(fid.replica(), ReplicaId::new(7));
    }

    #[rstest]
    fn test_globcnt_bytes_are_big_endian() {
        let mid = MessageId::new(0x0102_0304_0506, ReplicaId::PRIVATE);
        assert_eq!(mid.globcnt_bytes(), [1, 2, 3, 4, 5, 6]);
    }

    #[rstest]
    fn test_folder_id_displays_as_hex() {
        let fid = FolderId::from(0x10001);
        assert_eq!("0x0000000000010001", fid.to_string());
    }
}
