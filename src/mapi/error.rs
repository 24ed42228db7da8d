use thiserror::Error;

/// Recoverable failures surfaced to the protocol layer.
///
/// Each variant maps onto the MAPI status code the protocol layer puts on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapiError {
    #[error("object or property not found")]
    NotFound,
    #[error("an object with that name already exists")]
    Collision,
    #[error("access denied")]
    Denied,
    #[error("not enough memory")]
    NotEnoughMemory,
    #[error("call failed")]
    CallFailed,
    #[error("folder still has subfolders")]
    HasFolders,
    #[error("folder still has messages")]
    HasMessages,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("object is not initialized")]
    NotInitialized,
    #[error("operation not supported")]
    NoSupport,
    #[error("invalid object handle")]
    InvalidObject,
}

impl MapiError {
    pub fn status_code(self) -> u32 {
        match self {
            Self::NotFound => 0x8004_010F,
            Self::Collision => 0x8004_0604,
            Self::Denied => 0x8007_0005,
            Self::NotEnoughMemory => 0x8007_000E,
            Self::CallFailed => 0x8000_4005,
            Self::HasFolders => 0x8004_0609,
            Self::HasMessages => 0x8004_0608,
            Self::InvalidParameter => 0x8007_0057,
            Self::NotInitialized => 0x8004_0605,
            Self::NoSupport => 0x8004_0102,
            Self::InvalidObject => 0x8004_0108,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case(MapiError::NotFound, 0x8004_010F)]
    #[case(MapiError::Collision, 0x8004_0604)]
    #[case(MapiError::Denied, 0x8007_0005)]
    fn test_status_codes_match_wire_values(#[case] error: MapiError, #[case] code: u32) {
        assert_eq!(error.status_code(), code);
    }
}
