use crate::{
    mapi::{FolderId, ReplicaId},
    metadata::{MailboxRecord, StoreKind},
};

/// A logged-on store. Never served by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub owner: String,
    pub kind: StoreKind,
    pub root: FolderId,
    pub replica_id: ReplicaId,
    pub replica_guid: [u8; 16],
}

impl Mailbox {
    /// Source keys are the replica GUID followed by the id's global counter.
    pub fn source_key(&self, id: impl Into<u64>) -> Vec<u8> {
        let globcnt = FolderId::from(id.into()).globcnt_bytes();
        let mut key = Vec::with_capacity(22);
        key.extend_from_slice(&self.replica_guid);
        key.extend_from_slice(&globcnt);
        key
    }
}

impl From<MailboxRecord> for Mailbox {
    fn from(record: MailboxRecord) -> Self {
        Self {
            owner: record.owner,
            kind: record.kind,
            root: record.root,
            replica_id: record.replica_id,
            replica_guid: record.replica_guid,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_source_key_is_guid_then_globcnt() {
        let mailbox = Mailbox {
            owner: "jdoe".into(),
            kind: StoreKind::Private,
            root: FolderId::new(1, ReplicaId::PRIVATE),
            replica_id: ReplicaId::PRIVATE,
            replica_guid: [0xab; 16],
        };
        let key = mailbox.source_key(FolderId::new(0x0102, ReplicaId::PRIVATE));
        assert_eq!(key.len(), 22);
        assert_eq!(&key[..16], &[0xab; 16]);
        assert_eq!(&key[16..], &[0, 0, 0, 0, 1, 2]);
    }
}
