//! Lays out a new mailbox: its metadata record, the well-known folders and,
//! for private stores, the backend roots of the folders holding content.

use log::{debug, info};
use uuid::Uuid;

use crate::{
    backend::{ContainerRole, Provisioner},
    mapi::{
        FolderId, MapiError, PropValue, PropertyRow, ReplicaId,
        tags::{PR_CHANGE_NUM, PR_CONTAINER_CLASS, PR_DISPLAY_NAME},
    },
    metadata::{MailboxRecord, MetadataStore, RecordAttrs, StoreKind, SystemIndex},
};

/// Every well-known folder of a private store, each after its parent.
const PRIVATE_LAYOUT: [(SystemIndex, Option<SystemIndex>); 19] = [
    (SystemIndex::Root, None),
    (SystemIndex::DeferredAction, Some(SystemIndex::Root)),
    (SystemIndex::SpoolerQueue, Some(SystemIndex::Root)),
    (SystemIndex::TopOfStore, Some(SystemIndex::Root)),
    (SystemIndex::Views, Some(SystemIndex::Root)),
    (SystemIndex::CommonViews, Some(SystemIndex::Root)),
    (SystemIndex::Schedule, Some(SystemIndex::Root)),
    (SystemIndex::Search, Some(SystemIndex::Root)),
    (SystemIndex::Shortcuts, Some(SystemIndex::Root)),
    (SystemIndex::Inbox, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Outbox, Some(SystemIndex::TopOfStore)),
    (SystemIndex::SentItems, Some(SystemIndex::TopOfStore)),
    (SystemIndex::DeletedItems, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Drafts, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Calendar, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Contacts, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Tasks, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Notes, Some(SystemIndex::TopOfStore)),
    (SystemIndex::Journal, Some(SystemIndex::TopOfStore)),
];

const PUBLIC_LAYOUT: [(SystemIndex, Option<SystemIndex>); 6] = [
    (SystemIndex::Root, None),
    (SystemIndex::TopOfStore, Some(SystemIndex::Root)),
    (SystemIndex::NonIpmSubtree, Some(SystemIndex::Root)),
    (SystemIndex::EFormsRegistry, Some(SystemIndex::NonIpmSubtree)),
    (SystemIndex::FreeBusy, Some(SystemIndex::NonIpmSubtree)),
    (SystemIndex::OfflineAddressBook, Some(SystemIndex::NonIpmSubtree)),
];

/// Creates the mailbox of `owner` in one transaction. Fails with
/// `Collision` if it already exists.
pub fn provision_mailbox(
    store: &dyn MetadataStore,
    provisioner: &dyn Provisioner,
    owner: &str,
    kind: StoreKind,
) -> Result<MailboxRecord, MapiError> {
    let mailbox = MailboxRecord {
        owner: owner.to_string(),
        kind,
        root: FolderId::new(store.allocate_global_count()?, ReplicaId::PRIVATE),
        replica_id: ReplicaId::PRIVATE,
        replica_guid: *Uuid::new_v4().as_bytes(),
    };
    store.transaction(&mut |store| lay_out(store, provisioner, &mailbox))?;
    info!("provisioned {kind:?} store of {owner}");
    Ok(mailbox)
}

fn lay_out(
    store: &dyn MetadataStore,
    provisioner: &dyn Provisioner,
    mailbox: &MailboxRecord,
) -> Result<(), MapiError> {
    store.create_mailbox(mailbox)?;
    let layout: &[(SystemIndex, Option<SystemIndex>)] = match mailbox.kind {
        StoreKind::Private => &PRIVATE_LAYOUT,
        StoreKind::Public => &PUBLIC_LAYOUT,
    };
    let mut created: Vec<(SystemIndex, FolderId)> = Vec::with_capacity(layout.len());
    for (index, parent) in layout {
        let parent = parent.map(|parent| {
            created
                .iter()
                .find(|(created, _)| *created == parent)
                .map(|(_, fid)| *fid)
                .expect("layout should list parents first")
        });
        let fid = match parent {
            None => mailbox.root,
            Some(_) => FolderId::new(
                store.allocate_change_number(mailbox.root)?,
                mailbox.replica_id,
            ),
        };
        let change_number = store.allocate_change_number(mailbox.root)?;

        let mut attrs = RecordAttrs::folder(mailbox.root);
        attrs.system_idx(*index).display_name(index.display_name());
        let mut props = PropertyRow::new()
            .with(PR_DISPLAY_NAME, PropValue::Unicode(index.display_name().into()))
            .with(PR_CHANGE_NUM, PropValue::from_id(change_number));
        let backend_uri = match (mailbox.kind, index.container_class()) {
            (StoreKind::Private, Some(class)) => {
                props.set(PR_CONTAINER_CLASS, PropValue::Unicode(class.into()));
                let role = ContainerRole::from_container_class(class);
                let uri = provisioner.backend_uri(&mailbox.owner, role, fid)?;
                attrs.backend_root(true).uri(uri.clone());
                Some(uri)
            }
            _ => None,
        };
        store.create_record(parent, fid.into(), &attrs.build()?)?;
        store.set_properties(fid.into(), &props)?;
        if let Some(uri) = backend_uri {
            store.index_register(mailbox.root, fid.into(), &uri)?;
            debug!("{} of {} served at {uri}", index.display_name(), mailbox.owner);
        }
        created.push((*index, fid));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::{
        backend::TemplateProvisioner,
        metadata::{ChildFilter, SqliteMetadataStore},
    };

    #[fixture]
    fn store() -> SqliteMetadataStore {
        assert_ok!(SqliteMetadataStore::open_in_memory())
    }

    fn provisioner() -> TemplateProvisioner {
        assert_ok!(TemplateProvisioner::new("memory://{owner}/{role}/{fid}/"))
    }

    #[rstest]
    fn test_private_store_layout(store: SqliteMetadataStore) {
        let mailbox =
            assert_ok!(provision_mailbox(&store, &provisioner(), "jdoe", StoreKind::Private));
        let root_children = assert_ok!(store.count_children(mailbox.root, ChildFilter::folders()));
        assert_eq!(root_children, 8);
        let top = assert_ok!(store.find_system_folder(mailbox.root, SystemIndex::TopOfStore));
        assert_eq!(assert_ok!(store.count_children(top, ChildFilter::folders())), 10);

        let calendar = assert_ok!(store.find_system_folder(mailbox.root, SystemIndex::Calendar));
        let record = assert_ok!(store.record(calendar.into()));
        assert!(record.backend_root);
        let uri = assert_some!(record.uri);
        assert_starts_with!(uri, "memory://jdoe/calendar/");
        assert_eq!(assert_ok!(store.find_by_uri(&uri)), u64::from(calendar));
        assert_eq!(
            assert_ok!(store.get_property(calendar.into(), PR_CONTAINER_CLASS)),
            PropValue::Unicode("IPF.Appointment".into())
        );
        assert!(!assert_ok!(store.record(top.into())).backend_root);
    }

    #[rstest]
    fn test_public_store_has_no_backend_roots(store: SqliteMetadataStore) {
        let mailbox =
            assert_ok!(provision_mailbox(&store, &provisioner(), "jdoe", StoreKind::Public));
        let non_ipm =
            assert_ok!(store.find_system_folder(mailbox.root, SystemIndex::NonIpmSubtree));
        assert_eq!(assert_ok!(store.count_children(non_ipm, ChildFilter::folders())), 3);
        let freebusy = assert_ok!(store.find_system_folder(mailbox.root, SystemIndex::FreeBusy));
        assert_none!(assert_ok!(store.record(freebusy.into())).uri);
    }

    #[rstest]
    fn test_mailbox_is_provisioned_once(store: SqliteMetadataStore) {
        assert_ok!(provision_mailbox(&store, &provisioner(), "jdoe", StoreKind::Private));
        assert_matches!(
            provision_mailbox(&store, &provisioner(), "jdoe", StoreKind::Private),
            Err(MapiError::Collision)
        );
        assert_ok!(store.mailbox("jdoe", StoreKind::Private));
    }
}
