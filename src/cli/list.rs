use std::io::Write;

use anyhow::{Context as _, Result};

use crate::{
    mapi::FolderId,
    metadata::{ChildFilter, MetadataStore, StoreKind},
};

/// Writes the folders of a mailbox as an indented tree, one per line with
/// its id, special folder marker and backend URI.
pub fn list(
    store: &dyn MetadataStore,
    owner: &str,
    kind: StoreKind,
    out: &mut impl Write,
) -> Result<()> {
    let mailbox = store
        .mailbox(owner, kind)
        .with_context(|| format!("{owner} has no {kind:?} store"))?;
    let mut pending = vec![(mailbox.root, 0usize)];
    while let Some((fid, depth)) = pending.pop() {
        let record = store.record(fid.into())?;
        let name = record.display_name.as_deref().unwrap_or("?");
        write!(out, "{:indent$}{name} [{fid}]", "", indent = depth * 2)?;
        if let Some(index) = record.system_idx {
            write!(out, " ({index:?})")?;
        }
        match (&record.uri, record.backend_root) {
            (Some(uri), _) => write!(out, " -> {uri}")?,
            (None, true) => write!(out, " -> pending")?,
            (None, false) => {}
        }
        writeln!(out)?;

        let mut children = store.find_children(fid, ChildFilter::folders())?;
        children.sort_unstable();
        pending.extend(
            children
                .into_iter()
                .rev()
                .map(|child| (FolderId::from(child), depth + 1)),
        );
    }
    Ok(())
}

/// Writes the URI index of a mailbox, one `uri [id]` line per backend
/// folder it can route to.
pub fn list_index(
    store: &dyn MetadataStore,
    owner: &str,
    kind: StoreKind,
    out: &mut impl Write,
) -> Result<()> {
    let mailbox = store
        .mailbox(owner, kind)
        .with_context(|| format!("{owner} has no {kind:?} store"))?;
    for (id, uri) in store.index_entries(mailbox.root)? {
        writeln!(out, "{uri} [{}]", FolderId::from(id))?;
    }
    Ok(())
}
