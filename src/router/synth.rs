//! Properties computed by the router instead of being read from whoever
//! stores the object.

use bytes::{BufMut, BytesMut};

use crate::mapi::{MapiError, PropResult, PropTag};

/// Provider uid of address book entry ids.
const EMSAB_UID: [u8; 16] = [
    0xDC, 0xA7, 0x40, 0xC8, 0xC0, 0x42, 0x10, 0x1A, 0xB4, 0xB9, 0x08, 0x00, 0x2B, 0x2F, 0xE1, 0x82,
];

/// Address book entry id of a mailbox owner within `organization`.
pub fn owner_entry_id(organization: &str, owner: &str) -> Vec<u8> {
    let dn = format!("{organization}/cn=Recipients/cn={owner}");
    let mut buf = BytesMut::with_capacity(28 + dn.len() + 1);
    buf.put_u32_le(0);
    buf.put_slice(&EMSAB_UID);
    buf.put_u32_le(1);
    buf.put_u32_le(0);
    buf.put_slice(dn.as_bytes());
    buf.put_u8(0);
    buf.to_vec()
}

/// Answers every tag `local` knows about, fetching the rest from `remote` in
/// a single call.
pub fn answer(
    tags: &[PropTag],
    mut local: impl FnMut(PropTag) -> Option<PropResult>,
    remote: impl FnOnce(&[PropTag]) -> Result<Vec<PropResult>, MapiError>,
) -> Result<Vec<PropResult>, MapiError> {
    let mut results: Vec<Option<PropResult>> = tags.iter().map(|tag| local(*tag)).collect();
    let missing: Vec<PropTag> = tags
        .iter()
        .zip(&results)
        .filter(|(_, result)| result.is_none())
        .map(|(tag, _)| *tag)
        .collect();
    if !missing.is_empty() {
        let mut fetched = remote(&missing)?.into_iter();
        for slot in results.iter_mut().filter(|result| result.is_none()) {
            *slot = fetched.next();
        }
    }
    Ok(results
        .into_iter()
        .map(|result| result.unwrap_or(Err(MapiError::NotFound)))
        .collect())
}
