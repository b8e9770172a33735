//! MOUNT DUMP (procedure 2), RFC 1813 §5.2.2: list active mounts. This server persists no mount
//! table, so the list is always empty.

use crate::xdr::decode::DecodeResult;
use crate::xdr::encode;

pub async fn handle(_args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::new();
    encode::bool(&mut out, false).unwrap(); // empty mountlist
    Ok(out)
}
