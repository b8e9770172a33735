//! NULL (procedure 0): no arguments, empty reply. Used as a liveness probe.

use crate::xdr::decode::DecodeResult;

pub async fn handle(_args: &[u8]) -> DecodeResult<Vec<u8>> {
    Ok(Vec::new())
}
