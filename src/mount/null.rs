//! MOUNT NULL (procedure 0), RFC 1813 §5.2.0. Does no work; exists for response timing.

use crate::xdr::decode::DecodeResult;

pub async fn handle(_args: &[u8]) -> DecodeResult<Vec<u8>> {
    Ok(Vec::new())
}
