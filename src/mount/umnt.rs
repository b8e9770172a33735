//! MOUNT UMNT (procedure 3), RFC 1813 §5.2.3. No mount table is kept, so there is no state to
//! drop; the path is decoded only to validate the call shape.

use std::io::Cursor;

use crate::mount::MOUNT_DIRPATH_LEN;
use crate::xdr::decode::{self, DecodeResult};

pub async fn handle(args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let _dirpath = decode::string_max(&mut cursor, MOUNT_DIRPATH_LEN)?;
    Ok(Vec::new())
}
