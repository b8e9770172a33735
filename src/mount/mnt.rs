//! MOUNT MNT (procedure 1), RFC 1813 §5.2.1: resolve a server path to a root file handle.

use std::io::Cursor;

use crate::handle_registry::Node;
use crate::mount::{MountContext, MountStat3, MOUNT_DIRPATH_LEN};
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

/// AUTH_NONE and AUTH_SYS are the only flavors this server accepts (matches the NFS-layer
/// `auth` policy), so MNT always offers exactly those two.
const AUTH_FLAVORS: [u32; 2] = [0, 1];

pub async fn handle(ctx: &MountContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let dirpath = decode::string_max(&mut cursor, MOUNT_DIRPATH_LEN)?;

    let mut out = Vec::new();
    match ctx.filesystem.stat(&dirpath).await {
        Ok(info) => {
            let handle = ctx.handles.allocate(Node { path: dirpath, fileid: info.fileid });
            encode::variant(&mut out, MountStat3::MNT3_OK).unwrap();
            encode::file_handle(&mut out, handle).unwrap();
            encode::u32(&mut out, AUTH_FLAVORS.len() as u32).unwrap();
            for flavor in AUTH_FLAVORS {
                encode::u32(&mut out, flavor).unwrap();
            }
        }
        Err(err) => {
            encode::variant(&mut out, MountStat3::from(err)).unwrap();
        }
    }
    Ok(out)
}
