//! GETATTR (procedure 1) and SETATTR (procedure 2).

use std::io::Cursor;

use crate::filesystem::{SetAttr, SetTime};
use crate::nfs::{self, ProcedureContext};
use crate::status::Nfsstat3;
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

pub async fn get_attr(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    match nfs::fetch_attr(ctx, &path).await {
        Ok(info) => {
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::file_attr(&mut out, &info).unwrap();
            Ok(out)
        }
        Err(status) => nfs::status_only(status),
    }
}

/// `set_mode3`/`set_uid3`/.../`set_atime`/`set_mtime`: each field is `{present: bool, value?}`.
fn decode_sattr3(src: &mut impl std::io::Read) -> DecodeResult<SetAttr> {
    let mode = decode::option(src, decode::u32)?;
    let uid = decode::option(src, decode::u32)?;
    let gid = decode::option(src, decode::u32)?;
    let size = decode::option(src, decode::u64)?;
    let atime = decode_set_time(src)?;
    let mtime = decode_set_time(src)?;
    Ok(SetAttr { mode, uid, gid, size, atime, mtime })
}

fn decode_set_time(src: &mut impl std::io::Read) -> DecodeResult<Option<SetTime>> {
    match decode::u32(src)? {
        0 => Ok(None),
        1 => Ok(Some(SetTime::SetToServerTime)),
        2 => {
            let (sec, nsec) = decode::nfs_time(src)?;
            Ok(Some(SetTime::SetToClientTime(sec, nsec)))
        }
        _ => Err(decode::DecodeError::BadEnumDiscriminant),
    }
}

pub async fn set_attr(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let new_attr = decode_sattr3(&mut cursor)?;
    // sattrguard3: `{present: bool, ctime?}` — a guard we honor when supplied.
    let guard_ctime = decode::option(&mut cursor, decode::nfs_time)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let before = nfs::fetch_attr(ctx, &path).await.ok();

    if let Some(expected) = guard_ctime {
        if before.as_ref().and_then(|b| b.ctime).unwrap_or((0, 0)) != expected {
            return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_NOT_SYNC, before.as_ref(), before.as_ref());
        }
    }

    if ctx.limits.read_only || ctx.filesystem.read_only() {
        return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_ROFS, before.as_ref(), before.as_ref());
    }

    match ctx.filesystem.setattr(&path, new_attr).await {
        Ok(after) => {
            nfs::invalidate(ctx, &path);
            ctx.attr_cache.put(path.clone(), (&after).into());
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::wcc_data(&mut out, before.as_ref(), Some(&after)).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_wcc(err.into(), before.as_ref(), before.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_time_discriminant_2_requires_a_following_timestamp() {
        let mut body = Vec::new();
        encode::u32(&mut body, 2).unwrap();
        encode::u32(&mut body, 1000).unwrap();
        encode::u32(&mut body, 0).unwrap();
        let mut cursor = Cursor::new(body.as_slice());
        assert_eq!(decode_set_time(&mut cursor).unwrap(), Some(SetTime::SetToClientTime(1000, 0)));
    }

    #[test]
    fn sattr3_with_every_field_absent_decodes_to_all_none() {
        let mut body = Vec::new();
        for _ in 0..4 {
            encode::bool(&mut body, false).unwrap();
        }
        encode::u32(&mut body, 0).unwrap();
        encode::u32(&mut body, 0).unwrap();
        let mut cursor = Cursor::new(body.as_slice());
        let attr = decode_sattr3(&mut cursor).unwrap();
        assert_eq!(attr, SetAttr::default());
    }
}
