//! FSSTAT (procedure 18), FSINFO (procedure 19), PATHCONF (procedure 20), and COMMIT (procedure
//! 21).

use std::io::Cursor;

use crate::nfs::{self, ProcedureContext};
use crate::status::Nfsstat3;
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

/// FSINFO `properties` bitmask: FSF3_LINK | FSF3_SYMLINK | FSF3_HOMOGENEOUS | FSF3_CANSETTIME.
const FSF3_PROPERTIES: u32 = 0x01 | 0x02 | 0x08 | 0x10;

pub async fn fsstat(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let attr = nfs::fetch_attr(ctx, &path).await.ok();
    match ctx.filesystem.statfs(&path).await {
        Ok(stats) => {
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
            encode::u64(&mut out, stats.total_bytes).unwrap();
            encode::u64(&mut out, stats.free_bytes).unwrap();
            encode::u64(&mut out, stats.available_bytes).unwrap();
            encode::u64(&mut out, stats.total_files).unwrap();
            encode::u64(&mut out, stats.free_files).unwrap();
            encode::u64(&mut out, stats.available_files).unwrap();
            encode::u32(&mut out, 0).unwrap(); // invarsec: attributes may change at any time
            Ok(out)
        }
        Err(err) => nfs::failure_with_attr(err.into(), attr.as_ref()),
    }
}

pub async fn fsinfo(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let attr = nfs::fetch_attr(ctx, &path).await.ok();
    let transfer = ctx.limits.transfer_size;

    let mut out = Vec::new();
    encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
    encode::option(&mut out, attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
    encode::u32(&mut out, transfer).unwrap(); // rtmax
    encode::u32(&mut out, transfer).unwrap(); // rtpref
    encode::u32(&mut out, 4096).unwrap(); // rtmult
    encode::u32(&mut out, transfer).unwrap(); // wtmax
    encode::u32(&mut out, transfer).unwrap(); // wtpref
    encode::u32(&mut out, 4096).unwrap(); // wtmult
    encode::u32(&mut out, 4096).unwrap(); // dtpref, readdir
    encode::u64(&mut out, u64::MAX).unwrap(); // maxfilesize
    encode::nfs_time(&mut out, (1, 0)).unwrap(); // time_delta: 1s server clock granularity
    encode::u32(&mut out, FSF3_PROPERTIES).unwrap();
    Ok(out)
}

pub async fn pathconf(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let attr = nfs::fetch_attr(ctx, &path).await.ok();

    let mut out = Vec::new();
    encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
    encode::option(&mut out, attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
    encode::u32(&mut out, if ctx.filesystem.supports_hard_links() { u32::MAX } else { 1 }).unwrap();
    encode::u32(&mut out, crate::xdr::decode::MAX_NAME_LEN as u32).unwrap();
    encode::bool(&mut out, true).unwrap(); // no_trunc: names over the limit are rejected, not truncated
    encode::bool(&mut out, false).unwrap(); // chown_restricted
    encode::bool(&mut out, false).unwrap(); // case_insensitive
    encode::bool(&mut out, true).unwrap(); // case_preserving
    Ok(out)
}

pub async fn commit(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let offset = decode::u64(&mut cursor)?;
    let count = decode::u32(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let before = nfs::fetch_attr(ctx, &path).await.ok();

    let file = match ctx.filesystem.open(&path).await {
        Ok(f) => f,
        Err(err) => return nfs::failure_with_wcc(err.into(), before.as_ref(), before.as_ref()),
    };
    let result = file.commit(offset, count).await;
    let _ = file.close().await;

    match result {
        Ok(()) => {
            let after = nfs::fetch_attr(ctx, &path).await.ok();
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::wcc_data(&mut out, before.as_ref(), after.as_ref()).unwrap();
            // Write verifier: a constant cookie, consistent with WRITE — no crash-recovery state
            // is persisted across restarts to compare against.
            encode::u64(&mut out, 0).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_wcc(err.into(), before.as_ref(), before.as_ref()),
    }
}
