//! READ (procedure 6) and WRITE (procedure 7).

use std::io::Cursor;

use crate::nfs::{self, ProcedureContext};
use crate::status::{Nfsstat3, StableHow};
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

pub async fn read(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let offset = decode::u64(&mut cursor)?;
    let requested_count = decode::u32(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let attr = nfs::fetch_attr(ctx, &path).await.ok();

    if let Err(status) = nfs::check_offset_count(offset, requested_count) {
        return nfs::failure_with_attr(status, attr.as_ref());
    }
    let count = requested_count.min(ctx.limits.transfer_size);

    if let Some(cached) = ctx.read_ahead.read(&path, offset, count as usize) {
        ctx.metrics.record_read_ahead(true);
        let file_size = attr.as_ref().map(|a| a.size).unwrap_or(offset + cached.len() as u64);
        let eof = offset + cached.len() as u64 >= file_size;
        return Ok(encode_read_ok(attr.as_ref(), cached.len() as u32, eof, &cached));
    }
    ctx.metrics.record_read_ahead(false);

    let file = match ctx.filesystem.open(&path).await {
        Ok(f) => f,
        Err(err) => return nfs::failure_with_attr(err.into(), attr.as_ref()),
    };
    let data = match file.read_at(offset, count).await {
        Ok(d) => d,
        Err(err) => {
            let _ = file.close().await;
            return nfs::failure_with_attr(err.into(), attr.as_ref());
        }
    };
    let file_size = attr.as_ref().map(|a| a.size).unwrap_or(offset + data.len() as u64);
    let eof = offset + data.len() as u64 >= file_size;

    if !eof && data.len() as u32 == count && ctx.limits.enable_read_ahead {
        if let Ok(prefetched) = file.read_at(offset + data.len() as u64, ctx.limits.read_ahead_size).await {
            if !prefetched.is_empty() {
                ctx.read_ahead.fill(&path, prefetched, offset + data.len() as u64);
            }
        }
    }
    let _ = file.close().await;

    Ok(encode_read_ok(attr.as_ref(), data.len() as u32, eof, &data))
}

fn encode_read_ok(attr: Option<&crate::filesystem::FileInfo>, count: u32, eof: bool, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 96);
    encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
    encode::option(&mut out, attr, |d, i| encode::file_attr(d, i)).unwrap();
    encode::u32(&mut out, count).unwrap();
    encode::bool(&mut out, eof).unwrap();
    encode::opaque(&mut out, data).unwrap();
    out
}

pub async fn write(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let offset = decode::u64(&mut cursor)?;
    let declared_count = decode::u32_as_usize(&mut cursor)?;
    let stable: StableHow = decode::variant(&mut cursor)?;
    let data = decode::opaque(&mut cursor)?;
    if data.len() != declared_count {
        return Err(decode::DecodeError::LengthExceeded);
    }

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let before = nfs::fetch_attr(ctx, &path).await.ok();

    if let Err(status) = nfs::check_offset_count(offset, data.len() as u32) {
        return nfs::failure_with_wcc(status, before.as_ref(), before.as_ref());
    }
    if ctx.limits.read_only || ctx.filesystem.read_only() {
        return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_ROFS, before.as_ref(), before.as_ref());
    }

    let clamp = (ctx.limits.transfer_size as usize).min(data.len());
    let payload = &data[..clamp];

    let file = match ctx.filesystem.open(&path).await {
        Ok(f) => f,
        Err(err) => return nfs::failure_with_wcc(err.into(), before.as_ref(), before.as_ref()),
    };
    let written = match file.write_at(offset, payload).await {
        Ok(n) => n,
        Err(err) => {
            let _ = file.close().await;
            return nfs::failure_with_wcc(err.into(), before.as_ref(), before.as_ref());
        }
    };
    let _ = file.close().await;

    nfs::invalidate(ctx, &path);
    let after = nfs::fetch_attr(ctx, &path).await.ok();
    ctx.metrics.add_bytes_written(written as u64);

    let mut out = Vec::new();
    encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
    encode::wcc_data(&mut out, before.as_ref(), after.as_ref()).unwrap();
    encode::u32(&mut out, written).unwrap();
    encode::variant(&mut out, stable).unwrap();
    // write verifier: a constant cookie since no crash-recovery state is persisted (no
    // UNSTABLE-then-COMMIT resend protocol is implemented beyond honoring the client's request).
    encode::u64(&mut out, 0).unwrap();
    Ok(out)
}
