//! READDIR (procedure 16) and READDIRPLUS (procedure 17).
//!
//! Both replies carry a linked list of entries encoded as a repeated `(bool has_next, entry)`
//! followed by a terminating `false`, then an `eof` flag. Entries beyond what the underlying
//! `Filesystem::readdir` call returns are never fabricated: if the call returns fewer entries
//! than were requested, the listing is assumed exhausted (no directory-generation tracking is
//! implemented, so `cookieverf` is always the constant zero).

use std::io::Cursor;

use crate::filesystem::DirEntry;
use crate::handle_registry::Node;
use crate::nfs::{self, ProcedureContext};
use crate::status::Nfsstat3;
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

const COOKIEVERF: [u8; 8] = [0; 8];
/// Conservative fallback when a client's `count`/`dircount` doesn't leave room to compute an
/// exact per-entry budget.
const DEFAULT_MAX_ENTRIES: u32 = 256;

fn entries_for_count(count: u32, per_entry_estimate: u32) -> u32 {
    if per_entry_estimate == 0 {
        return DEFAULT_MAX_ENTRIES;
    }
    (count / per_entry_estimate).max(1).min(4096)
}

pub async fn readdir(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let cookie = decode::u64(&mut cursor)?;
    let _cookieverf = decode::array::<8>(&mut cursor)?;
    let count = decode::u32(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let dir_attr = nfs::fetch_attr(ctx, &path).await.ok();

    let max_entries = entries_for_count(count, 64);
    match ctx.filesystem.readdir(&path, cookie, max_entries).await {
        Ok(listing) => {
            let eof = listing.len() < max_entries as usize;
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, dir_attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
            encode::array(&mut out, COOKIEVERF).unwrap();
            for entry in &listing {
                encode::bool(&mut out, true).unwrap();
                encode_entry(&mut out, entry);
            }
            encode::bool(&mut out, false).unwrap();
            encode::bool(&mut out, eof).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_attr(err.into(), dir_attr.as_ref()),
    }
}

fn encode_entry(out: &mut Vec<u8>, entry: &DirEntry) {
    encode::u64(out, entry.fileid).unwrap();
    encode::string(out, &entry.name).unwrap();
    encode::u64(out, entry.cookie).unwrap();
}

pub async fn readdirplus(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let cookie = decode::u64(&mut cursor)?;
    let _cookieverf = decode::array::<8>(&mut cursor)?;
    let _dircount = decode::u32(&mut cursor)?;
    let maxcount = decode::u32(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    let dir_attr = nfs::fetch_attr(ctx, &path).await.ok();

    let max_entries = entries_for_count(maxcount, 256);
    match ctx.filesystem.readdir(&path, cookie, max_entries).await {
        Ok(listing) => {
            let eof = listing.len() < max_entries as usize;
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, dir_attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
            encode::array(&mut out, COOKIEVERF).unwrap();
            for entry in &listing {
                encode::bool(&mut out, true).unwrap();
                encode_entry(&mut out, entry);

                let child_path = nfs::join_path(&path, &entry.name);
                let child_attr = nfs::fetch_attr(ctx, &child_path).await.ok();
                encode::option(&mut out, child_attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();

                let child_handle = ctx.handles.allocate(Node { path: child_path, fileid: entry.fileid });
                encode::option(&mut out, Some(child_handle), |d, h| encode::file_handle(d, h)).unwrap();
            }
            encode::bool(&mut out, false).unwrap();
            encode::bool(&mut out, eof).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_attr(err.into(), dir_attr.as_ref()),
    }
}
