//! The 21 NFSv3 procedures (RFC 1813 §3): decode → resolve handle → act → encode.
//!
//! Every handler has the shape `async fn handle(ctx, args: &[u8]) -> DecodeResult<Vec<u8>>`: a
//! `DecodeError` means the argument bytes themselves were malformed and the dispatcher reports
//! `GARBAGE_ARGS` at the RPC layer. Once arguments decode successfully, every other failure
//! (bad handle, missing capability, name validation, overflow) is encoded into the reply body as
//! an `Nfsstat3`, and the call is still an RPC-level success.

pub mod attr;
pub mod dirops;
pub mod fsinfo;
pub mod io;
pub mod link;
pub mod lookup;
pub mod null;
pub mod readdir;

use crate::attr_cache::{AttrCache, AttrSnapshot};
use crate::filesystem::{FileInfo, Filesystem};
use crate::handle_registry::HandleRegistry;
use crate::metrics::Metrics;
use crate::read_ahead::ReadAheadBuffer;
use crate::status::Nfsstat3;
use crate::xdr::decode::DecodeResult;
use crate::xdr::encode;

/// Per-export transfer and policy limits that every procedure honors.
#[derive(Debug, Clone)]
pub struct TransferLimits {
    pub transfer_size: u32,
    pub read_ahead_size: u32,
    pub enable_read_ahead: bool,
    pub read_only: bool,
}

impl Default for TransferLimits {
    fn default() -> Self {
        TransferLimits { transfer_size: 65_536, read_ahead_size: 262_144, enable_read_ahead: true, read_only: false }
    }
}

/// Everything a procedure handler needs, borrowed for the duration of one call.
pub struct ProcedureContext<'a> {
    pub handles: &'a HandleRegistry,
    pub attr_cache: &'a AttrCache,
    pub read_ahead: &'a ReadAheadBuffer,
    pub filesystem: &'a dyn Filesystem,
    pub limits: &'a TransferLimits,
    pub metrics: &'a Metrics,
}

/// Resolves a wire handle to the path it names, or `BADHANDLE` if it is unknown.
pub fn resolve_handle(ctx: &ProcedureContext<'_>, handle: u64) -> Result<String, Nfsstat3> {
    ctx.handles.get(handle).map(|n| n.path).ok_or(Nfsstat3::NFS3ERR_BADHANDLE)
}

/// The sole defence against path traversal (spec §4.9): a name must be non-empty, not `.`/`..`,
/// and contain no path separator of either flavor.
pub fn validate_component(name: &str) -> Result<(), Nfsstat3> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(Nfsstat3::NFS3ERR_INVAL);
    }
    Ok(())
}

/// Joins a canonical directory path with a (already-validated) single component.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Fetches attributes for `path`, serving from the attribute cache when possible and populating
/// it on a miss.
pub async fn fetch_attr(ctx: &ProcedureContext<'_>, path: &str) -> Result<FileInfo, Nfsstat3> {
    if let Some(snapshot) = ctx.attr_cache.get(path) {
        ctx.metrics.record_attr_cache(true);
        return Ok(snapshot.to_file_info());
    }
    ctx.metrics.record_attr_cache(false);
    let info = ctx.filesystem.stat(path).await.map_err(Nfsstat3::from)?;
    ctx.attr_cache.put(path.to_string(), AttrSnapshot::from(&info));
    Ok(info)
}

/// Drops any cached attribute/read-ahead state for `path`, called after any mutation.
pub fn invalidate(ctx: &ProcedureContext<'_>, path: &str) {
    ctx.attr_cache.invalidate(path);
    ctx.read_ahead.clear_path(path);
}

/// Checks `offset + count` as a 64-bit signed add (spec §4.9 "Read/write overflow rule").
pub fn check_offset_count(offset: u64, count: u32) -> Result<(), Nfsstat3> {
    if offset > i64::MAX as u64 {
        return Err(Nfsstat3::NFS3ERR_INVAL);
    }
    match (offset as i64).checked_add(count as i64) {
        Some(_) => Ok(()),
        None => Err(Nfsstat3::NFS3ERR_INVAL),
    }
}

/// Encodes a reply that carries only a status code and nothing else (the failure case of most
/// procedures, and the whole of NULL on success).
pub fn status_only(status: Nfsstat3) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(4);
    encode::variant(&mut out, status).expect("writing to a Vec never fails");
    Ok(out)
}

/// Encodes a `post_op_attr`-only failure reply: status followed by an optional `fattr3`.
pub fn failure_with_attr(status: Nfsstat3, attr: Option<&FileInfo>) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::new();
    encode::variant(&mut out, status).unwrap();
    encode::option(&mut out, attr, |d, info| encode::file_attr(d, info)).unwrap();
    Ok(out)
}

/// Encodes a `wcc_data`-only failure reply: status followed by before/after weak-cache-
/// consistency attributes.
pub fn failure_with_wcc(status: Nfsstat3, before: Option<&FileInfo>, after: Option<&FileInfo>) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::new();
    encode::variant(&mut out, status).unwrap();
    encode::wcc_data(&mut out, before, after).unwrap();
    Ok(out)
}
