//! LOOKUP (procedure 3) and ACCESS (procedure 4).

use std::io::Cursor;

use crate::handle_registry::Node;
use crate::nfs::{self, ProcedureContext};
use crate::status::Nfsstat3;
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

pub async fn lookup(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let dir_handle = decode::file_handle(&mut cursor)?;
    let name = decode::component_name(&mut cursor)?;

    let dir_path = match nfs::resolve_handle(ctx, dir_handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };

    // Validated before any filesystem call is issued — a malicious name never reaches the
    // backing store (spec §8 invariant 9 / scenario S2).
    if let Err(status) = nfs::validate_component(&name) {
        return nfs::failure_with_attr(status, None);
    }

    let dir_attr_for_failure = nfs::fetch_attr(ctx, &dir_path).await.ok();

    match ctx.filesystem.lookup(&dir_path, &name).await {
        Ok(info) => {
            let path = nfs::join_path(&dir_path, &name);
            let handle = ctx.handles.allocate(Node { path: path.clone(), fileid: info.fileid });
            ctx.attr_cache.put(path, (&info).into());
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::file_handle(&mut out, handle).unwrap();
            encode::option(&mut out, Some(&info), |d, i| encode::file_attr(d, i)).unwrap();
            encode::option(&mut out, dir_attr_for_failure.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_attr(err.into(), dir_attr_for_failure.as_ref()),
    }
}

pub async fn access(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;
    let requested_mask = decode::u32(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    match nfs::fetch_attr(ctx, &path).await {
        Ok(info) => {
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, Some(&info), |d, i| encode::file_attr(d, i)).unwrap();
            // No host-side permission model is part of this core; every requested bit the
            // filesystem capability didn't reject is granted.
            encode::u32(&mut out, requested_mask).unwrap();
            Ok(out)
        }
        Err(status) => nfs::failure_with_attr(status, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_traversal_name_is_rejected_before_any_validation_concern() {
        assert_eq!(nfs::validate_component("../../etc"), Err(Nfsstat3::NFS3ERR_INVAL));
    }
}
