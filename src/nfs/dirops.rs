//! CREATE (procedure 8), MKDIR (procedure 9), REMOVE (procedure 12), RMDIR (procedure 13), and
//! RENAME (procedure 14).

use std::io::Cursor;

use crate::filesystem::SetAttr;
use crate::handle_registry::Node;
use crate::nfs::{self, ProcedureContext};
use crate::status::{CreateMode3, Nfsstat3};
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

fn decode_sattr3(src: &mut impl std::io::Read) -> DecodeResult<SetAttr> {
    let mode = decode::option(src, decode::u32)?;
    let uid = decode::option(src, decode::u32)?;
    let gid = decode::option(src, decode::u32)?;
    let size = decode::option(src, decode::u64)?;
    let _ = decode::u32(src)?;
    let _ = decode::u32(src)?;
    Ok(SetAttr { mode, uid, gid, size, atime: None, mtime: None })
}

pub async fn create(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let dir_handle = decode::file_handle(&mut cursor)?;
    let name = decode::component_name(&mut cursor)?;
    let mode: CreateMode3 = decode::variant(&mut cursor)?;
    // UNCHECKED/GUARDED carry an sattr3; EXCLUSIVE carries an 8-byte verifier instead. EXCLUSIVE
    // degrades to GUARDED semantics here (no verifier persistence, spec §9 open question).
    let (requested_mode, exclusive) = match mode {
        CreateMode3::EXCLUSIVE => {
            let _verifier = decode::array::<8>(&mut cursor)?;
            (0o644, true)
        }
        _ => {
            let sattr = decode_sattr3(&mut cursor)?;
            (sattr.mode.unwrap_or(0o644), false)
        }
    };

    let dir_path = match nfs::resolve_handle(ctx, dir_handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    if let Err(status) = nfs::validate_component(&name) {
        return nfs::failure_with_wcc(status, None, None);
    }
    let dir_before = nfs::fetch_attr(ctx, &dir_path).await.ok();
    if ctx.limits.read_only || ctx.filesystem.read_only() {
        return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_ROFS, dir_before.as_ref(), dir_before.as_ref());
    }

    let exclusive_flag = matches!(mode, CreateMode3::GUARDED) || exclusive;
    match ctx.filesystem.create(&dir_path, &name, requested_mode, exclusive_flag).await {
        Ok(info) => {
            let path = nfs::join_path(&dir_path, &name);
            let handle = ctx.handles.allocate(Node { path: path.clone(), fileid: info.fileid });
            ctx.attr_cache.put(path, (&info).into());
            nfs::invalidate(ctx, &dir_path);
            let dir_after = nfs::fetch_attr(ctx, &dir_path).await.ok();
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, Some(handle), |d, h| encode::file_handle(d, h)).unwrap();
            encode::option(&mut out, Some(&info), |d, i| encode::file_attr(d, i)).unwrap();
            encode::wcc_data(&mut out, dir_before.as_ref(), dir_after.as_ref()).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_wcc(err.into(), dir_before.as_ref(), dir_before.as_ref()),
    }
}

pub async fn mkdir(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let dir_handle = decode::file_handle(&mut cursor)?;
    let name = decode::component_name(&mut cursor)?;
    let sattr = decode_sattr3(&mut cursor)?;

    let dir_path = match nfs::resolve_handle(ctx, dir_handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    if let Err(status) = nfs::validate_component(&name) {
        return nfs::failure_with_wcc(status, None, None);
    }
    let dir_before = nfs::fetch_attr(ctx, &dir_path).await.ok();
    if ctx.limits.read_only || ctx.filesystem.read_only() {
        return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_ROFS, dir_before.as_ref(), dir_before.as_ref());
    }

    match ctx.filesystem.mkdir(&dir_path, &name, sattr.mode.unwrap_or(0o755)).await {
        Ok(info) => {
            let path = nfs::join_path(&dir_path, &name);
            let handle = ctx.handles.allocate(Node { path: path.clone(), fileid: info.fileid });
            ctx.attr_cache.put(path, (&info).into());
            nfs::invalidate(ctx, &dir_path);
            let dir_after = nfs::fetch_attr(ctx, &dir_path).await.ok();
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, Some(handle), |d, h| encode::file_handle(d, h)).unwrap();
            encode::option(&mut out, Some(&info), |d, i| encode::file_attr(d, i)).unwrap();
            encode::wcc_data(&mut out, dir_before.as_ref(), dir_after.as_ref()).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_wcc(err.into(), dir_before.as_ref(), dir_before.as_ref()),
    }
}

async fn remove_entry(ctx: &ProcedureContext<'_>, args: &[u8], is_dir: bool) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let dir_handle = decode::file_handle(&mut cursor)?;
    let name = decode::component_name(&mut cursor)?;

    let dir_path = match nfs::resolve_handle(ctx, dir_handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    if let Err(status) = nfs::validate_component(&name) {
        return nfs::failure_with_wcc(status, None, None);
    }
    let dir_before = nfs::fetch_attr(ctx, &dir_path).await.ok();
    if ctx.limits.read_only || ctx.filesystem.read_only() {
        return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_ROFS, dir_before.as_ref(), dir_before.as_ref());
    }

    let result = if is_dir {
        ctx.filesystem.rmdir(&dir_path, &name).await
    } else {
        ctx.filesystem.remove(&dir_path, &name).await
    };
    match result {
        Ok(()) => {
            let removed_path = nfs::join_path(&dir_path, &name);
            nfs::invalidate(ctx, &removed_path);
            nfs::invalidate(ctx, &dir_path);
            let dir_after = nfs::fetch_attr(ctx, &dir_path).await.ok();
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::wcc_data(&mut out, dir_before.as_ref(), dir_after.as_ref()).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_wcc(err.into(), dir_before.as_ref(), dir_before.as_ref()),
    }
}

pub async fn remove(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    remove_entry(ctx, args, false).await
}

pub async fn rmdir(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    remove_entry(ctx, args, true).await
}

pub async fn rename(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let from_dir_handle = decode::file_handle(&mut cursor)?;
    let from_name = decode::component_name(&mut cursor)?;
    let to_dir_handle = decode::file_handle(&mut cursor)?;
    let to_name = decode::component_name(&mut cursor)?;

    let (from_dir, to_dir) = match (nfs::resolve_handle(ctx, from_dir_handle), nfs::resolve_handle(ctx, to_dir_handle)) {
        (Ok(f), Ok(t)) => (f, t),
        (Err(status), _) | (_, Err(status)) => {
            let mut out = Vec::new();
            encode::variant(&mut out, status).unwrap();
            encode::wcc_data(&mut out, None, None).unwrap();
            encode::wcc_data(&mut out, None, None).unwrap();
            return Ok(out);
        }
    };
    if nfs::validate_component(&from_name).is_err() || nfs::validate_component(&to_name).is_err() {
        let mut out = Vec::new();
        encode::variant(&mut out, Nfsstat3::NFS3ERR_INVAL).unwrap();
        encode::wcc_data(&mut out, None, None).unwrap();
        encode::wcc_data(&mut out, None, None).unwrap();
        return Ok(out);
    }
    let from_before = nfs::fetch_attr(ctx, &from_dir).await.ok();
    let to_before = nfs::fetch_attr(ctx, &to_dir).await.ok();
    if ctx.limits.read_only || ctx.filesystem.read_only() {
        let mut out = Vec::new();
        encode::variant(&mut out, Nfsstat3::NFS3ERR_ROFS).unwrap();
        encode::wcc_data(&mut out, from_before.as_ref(), from_before.as_ref()).unwrap();
        encode::wcc_data(&mut out, to_before.as_ref(), to_before.as_ref()).unwrap();
        return Ok(out);
    }

    let status = match ctx.filesystem.rename(&from_dir, &from_name, &to_dir, &to_name).await {
        Ok(()) => {
            nfs::invalidate(ctx, &nfs::join_path(&from_dir, &from_name));
            nfs::invalidate(ctx, &nfs::join_path(&to_dir, &to_name));
            nfs::invalidate(ctx, &from_dir);
            nfs::invalidate(ctx, &to_dir);
            Nfsstat3::NFS3_OK
        }
        Err(err) => err.into(),
    };
    let from_after = nfs::fetch_attr(ctx, &from_dir).await.ok();
    let to_after = nfs::fetch_attr(ctx, &to_dir).await.ok();

    let mut out = Vec::new();
    encode::variant(&mut out, status).unwrap();
    encode::wcc_data(&mut out, from_before.as_ref(), from_after.as_ref()).unwrap();
    encode::wcc_data(&mut out, to_before.as_ref(), to_after.as_ref()).unwrap();
    Ok(out)
}
