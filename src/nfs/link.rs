//! READLINK (procedure 5), SYMLINK (procedure 10), MKNOD (procedure 11), and LINK (procedure
//! 15). SYMLINK/READLINK degrade to `NOTSUPP` when the filesystem lacks the capability (spec
//! §9 "Symlink support is optional"); MKNOD and LINK are explicit Non-goals and always answer
//! `NOTSUPP`.

use std::io::Cursor;

use crate::filesystem::SetAttr;
use crate::handle_registry::Node;
use crate::nfs::{self, ProcedureContext};
use crate::status::Nfsstat3;
use crate::xdr::decode::{self, DecodeResult};
use crate::xdr::encode;

pub async fn readlink(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let handle = decode::file_handle(&mut cursor)?;

    let path = match nfs::resolve_handle(ctx, handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    if !ctx.filesystem.supports_symlinks() {
        return nfs::failure_with_attr(Nfsstat3::NFS3ERR_NOTSUPP, None);
    }
    match ctx.filesystem.readlink(&path).await {
        Ok(target) => {
            let attr = nfs::fetch_attr(ctx, &path).await.ok();
            let mut out = Vec::new();
            encode::variant(&mut out, Nfsstat3::NFS3_OK).unwrap();
            encode::option(&mut out, attr.as_ref(), |d, i| encode::file_attr(d, i)).unwrap();
            encode::string(&mut out, &target).unwrap();
            Ok(out)
        }
        Err(err) => nfs::failure_with_attr(err.into(), None),
    }
}

pub async fn symlink(ctx: &ProcedureContext<'_>, args: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut cursor = Cursor::new(args);
    let dir_handle = decode::file_handle(&mut cursor)?;
    let name = decode::component_name(&mut cursor)?;
    let _symlink_attr = decode_symlink_sattr(&mut cursor)?;
    let target = decode::path(&mut cursor)?;

    let dir_path = match nfs::resolve_handle(ctx, dir_handle) {
        Ok(p) => p,
        Err(status) => return nfs::status_only(status),
    };
    if let Err(status) = nfs::validate_component(&name) {
        return nfs::failure_with_wcc(status, None, None);
    }
    if !ctx.filesystem.supports_symlinks() {
        return nfs::failure_with_wcc(Nfsstat3::NFS3ERR_NOTSUPP, None, None);
    }
    let dir_before = nfs::fetch_attr(ctx, &dir_path).await.ok();

    match ctx.filesystem.symlink(&dir_path, &name, &target).await {
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

fn decode_symlink_sattr(src: &mut impl std::io::Read) -> DecodeResult<SetAttr> {
    let mode = decode::option(src, decode::u32)?;
    let uid = decode::option(src, decode::u32)?;
    let gid = decode::option(src, decode::u32)?;
    let size = decode::option(src, decode::u64)?;
    let _ = decode::u32(src)?; // set_atime discriminant, ignored for newly created symlinks
    let _ = decode::u32(src)?; // set_mtime discriminant
    Ok(SetAttr { mode, uid, gid, size, atime: None, mtime: None })
}

pub async fn mknod(_ctx: &ProcedureContext<'_>, _args: &[u8]) -> DecodeResult<Vec<u8>> {
    nfs::failure_with_wcc(Nfsstat3::NFS3ERR_NOTSUPP, None, None)
}

pub async fn link(_ctx: &ProcedureContext<'_>, _args: &[u8]) -> DecodeResult<Vec<u8>> {
    // LINK3resfail (RFC 1813 §3.3.15): post_op_attr file_attributes, wcc_data linkdir_wcc.
    let mut out = Vec::new();
    encode::variant(&mut out, Nfsstat3::NFS3ERR_NOTSUPP).unwrap();
    encode::option(&mut out, None::<&crate::filesystem::FileInfo>, |d, i| encode::file_attr(d, i)).unwrap();
    encode::wcc_data(&mut out, None, None).unwrap();
    Ok(out)
}
