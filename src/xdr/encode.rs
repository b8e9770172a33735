//! Primitive XDR encoding (RFC 4506) plus the shared `fattr3`/`wcc_attr`/`wcc_data` structures.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use num_traits::ToPrimitive;

use crate::filesystem::FileInfo;
use crate::status::Ftype3;
use crate::xdr::decode::ALIGNMENT;

pub fn padding(dest: &mut impl Write, n: usize) -> io::Result<()> {
    let pad = (ALIGNMENT - n % ALIGNMENT) % ALIGNMENT;
    dest.write_all(&[0u8; ALIGNMENT][..pad])
}

pub fn u8(dest: &mut impl Write, v: u8) -> io::Result<()> {
    dest.write_u8(v)
}

pub fn u32(dest: &mut impl Write, v: u32) -> io::Result<()> {
    dest.write_u32::<BigEndian>(v)
}

pub fn u64(dest: &mut impl Write, v: u64) -> io::Result<()> {
    dest.write_u64::<BigEndian>(v)
}

pub fn i32(dest: &mut impl Write, v: i32) -> io::Result<()> {
    dest.write_i32::<BigEndian>(v)
}

pub fn bool(dest: &mut impl Write, v: bool) -> io::Result<()> {
    u32(dest, if v { 1 } else { 0 })
}

pub fn option<T>(dest: &mut impl Write, v: Option<T>, cont: impl FnOnce(&mut dyn Write, T) -> io::Result<()>) -> io::Result<()> {
    match v {
        Some(inner) => {
            bool(dest, true)?;
            cont(dest, inner)
        }
        None => bool(dest, false),
    }
}

pub fn array<const N: usize>(dest: &mut impl Write, buf: [u8; N]) -> io::Result<()> {
    dest.write_all(&buf)?;
    padding(dest, N)
}

pub fn opaque(dest: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    u32(dest, bytes.len() as u32)?;
    dest.write_all(bytes)?;
    padding(dest, bytes.len())
}

pub fn string(dest: &mut impl Write, s: &str) -> io::Result<()> {
    opaque(dest, s.as_bytes())
}

pub fn variant<T: ToPrimitive>(dest: &mut impl Write, v: T) -> io::Result<()> {
    u32(dest, v.to_u32().expect("wire enum fits in u32"))
}

/// Encodes an `nfstime3` (seconds, nanoseconds).
pub fn nfs_time(dest: &mut impl Write, t: (u32, u32)) -> io::Result<()> {
    u32(dest, t.0)?;
    u32(dest, t.1)
}

/// Encodes an opaque `nfs_fh3` carrying one of our 8-byte `u64` handles.
pub fn file_handle(dest: &mut impl Write, handle: u64) -> io::Result<()> {
    u32(dest, 8)?;
    array::<8>(dest, handle.to_be_bytes())
}

/// Encodes `fattr3` from a backend-supplied [`FileInfo`], field order per RFC 1813 §2.5.1.
pub fn file_attr(dest: &mut impl Write, info: &FileInfo) -> io::Result<()> {
    let ftype: Ftype3 = info.kind.into();
    variant(dest, ftype)?;
    u32(dest, info.mode)?;
    u32(dest, info.nlink.unwrap_or(1))?;
    u32(dest, info.uid)?;
    u32(dest, info.gid)?;
    u64(dest, info.size)?;
    u64(dest, info.used)?;
    u32(dest, info.device.major)?;
    u32(dest, info.device.minor)?;
    u64(dest, info.fsid.unwrap_or(0))?;
    u64(dest, info.fileid)?;
    nfs_time(dest, info.atime)?;
    nfs_time(dest, info.mtime)?;
    nfs_time(dest, info.ctime.unwrap_or(info.mtime))
}

/// Encodes `wcc_attr`: the pre-op subset of `fattr3` used in weak cache consistency data.
pub fn wcc_attr(dest: &mut impl Write, info: &FileInfo) -> io::Result<()> {
    u64(dest, info.size)?;
    nfs_time(dest, info.mtime)?;
    nfs_time(dest, info.ctime.unwrap_or(info.mtime))
}

/// Encodes `wcc_data`: optional pre-op `wcc_attr` followed by optional post-op `fattr3`.
pub fn wcc_data(dest: &mut impl Write, before: Option<&FileInfo>, after: Option<&FileInfo>) -> io::Result<()> {
    option(dest, before, |d, info| wcc_attr(d, info))?;
    option(dest, after, |d, info| file_attr(d, info))
}
