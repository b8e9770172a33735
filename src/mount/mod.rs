//! `MOUNT` protocol implementation for NFS version 3, RFC 1813 §5.0.
//! <https://datatracker.ietf.org/doc/html/rfc1813#section-5.0>.
//!
//! The server keeps no mount table: a client may `MNT` any export path it can resolve and is
//! never required to `UMNT` before reconnecting. `DUMP` therefore always answers with an empty
//! list rather than the historical bookkeeping RFC 1813 describes as optional.

pub mod dump;
pub mod mnt;
pub mod null;
pub mod umnt;

use crate::filesystem::Filesystem;
use crate::handle_registry::HandleRegistry;

/// Maximum bytes in a path name (RFC 1813 `MNTPATHLEN`).
pub const MOUNT_DIRPATH_LEN: usize = 1024;
/// Maximum bytes in a host name (RFC 1813 `MNTNAMLEN`).
pub const MOUNT_HOST_NAME_LEN: usize = 255;
/// Bytes in a v3 file handle as this server issues them.
pub const HANDLE_SIZE: usize = 8;

/// `mountstat3` values (RFC 1813 §5.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
#[repr(u32)]
pub enum MountStat3 {
    MNT3_OK = 0,
    MNT3ERR_PERM = 1,
    MNT3ERR_NOENT = 2,
    MNT3ERR_IO = 5,
    MNT3ERR_ACCES = 13,
    MNT3ERR_NOTDIR = 20,
    MNT3ERR_INVAL = 22,
    MNT3ERR_NAMETOOLONG = 63,
    MNT3ERR_NOTSUPP = 10004,
    MNT3ERR_SERVERFAULT = 10006,
}

impl From<crate::filesystem::FsError> for MountStat3 {
    fn from(err: crate::filesystem::FsError) -> Self {
        use crate::filesystem::FsError;
        match err {
            FsError::NotFound => MountStat3::MNT3ERR_NOENT,
            FsError::PermissionDenied => MountStat3::MNT3ERR_ACCES,
            FsError::NotADirectory => MountStat3::MNT3ERR_NOTDIR,
            FsError::NameTooLong => MountStat3::MNT3ERR_NAMETOOLONG,
            FsError::NotSupported => MountStat3::MNT3ERR_NOTSUPP,
            FsError::InvalidArgument => MountStat3::MNT3ERR_INVAL,
            _ => MountStat3::MNT3ERR_SERVERFAULT,
        }
    }
}

/// Everything a MOUNT handler needs, borrowed for the duration of one call.
pub struct MountContext<'a> {
    pub handles: &'a HandleRegistry,
    pub filesystem: &'a dyn Filesystem,
}
