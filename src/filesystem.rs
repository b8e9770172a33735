//! The injected filesystem capability (spec §3/§6): everything the core needs from a concrete
//! storage backend, expressed in terms of paths rather than the core's own opaque handles.

use async_trait::async_trait;

use crate::status::{Ftype3, Nfsstat3};

/// Reasons a `Filesystem` operation can fail, independent of any wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    InvalidArgument,
    NoSpace,
    ReadOnly,
    NameTooLong,
    NotSupported,
    Other(String),
}

impl From<FsError> for Nfsstat3 {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Nfsstat3::NFS3ERR_NOENT,
            FsError::PermissionDenied => Nfsstat3::NFS3ERR_ACCES,
            FsError::AlreadyExists => Nfsstat3::NFS3ERR_EXIST,
            FsError::NotADirectory => Nfsstat3::NFS3ERR_NOTDIR,
            FsError::IsADirectory => Nfsstat3::NFS3ERR_ISDIR,
            FsError::DirectoryNotEmpty => Nfsstat3::NFS3ERR_NOTEMPTY,
            FsError::InvalidArgument => Nfsstat3::NFS3ERR_INVAL,
            FsError::NoSpace => Nfsstat3::NFS3ERR_NOSPC,
            FsError::ReadOnly => Nfsstat3::NFS3ERR_ROFS,
            FsError::NameTooLong => Nfsstat3::NFS3ERR_NAMETOOLONG,
            FsError::NotSupported => Nfsstat3::NFS3ERR_NOTSUPP,
            FsError::Other(_) => Nfsstat3::NFS3ERR_IO,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// File kind as the backend sees it, collapsed to what `ftype3` distinguishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Socket,
    Fifo,
}

impl From<FileKind> for Ftype3 {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Regular => Ftype3::NF3REG,
            FileKind::Directory => Ftype3::NF3DIR,
            FileKind::Symlink => Ftype3::NF3LNK,
            FileKind::BlockDevice => Ftype3::NF3BLK,
            FileKind::CharDevice => Ftype3::NF3CHR,
            FileKind::Socket => Ftype3::NF3SOCK,
            FileKind::Fifo => Ftype3::NF3FIFO,
        }
    }
}

impl From<Ftype3> for FileKind {
    fn from(ftype: Ftype3) -> Self {
        match ftype {
            Ftype3::NF3REG => FileKind::Regular,
            Ftype3::NF3DIR => FileKind::Directory,
            Ftype3::NF3LNK => FileKind::Symlink,
            Ftype3::NF3BLK => FileKind::BlockDevice,
            Ftype3::NF3CHR => FileKind::CharDevice,
            Ftype3::NF3SOCK => FileKind::Socket,
            Ftype3::NF3FIFO => FileKind::Fifo,
        }
    }
}

/// A device major/minor pair, carried by block and character special files.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

/// Everything the core needs to build an `fattr3` for a path, in backend-native units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub device: DeviceId,
    pub fsid: Option<u64>,
    pub fileid: u64,
    pub atime: (u32, u32),
    pub mtime: (u32, u32),
    pub ctime: Option<(u32, u32)>,
}

/// Attribute fields a `SETATTR` call may update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SetTime>,
    pub mtime: Option<SetTime>,
}

/// `set_atime`/`set_mtime` (RFC 1813 §2.6): leave untouched, set to server time, or set to a
/// client-supplied value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetTime {
    SetToServerTime,
    SetToClientTime(u32, u32),
}

/// A single entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub fileid: u64,
    /// Opaque cookie the client may replay to resume iteration after this entry.
    pub cookie: u64,
}

/// Aggregate filesystem statistics backing `FSSTAT`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FsStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub total_files: u64,
    pub free_files: u64,
    pub available_files: u64,
}

/// An open file handle obtained from `Filesystem::open`. Implementations own whatever native
/// descriptor/cursor state a read or write needs.
#[async_trait]
pub trait OpenFile: Send + Sync {
    async fn read_at(&self, offset: u64, len: u32) -> FsResult<Vec<u8>>;
    async fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<u32>;
    /// Flushes any buffered writes to stable storage (backs `COMMIT`).
    async fn commit(&self, offset: u64, len: u32) -> FsResult<()>;
    async fn close(&self) -> FsResult<()>;
}

/// The storage backend a server instance exports. Every method is keyed by an absolute,
/// `/`-separated path rooted at the export; the core never sees the backend's native path type.
///
/// Implementations that cannot support symlinks, device nodes, or hard links should return
/// `FsError::NotSupported` from the relevant method and report it from `capabilities()` so the
/// core can answer `PATHCONF`/dispatch consistently.
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn stat(&self, path: &str) -> FsResult<FileInfo>;
    async fn setattr(&self, path: &str, attr: SetAttr) -> FsResult<FileInfo>;
    async fn lookup(&self, dir: &str, name: &str) -> FsResult<FileInfo>;
    async fn open(&self, path: &str) -> FsResult<Box<dyn OpenFile>>;
    async fn readdir(&self, dir: &str, cookie: u64, max_entries: u32) -> FsResult<Vec<DirEntry>>;
    async fn create(&self, dir: &str, name: &str, mode: u32, exclusive: bool) -> FsResult<FileInfo>;
    async fn mkdir(&self, dir: &str, name: &str, mode: u32) -> FsResult<FileInfo>;
    async fn remove(&self, dir: &str, name: &str) -> FsResult<()>;
    async fn rmdir(&self, dir: &str, name: &str) -> FsResult<()>;
    async fn rename(&self, from_dir: &str, from_name: &str, to_dir: &str, to_name: &str) -> FsResult<()>;
    async fn truncate(&self, path: &str, len: u64) -> FsResult<()>;

    async fn symlink(&self, dir: &str, name: &str, target: &str) -> FsResult<FileInfo> {
        let _ = (dir, name, target);
        Err(FsError::NotSupported)
    }

    async fn readlink(&self, path: &str) -> FsResult<String> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    async fn mknod(&self, dir: &str, name: &str, kind: FileKind, mode: u32, device: DeviceId) -> FsResult<FileInfo> {
        let _ = (dir, name, kind, mode, device);
        Err(FsError::NotSupported)
    }

    async fn link(&self, path: &str, link_dir: &str, link_name: &str) -> FsResult<FileInfo> {
        let _ = (path, link_dir, link_name);
        Err(FsError::NotSupported)
    }

    async fn statfs(&self, path: &str) -> FsResult<FsStats> {
        let _ = path;
        Ok(FsStats::default())
    }

    fn supports_symlinks(&self) -> bool {
        false
    }

    fn supports_hard_links(&self) -> bool {
        false
    }

    fn read_only(&self) -> bool {
        false
    }
}
