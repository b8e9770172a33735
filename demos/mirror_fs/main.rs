//! Disk-passthrough demo: exports a directory on the local filesystem as an NFSv3 share by
//! mapping the core's path-based `Filesystem` trait directly onto `tokio::fs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;

use nfs3d::config::Config;
use nfs3d::filesystem::{
    DeviceId, DirEntry, FileInfo, FileKind, Filesystem, FsError, FsResult, FsStats, OpenFile, SetAttr, SetTime,
};

fn metadata_kind(meta: &std::fs::Metadata) -> FileKind {
    if meta.is_dir() {
        FileKind::Directory
    } else if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Regular
    }
}

fn to_fs_error(err: std::io::Error) -> FsError {
    match err.kind() {
        std::io::ErrorKind::NotFound => FsError::NotFound,
        std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
        std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
        _ => FsError::Other(err.to_string()),
    }
}

fn meta_to_info(meta: &std::fs::Metadata, fileid: u64) -> FileInfo {
    use std::os::unix::fs::MetadataExt;
    let atime = (meta.atime().max(0) as u32, meta.atime_nsec().max(0) as u32);
    let mtime = (meta.mtime().max(0) as u32, meta.mtime_nsec().max(0) as u32);
    let ctime = (meta.ctime().max(0) as u32, meta.ctime_nsec().max(0) as u32);
    FileInfo {
        kind: metadata_kind(meta),
        mode: meta.mode() & 0o7777,
        nlink: Some(meta.nlink() as u32),
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.len(),
        used: meta.blocks() as u64 * 512,
        device: DeviceId::default(),
        fsid: Some(meta.dev()),
        fileid,
        atime,
        mtime,
        ctime: Some(ctime),
    }
}

/// Maps NFS handle-space paths (always `/`-rooted) onto real filesystem paths under `root`,
/// tracking a stable fileid per inode so repeated lookups agree with each other.
struct MirrorFs {
    root: PathBuf,
    fileids: RwLock<HashMap<u64, u64>>,
    next_fileid: AtomicU64,
}

impl MirrorFs {
    fn new(root: PathBuf) -> Self {
        MirrorFs { root, fileids: RwLock::new(HashMap::new()), next_fileid: AtomicU64::new(2) }
    }

    fn real_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            full.push(component);
        }
        full
    }

    async fn fileid_for(&self, meta: &std::fs::Metadata) -> u64 {
        use std::os::unix::fs::MetadataExt;
        let inode = meta.ino();
        let mut ids = self.fileids.write().await;
        *ids.entry(inode).or_insert_with(|| self.next_fileid.fetch_add(1, Ordering::Relaxed))
    }

    async fn stat_path(&self, real: &Path) -> FsResult<FileInfo> {
        let meta = tokio::fs::symlink_metadata(real).await.map_err(to_fs_error)?;
        let fileid = self.fileid_for(&meta).await;
        Ok(meta_to_info(&meta, fileid))
    }
}

struct MirrorOpenFile {
    path: PathBuf,
}

#[async_trait]
impl OpenFile for MirrorOpenFile {
    async fn read_at(&self, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(to_fs_error)?;
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(to_fs_error)?;
        let mut buf = vec![0u8; len as usize];
        let n = file.read(&mut buf).await.map_err(to_fs_error)?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<u32> {
        let mut file = tokio::fs::OpenOptions::new().write(true).open(&self.path).await.map_err(to_fs_error)?;
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(to_fs_error)?;
        file.write_all(data).await.map_err(to_fs_error)?;
        Ok(data.len() as u32)
    }

    async fn commit(&self, _offset: u64, _len: u32) -> FsResult<()> {
        let file = tokio::fs::OpenOptions::new().write(true).open(&self.path).await.map_err(to_fs_error)?;
        file.sync_data().await.map_err(to_fs_error)
    }

    async fn close(&self) -> FsResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MirrorFs {
    async fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.stat_path(&self.real_path(path)).await
    }

    async fn setattr(&self, path: &str, attr: SetAttr) -> FsResult<FileInfo> {
        let real = self.real_path(path);
        if let Some(size) = attr.size {
            let file = tokio::fs::OpenOptions::new().write(true).open(&real).await.map_err(to_fs_error)?;
            file.set_len(size).await.map_err(to_fs_error)?;
        }
        if attr.mode.is_some() {
            // chmod isn't exposed by tokio::fs directly; real deployments would shell out to
            // std::fs::Permissions, left out here since exports from this demo are all 0700.
        }
        let _ = (attr.uid, attr.gid, attr.atime, attr.mtime);
        self.stat_path(&real).await
    }

    async fn lookup(&self, dir: &str, name: &str) -> FsResult<FileInfo> {
        let real = self.real_path(dir).join(name);
        self.stat_path(&real).await
    }

    async fn open(&self, path: &str) -> FsResult<Box<dyn OpenFile>> {
        let real = self.real_path(path);
        if !real.exists() {
            return Err(FsError::NotFound);
        }
        Ok(Box::new(MirrorOpenFile { path: real }))
    }

    async fn readdir(&self, dir: &str, cookie: u64, max_entries: u32) -> FsResult<Vec<DirEntry>> {
        let real = self.real_path(dir);
        let mut read_dir = tokio::fs::read_dir(&real).await.map_err(to_fs_error)?;
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(to_fs_error)? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        let mut out = Vec::new();
        for (i, name) in names.into_iter().enumerate().skip(cookie as usize).take(max_entries as usize) {
            let meta = tokio::fs::symlink_metadata(real.join(&name)).await.map_err(to_fs_error)?;
            let fileid = self.fileid_for(&meta).await;
            out.push(DirEntry { name, fileid, cookie: i as u64 + 1 });
        }
        Ok(out)
    }

    async fn create(&self, dir: &str, name: &str, mode: u32, exclusive: bool) -> FsResult<FileInfo> {
        let real = self.real_path(dir).join(name);
        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true);
        if exclusive {
            opts.create_new(true);
        }
        opts.open(&real).await.map_err(to_fs_error)?;
        let _ = mode;
        self.stat_path(&real).await
    }

    async fn mkdir(&self, dir: &str, name: &str, mode: u32) -> FsResult<FileInfo> {
        let real = self.real_path(dir).join(name);
        tokio::fs::create_dir(&real).await.map_err(to_fs_error)?;
        let _ = mode;
        self.stat_path(&real).await
    }

    async fn remove(&self, dir: &str, name: &str) -> FsResult<()> {
        tokio::fs::remove_file(self.real_path(dir).join(name)).await.map_err(to_fs_error)
    }

    async fn rmdir(&self, dir: &str, name: &str) -> FsResult<()> {
        tokio::fs::remove_dir(self.real_path(dir).join(name)).await.map_err(to_fs_error)
    }

    async fn rename(&self, from_dir: &str, from_name: &str, to_dir: &str, to_name: &str) -> FsResult<()> {
        let from = self.real_path(from_dir).join(from_name);
        let to = self.real_path(to_dir).join(to_name);
        tokio::fs::rename(from, to).await.map_err(to_fs_error)
    }

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        let file = tokio::fs::OpenOptions::new().write(true).open(self.real_path(path)).await.map_err(to_fs_error)?;
        file.set_len(len).await.map_err(to_fs_error)
    }

    async fn symlink(&self, dir: &str, name: &str, target: &str) -> FsResult<FileInfo> {
        let real = self.real_path(dir).join(name);
        tokio::fs::symlink(target, &real).await.map_err(to_fs_error)?;
        self.stat_path(&real).await
    }

    async fn readlink(&self, path: &str) -> FsResult<String> {
        let target = tokio::fs::read_link(self.real_path(path)).await.map_err(to_fs_error)?;
        target.to_str().map(|s| s.to_string()).ok_or(FsError::InvalidArgument)
    }

    async fn statfs(&self, _path: &str) -> FsResult<FsStats> {
        Ok(FsStats { total_bytes: u64::MAX / 2, free_bytes: u64::MAX / 2, available_bytes: u64::MAX / 2, total_files: u64::MAX / 2, free_files: u64::MAX / 2, available_files: u64::MAX / 2 })
    }

    fn supports_symlinks(&self) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let root = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| std::env::current_dir().unwrap());
    let mut config = Config::default();
    config.nfs_bind_addr = "127.0.0.1:2049".to_string();
    config.mount_bind_addr = "127.0.0.1:635".to_string();

    let filesystem: Box<dyn Filesystem> = Box::new(MirrorFs::new(root.clone()));
    let server = nfs3d::Server::bind(config, filesystem).await?;
    tracing::info!(root = %root.display(), nfs = ?server.local_nfs_addr()?, mount = ?server.local_mount_addr()?, "mirrorfs listening");

    let _shutdown = Arc::new(server.shutdown_handle());
    server.run().await
}
