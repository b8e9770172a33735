//! A tiny in-memory `Filesystem` used by the integration tests and the `mirrorfs` demo's
//! smaller sibling: a tree of nodes keyed by canonical path, with no on-disk state at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use nfs3d::filesystem::{
    DeviceId, DirEntry, FileInfo, FileKind, Filesystem, FsError, FsResult, FsStats, OpenFile, SetAttr, SetTime,
};

#[derive(Debug, Clone)]
enum Content {
    Directory,
    Regular(Vec<u8>),
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Entry {
    info: FileInfo,
    content: Content,
}

fn now() -> (u32, u32) {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs() as u32, d.subsec_nanos())
}

fn default_info(kind: FileKind, fileid: u64, mode: u32) -> FileInfo {
    let stamp = now();
    FileInfo {
        kind,
        mode,
        nlink: Some(1),
        uid: 0,
        gid: 0,
        size: 0,
        used: 0,
        device: DeviceId::default(),
        fsid: Some(1),
        fileid,
        atime: stamp,
        mtime: stamp,
        ctime: Some(stamp),
    }
}

/// An in-memory tree of files and directories, rooted at `/`.
pub struct MemFs {
    state: Arc<RwLock<HashMap<String, Entry>>>,
    next_fileid: AtomicU64,
}

impl Default for MemFs {
    fn default() -> Self {
        let mut state = HashMap::new();
        state.insert("/".to_string(), Entry { info: default_info(FileKind::Directory, 1, 0o755), content: Content::Directory });
        MemFs { state: Arc::new(RwLock::new(state)), next_fileid: AtomicU64::new(2) }
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn join(dir: &str, name: &str) -> String {
        if dir == "/" {
            format!("/{name}")
        } else {
            format!("{dir}/{name}")
        }
    }

    fn children_prefix(dir: &str) -> String {
        if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        }
    }
}

struct MemOpenFile {
    state: Arc<RwLock<HashMap<String, Entry>>>,
    path: String,
}

#[async_trait]
impl OpenFile for MemOpenFile {
    async fn read_at(&self, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        let state = self.state.read().await;
        let entry = state.get(&self.path).ok_or(FsError::NotFound)?;
        let Content::Regular(data) = &entry.content else { return Err(FsError::IsADirectory) };
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<u32> {
        let mut state = self.state.write().await;
        let entry = state.get_mut(&self.path).ok_or(FsError::NotFound)?;
        let Content::Regular(buf) = &mut entry.content else { return Err(FsError::IsADirectory) };
        let start = offset as usize;
        if buf.len() < start + data.len() {
            buf.resize(start + data.len(), 0);
        }
        buf[start..start + data.len()].copy_from_slice(data);
        entry.info.size = buf.len() as u64;
        entry.info.used = buf.len() as u64;
        entry.info.mtime = now();
        Ok(data.len() as u32)
    }

    async fn commit(&self, _offset: u64, _len: u32) -> FsResult<()> {
        Ok(())
    }

    async fn close(&self) -> FsResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MemFs {
    async fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.state.read().await.get(path).map(|e| e.info.clone()).ok_or(FsError::NotFound)
    }

    async fn setattr(&self, path: &str, attr: SetAttr) -> FsResult<FileInfo> {
        let mut state = self.state.write().await;
        let entry = state.get_mut(path).ok_or(FsError::NotFound)?;
        if let Some(mode) = attr.mode {
            entry.info.mode = mode;
        }
        if let Some(uid) = attr.uid {
            entry.info.uid = uid;
        }
        if let Some(gid) = attr.gid {
            entry.info.gid = gid;
        }
        if let Some(size) = attr.size {
            if let Content::Regular(buf) = &mut entry.content {
                buf.resize(size as usize, 0);
            }
            entry.info.size = size;
            entry.info.used = size;
        }
        match attr.atime {
            Some(SetTime::SetToServerTime) => entry.info.atime = now(),
            Some(SetTime::SetToClientTime(s, n)) => entry.info.atime = (s, n),
            None => {}
        }
        match attr.mtime {
            Some(SetTime::SetToServerTime) => entry.info.mtime = now(),
            Some(SetTime::SetToClientTime(s, n)) => entry.info.mtime = (s, n),
            None => {}
        }
        Ok(entry.info.clone())
    }

    async fn lookup(&self, dir: &str, name: &str) -> FsResult<FileInfo> {
        let path = Self::join(dir, name);
        self.state.read().await.get(&path).map(|e| e.info.clone()).ok_or(FsError::NotFound)
    }

    async fn open(&self, path: &str) -> FsResult<Box<dyn OpenFile>> {
        let state = self.state.read().await;
        let entry = state.get(path).ok_or(FsError::NotFound)?;
        if matches!(entry.content, Content::Directory) {
            return Err(FsError::IsADirectory);
        }
        drop(state);
        Ok(Box::new(MemOpenFile { state: self.state.clone(), path: path.to_string() }))
    }

    async fn readdir(&self, dir: &str, cookie: u64, max_entries: u32) -> FsResult<Vec<DirEntry>> {
        let state = self.state.read().await;
        if !matches!(state.get(dir).map(|e| &e.content), Some(Content::Directory)) {
            return Err(FsError::NotADirectory);
        }
        let prefix = Self::children_prefix(dir);
        let mut names: Vec<(String, u64)> = state
            .iter()
            .filter_map(|(path, entry)| {
                let rest = path.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                Some((rest.to_string(), entry.info.fileid))
            })
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .enumerate()
            .skip(cookie as usize)
            .take(max_entries as usize)
            .map(|(i, (name, fileid))| DirEntry { name, fileid, cookie: i as u64 + 1 })
            .collect())
    }

    async fn create(&self, dir: &str, name: &str, mode: u32, exclusive: bool) -> FsResult<FileInfo> {
        let path = Self::join(dir, name);
        let mut state = self.state.write().await;
        if !matches!(state.get(dir).map(|e| &e.content), Some(Content::Directory)) {
            return Err(FsError::NotADirectory);
        }
        if state.contains_key(&path) {
            if exclusive {
                return Err(FsError::AlreadyExists);
            }
            return Ok(state.get(&path).unwrap().info.clone());
        }
        let fileid = self.next_fileid.fetch_add(1, Ordering::Relaxed);
        let info = default_info(FileKind::Regular, fileid, mode);
        state.insert(path, Entry { info: info.clone(), content: Content::Regular(Vec::new()) });
        Ok(info)
    }

    async fn mkdir(&self, dir: &str, name: &str, mode: u32) -> FsResult<FileInfo> {
        let path = Self::join(dir, name);
        let mut state = self.state.write().await;
        if state.contains_key(&path) {
            return Err(FsError::AlreadyExists);
        }
        let fileid = self.next_fileid.fetch_add(1, Ordering::Relaxed);
        let info = default_info(FileKind::Directory, fileid, mode);
        state.insert(path, Entry { info: info.clone(), content: Content::Directory });
        Ok(info)
    }

    async fn remove(&self, dir: &str, name: &str) -> FsResult<()> {
        let path = Self::join(dir, name);
        let mut state = self.state.write().await;
        match state.get(&path) {
            Some(entry) if matches!(entry.content, Content::Directory) => Err(FsError::IsADirectory),
            Some(_) => {
                state.remove(&path);
                Ok(())
            }
            None => Err(FsError::NotFound),
        }
    }

    async fn rmdir(&self, dir: &str, name: &str) -> FsResult<()> {
        let path = Self::join(dir, name);
        let mut state = self.state.write().await;
        match state.get(&path) {
            Some(entry) if !matches!(entry.content, Content::Directory) => Err(FsError::NotADirectory),
            Some(_) => {
                let prefix = Self::children_prefix(&path);
                if state.keys().any(|p| p.strip_prefix(&prefix).is_some_and(|r| !r.is_empty() && !r.contains('/'))) {
                    return Err(FsError::DirectoryNotEmpty);
                }
                state.remove(&path);
                Ok(())
            }
            None => Err(FsError::NotFound),
        }
    }

    async fn rename(&self, from_dir: &str, from_name: &str, to_dir: &str, to_name: &str) -> FsResult<()> {
        let from_path = Self::join(from_dir, from_name);
        let to_path = Self::join(to_dir, to_name);
        let mut state = self.state.write().await;
        let entry = state.remove(&from_path).ok_or(FsError::NotFound)?;
        state.insert(to_path, entry);
        Ok(())
    }

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        let mut state = self.state.write().await;
        let entry = state.get_mut(path).ok_or(FsError::NotFound)?;
        let Content::Regular(buf) = &mut entry.content else { return Err(FsError::IsADirectory) };
        buf.resize(len as usize, 0);
        entry.info.size = len;
        entry.info.used = len;
        Ok(())
    }

    async fn symlink(&self, dir: &str, name: &str, target: &str) -> FsResult<FileInfo> {
        let path = Self::join(dir, name);
        let mut state = self.state.write().await;
        if state.contains_key(&path) {
            return Err(FsError::AlreadyExists);
        }
        let fileid = self.next_fileid.fetch_add(1, Ordering::Relaxed);
        let mut info = default_info(FileKind::Symlink, fileid, 0o777);
        info.size = target.len() as u64;
        state.insert(path, Entry { info: info.clone(), content: Content::Symlink(target.to_string()) });
        Ok(info)
    }

    async fn readlink(&self, path: &str) -> FsResult<String> {
        let state = self.state.read().await;
        match state.get(path) {
            Some(Entry { content: Content::Symlink(target), .. }) => Ok(target.clone()),
            Some(_) => Err(FsError::InvalidArgument),
            None => Err(FsError::NotFound),
        }
    }

    async fn statfs(&self, _path: &str) -> FsResult<FsStats> {
        let state = self.state.read().await;
        let used: u64 = state.values().map(|e| e.info.used).sum();
        Ok(FsStats {
            total_bytes: 1 << 40,
            free_bytes: (1 << 40) - used,
            available_bytes: (1 << 40) - used,
            total_files: 1 << 20,
            free_files: (1 << 20) - state.len() as u64,
            available_files: (1 << 20) - state.len() as u64,
        })
    }

    fn supports_symlinks(&self) -> bool {
        true
    }

    fn supports_hard_links(&self) -> bool {
        false
    }

    fn read_only(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_lookup_and_read_round_trip() {
        let fs = MemFs::new();
        fs.create("/", "hello.txt", 0o644, false).await.unwrap();
        let file = fs.open("/hello.txt").await.unwrap();
        file.write_at(0, b"hi there").await.unwrap();
        let data = file.read_at(0, 8).await.unwrap();
        assert_eq!(data, b"hi there");
        let info = fs.lookup("/", "hello.txt").await.unwrap();
        assert_eq!(info.size, 8);
    }

    #[tokio::test]
    async fn mkdir_then_readdir_lists_children() {
        let fs = MemFs::new();
        fs.mkdir("/", "sub", 0o755).await.unwrap();
        fs.create("/sub", "a", 0o644, false).await.unwrap();
        fs.create("/sub", "b", 0o644, false).await.unwrap();
        let entries = fs.readdir("/sub", 0, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn rmdir_rejects_nonempty_directory() {
        let fs = MemFs::new();
        fs.mkdir("/", "sub", 0o755).await.unwrap();
        fs.create("/sub", "a", 0o644, false).await.unwrap();
        assert_eq!(fs.rmdir("/", "sub").await, Err(FsError::DirectoryNotEmpty));
    }

    #[tokio::test]
    async fn rename_moves_entry() {
        let fs = MemFs::new();
        fs.create("/", "a", 0o644, false).await.unwrap();
        fs.rename("/", "a", "/", "b").await.unwrap();
        assert_eq!(fs.lookup("/", "a").await, Err(FsError::NotFound));
        assert!(fs.lookup("/", "b").await.is_ok());
    }
}
