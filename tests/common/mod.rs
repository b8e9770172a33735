//! Shared test scaffolding: a raw RPC client over the wire protocol, talking to a real
//! `nfs3d::Server` bound to an ephemeral port, backed by the in-memory demo filesystem.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use nfs3d::config::Config;
use nfs3d::filesystem::{DirEntry, FileInfo, FsResult, OpenFile, SetAttr};
use nfs3d::status::{AuthFlavor, NFS_PROGRAM, NFS_V3};
use nfs3d::xdr::encode;
use nfs3d::{Filesystem, Server};

#[path = "../../demos/memfs.rs"]
pub mod memfs;

pub struct TestServer {
    pub server_task: tokio::task::JoinHandle<()>,
    pub nfs_addr: std::net::SocketAddr,
    pub mount_addr: std::net::SocketAddr,
    pub shutdown: tokio::sync::watch::Sender<bool>,
}

pub async fn start_server(config_fn: impl FnOnce(&mut Config)) -> TestServer {
    start_server_with(memfs::MemFs::new(), config_fn).await
}

pub async fn start_server_with(filesystem: impl Filesystem + 'static, config_fn: impl FnOnce(&mut Config)) -> TestServer {
    let mut config = Config::default();
    config.nfs_bind_addr = "127.0.0.1:0".to_string();
    config.mount_bind_addr = "127.0.0.1:0".to_string();
    config_fn(&mut config);

    let filesystem: Box<dyn Filesystem> = Box::new(filesystem);
    let server = Server::bind(config, filesystem).await.expect("bind");
    let nfs_addr = server.local_nfs_addr().unwrap();
    let mount_addr = server.local_mount_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(async move {
        let _ = server.run().await;
    });
    TestServer { server_task, nfs_addr, mount_addr, shutdown }
}

impl TestServer {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), self.server_task).await;
    }
}

/// A minimal client-side RPC encoder/decoder: builds `call_body` envelopes with `AUTH_NONE` and
/// strips the reply envelope back down to the procedure result bytes.
pub struct RpcClient {
    stream: TcpStream,
    xid: u32,
}

impl RpcClient {
    pub async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        stream.set_nodelay(true).ok();
        RpcClient { stream, xid: 1 }
    }

    pub async fn call(&mut self, program: u32, version: u32, procedure: u32, args: &[u8]) -> Vec<u8> {
        let xid = self.xid;
        self.xid += 1;

        let mut body = Vec::new();
        encode::u32(&mut body, xid).unwrap();
        encode::u32(&mut body, 0).unwrap(); // MSG_CALL
        encode::u32(&mut body, 2).unwrap(); // rpc version
        encode::u32(&mut body, program).unwrap();
        encode::u32(&mut body, version).unwrap();
        encode::u32(&mut body, procedure).unwrap();
        encode::variant(&mut body, AuthFlavor::AUTH_NONE).unwrap();
        encode::opaque(&mut body, &[]).unwrap();
        encode::variant(&mut body, AuthFlavor::AUTH_NONE).unwrap();
        encode::opaque(&mut body, &[]).unwrap();
        body.extend_from_slice(args);

        nfs3d::framer::write_record(&mut self.stream, &body, nfs3d::framer::DEFAULT_WRITE_FRAGMENT_LEN).await.expect("write");
        let reply = nfs3d::framer::read_record(&mut self.stream).await.expect("read").expect("eof");

        let mut cursor = std::io::Cursor::new(&reply[..]);
        let reply_xid = nfs3d::xdr::decode::u32(&mut cursor).unwrap();
        assert_eq!(reply_xid, xid);
        let msg_type = nfs3d::xdr::decode::u32(&mut cursor).unwrap();
        assert_eq!(msg_type, 1, "expected MSG_REPLY");
        let reply_stat = nfs3d::xdr::decode::u32(&mut cursor).unwrap();
        assert_eq!(reply_stat, 0, "expected MSG_ACCEPTED");
        let _verf_flavor = nfs3d::xdr::decode::u32(&mut cursor).unwrap();
        let _verf_body = nfs3d::xdr::decode::opaque(&mut cursor).unwrap();
        let accept_stat = nfs3d::xdr::decode::u32(&mut cursor).unwrap();
        assert_eq!(accept_stat, 0, "expected AcceptStat::SUCCESS");

        let pos = cursor.position() as usize;
        reply[pos..].to_vec()
    }

    pub async fn nfs_call(&mut self, procedure: u32, args: &[u8]) -> Vec<u8> {
        self.call(NFS_PROGRAM, NFS_V3, procedure, args).await
    }

    /// Writes a pre-built call record and returns the raw reply bytes, envelope included. For
    /// tests that need to inspect `accept_stat`/`reply_stat` directly rather than asserting
    /// success.
    pub async fn call_raw(&mut self, body: &[u8]) -> Vec<u8> {
        nfs3d::framer::write_record(&mut self.stream, body, nfs3d::framer::DEFAULT_WRITE_FRAGMENT_LEN).await.expect("write");
        nfs3d::framer::read_record(&mut self.stream).await.expect("read").expect("eof")
    }
}

/// Wraps a `Filesystem` and counts `open()` calls, so a test can assert that a read-ahead hit
/// served a request without the core reopening the backing file.
pub struct CountingFs<F> {
    inner: F,
    pub opens: Arc<AtomicUsize>,
}

impl<F: Filesystem> CountingFs<F> {
    pub fn new(inner: F) -> (Self, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        (CountingFs { inner, opens: opens.clone() }, opens)
    }
}

#[async_trait]
impl<F: Filesystem> Filesystem for CountingFs<F> {
    async fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.inner.stat(path).await
    }

    async fn setattr(&self, path: &str, attr: SetAttr) -> FsResult<FileInfo> {
        self.inner.setattr(path, attr).await
    }

    async fn lookup(&self, dir: &str, name: &str) -> FsResult<FileInfo> {
        self.inner.lookup(dir, name).await
    }

    async fn open(&self, path: &str) -> FsResult<Box<dyn OpenFile>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(path).await
    }

    async fn readdir(&self, dir: &str, cookie: u64, max_entries: u32) -> FsResult<Vec<DirEntry>> {
        self.inner.readdir(dir, cookie, max_entries).await
    }

    async fn create(&self, dir: &str, name: &str, mode: u32, exclusive: bool) -> FsResult<FileInfo> {
        self.inner.create(dir, name, mode, exclusive).await
    }

    async fn mkdir(&self, dir: &str, name: &str, mode: u32) -> FsResult<FileInfo> {
        self.inner.mkdir(dir, name, mode).await
    }

    async fn remove(&self, dir: &str, name: &str) -> FsResult<()> {
        self.inner.remove(dir, name).await
    }

    async fn rmdir(&self, dir: &str, name: &str) -> FsResult<()> {
        self.inner.rmdir(dir, name).await
    }

    async fn rename(&self, from_dir: &str, from_name: &str, to_dir: &str, to_name: &str) -> FsResult<()> {
        self.inner.rename(from_dir, from_name, to_dir, to_name).await
    }

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        self.inner.truncate(path, len).await
    }

    fn supports_symlinks(&self) -> bool {
        self.inner.supports_symlinks()
    }

    fn supports_hard_links(&self) -> bool {
        self.inner.supports_hard_links()
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }
}
