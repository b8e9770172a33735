//! End-to-end tests driving a real `nfs3d::Server` over TCP with the in-memory demo filesystem.

mod common;

use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::time::Duration;

use nfs3d::status::{MOUNT_PROGRAM, MOUNT_V3, NFS_PROGRAM, NFS_V3};
use nfs3d::xdr::{decode, encode};

use common::{start_server, start_server_with, CountingFs, RpcClient};

async fn mount_root(client: &mut RpcClient) -> u64 {
    let mut args = Vec::new();
    encode::string(&mut args, "/").unwrap();
    let reply = client.call(MOUNT_PROGRAM, MOUNT_V3, 1, &args).await;
    let mut cursor = Cursor::new(&reply[..]);
    let status = decode::u32(&mut cursor).unwrap();
    assert_eq!(status, 0, "MNT should succeed");
    decode::file_handle(&mut cursor).unwrap()
}

fn encode_handle(handle: u64) -> Vec<u8> {
    let mut out = Vec::new();
    encode::file_handle(&mut out, handle).unwrap();
    out
}

#[tokio::test]
async fn mount_null_and_getattr_round_trip() {
    let srv = start_server(|_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;

    // MOUNT NULL replies with an empty body.
    let reply = mount_client.call(MOUNT_PROGRAM, MOUNT_V3, 0, &[]).await;
    assert!(reply.is_empty());

    let root = mount_root(&mut mount_client).await;
    assert_ne!(root, 0);

    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;
    let reply = nfs_client.nfs_call(1, &encode_handle(root)).await;
    let mut cursor = Cursor::new(&reply[..]);
    let status = decode::u32(&mut cursor).unwrap();
    assert_eq!(status, 0, "GETATTR on the mounted root should succeed");

    srv.stop().await;
}

#[tokio::test]
async fn dump_is_always_empty_and_umnt_is_a_no_op() {
    let srv = start_server(|_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;
    let _root = mount_root(&mut mount_client).await;

    let reply = mount_client.call(MOUNT_PROGRAM, MOUNT_V3, 2, &[]).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::bool(&mut cursor).unwrap(), false, "DUMP should report no active mounts");

    let mut args = Vec::new();
    encode::string(&mut args, "/").unwrap();
    let reply = mount_client.call(MOUNT_PROGRAM, MOUNT_V3, 3, &args).await;
    assert!(reply.is_empty(), "UMNT carries no result body");

    srv.stop().await;
}

#[tokio::test]
async fn create_write_read_round_trip() {
    let srv = start_server(|_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;
    let root = mount_root(&mut mount_client).await;
    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;

    // CREATE(root, "greeting.txt", UNCHECKED, default sattr3)
    let mut args = Vec::new();
    encode::file_handle(&mut args, root).unwrap();
    encode::string(&mut args, "greeting.txt").unwrap();
    encode::u32(&mut args, 0).unwrap(); // createmode3::UNCHECKED
    encode::bool(&mut args, false).unwrap(); // mode not set
    encode::bool(&mut args, false).unwrap(); // uid not set
    encode::bool(&mut args, false).unwrap(); // gid not set
    encode::bool(&mut args, false).unwrap(); // size not set
    encode::u32(&mut args, 0).unwrap(); // set_atime::DONT_CHANGE
    encode::u32(&mut args, 0).unwrap(); // set_mtime::DONT_CHANGE
    let reply = nfs_client.nfs_call(8, &args).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0, "CREATE should succeed");
    assert!(decode::bool(&mut cursor).unwrap(), "CREATE should return a handle");
    let file_handle = decode::file_handle(&mut cursor).unwrap();

    // WRITE(file_handle, offset=0, "hello world", UNSTABLE)
    let payload = b"hello world";
    let mut args = Vec::new();
    encode::file_handle(&mut args, file_handle).unwrap();
    encode::u64(&mut args, 0).unwrap();
    encode::u32(&mut args, payload.len() as u32).unwrap();
    encode::u32(&mut args, 0).unwrap(); // stable_how::UNSTABLE
    encode::opaque(&mut args, payload).unwrap();
    let reply = nfs_client.nfs_call(7, &args).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0, "WRITE should succeed");

    // READ(file_handle, offset=0, count=32)
    let mut args = Vec::new();
    encode::file_handle(&mut args, file_handle).unwrap();
    encode::u64(&mut args, 0).unwrap();
    encode::u32(&mut args, 32).unwrap();
    let reply = nfs_client.nfs_call(6, &args).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0, "READ should succeed");

    srv.stop().await;
}

#[tokio::test]
async fn readdir_lists_created_entries() {
    let srv = start_server(|_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;
    let root = mount_root(&mut mount_client).await;
    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;

    for name in ["a", "b", "c"] {
        let mut args = Vec::new();
        encode::file_handle(&mut args, root).unwrap();
        encode::string(&mut args, name).unwrap();
        encode::u32(&mut args, 0).unwrap();
        encode::bool(&mut args, false).unwrap();
        encode::bool(&mut args, false).unwrap();
        encode::bool(&mut args, false).unwrap();
        encode::bool(&mut args, false).unwrap();
        encode::u32(&mut args, 0).unwrap();
        encode::u32(&mut args, 0).unwrap();
        let reply = nfs_client.nfs_call(8, &args).await;
        assert_eq!(decode::u32(&mut Cursor::new(&reply[..])).unwrap(), 0);
    }

    // READDIR(root, cookie=0, cookieverf=zero, count=4096)
    let mut args = Vec::new();
    encode::file_handle(&mut args, root).unwrap();
    encode::u64(&mut args, 0).unwrap();
    encode::array(&mut args, [0u8; 8]).unwrap();
    encode::u32(&mut args, 4096).unwrap();
    let reply = nfs_client.nfs_call(16, &args).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0, "READDIR should succeed");
    let _dir_attr = decode::option(&mut cursor, |c| {
        // fattr3, field order per encode::file_attr: ftype/mode/nlink/uid/gid, size/used,
        // device.major/minor, fsid/fileid, atime/mtime/ctime.
        for _ in 0..5 {
            decode::u32(c)?;
        }
        decode::u64(c)?;
        decode::u64(c)?;
        decode::u32(c)?;
        decode::u32(c)?;
        decode::u64(c)?;
        decode::u64(c)?;
        decode::nfs_time(c)?;
        decode::nfs_time(c)?;
        decode::nfs_time(c)?;
        Ok(())
    })
    .unwrap();
    let _cookieverf: [u8; 8] = decode::array(&mut cursor).unwrap();

    let mut names = Vec::new();
    while decode::bool(&mut cursor).unwrap() {
        let _fileid = decode::u64(&mut cursor).unwrap();
        let name = decode::string(&mut cursor).unwrap();
        let _cookie = decode::u64(&mut cursor).unwrap();
        names.push(name);
    }
    let eof = decode::bool(&mut cursor).unwrap();
    assert!(eof);
    assert_eq!(names, vec!["a", "b", "c"]);

    srv.stop().await;
}

#[tokio::test]
async fn unknown_procedure_is_rejected_with_proc_unavail() {
    let srv = start_server(|_| {}).await;
    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;

    let mut body = Vec::new();
    encode::u32(&mut body, 99).unwrap();
    encode::u32(&mut body, 0).unwrap();
    encode::u32(&mut body, 2).unwrap();
    encode::u32(&mut body, NFS_PROGRAM).unwrap();
    encode::u32(&mut body, NFS_V3).unwrap();
    encode::u32(&mut body, 9999).unwrap();
    encode::variant(&mut body, nfs3d::status::AuthFlavor::AUTH_NONE).unwrap();
    encode::opaque(&mut body, &[]).unwrap();
    encode::variant(&mut body, nfs3d::status::AuthFlavor::AUTH_NONE).unwrap();
    encode::opaque(&mut body, &[]).unwrap();

    let reply = nfs_client.call_raw(&body).await;
    let mut cursor = Cursor::new(&reply[..]);
    let _xid = decode::u32(&mut cursor).unwrap();
    let _msg_type = decode::u32(&mut cursor).unwrap();
    let _accepted = decode::u32(&mut cursor).unwrap();
    let _verf_flavor = decode::u32(&mut cursor).unwrap();
    let _verf_body = decode::opaque(&mut cursor).unwrap();
    let accept_stat = decode::u32(&mut cursor).unwrap();
    assert_eq!(accept_stat, 3, "expected AcceptStat::PROC_UNAVAIL");

    srv.stop().await;
}

#[tokio::test]
async fn idle_connection_is_reaped_after_the_configured_timeout() {
    let srv = start_server(|cfg| {
        cfg.idle_timeout = Duration::from_millis(100);
    })
    .await;

    let stream = tokio::net::TcpStream::connect(srv.nfs_addr).await.unwrap();
    // No request sent; the reaper should close the idle connection well within a couple of
    // reaper ticks (reaper interval = min(30s, idle_timeout/2) = 50ms here).
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut stream = stream;
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "idle-reaped connection should observe EOF");

    srv.stop().await;
}

#[tokio::test]
async fn allow_list_denies_requests_from_unlisted_clients() {
    let srv = start_server(|cfg| {
        // Loopback test clients will never match this bogus /32, so every request is denied.
        cfg.export.allow_list = vec!["203.0.113.1/32".to_string()];
    })
    .await;

    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;
    let mut body = Vec::new();
    encode::u32(&mut body, 7).unwrap();
    encode::u32(&mut body, 0).unwrap();
    encode::u32(&mut body, 2).unwrap();
    encode::u32(&mut body, NFS_PROGRAM).unwrap();
    encode::u32(&mut body, NFS_V3).unwrap();
    encode::u32(&mut body, 0).unwrap();
    encode::variant(&mut body, nfs3d::status::AuthFlavor::AUTH_NONE).unwrap();
    encode::opaque(&mut body, &[]).unwrap();
    encode::variant(&mut body, nfs3d::status::AuthFlavor::AUTH_NONE).unwrap();
    encode::opaque(&mut body, &[]).unwrap();

    let reply = nfs_client.call_raw(&body).await;
    let mut cursor = Cursor::new(&reply[..]);
    let _xid = decode::u32(&mut cursor).unwrap();
    let _msg_type = decode::u32(&mut cursor).unwrap();
    let reply_stat = decode::u32(&mut cursor).unwrap();
    assert_eq!(reply_stat, 1, "expected MSG_DENIED");

    srv.stop().await;
}

fn decode_fattr3_size(cursor: &mut Cursor<&[u8]>) -> u64 {
    // ftype, mode, nlink, uid, gid
    for _ in 0..5 {
        decode::u32(cursor).unwrap();
    }
    let size = decode::u64(cursor).unwrap();
    let _used = decode::u64(cursor).unwrap();
    let _major = decode::u32(cursor).unwrap();
    let _minor = decode::u32(cursor).unwrap();
    let _fsid = decode::u64(cursor).unwrap();
    let _fileid = decode::u64(cursor).unwrap();
    decode::nfs_time(cursor).unwrap();
    decode::nfs_time(cursor).unwrap();
    decode::nfs_time(cursor).unwrap();
    size
}

#[tokio::test]
async fn exclusive_create_of_an_existing_name_fails_with_exist() {
    let srv = start_server(|_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;
    let root = mount_root(&mut mount_client).await;
    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;

    let exclusive_create = |name: &str| {
        let mut args = Vec::new();
        encode::file_handle(&mut args, root).unwrap();
        encode::string(&mut args, name).unwrap();
        encode::u32(&mut args, 2).unwrap(); // createmode3::EXCLUSIVE
        encode::array(&mut args, [0u8; 8]).unwrap(); // createverf3
        args
    };

    let reply = nfs_client.nfs_call(8, &exclusive_create("excl.txt")).await;
    let status = decode::u32(&mut Cursor::new(&reply[..])).unwrap();
    assert_eq!(status, 0, "first EXCLUSIVE create should succeed");

    let reply = nfs_client.nfs_call(8, &exclusive_create("excl.txt")).await;
    let status = decode::u32(&mut Cursor::new(&reply[..])).unwrap();
    assert_eq!(status, 17, "second EXCLUSIVE create of the same name should fail with NFS3ERR_EXIST");

    srv.stop().await;
}

#[tokio::test]
async fn read_ahead_hit_avoids_a_second_filesystem_open() {
    let (fs, opens) = CountingFs::new(common::memfs::MemFs::new());
    let srv = start_server_with(fs, |_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;
    let root = mount_root(&mut mount_client).await;
    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;

    // CREATE(root, "big.bin", UNCHECKED, default sattr3)
    let mut args = Vec::new();
    encode::file_handle(&mut args, root).unwrap();
    encode::string(&mut args, "big.bin").unwrap();
    encode::u32(&mut args, 0).unwrap();
    for _ in 0..4 {
        encode::bool(&mut args, false).unwrap();
    }
    encode::u32(&mut args, 0).unwrap();
    encode::u32(&mut args, 0).unwrap();
    let reply = nfs_client.nfs_call(8, &args).await;
    assert_eq!(decode::u32(&mut Cursor::new(&reply[..])).unwrap(), 0, "CREATE should succeed");
    let mut cursor = Cursor::new(&reply[..]);
    decode::u32(&mut cursor).unwrap();
    assert!(decode::bool(&mut cursor).unwrap());
    let file_handle = decode::file_handle(&mut cursor).unwrap();

    // WRITE(file_handle, offset=0, 4096 bytes)
    let payload = vec![0x42u8; 4096];
    let mut args = Vec::new();
    encode::file_handle(&mut args, file_handle).unwrap();
    encode::u64(&mut args, 0).unwrap();
    encode::u32(&mut args, payload.len() as u32).unwrap();
    encode::u32(&mut args, 0).unwrap();
    encode::opaque(&mut args, &payload).unwrap();
    let reply = nfs_client.nfs_call(7, &args).await;
    assert_eq!(decode::u32(&mut Cursor::new(&reply[..])).unwrap(), 0, "WRITE should succeed");

    // READ(file_handle, offset=0, count=1024): a miss, opens the file and primes read-ahead.
    let mut args = Vec::new();
    encode::file_handle(&mut args, file_handle).unwrap();
    encode::u64(&mut args, 0).unwrap();
    encode::u32(&mut args, 1024).unwrap();
    let reply = nfs_client.nfs_call(6, &args).await;
    assert_eq!(decode::u32(&mut Cursor::new(&reply[..])).unwrap(), 0, "first READ should succeed");
    let opens_after_first_read = opens.load(Ordering::SeqCst);

    // READ(file_handle, offset=1024, count=1024): should be served entirely from the read-ahead
    // buffer primed by the first read, with no additional `Filesystem::open` call.
    let mut args = Vec::new();
    encode::file_handle(&mut args, file_handle).unwrap();
    encode::u64(&mut args, 1024).unwrap();
    encode::u32(&mut args, 1024).unwrap();
    let reply = nfs_client.nfs_call(6, &args).await;
    assert_eq!(decode::u32(&mut Cursor::new(&reply[..])).unwrap(), 0, "second READ should succeed");
    assert_eq!(opens.load(Ordering::SeqCst), opens_after_first_read, "read-ahead hit must not reopen the file");

    srv.stop().await;
}

#[tokio::test]
async fn write_invalidates_the_attribute_cache() {
    let srv = start_server(|_| {}).await;
    let mut mount_client = RpcClient::connect(srv.mount_addr).await;
    let root = mount_root(&mut mount_client).await;
    let mut nfs_client = RpcClient::connect(srv.nfs_addr).await;

    let mut args = Vec::new();
    encode::file_handle(&mut args, root).unwrap();
    encode::string(&mut args, "f").unwrap();
    encode::u32(&mut args, 0).unwrap();
    for _ in 0..4 {
        encode::bool(&mut args, false).unwrap();
    }
    encode::u32(&mut args, 0).unwrap();
    encode::u32(&mut args, 0).unwrap();
    let reply = nfs_client.nfs_call(8, &args).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0, "CREATE should succeed");
    decode::bool(&mut cursor).unwrap();
    let file_handle = decode::file_handle(&mut cursor).unwrap();

    // GETATTR before the write: size should be 0.
    let reply = nfs_client.nfs_call(1, &encode_handle(file_handle)).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0);
    assert_eq!(decode_fattr3_size(&mut cursor), 0);

    // WRITE 5 bytes at offset 0.
    let payload = b"hello";
    let mut args = Vec::new();
    encode::file_handle(&mut args, file_handle).unwrap();
    encode::u64(&mut args, 0).unwrap();
    encode::u32(&mut args, payload.len() as u32).unwrap();
    encode::u32(&mut args, 0).unwrap();
    encode::opaque(&mut args, payload).unwrap();
    let reply = nfs_client.nfs_call(7, &args).await;
    assert_eq!(decode::u32(&mut Cursor::new(&reply[..])).unwrap(), 0, "WRITE should succeed");

    // GETATTR after the write must observe the new size immediately, not a stale cached value.
    let reply = nfs_client.nfs_call(1, &encode_handle(file_handle)).await;
    let mut cursor = Cursor::new(&reply[..]);
    assert_eq!(decode::u32(&mut cursor).unwrap(), 0);
    assert_eq!(decode_fattr3_size(&mut cursor), 5);

    srv.stop().await;
}
