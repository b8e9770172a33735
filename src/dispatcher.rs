//! Maps `(program, version, procedure)` to a handler, the single place that owns the symbolic
//! operation name used for metrics and tracing (handlers never hard-code their own name). Applies
//! the 2 s per-call timeout and the `PROG_UNAVAIL`/`PROG_MISMATCH`/`PROC_UNAVAIL`/`GARBAGE_ARGS`
//! error policy (spec §4.8/§9).

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::attr_cache::AttrCache;
use crate::filesystem::Filesystem;
use crate::handle_registry::HandleRegistry;
use crate::metrics::Metrics;
use crate::mount;
use crate::nfs::{self, ProcedureContext, TransferLimits};
use crate::read_ahead::ReadAheadBuffer;
use crate::rpc_msg::{self, RpcCall};
use crate::status::{AcceptStat, Nfsstat3, MOUNT_PROGRAM, MOUNT_V3, NFS_PROGRAM, NFS_V3};
use crate::xdr::decode::DecodeResult;
use crate::xdr::encode;

/// Every handler runs under this deadline; expiry is reported as a transient procedure-level
/// error rather than an RPC-envelope failure (spec §9 "Timeouts ... are reported as a transient
/// procedure-level error and metered; the connection stays open").
pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a dispatched call needs, shared across every procedure on a connection.
pub struct DispatchContext<'a> {
    pub handles: &'a HandleRegistry,
    pub attr_cache: &'a AttrCache,
    pub read_ahead: &'a ReadAheadBuffer,
    pub filesystem: &'a dyn Filesystem,
    pub limits: &'a TransferLimits,
    pub metrics: &'a Metrics,
}

impl<'a> DispatchContext<'a> {
    fn nfs_ctx(&self) -> ProcedureContext<'a> {
        ProcedureContext {
            handles: self.handles,
            attr_cache: self.attr_cache,
            read_ahead: self.read_ahead,
            filesystem: self.filesystem,
            limits: self.limits,
            metrics: self.metrics,
        }
    }

    fn mount_ctx(&self) -> mount::MountContext<'a> {
        mount::MountContext { handles: self.handles, filesystem: self.filesystem }
    }
}

enum ProcOutcome {
    Ok(Vec<u8>),
    Garbage,
    TimedOut,
}

async fn with_timeout<F>(fut: F) -> ProcOutcome
where
    F: Future<Output = DecodeResult<Vec<u8>>>,
{
    match tokio::time::timeout(CALL_TIMEOUT, fut).await {
        Ok(Ok(body)) => ProcOutcome::Ok(body),
        Ok(Err(_)) => ProcOutcome::Garbage,
        Err(_) => ProcOutcome::TimedOut,
    }
}

/// Dispatches one decoded RPC call and returns the complete reply record (RPC envelope plus
/// procedure result, already XDR-encoded).
pub async fn dispatch(call: &RpcCall, ctx: &DispatchContext<'_>) -> Vec<u8> {
    let xid = call.xid;
    let program = call.body.program;
    let version = call.body.version;
    let procedure = call.body.procedure;

    if program == NFS_PROGRAM && version != NFS_V3 {
        warn!(program, version, "NFS version mismatch");
        return rpc_msg::encode_accepted_failure(xid, AcceptStat::PROG_MISMATCH, Some((NFS_V3, NFS_V3)));
    }
    if program == MOUNT_PROGRAM && version != MOUNT_V3 {
        warn!(program, version, "MOUNT version mismatch");
        return rpc_msg::encode_accepted_failure(xid, AcceptStat::PROG_MISMATCH, Some((MOUNT_V3, MOUNT_V3)));
    }

    let nfs_ctx = ctx.nfs_ctx();
    let mount_ctx = ctx.mount_ctx();
    let start = Instant::now();

    let (name, is_mount, outcome) = match (program, procedure) {
        (NFS_PROGRAM, 0) => ("NULL", false, with_timeout(nfs::null::handle(&call.args)).await),
        (NFS_PROGRAM, 1) => ("GETATTR", false, with_timeout(nfs::attr::get_attr(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 2) => ("SETATTR", false, with_timeout(nfs::attr::set_attr(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 3) => ("LOOKUP", false, with_timeout(nfs::lookup::lookup(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 4) => ("ACCESS", false, with_timeout(nfs::lookup::access(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 5) => ("READLINK", false, with_timeout(nfs::link::readlink(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 6) => ("READ", false, with_timeout(nfs::io::read(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 7) => ("WRITE", false, with_timeout(nfs::io::write(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 8) => ("CREATE", false, with_timeout(nfs::dirops::create(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 9) => ("MKDIR", false, with_timeout(nfs::dirops::mkdir(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 10) => ("SYMLINK", false, with_timeout(nfs::link::symlink(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 11) => ("MKNOD", false, with_timeout(nfs::link::mknod(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 12) => ("REMOVE", false, with_timeout(nfs::dirops::remove(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 13) => ("RMDIR", false, with_timeout(nfs::dirops::rmdir(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 14) => ("RENAME", false, with_timeout(nfs::dirops::rename(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 15) => ("LINK", false, with_timeout(nfs::link::link(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 16) => ("READDIR", false, with_timeout(nfs::readdir::readdir(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 17) => ("READDIRPLUS", false, with_timeout(nfs::readdir::readdirplus(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 18) => ("FSSTAT", false, with_timeout(nfs::fsinfo::fsstat(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 19) => ("FSINFO", false, with_timeout(nfs::fsinfo::fsinfo(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 20) => ("PATHCONF", false, with_timeout(nfs::fsinfo::pathconf(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, 21) => ("COMMIT", false, with_timeout(nfs::fsinfo::commit(&nfs_ctx, &call.args)).await),
        (NFS_PROGRAM, _) => {
            debug!(procedure, "unknown NFS procedure");
            return rpc_msg::encode_accepted_failure(xid, AcceptStat::PROC_UNAVAIL, None);
        }
        (MOUNT_PROGRAM, 0) => ("MOUNT_NULL", true, with_timeout(mount::null::handle(&call.args)).await),
        (MOUNT_PROGRAM, 1) => ("MNT", true, with_timeout(mount::mnt::handle(&mount_ctx, &call.args)).await),
        (MOUNT_PROGRAM, 2) => ("DUMP", true, with_timeout(mount::dump::handle(&call.args)).await),
        (MOUNT_PROGRAM, 3) => ("UMNT", true, with_timeout(mount::umnt::handle(&call.args)).await),
        (MOUNT_PROGRAM, _) => {
            debug!(procedure, "unknown MOUNT procedure");
            return rpc_msg::encode_accepted_failure(xid, AcceptStat::PROC_UNAVAIL, None);
        }
        _ => {
            warn!(program, "unknown RPC program");
            return rpc_msg::encode_accepted_failure(xid, AcceptStat::PROG_UNAVAIL, None);
        }
    };

    let elapsed = start.elapsed();
    match outcome {
        ProcOutcome::Ok(body) => {
            ctx.metrics.record_call(name, elapsed, false);
            rpc_msg::encode_accepted_success(xid, &body)
        }
        ProcOutcome::Garbage => {
            ctx.metrics.record_call(name, elapsed, true);
            rpc_msg::encode_accepted_failure(xid, AcceptStat::GARBAGE_ARGS, None)
        }
        ProcOutcome::TimedOut => {
            warn!(name, ?elapsed, "procedure call exceeded its deadline");
            ctx.metrics.record_call(name, elapsed, true);
            let mut body = Vec::new();
            if is_mount {
                encode::variant(&mut body, mount::MountStat3::MNT3ERR_SERVERFAULT).unwrap();
            } else {
                encode::variant(&mut body, Nfsstat3::NFS3ERR_JUKEBOX).unwrap();
            }
            rpc_msg::encode_accepted_success(xid, &body)
        }
    }
}
