//! Wires every subsystem into a running server (spec §2/§4.12): caches, worker pool, metrics,
//! memory monitor, auth policy, and the NFS/MOUNT connection managers sharing one filesystem.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};

use crate::attr_cache::AttrCache;
use crate::auth::AuthPolicy;
use crate::config::{Config, ExportOptions};
use crate::connection::{ConnectionManager, SharedState};
use crate::filesystem::Filesystem;
use crate::handle_registry::HandleRegistry;
use crate::memory_monitor::MemoryMonitor;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::read_ahead::ReadAheadBuffer;
use crate::worker_pool::{self, WorkerPool};

/// A running NFSv3/MOUNT server. `run` drives both listeners to completion; `shutdown` and the
/// `ExportOptions` accessors can be called concurrently from another task.
pub struct Server {
    nfs_listener: TcpListener,
    mount_listener: TcpListener,
    state: Arc<SharedState>,
    connection_limits: crate::connection::ConnectionLimits,
    export: Arc<RwLock<ExportOptions>>,
    worker_pool: WorkerPool,
    memory_monitor: Option<MemoryMonitor>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    pub async fn bind(config: Config, filesystem: Box<dyn Filesystem>) -> std::io::Result<Self> {
        let nfs_listener = TcpListener::bind(&config.nfs_bind_addr).await?;
        let mount_listener = TcpListener::bind(&config.mount_bind_addr).await?;

        let export = config.export.clone();
        let max_workers = config.worker_pool_max_workers.unwrap_or_else(worker_pool::default_max_workers);

        let state = Arc::new(SharedState {
            handles: HandleRegistry::new(),
            attr_cache: AttrCache::new(config.attr_cache_capacity, config.attr_cache_ttl),
            read_ahead: ReadAheadBuffer::new(
                config.read_ahead_max_files,
                config.read_ahead_max_bytes,
                export.read_ahead_size as usize,
            ),
            filesystem,
            limits: export.transfer_limits(),
            metrics: Metrics::new(),
            auth: AuthPolicy {
                allow_list: export.allow_entries(),
                require_secure_port: export.require_secure_port,
                squash: export.squash_mode(),
            },
        });

        let memory_monitor = config
            .memory_monitor
            .map(|pressure| MemoryMonitor::new(pressure, config.attr_cache_capacity, config.read_ahead_max_files, config.read_ahead_max_bytes));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Server {
            nfs_listener,
            mount_listener,
            state,
            connection_limits: config.connection_limits(),
            export: Arc::new(RwLock::new(export)),
            worker_pool: WorkerPool::new(max_workers),
            memory_monitor,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_nfs_addr(&self) -> std::io::Result<SocketAddr> {
        self.nfs_listener.local_addr()
    }

    pub fn local_mount_addr(&self) -> std::io::Result<SocketAddr> {
        self.mount_listener.local_addr()
    }

    /// A handle that triggers graceful shutdown of every connection manager sharing this
    /// server's shutdown channel.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Runs the NFS and MOUNT accept loops to completion (i.e. until shutdown is signalled and
    /// both have finished draining).
    pub async fn run(self) -> std::io::Result<()> {
        let nfs_mgr = ConnectionManager::new(self.nfs_listener, self.state.clone(), self.connection_limits.clone(), self.shutdown_rx.clone());
        let mount_mgr = ConnectionManager::new(self.mount_listener, self.state.clone(), self.connection_limits.clone(), self.shutdown_rx.clone());

        let (nfs_result, mount_result) = tokio::join!(nfs_mgr.run(), mount_mgr.run());
        nfs_result?;
        mount_result?;
        Ok(())
    }

    /// `true` iff the worker pool is accepting submissions and memory is not in a pressure
    /// state. A liveness probe, not a correctness guarantee.
    pub fn healthy(&self) -> bool {
        !self.memory_monitor.as_ref().map(|m| m.is_in_pressure()).unwrap_or(false)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    pub async fn get_export_options(&self) -> ExportOptions {
        self.export.read().await.clone()
    }

    /// Applies a new set of export options. Squash mode is fixed at construction time, since
    /// changing the effective-identity policy under live connections would silently reclassify
    /// already-open handles; attempting to change it is rejected.
    pub async fn update_export_options(&self, new_options: ExportOptions) -> Result<(), String> {
        let mut current = self.export.write().await;
        if new_options.squash_mode() != current.squash_mode() {
            return Err("squash mode cannot be changed after startup".to_string());
        }
        *current = new_options;
        Ok(())
    }

    /// Samples the given usage source and shrinks caches under memory pressure (spec §4.12).
    /// The caller is expected to invoke this on `memory_monitor().check_interval` cadence.
    pub fn memory_monitor_tick(&self, source: &dyn crate::memory_monitor::UsageSource) -> bool {
        match &self.memory_monitor {
            Some(monitor) => monitor.tick(source, &self.state.attr_cache, &self.state.read_ahead),
            None => false,
        }
    }
}
