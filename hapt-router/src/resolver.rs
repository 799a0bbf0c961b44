use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, ToSocketAddrs},
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::{
    config::LogicalDevice,
    event::{EventSink, LogLevel, RouterEvent},
    store::RouteStore,
    RESOLVE_QUEUE_DEPTH,
};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("no address records for {0}")]
    NoRecords(String),
}

/// Trait over blocking name resolution. The default implementation
/// uses the platform resolver; alternate implementations may back this
/// with an mDNS daemon or a static table.
pub trait HostLookup: Send + Sync {
    fn lookup(&self, host: &str) -> Result<IpAddr, LookupError>;
}

/// Platform resolver via [`std::net::ToSocketAddrs`]. Blocking,
/// bounded only by the platform lookup timeout; always called from a
/// blocking-capable task.
pub struct DnsLookup;

impl HostLookup for DnsLookup {
    fn lookup(&self, host: &str) -> Result<IpAddr, LookupError> {
        let addrs: Vec<_> = (host, 0u16).to_socket_addrs()?.collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(|addr| addr.ip())
            .ok_or_else(|| LookupError::NoRecords(host.to_string()))
    }
}

/// Cache-miss signal path from the router into the resolver task.
/// At most one outstanding request per discovery name: the pending-set
/// check and the enqueue happen under one lock.
#[derive(Clone)]
pub struct ResolverHandle {
    tx: mpsc::Sender<String>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl ResolverHandle {
    /// Queues one resolution attempt. Never blocks; returns false when
    /// the name is already pending or the queue is full (the next
    /// cache miss retriggers).
    pub(crate) fn request(&self, discovery: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains(discovery) {
            return false;
        }
        if self.tx.try_send(discovery.to_string()).is_ok() {
            pending.insert(discovery.to_string());
            true
        } else {
            false
        }
    }

    fn complete(&self, discovery: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(discovery);
    }
}

/// Background worker performing the blocking name lookups the hot path
/// must never run. Serves explicit requests from its queue and, while
/// the queue is idle, sweeps every configured discovery name for
/// missing or expired cache entries.
pub(crate) struct Resolver {
    store: Arc<RouteStore>,
    lookup: Arc<dyn HostLookup>,
    sink: EventSink,
    /// discovery name -> owning device, for ResolveUpdate events
    owners: HashMap<String, String>,
    /// sweep order over all configured discovery names
    names: Vec<String>,
    rx: mpsc::Receiver<String>,
    handle: ResolverHandle,
    poll: Duration,
    sweep_pause: Duration,
}

impl Resolver {
    pub(crate) fn new(
        store: Arc<RouteStore>,
        lookup: Arc<dyn HostLookup>,
        sink: EventSink,
        devices: &[LogicalDevice],
        poll: Duration,
        sweep_pause: Duration,
    ) -> (Self, ResolverHandle) {
        let (tx, rx) = mpsc::channel(RESOLVE_QUEUE_DEPTH);
        let handle = ResolverHandle {
            tx,
            pending: Arc::new(Mutex::new(HashSet::new())),
        };

        let owners = devices
            .iter()
            .map(|device| (device.discovery.clone(), device.name.clone()))
            .collect();
        let names = devices
            .iter()
            .map(|device| device.discovery.clone())
            .collect();

        (
            Self {
                store,
                lookup,
                sink,
                owners,
                names,
                rx,
                handle: handle.clone(),
                poll,
                sweep_pause,
            },
            handle,
        )
    }

    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::debug!("resolver task started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                req = self.rx.recv() => match req {
                    Some(name) => {
                        self.attempt(&name).await;
                        self.handle.complete(&name);
                    }
                    None => break,
                },
                _ = tokio::time::sleep(self.poll) => self.sweep(&mut shutdown).await,
            }
        }
        log::debug!("resolver task exiting");
    }

    /// Re-resolves every name whose cache entry is missing or expired,
    /// pausing between entries.
    async fn sweep(&self, shutdown: &mut watch::Receiver<bool>) {
        for name in &self.names {
            if *shutdown.borrow() {
                return;
            }
            if self.store.needs_resolution(name) {
                self.attempt(name).await;
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = tokio::time::sleep(self.sweep_pause) => {}
                }
            }
        }
    }

    async fn attempt(&self, discovery: &str) {
        let lookup = self.lookup.clone();
        let host = discovery.to_string();

        match tokio::task::spawn_blocking(move || lookup.lookup(&host)).await {
            Ok(Ok(addr)) => {
                let previous = self.store.get(discovery).map(|entry| entry.addr);
                self.store.set(discovery, addr);

                if previous != Some(addr) {
                    self.sink
                        .log(LogLevel::Success, format!("RESOLVED: {discovery} -> {addr}"));
                    if let Some(device) = self.owners.get(discovery) {
                        self.sink.emit(RouterEvent::ResolveUpdate {
                            device: device.clone(),
                            addr,
                        });
                    }
                }
            }
            Ok(Err(e)) => {
                // Offline visibility comes from device status, not log lines
                log::trace!("lookup failed for {discovery}: {e:}");
                self.store.invalidate(discovery);
            }
            Err(e) => {
                log::error!("lookup task join error {e:}");
            }
        }
    }
}
