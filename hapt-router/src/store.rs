use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// One resolved discovery name. `resolved_at == None` marks the entry
/// stale: the address is kept for display but never routed to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheEntry {
    pub(crate) addr: IpAddr,
    resolved_at: Option<Instant>,
}

impl CacheEntry {
    pub(crate) fn age(&self) -> Option<Duration> {
        self.resolved_at.map(|at| at.elapsed())
    }
}

/// Effective transmit target for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Manual(IpAddr),
    Cached(IpAddr),
    Unresolved,
}

impl Target {
    pub(crate) fn addr(&self) -> Option<IpAddr> {
        match self {
            Target::Manual(addr) | Target::Cached(addr) => Some(*addr),
            Target::Unresolved => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// discovery name -> last resolution result
    cache: HashMap<String, CacheEntry>,
    /// device name -> manually set address
    overrides: HashMap<String, IpAddr>,
}

/// Shared routing state: the address cache written by the resolver and
/// the manual-override table written by the command surface, read by
/// the router on every message. One mutex covers both, so a target
/// computation observes a consistent snapshot and no reader ever sees
/// a partially written entry.
pub(crate) struct RouteStore {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl RouteStore {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
        }
    }

    /// Manual override if set, else a fresh cache entry, else
    /// unresolved. Single lock acquisition.
    pub(crate) fn target(&self, device: &str, discovery: &str) -> Target {
        let inner = self.lock();
        if let Some(addr) = inner.overrides.get(device) {
            return Target::Manual(*addr);
        }
        match inner.cache.get(discovery) {
            Some(entry) if self.fresh(entry) => Target::Cached(entry.addr),
            _ => Target::Unresolved,
        }
    }

    pub(crate) fn get(&self, discovery: &str) -> Option<CacheEntry> {
        self.lock().cache.get(discovery).copied()
    }

    pub(crate) fn set(&self, discovery: &str, addr: IpAddr) {
        self.lock().cache.insert(
            discovery.to_string(),
            CacheEntry {
                addr,
                resolved_at: Some(Instant::now()),
            },
        );
    }

    /// Marks the entry stale without deleting the last-known address.
    pub(crate) fn invalidate(&self, discovery: &str) {
        if let Some(entry) = self.lock().cache.get_mut(discovery) {
            entry.resolved_at = None;
        }
    }

    pub(crate) fn clear(&self) {
        self.lock().cache.clear();
    }

    /// True when the entry is missing or older than the TTL.
    pub(crate) fn needs_resolution(&self, discovery: &str) -> bool {
        let inner = self.lock();
        match inner.cache.get(discovery) {
            Some(entry) => !self.fresh(entry),
            None => true,
        }
    }

    pub(crate) fn set_override(&self, device: &str, addr: Option<IpAddr>) {
        let mut inner = self.lock();
        match addr {
            Some(addr) => {
                inner.overrides.insert(device.to_string(), addr);
            }
            None => {
                inner.overrides.remove(device);
            }
        }
    }

    pub(crate) fn override_for(&self, device: &str) -> Option<IpAddr> {
        self.lock().overrides.get(device).copied()
    }

    fn fresh(&self, entry: &CacheEntry) -> bool {
        entry.age().is_some_and(|age| age < self.ttl)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
