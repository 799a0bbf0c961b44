use std::fmt;
use std::net::IpAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc::{channel, Receiver, Sender};

/// Severity attached to [`RouterEvent::LogUpdate`] lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Success => write!(f, "SUCCESS"),
        }
    }
}

/// [`DeviceState`] is reported with every [`RouterEvent::StatusUpdate`]
/// and can be used by client subscribers to drive a per-device state
/// machine in a front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unknown,
    /// Routing to a freshly resolved address
    Online,
    /// Routing to a manually set address
    Manual,
    /// No override and no fresh cache entry; awaiting resolution
    Offline,
    Stopped,
    /// Listener could not bind its port at startup
    Failed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Unknown => write!(f, "UNKNOWN"),
            DeviceState::Online => write!(f, "ONLINE"),
            DeviceState::Manual => write!(f, "MANUAL"),
            DeviceState::Offline => write!(f, "OFFLINE"),
            DeviceState::Stopped => write!(f, "STOPPED"),
            DeviceState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Events produced by the router, resolver, and service layers and
/// consumed by subscribed clients. Each event is self-contained; a
/// subscriber that joins late or drops events only loses history, not
/// consistency.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    LogUpdate {
        message: String,
        level: LogLevel,
    },
    StatusUpdate {
        device: String,
        addr: Option<IpAddr>,
        intensity: f32,
        state: DeviceState,
    },
    CounterUpdate {
        received: u64,
        routed: u64,
    },
    LastMessageUpdate {
        address: String,
        value: f32,
    },
    ResolveUpdate {
        device: String,
        addr: IpAddr,
    },
}

/// Producer side of the bounded event queue. Emitting never blocks:
/// when the queue is full the new event is dropped and counted.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Sender<RouterEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn channel(depth: usize) -> (Self, Receiver<RouterEvent>) {
        let (tx, rx) = channel(depth);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    pub(crate) fn emit(&self, event: RouterEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn log(&self, level: LogLevel, message: String) {
        self.emit(RouterEvent::LogUpdate { message, level });
    }

    #[cfg(test)]
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
