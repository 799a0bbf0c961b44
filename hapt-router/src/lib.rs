//! The `hapt-router` crate is the routing core of the haptic relay
//! system: it listens for avatar-parameter OSC messages from the game
//! client (UDP, one float intensity per limb receiver), decides per
//! device whether the new intensity is worth transmitting, and forwards
//! it as an outbound OSC datagram to the matching actuator device on
//! the local network.
//!
//! The crate wires together a handful of cooperating tasks:
//! 1. A listener task bound to the inbound OSC port, decoding datagrams
//!    and feeding (address, value) pairs into the router's intake
//!    channel. The listener never performs name resolution or any other
//!    blocking work.
//! 2. A router task that maps each OSC address to a [`LogicalDevice`],
//!    computes the effective target address (manual override, else a
//!    fresh cache entry), applies the rate-limit rule, and transmits
//!    via the shared sender socket. Because a single task drains the
//!    intake channel, updates for one device are always applied in
//!    arrival order.
//! 3. A resolver task performing the slow, blocking hostname lookups on
//!    a dedicated path: it serves deduplicated cache-miss requests from
//!    the router and periodically sweeps every configured discovery
//!    name, refreshing entries older than the cache TTL.
//!
//! Everything the tasks observe is reported as [`RouterEvent`]s on a
//! bounded queue and fanned out to subscribed clients; front ends drive
//! the system through the actix [`RouterHandle`] returned by
//! [`router`].
//!
//! # Examples
//! ```no_run
//! #[actix::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = hapt_router::router(hapt_router::RouterConfig::default()).await?;
//!
//!     // The provided client ID must be unique for each subscriber
//!     let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(256);
//!     handle.send(hapt_router::Subscribe { id: 0, events: events_tx }).await??;
//!     handle.send(hapt_router::StartRouter).await??;
//!
//!     while let Some(event) = events_rx.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod event;
mod listener;
pub mod osc;
mod rate;
mod resolver;
mod router;
mod sender;
mod service;
mod store;

pub use config::{default_devices, LogicalDevice, RouterConfig, SendMode};
pub use event::{DeviceState, LogLevel, RouterEvent};
pub use resolver::{DnsLookup, HostLookup, LookupError};
pub use sender::SendError;
pub use service::{
    router, router_with_lookup, ClearCache, RouterError, RouterHandle, SetManualAddress,
    StartRouter, StopRouter, Subscribe, TestPulse, Unsubscribe,
};

/// [`ClientId`] is used with subscribing to router events
pub type ClientId = u32;

/// Inbound OSC port the game client transmits avatar parameters to
pub const DEFAULT_LISTEN_PORT: u16 = 9001;

/// Outbound OSC port every actuator device listens on
pub const DEFAULT_SEND_PORT: u16 = 8000;

/// Base path of the outbound intensity message
pub const DEFAULT_BASE_PATH: &str = "/haptics/set_intensity";

/// Minimum intensity delta that justifies a transmission (3%)
pub const INTENSITY_THRESHOLD: f32 = 0.03;

/// Maximum age of a cached resolved address before re-resolution
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

// Depth of the event queue between the worker tasks and the fan-out
// loop; overflow drops the new event and bumps a counter
const EVENT_QUEUE_DEPTH: usize = 1024;

// Depth of the deduplicated resolution request queue
const RESOLVE_QUEUE_DEPTH: usize = 32;
