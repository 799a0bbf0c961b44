use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DEFAULT_BASE_PATH, DEFAULT_CACHE_TTL_SECS, DEFAULT_LISTEN_PORT, DEFAULT_SEND_PORT};

/// Outbound addressing mode, fixed at startup.
///
/// Unicast sends one datagram per device to its resolved or manually
/// set address. Broadcast sends one datagram to the subnet broadcast
/// address with the device's discovery name appended to the message
/// path, so every physical device filters for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendMode {
    Unicast,
    Broadcast,
}

/// One actuator role: a limb receiver on the avatar mapped to a
/// discoverable device on the local network. Created once from the
/// startup configuration and immutable afterwards; only the manual
/// address override (held by the route store) changes at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalDevice {
    /// Unique role name, e.g. `UpperArm_L`
    pub name: String,
    /// Hostname-style discovery name, e.g. `upperarm_l.local`
    pub discovery: String,
    /// Inbound OSC address carrying this device's intensity
    pub path: String,
}

impl LogicalDevice {
    /// Device with the conventional discovery name and avatar
    /// parameter path derived from the role name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            discovery: format!("{}.local", name.to_lowercase()),
            path: format!("/avatar/parameters/Receiver_{name}"),
        }
    }

    pub fn with_discovery(name: &str, discovery: &str) -> Self {
        Self {
            discovery: discovery.to_string(),
            ..Self::new(name)
        }
    }
}

/// The full limb set of the reference haptic vest build.
pub fn default_devices() -> Vec<LogicalDevice> {
    [
        "Head",
        "Chest",
        "UpperArm_L",
        "UpperArm_R",
        "Hips",
        "UpperLeg_L",
        "UpperLeg_R",
        "LowerLeg_L",
        "LowerLeg_R",
        "Foot_L",
        "Foot_R",
    ]
    .iter()
    .map(|name| LogicalDevice::new(name))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub listen_port: u16,
    pub send_port: u16,
    pub mode: SendMode,
    pub base_path: String,
    /// Cached addresses older than this are re-resolved
    pub cache_ttl: Duration,
    /// How long the resolver waits on its request queue before running
    /// a cache-expiry sweep
    pub resolver_poll: Duration,
    /// Pause between lookups within one sweep, to avoid lookup storms
    pub sweep_pause: Duration,
    pub devices: Vec<LogicalDevice>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            send_port: DEFAULT_SEND_PORT,
            mode: SendMode::Unicast,
            base_path: DEFAULT_BASE_PATH.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            resolver_poll: Duration::from_millis(500),
            sweep_pause: Duration::from_millis(100),
            devices: default_devices(),
        }
    }
}
