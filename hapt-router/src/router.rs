use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc::UnboundedReceiver, watch};

use crate::{
    config::LogicalDevice,
    event::{DeviceState, EventSink, LogLevel, RouterEvent},
    rate::RateLimiter,
    resolver::ResolverHandle,
    sender::OscSender,
    store::{RouteStore, Target},
    INTENSITY_THRESHOLD,
};

// Intensities above this are worth a route log line (and a highlight
// in front ends); everything below is background wiggle
const LOG_INTENSITY_FLOOR: f32 = 0.05;

/// Per-message processing core. A single task drains the intake
/// channel, so rate state and online flags for one device are always
/// applied in arrival order — no per-device locking needed.
pub(crate) struct Router {
    devices: Arc<Vec<LogicalDevice>>,
    by_path: HashMap<String, usize>,
    store: Arc<RouteStore>,
    rate: RateLimiter,
    resolver: ResolverHandle,
    sender: Arc<OscSender>,
    sink: EventSink,
    online: Vec<bool>,
    received: u64,
    routed: u64,
}

impl Router {
    pub(crate) fn new(
        devices: Arc<Vec<LogicalDevice>>,
        store: Arc<RouteStore>,
        resolver: ResolverHandle,
        sender: Arc<OscSender>,
        sink: EventSink,
    ) -> Self {
        let by_path = devices
            .iter()
            .enumerate()
            .map(|(idx, device)| (device.path.clone(), idx))
            .collect();
        let online = vec![false; devices.len()];

        Self {
            devices,
            by_path,
            store,
            rate: RateLimiter::new(INTENSITY_THRESHOLD),
            resolver,
            sender,
            sink,
            online,
            received: 0,
            routed: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut intake: UnboundedReceiver<(String, f32)>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                msg = intake.recv() => match msg {
                    Some((address, value)) => self.process(&address, value).await,
                    None => break,
                },
            }
        }
        log::debug!("router task exiting");
    }

    /// One intake step: map the OSC address to a device, compute the
    /// effective target, rate-limit, transmit. Never blocks on name
    /// resolution — cache misses are handed to the resolver task.
    pub(crate) async fn process(&mut self, address: &str, value: f32) {
        // Unmapped addresses are routine traffic (every avatar
        // parameter arrives here), not an error
        let Some(&idx) = self.by_path.get(address) else {
            return;
        };
        let device = self.devices[idx].clone();

        self.sink.emit(RouterEvent::LastMessageUpdate {
            address: address.to_string(),
            value,
        });

        let target = self.store.target(&device.name, &device.discovery);
        match target {
            Target::Unresolved => {
                self.sink.emit(RouterEvent::StatusUpdate {
                    device: device.name.clone(),
                    addr: None,
                    intensity: value,
                    state: DeviceState::Offline,
                });

                // One warning per online -> offline transition, never per message
                if self.online[idx] {
                    self.online[idx] = false;
                    self.sink.log(
                        LogLevel::Warn,
                        format!(
                            "Device '{}' ({}) status lost. Awaiting async resolution.",
                            device.name, device.discovery
                        ),
                    );
                }

                self.resolver.request(&device.discovery);
            }
            Target::Manual(addr) | Target::Cached(addr) => {
                self.online[idx] = true;
                let manual = matches!(target, Target::Manual(_));

                self.sink.emit(RouterEvent::StatusUpdate {
                    device: device.name.clone(),
                    addr: Some(addr),
                    intensity: value,
                    state: if manual {
                        DeviceState::Manual
                    } else {
                        DeviceState::Online
                    },
                });

                if self.rate.should_send(&device.name, value) {
                    match self.sender.send(&device, addr, value).await {
                        Ok(()) => {
                            self.rate.commit(&device.name, value);
                            self.routed += 1;

                            if value > LOG_INTENSITY_FLOOR {
                                let tag = if manual { "MANUAL ROUTE" } else { "ROUTE" };
                                self.sink.log(
                                    LogLevel::Info,
                                    format!("[{tag}] {}: {value:.2} -> {addr}", device.name),
                                );
                            }
                        }
                        Err(e) => {
                            self.sink.log(
                                LogLevel::Error,
                                format!("Send failed to {} ({addr}): {e}", device.discovery),
                            );
                        }
                    }
                }
            }
        }

        self.received += 1;
        self.sink.emit(RouterEvent::CounterUpdate {
            received: self.received,
            routed: self.routed,
        });
    }
}
