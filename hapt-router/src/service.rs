use actix::{prelude::*, Actor, Addr};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    net::UdpSocket,
    sync::{
        mpsc::{error::TrySendError, unbounded_channel, Receiver, Sender, UnboundedReceiver,
            UnboundedSender},
        watch,
    },
    task::JoinHandle,
};

use crate::{
    config::{LogicalDevice, RouterConfig},
    event::{DeviceState, EventSink, LogLevel, RouterEvent},
    listener,
    resolver::{DnsLookup, HostLookup, Resolver, ResolverHandle},
    router::Router,
    sender::{OscSender, SendError},
    store::RouteStore,
    ClientId, EVENT_QUEUE_DEPTH,
};

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Send Error")]
    Send(#[from] SendError),
    #[error("ActorError")]
    ActorError,
}

/// Commands the service loop accepts from [`RouterHandle`].
enum RouterApi {
    Subscribe {
        id: ClientId,
        events: Sender<RouterEvent>,
    },
    Unsubscribe {
        id: ClientId,
    },
    Start,
    Stop,
    SetOverride {
        device: String,
        addr: Option<IpAddr>,
    },
    ClearCache,
    TestPulse {
        device: Option<String>,
        intensity: f32,
        hold: Duration,
    },
}

/// The [`RouterHandle`] actor is the only surface clients hold: it
/// forwards every command into the service loop's channel and owns no
/// routing state itself.
pub struct RouterHandle(UnboundedSender<RouterApi>);

impl Actor for RouterHandle {
    type Context = Context<Self>;
}

/// Public entry point: builds the routing service around the given
/// configuration and returns the command handle. The service is
/// created stopped; send [`StartRouter`] to begin listening.
pub async fn router(config: RouterConfig) -> Result<Addr<RouterHandle>, RouterError> {
    router_with_lookup(config, Arc::new(DnsLookup)).await
}

/// Same as [`router`] with a caller-provided name lookup
/// implementation.
pub async fn router_with_lookup(
    config: RouterConfig,
    lookup: Arc<dyn HostLookup>,
) -> Result<Addr<RouterHandle>, RouterError> {
    let sender = OscSender::new(config.mode, config.send_port, &config.base_path).await?;
    let (service, handle) = RouterService::new(config, lookup, Arc::new(sender));

    tokio::spawn(async move {
        service.event_loop().await;
        log::warn!("router service exiting event loop");
    });

    Ok(handle.start())
}

struct Running {
    shutdown: watch::Sender<bool>,
    resolver_handle: ResolverHandle,
    listener: JoinHandle<()>,
    router: JoinHandle<()>,
    resolver: JoinHandle<()>,
}

/// Owns the routing tasks' lifecycles, the shared route store, and the
/// fan-out of events to subscribed clients.
struct RouterService {
    config: RouterConfig,
    devices: Arc<Vec<LogicalDevice>>,
    store: Arc<RouteStore>,
    lookup: Arc<dyn HostLookup>,
    sender: Arc<OscSender>,
    sink: EventSink,
    event_rx: Receiver<RouterEvent>,
    api_rx: UnboundedReceiver<RouterApi>,
    subscribers: HashMap<ClientId, Sender<RouterEvent>>,
    running: Option<Running>,
}

impl RouterService {
    fn new(
        config: RouterConfig,
        lookup: Arc<dyn HostLookup>,
        sender: Arc<OscSender>,
    ) -> (Self, RouterHandle) {
        let devices = Arc::new(config.devices.clone());
        let store = Arc::new(RouteStore::new(config.cache_ttl));
        let (sink, event_rx) = EventSink::channel(EVENT_QUEUE_DEPTH);
        let (api_tx, api_rx) = unbounded_channel();

        (
            Self {
                config,
                devices,
                store,
                lookup,
                sender,
                sink,
                event_rx,
                api_rx,
                subscribers: HashMap::new(),
                running: None,
            },
            RouterHandle(api_tx),
        )
    }

    async fn event_loop(mut self) {
        loop {
            tokio::select! {
                api = self.api_rx.recv() => match api {
                    Some(api) => self.handle_api(api).await,
                    // all handles dropped
                    None => break,
                },
                Some(event) = self.event_rx.recv() => self.fan_out(event),
            }
        }
        self.stop().await;
    }

    async fn handle_api(&mut self, api: RouterApi) {
        match api {
            RouterApi::Subscribe { id, events } => {
                self.subscribers.insert(id, events);
                log::debug!("Subscribed client ID {id:}");
            }
            RouterApi::Unsubscribe { id } => {
                if self.subscribers.remove(&id).is_none() {
                    log::warn!("Removing non-existent subscriber ID");
                } else {
                    log::debug!("Unsubscribed client ID {id:}");
                }
            }
            RouterApi::Start => self.start().await,
            RouterApi::Stop => self.stop().await,
            RouterApi::SetOverride { device, addr } => self.set_override(&device, addr),
            RouterApi::ClearCache => self.clear_cache(),
            RouterApi::TestPulse {
                device,
                intensity,
                hold,
            } => self.test_pulse(device.as_deref(), intensity, hold),
        }
    }

    async fn start(&mut self) {
        if self.running.is_some() {
            self.sink
                .log(LogLevel::Warn, "Router is already running.".to_string());
            return;
        }

        // Bind before spawning anything so a port conflict surfaces as
        // a startup failure, not a dead listener task
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.config.listen_port)).await {
            Ok(socket) => socket,
            Err(e) => {
                self.sink.log(
                    LogLevel::Error,
                    format!(
                        "Failed to start OSC listener (port {} likely in use): {e}",
                        self.config.listen_port
                    ),
                );
                for device in self.devices.iter() {
                    self.sink.emit(RouterEvent::StatusUpdate {
                        device: device.name.clone(),
                        addr: self.store.override_for(&device.name),
                        intensity: 0.0,
                        state: DeviceState::Failed,
                    });
                }
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (intake_tx, intake_rx) = unbounded_channel();

        let listener = tokio::spawn(listener::run(
            socket,
            intake_tx,
            self.sink.clone(),
            shutdown_rx.clone(),
        ));

        let (resolver, resolver_handle) = Resolver::new(
            self.store.clone(),
            self.lookup.clone(),
            self.sink.clone(),
            &self.devices,
            self.config.resolver_poll,
            self.config.sweep_pause,
        );
        let resolver = tokio::spawn(resolver.run(shutdown_rx.clone()));

        let router = Router::new(
            self.devices.clone(),
            self.store.clone(),
            resolver_handle.clone(),
            self.sender.clone(),
            self.sink.clone(),
        );
        let router = tokio::spawn(router.run(intake_rx, shutdown_rx));

        self.running = Some(Running {
            shutdown: shutdown_tx,
            resolver_handle,
            listener,
            router,
            resolver,
        });

        // Fresh run: counters restart and every device is unknown
        // until its first routed message
        self.sink.emit(RouterEvent::CounterUpdate {
            received: 0,
            routed: 0,
        });
        for device in self.devices.iter() {
            self.sink.emit(RouterEvent::StatusUpdate {
                device: device.name.clone(),
                addr: self.store.override_for(&device.name),
                intensity: 0.0,
                state: DeviceState::Unknown,
            });
        }
        self.sink.log(
            LogLevel::Info,
            format!("OSC server started on port {}.", self.config.listen_port),
        );
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown.send(true).ok();

        for (name, mut task) in [
            ("listener", running.listener),
            ("router", running.router),
            ("resolver", running.resolver),
        ] {
            if tokio::time::timeout(Duration::from_secs(1), &mut task)
                .await
                .is_err()
            {
                // in-flight work is abandoned, not awaited
                log::warn!("{name} task did not stop in time, aborting");
                task.abort();
            }
        }

        // Cache and overrides survive a stop; rate state died with the
        // router task
        for device in self.devices.iter() {
            self.sink.emit(RouterEvent::StatusUpdate {
                device: device.name.clone(),
                addr: self.store.override_for(&device.name),
                intensity: 0.0,
                state: DeviceState::Stopped,
            });
        }
        self.sink
            .log(LogLevel::Info, "Router service stopped.".to_string());
    }

    fn set_override(&mut self, device: &str, addr: Option<IpAddr>) {
        if !self.devices.iter().any(|d| d.name == device) {
            self.sink
                .log(LogLevel::Error, format!("Unknown device '{device}'"));
            return;
        }

        self.store.set_override(device, addr);
        match addr {
            Some(addr) => {
                self.sink.log(
                    LogLevel::Success,
                    format!("Manual address set for {device} to {addr}"),
                );
                self.sink.emit(RouterEvent::StatusUpdate {
                    device: device.to_string(),
                    addr: Some(addr),
                    intensity: 0.0,
                    state: DeviceState::Manual,
                });
            }
            None => {
                self.sink.log(
                    LogLevel::Info,
                    format!("Manual address cleared for {device}. Now using name resolution."),
                );
                self.sink.emit(RouterEvent::StatusUpdate {
                    device: device.to_string(),
                    addr: None,
                    intensity: 0.0,
                    state: DeviceState::Unknown,
                });
            }
        }
    }

    fn clear_cache(&mut self) {
        self.store.clear();
        if let Some(running) = &self.running {
            for device in self.devices.iter() {
                running.resolver_handle.request(&device.discovery);
            }
            self.sink.log(
                LogLevel::Info,
                "Address cache cleared; re-resolving all devices.".to_string(),
            );
        } else {
            self.sink
                .log(LogLevel::Info, "Address cache cleared.".to_string());
        }
    }

    /// Sends the pulse to every selected device that has an address,
    /// then zero after the hold. Bypasses the rate limiter: a test
    /// pulse is an operator action, not avatar traffic.
    fn test_pulse(&mut self, device: Option<&str>, intensity: f32, hold: Duration) {
        let selected: Vec<LogicalDevice> = match device {
            Some(name) => self
                .devices
                .iter()
                .filter(|d| d.name == name)
                .cloned()
                .collect(),
            None => self.devices.to_vec(),
        };
        if selected.is_empty() {
            self.sink.log(
                LogLevel::Warn,
                format!("TEST SKIPPED: unknown device '{}'", device.unwrap_or("?")),
            );
            return;
        }

        let mut pulsed = Vec::new();
        for device in selected {
            match self
                .store
                .target(&device.name, &device.discovery)
                .addr()
            {
                Some(addr) => pulsed.push((device, addr)),
                None => self.sink.log(
                    LogLevel::Warn,
                    format!("TEST SKIPPED: {} - no address available", device.name),
                ),
            }
        }

        let sender = self.sender.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            for (device, addr) in &pulsed {
                match sender.send(device, *addr, intensity).await {
                    Ok(()) => sink.log(
                        LogLevel::Success,
                        format!("TEST: Sent {intensity:.2} to {} ({addr})", device.name),
                    ),
                    Err(e) => sink.log(
                        LogLevel::Error,
                        format!("TEST FAILED: {} ({addr}): {e}", device.name),
                    ),
                }
            }

            tokio::time::sleep(hold).await;

            for (device, addr) in &pulsed {
                if let Err(e) = sender.send(device, *addr, 0.0).await {
                    sink.log(
                        LogLevel::Error,
                        format!("TEST FAILED: {} ({addr}): {e}", device.name),
                    );
                }
            }
        });
    }

    fn fan_out(&mut self, event: RouterEvent) {
        self.subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("Dropping event for slow client ID {id:}");
                true
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("Removing disconnected client ID {id:}");
                false
            }
        });
    }
}

type CommandResponse = Result<(), RouterError>;

/// Subscribes a client's bounded event channel. Events that arrive
/// while the channel is full are dropped for that client only.
#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct Subscribe {
    pub id: ClientId,
    pub events: Sender<RouterEvent>,
}

impl Handler<Subscribe> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::Subscribe {
                id: msg.id,
                events: msg.events,
            })
            .map_err(|e| {
                log::error!("Error sending subscribe to service {e:}");
                RouterError::ActorError
            })
    }
}

#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct Unsubscribe {
    pub id: ClientId,
}

impl Handler<Unsubscribe> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::Unsubscribe { id: msg.id })
            .map_err(|e| {
                log::error!("Error sending unsubscribe to service {e:}");
                RouterError::ActorError
            })
    }
}

/// Binds the inbound port and spawns the listener/router/resolver
/// tasks. A bind failure is reported as an ERROR log event plus a
/// FAILED status for every device; the handle stays valid and start
/// may be retried.
#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct StartRouter;

impl Handler<StartRouter> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, _msg: StartRouter, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::Start)
            .map_err(|_| RouterError::ActorError)
    }
}

/// Stops the routing tasks within a bounded wait. The address cache
/// and manual overrides survive; counters and rate state reset on the
/// next start.
#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct StopRouter;

impl Handler<StopRouter> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, _msg: StopRouter, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::Stop)
            .map_err(|_| RouterError::ActorError)
    }
}

/// Sets (`Some`) or clears (`None`) the manual address for one device.
/// While set, the router ignores the address cache for that device
/// entirely.
#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct SetManualAddress {
    pub device: String,
    pub addr: Option<IpAddr>,
}

impl Handler<SetManualAddress> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, msg: SetManualAddress, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::SetOverride {
                device: msg.device,
                addr: msg.addr,
            })
            .map_err(|_| RouterError::ActorError)
    }
}

/// Empties the address cache and, while running, queues re-resolution
/// for every configured discovery name.
#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct ClearCache;

impl Handler<ClearCache> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, _msg: ClearCache, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::ClearCache)
            .map_err(|_| RouterError::ActorError)
    }
}

/// Sends a test intensity to one device (or all when `device` is
/// `None`), holding it for `hold` before sending zero.
#[derive(Message)]
#[rtype(result = "CommandResponse")]
pub struct TestPulse {
    pub device: Option<String>,
    pub intensity: f32,
    pub hold: Duration,
}

impl Handler<TestPulse> for RouterHandle {
    type Result = CommandResponse;

    fn handle(&mut self, msg: TestPulse, _ctx: &mut Self::Context) -> Self::Result {
        self.0
            .send(RouterApi::TestPulse {
                device: msg.device,
                intensity: msg.intensity,
                hold: msg.hold,
            })
            .map_err(|_| RouterError::ActorError)
    }
}
