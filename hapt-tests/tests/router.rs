//! End-to-end tests over real loopback sockets: OSC datagrams in on
//! the listen port, routed intensity datagrams captured on a fake
//! device socket, events observed through a subscribed channel.

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};
use tokio::{net::UdpSocket, sync::mpsc::Receiver};

use hapt_router::{
    osc, router_with_lookup, DeviceState, HostLookup, LogLevel, LogicalDevice, LookupError,
    RouterConfig, RouterEvent, SendMode, SetManualAddress, StartRouter, StopRouter, Subscribe,
    TestPulse,
};

struct StaticLookup(IpAddr);

impl HostLookup for StaticLookup {
    fn lookup(&self, _host: &str) -> Result<IpAddr, LookupError> {
        Ok(self.0)
    }
}

struct FailingLookup;

impl HostLookup for FailingLookup {
    fn lookup(&self, host: &str) -> Result<IpAddr, LookupError> {
        Err(LookupError::NoRecords(host.to_string()))
    }
}

fn config(listen_port: u16, send_port: u16) -> RouterConfig {
    RouterConfig {
        listen_port,
        send_port,
        devices: vec![LogicalDevice::new("Head")],
        resolver_poll: Duration::from_millis(50),
        sweep_pause: Duration::from_millis(5),
        ..RouterConfig::default()
    }
}

async fn wait_for(
    events: &mut Receiver<RouterEvent>,
    pred: impl Fn(&RouterEvent) -> bool,
) -> RouterEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drains events arriving within the window.
async fn collect_for(events: &mut Receiver<RouterEvent>, window: Duration) -> Vec<RouterEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        collected.push(event);
    }
    collected
}

async fn captured_values(capture: &UdpSocket) -> Vec<f32> {
    let mut buf = [0u8; 256];
    let mut values = Vec::new();
    while let Ok(Ok((len, _))) =
        tokio::time::timeout(Duration::from_millis(300), capture.recv_from(&mut buf)).await
    {
        for (_, value) in osc::decode(&buf[..len]).expect("captured datagram must decode") {
            values.push(value);
        }
    }
    values
}

fn started(event: &RouterEvent) -> bool {
    matches!(event, RouterEvent::LogUpdate { message, .. } if message.contains("OSC server started"))
}

#[actix::test]
async fn routes_rate_limited_sequence_to_manual_address() {
    let capture = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let send_port = capture.local_addr().unwrap().port();
    let listen_port = 47411;

    let handle = router_with_lookup(config(listen_port, send_port), Arc::new(FailingLookup))
        .await
        .unwrap();

    let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
    handle
        .send(Subscribe {
            id: 0,
            events: events_tx,
        })
        .await
        .unwrap()
        .unwrap();
    handle
        .send(SetManualAddress {
            device: "Head".to_string(),
            addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        })
        .await
        .unwrap()
        .unwrap();
    handle.send(StartRouter).await.unwrap().unwrap();
    wait_for(&mut events, started).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for value in [0.0f32, 0.01, 0.02, 0.05, 0.06, 0.0] {
        client
            .send_to(
                &osc::encode_float("/avatar/parameters/Receiver_Head", value),
                ("127.0.0.1", listen_port),
            )
            .await
            .unwrap();
    }

    assert_eq!(captured_values(&capture).await, vec![0.0, 0.01, 0.05, 0.0]);

    // all status updates carried the manual address
    let seen = collect_for(&mut events, Duration::from_millis(200)).await;
    assert!(seen.iter().any(|event| matches!(
        event,
        RouterEvent::StatusUpdate {
            state: DeviceState::Manual,
            addr: Some(addr),
            ..
        } if *addr == IpAddr::V4(Ipv4Addr::LOCALHOST)
    )));

    handle.send(StopRouter).await.unwrap().unwrap();
    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::StatusUpdate {
                state: DeviceState::Stopped,
                ..
            }
        )
    })
    .await;

    // restart: counters report zero again and the listener rebinds
    handle.send(StartRouter).await.unwrap().unwrap();
    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::CounterUpdate {
                received: 0,
                routed: 0
            }
        )
    })
    .await;
    wait_for(&mut events, started).await;
}

#[actix::test]
async fn unresolvable_device_warns_once_and_stays_offline() {
    let capture = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let send_port = capture.local_addr().unwrap().port();
    let listen_port = 47412;

    let handle = router_with_lookup(config(listen_port, send_port), Arc::new(FailingLookup))
        .await
        .unwrap();

    let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
    handle
        .send(Subscribe {
            id: 0,
            events: events_tx,
        })
        .await
        .unwrap()
        .unwrap();

    // Resolved once manually, then cleared: the device was online and
    // now transitions offline
    handle
        .send(SetManualAddress {
            device: "Head".to_string(),
            addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        })
        .await
        .unwrap()
        .unwrap();
    handle.send(StartRouter).await.unwrap().unwrap();
    wait_for(&mut events, started).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let datagram = osc::encode_float("/avatar/parameters/Receiver_Head", 0.8);
    client
        .send_to(&datagram, ("127.0.0.1", listen_port))
        .await
        .unwrap();
    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::StatusUpdate {
                state: DeviceState::Manual,
                ..
            }
        )
    })
    .await;
    assert_eq!(captured_values(&capture).await, vec![0.8]);

    handle
        .send(SetManualAddress {
            device: "Head".to_string(),
            addr: None,
        })
        .await
        .unwrap()
        .unwrap();
    // the clear is acknowledged before more traffic flows
    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::StatusUpdate {
                state: DeviceState::Unknown,
                ..
            }
        )
    })
    .await;

    for _ in 0..5 {
        client
            .send_to(&datagram, ("127.0.0.1", listen_port))
            .await
            .unwrap();
    }

    let seen = collect_for(&mut events, Duration::from_millis(400)).await;
    let warnings = seen
        .iter()
        .filter(|event| {
            matches!(
                event,
                RouterEvent::LogUpdate {
                    level: LogLevel::Warn,
                    message,
                } if message.contains("status lost")
            )
        })
        .count();
    assert_eq!(warnings, 1);

    let offline = seen
        .iter()
        .filter(|event| {
            matches!(
                event,
                RouterEvent::StatusUpdate {
                    state: DeviceState::Offline,
                    ..
                }
            )
        })
        .count();
    assert_eq!(offline, 5);

    // nothing was transmitted while offline
    assert!(captured_values(&capture).await.is_empty());
}

#[actix::test]
async fn background_resolution_brings_device_online() {
    let capture = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let send_port = capture.local_addr().unwrap().port();
    let listen_port = 47413;

    let handle = router_with_lookup(
        config(listen_port, send_port),
        Arc::new(StaticLookup(IpAddr::V4(Ipv4Addr::LOCALHOST))),
    )
    .await
    .unwrap();

    let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
    handle
        .send(Subscribe {
            id: 0,
            events: events_tx,
        })
        .await
        .unwrap()
        .unwrap();
    handle.send(StartRouter).await.unwrap().unwrap();
    wait_for(&mut events, started).await;

    match wait_for(&mut events, |event| {
        matches!(event, RouterEvent::ResolveUpdate { .. })
    })
    .await
    {
        RouterEvent::ResolveUpdate { device, addr } => {
            assert_eq!(device, "Head");
            assert_eq!(addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        _ => unreachable!(),
    }

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(
            &osc::encode_float("/avatar/parameters/Receiver_Head", 0.9),
            ("127.0.0.1", listen_port),
        )
        .await
        .unwrap();

    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::StatusUpdate {
                state: DeviceState::Online,
                ..
            }
        )
    })
    .await;
    assert_eq!(captured_values(&capture).await, vec![0.9]);
}

#[actix::test]
async fn test_pulse_sends_hold_then_zero() {
    let capture = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let send_port = capture.local_addr().unwrap().port();
    let listen_port = 47414;

    let handle = router_with_lookup(config(listen_port, send_port), Arc::new(FailingLookup))
        .await
        .unwrap();

    let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
    handle
        .send(Subscribe {
            id: 0,
            events: events_tx,
        })
        .await
        .unwrap()
        .unwrap();
    handle
        .send(SetManualAddress {
            device: "Head".to_string(),
            addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        })
        .await
        .unwrap()
        .unwrap();

    // test pulses work without the router running
    handle
        .send(TestPulse {
            device: Some("Head".to_string()),
            intensity: 0.5,
            hold: Duration::from_millis(50),
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(captured_values(&capture).await, vec![0.5, 0.0]);
    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::LogUpdate {
                level: LogLevel::Success,
                message,
            } if message.contains("TEST: Sent")
        )
    })
    .await;
}

#[actix::test]
async fn broadcast_mode_makes_identical_routing_decisions() {
    // The same intake sequence through both addressing modes; only the
    // wire destination and path differ, never the decisions
    let mut routed_by_mode = Vec::new();

    for (mode, listen_port) in [(SendMode::Unicast, 47416), (SendMode::Broadcast, 47417)] {
        let capture = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let send_port = capture.local_addr().unwrap().port();

        let mut config = config(listen_port, send_port);
        config.mode = mode;

        let handle = router_with_lookup(config, Arc::new(FailingLookup))
            .await
            .unwrap();

        let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
        handle
            .send(Subscribe {
                id: 0,
                events: events_tx,
            })
            .await
            .unwrap()
            .unwrap();
        handle
            .send(SetManualAddress {
                device: "Head".to_string(),
                addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            })
            .await
            .unwrap()
            .unwrap();
        handle.send(StartRouter).await.unwrap().unwrap();
        wait_for(&mut events, started).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for value in [0.0f32, 0.01, 0.02, 0.05, 0.06, 0.0] {
            client
                .send_to(
                    &osc::encode_float("/avatar/parameters/Receiver_Head", value),
                    ("127.0.0.1", listen_port),
                )
                .await
                .unwrap();
        }

        let counters = wait_for(&mut events, |event| {
            matches!(event, RouterEvent::CounterUpdate { received: 6, .. })
        })
        .await;
        if let RouterEvent::CounterUpdate { routed, .. } = counters {
            routed_by_mode.push(routed);
        }

        handle.send(StopRouter).await.unwrap().unwrap();
    }

    assert_eq!(routed_by_mode, vec![4, 4]);
}

#[actix::test]
async fn bind_failure_surfaces_and_start_can_be_retried() {
    let listen_port = 47415;
    let blocker = UdpSocket::bind(("0.0.0.0", listen_port)).await.unwrap();

    let capture = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let send_port = capture.local_addr().unwrap().port();

    let handle = router_with_lookup(config(listen_port, send_port), Arc::new(FailingLookup))
        .await
        .unwrap();

    let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
    handle
        .send(Subscribe {
            id: 0,
            events: events_tx,
        })
        .await
        .unwrap()
        .unwrap();
    handle.send(StartRouter).await.unwrap().unwrap();

    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::LogUpdate {
                level: LogLevel::Error,
                message,
            } if message.contains("Failed to start OSC listener")
        )
    })
    .await;
    wait_for(&mut events, |event| {
        matches!(
            event,
            RouterEvent::StatusUpdate {
                state: DeviceState::Failed,
                ..
            }
        )
    })
    .await;

    // operator frees the port and retries
    drop(blocker);
    handle.send(StartRouter).await.unwrap().unwrap();
    wait_for(&mut events, started).await;

    handle.send(StopRouter).await.unwrap().unwrap();
}
