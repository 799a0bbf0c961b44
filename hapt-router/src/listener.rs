use tokio::{
    net::UdpSocket,
    sync::{mpsc::UnboundedSender, watch},
};

use crate::{
    event::{EventSink, LogLevel},
    osc,
};

// Large enough for any realistic avatar-parameter bundle
const MAX_DATAGRAM: usize = 1536;

/// Receive loop for the inbound OSC port. Decodes each datagram into
/// (address, value) pairs and forwards them to the router's intake
/// channel; malformed packets are dropped without an event. The socket
/// is bound by the caller so bind failures surface before this task
/// exists, and it is released on exit.
pub(crate) async fn run(
    socket: UdpSocket,
    intake: UnboundedSender<(String, f32)>,
    sink: EventSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, _from)) => match osc::decode(&buf[..len]) {
                    Ok(pairs) => {
                        for pair in pairs {
                            if intake.send(pair).is_err() {
                                log::debug!("router intake closed, listener exiting");
                                return;
                            }
                        }
                    }
                    Err(e) => log::trace!("dropping malformed datagram: {e:}"),
                },
                Err(e) => {
                    sink.log(LogLevel::Error, format!("Listener socket error: {e}"));
                    break;
                }
            }
        }
    }
    log::debug!("listener task exiting");
}
