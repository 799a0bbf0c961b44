use hapt_router::{LogLevel, RouterEvent};

/// Renders one router event as a log line. Per-message traffic
/// (status, counters, last message) lands at debug so an idle terminal
/// is not flooded at avatar-parameter rates; state changes and log
/// events keep their severity.
pub fn render(event: &RouterEvent) {
    match event {
        RouterEvent::LogUpdate { message, level } => match level {
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
            LogLevel::Success => log::info!("[{level}] {message}"),
            LogLevel::Info => log::info!("{message}"),
        },
        RouterEvent::StatusUpdate {
            device,
            addr,
            intensity,
            state,
        } => match addr {
            Some(addr) => log::debug!("{device} [{state}] {addr} intensity {intensity:.2}"),
            None => log::debug!("{device} [{state}] --- intensity {intensity:.2}"),
        },
        RouterEvent::CounterUpdate { received, routed } => {
            log::debug!("Received: {received} Routed: {routed}");
        }
        RouterEvent::LastMessageUpdate { address, value } => {
            log::debug!("Last OSC message: {address} = {value:.2}");
        }
        RouterEvent::ResolveUpdate { device, addr } => {
            log::info!("Address updated for {device} to {addr}");
        }
    }
}
