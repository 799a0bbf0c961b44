use futures::StreamExt;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use haptd::{event::render, HaptdError};
use hapt_router::{RouterConfig, StartRouter, StopRouter, Subscribe};

#[actix::main]
async fn main() -> Result<(), HaptdError> {
    LogTracer::init().expect("Unable to set up log tracer");

    let sub = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(sub).expect("Unable to set up tracing subscriber");

    let handle = hapt_router::router(RouterConfig::default()).await?;

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(1024);
    handle
        .send(Subscribe {
            id: 0,
            events: events_tx,
        })
        .await??;
    handle.send(StartRouter).await??;

    let mut events = ReceiverStream::new(events_rx);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupt received, stopping router");
                handle.send(StopRouter).await??;
                break;
            }
            event = events.next() => match event {
                Some(event) => render(&event),
                None => break,
            },
        }
    }

    // Pick up the stop-state events before exiting
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.next()).await
    {
        render(&event);
    }

    Ok(())
}
