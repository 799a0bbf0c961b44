use std::time::Duration;

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    log::info!("Initializing router");

    let handle = hapt_router::router(hapt_router::RouterConfig::default())
        .await
        .map_err(|e| {
            log::error!("Error creating router & handle {e:}");
            e
        })?;

    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(1024);
    handle
        .send(hapt_router::Subscribe {
            id: 0,
            events: events_tx,
        })
        .await??;
    handle.send(hapt_router::StartRouter).await??;
    handle
        .send(hapt_router::TestPulse {
            device: None,
            intensity: 0.5,
            hold: Duration::from_millis(250),
        })
        .await??;

    // Let the pulse and the first resolution sweep play out, then stop
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events_rx.recv()).await {
        log::info!("{event:?}");
    }

    handle.send(hapt_router::StopRouter).await??;

    Ok(())
}
