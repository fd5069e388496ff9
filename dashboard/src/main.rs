use anyhow::Result;
use lib_livefeed::{FeedService, WsTransport};
use tokio::signal;

mod api;
mod config;
mod logger;
mod views;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::load_config();
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;

    let api = api::ApiClient::new(&settings.server_url)?;
    let transport = WsTransport::new(&settings.server_url, &settings.ws_path, settings.heartbeat())?;
    let feed = FeedService::new(transport, settings.reconnect_policy());

    log::info!("connecting to {}", settings.server_url);
    feed.connect().await?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let mut view_tasks = Vec::new();

    if let Some(session_id) = settings.watch_session {
        view_tasks.push(tokio::spawn(views::session_detail(
            feed.clone(),
            api.clone(),
            session_id,
            shutdown_tx.subscribe(),
        )));
    } else {
        view_tasks.push(tokio::spawn(views::session_board(
            feed.clone(),
            api.clone(),
            settings.session_filter(),
            shutdown_tx.subscribe(),
        )));
        view_tasks.push(tokio::spawn(views::employee_roster(
            feed.clone(),
            api.clone(),
            shutdown_tx.subscribe(),
        )));
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    for task in view_tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("view task failed: {e:#}"),
            Err(e) => log::error!("view task panicked: {e}"),
        }
    }

    feed.disconnect().await?;
    log::info!("Shutdown complete.");
    Ok(())
}
