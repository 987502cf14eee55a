mod capabilities;
mod config;
mod credentials;
mod errors;
mod models;
mod orchestrator;
mod providers;
mod scenes;
mod session;
mod sse;
mod util;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::{
    capabilities::ImageGenerator,
    credentials::CredentialGate,
    errors::Result,
    orchestrator::SessionController,
    util::LocalTimer,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = config::AppConfig::load()?;
    let bind_addr = config.server.bind_addr;

    let gate = Arc::new(CredentialGate::from_config(
        &config.gemini,
        &config.credentials,
    ));
    let renderer = Arc::new(ImageGenerator::new(config.gemini.clone(), gate.clone()));

    let (broadcaster, _bus_rx) = crate::sse::message_bus();
    let (command_tx, mut command_rx) = mpsc::channel(64);

    let mut controller =
        SessionController::new(gate, renderer, command_tx.clone(), Some(broadcaster.clone()))
            .await;

    let app = crate::sse::router(broadcaster, command_tx, config.server.max_upload_bytes);
    let server_task = tokio::spawn(async move {
        if let Err(err) = crate::sse::run_server(bind_addr, app).await {
            error!(target: "server", error = ?err, "HTTP 服务异常退出");
        }
    });

    info!(
        target: "server",
        model = %config.gemini.model,
        "穿越中华已准备就绪: http://{bind_addr}"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: "server", "收到退出信号，准备关闭");
                break;
            }
            command = command_rx.recv() => {
                match command {
                    Some(command) => controller.handle(command).await,
                    None => {
                        error!(target: "server", "命令通道已关闭");
                        break;
                    }
                }
            }
        }
    }

    controller.shutdown();
    server_task.abort();

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_timer(LocalTimer)
        .init();

    info!("tracing initialized");
}
