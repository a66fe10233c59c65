use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use auto_responder::api::control_routes;
use auto_responder::channels::BridgeClient;
use auto_responder::config::ResponderConfig;
use auto_responder::logging::init_logging;
use auto_responder::rules::{JsonRuleStore, RuleEngine};
use auto_responder::scheduler::AutoResponder;

const BRIDGE_HEALTH_ATTEMPTS: u32 = 30;
const BRIDGE_HEALTH_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ResponderConfig::from_env().context("invalid configuration")?;
    let log_guard = init_logging(&config.log_dir).context("failed to initialise logging")?;

    eprintln!("🤖 Auto Responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bridge: {}", config.bridge_url);
    eprintln!("   Rules: {}", config.rules_path.display());
    eprintln!("   Log: {}", log_guard.path().display());
    eprintln!(
        "   Control API: http://0.0.0.0:{}/api/auto-responder/status",
        config.control_port
    );

    // ── Bridge ──────────────────────────────────────────────────────────
    let bridge = Arc::new(BridgeClient::new(config.bridge_url.clone()));
    if let Err(e) = bridge
        .wait_until_healthy(BRIDGE_HEALTH_ATTEMPTS, BRIDGE_HEALTH_DELAY)
        .await
    {
        error!(error = %e, url = %config.bridge_url, "WhatsApp bridge is not available");
        return Err(e).context("WhatsApp bridge never became healthy");
    }

    // ── Rules ───────────────────────────────────────────────────────────
    let store = Arc::new(JsonRuleStore::new(config.rules_path.clone()));
    let engine = Arc::new(RuleEngine::load(store).await);
    info!(count = engine.len().await, "Rule engine ready");

    // ── Scheduler ───────────────────────────────────────────────────────
    let responder = Arc::new(AutoResponder::new(
        &config,
        engine,
        bridge.clone(),
        bridge,
    ));
    responder.start().await;

    // ── Control API ─────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.control_port))
        .await
        .with_context(|| format!("failed to bind control port {}", config.control_port))?;
    info!(port = config.control_port, "Control API listening");

    axum::serve(listener, control_routes(Arc::clone(&responder)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
        .context("control API server failed")?;

    responder.stop().await;
    info!("Auto responder exited");
    Ok(())
}
