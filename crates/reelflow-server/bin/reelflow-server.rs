use reelflow_server::Application;

/// Starts Reelflow's HTTP API, in-process worker runtime, and daily
/// cleanup task, and runs until a termination signal is received.
///
/// ```bash
/// cargo run --bin reelflow-server
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = Application::new().await?;
    app.start().await?;
    wait_for_shutdown_signal().await;
    app.shutdown().await
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
