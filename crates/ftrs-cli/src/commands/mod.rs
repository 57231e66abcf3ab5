pub mod client;
pub mod devnet;
pub mod gfd;
pub mod lfd;
pub mod rm;
pub mod server;

/// Blocks until Ctrl-C, logging the component identity so multi-component
/// `devnet` output stays attributable.
pub(crate) async fn wait_for_shutdown_signal(component: &str) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(component, error = %err, "failed to install ctrl-c handler, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!(component, "shutdown requested");
}
