use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Returns a token that is cancelled on SIGTERM or SIGINT.
///
/// The dispatch loop watches this token and returns on cancellation.
/// In-flight job lifecycles are deliberately left to unwind through worker
/// completion.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt, shutting down");
            }
        }

        trigger.cancel();
    });

    token
}
