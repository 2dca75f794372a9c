use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on the first SIGINT or SIGTERM. Returns early, without
/// cancelling, when the token is cancelled elsewhere first.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::signal::ctrl_c() => {
                        sw_info!(sys, signal = "SIGINT", "received signal, stopping input");
                    }
                    _ = sigterm.recv() => {
                        sw_info!(sys, signal = "SIGTERM", "received signal, stopping input");
                    }
                }
                cancel.cancel();
                return;
            }
            Err(e) => {
                sw_warn!(sys, error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            }
        }
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                sw_warn!(sys, error = %e, "Ctrl-C handler unavailable");
                return;
            }
            sw_info!(sys, signal = "SIGINT", "received signal, stopping input");
            cancel.cancel();
        }
    }
}
