//! Signal-driven restart of the script runtime
//!
//! SIGUSR2 bumps a counter in a watch channel. The host polls the receiver
//! once per tick with `has_changed` / `borrow_and_update` and runs the full
//! restart path (teardown all, re-scan, reload) when the counter moves, so
//! signals arriving faster than the tick rate collapse into one restart.

use tokio::sync::watch;
use tracing::{error, info};

/// Register a SIGUSR2 handler and return the restart counter.
///
/// Must be called from within a tokio runtime. Registration failure is
/// logged and leaves a counter that never changes; the host keeps running
/// without signal-driven restarts.
#[cfg(unix)]
pub fn setup_restart_signal() -> watch::Receiver<u64> {
    use tokio::signal::unix::{signal, SignalKind};

    let (restart_tx, restart_rx) = watch::channel(0u64);

    match signal(SignalKind::user_defined2()) {
        Ok(mut sigusr2) => {
            tokio::spawn(async move {
                while sigusr2.recv().await.is_some() {
                    info!(target: "scripting", "SIGUSR2 received, requesting script restart");
                    let restarts = *restart_tx.borrow() + 1;
                    if restart_tx.send(restarts).is_err() {
                        break;
                    }
                }
            });
        }
        Err(e) => {
            error!(target: "scripting", "failed to register SIGUSR2 handler: {}", e);
        }
    }

    restart_rx
}

/// SIGUSR2 does not exist off Unix; the counter simply never changes.
#[cfg(not(unix))]
pub fn setup_restart_signal() -> watch::Receiver<u64> {
    let (restart_tx, restart_rx) = watch::channel(0u64);
    tracing::warn!(target: "scripting", "signal-driven restart is unavailable on this platform");
    std::mem::forget(restart_tx);
    restart_rx
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigusr2_bumps_the_restart_counter() {
        let mut restart_rx = setup_restart_signal();
        assert!(!restart_rx.has_changed().unwrap());

        let pid = std::process::id().to_string();
        std::process::Command::new("kill")
            .args(["-USR2", &pid])
            .status()
            .expect("kill runs");

        tokio::time::timeout(Duration::from_secs(5), restart_rx.changed())
            .await
            .expect("signal observed before the deadline")
            .expect("sender alive");
        assert_eq!(*restart_rx.borrow_and_update(), 1);
    }
}
