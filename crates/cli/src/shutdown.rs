use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Gate between ticks of `export run` / `import run`. A signal never
/// interrupts a tick: the loop asks the gate before each tick and while it
/// waits for the next one, so the session is always persisted at a step
/// boundary when the process exits.
#[derive(Clone)]
pub struct TickGate {
    stop: CancellationToken,
}

impl TickGate {
    /// Creates the gate and starts listening for SIGINT and SIGTERM.
    pub fn listen() -> Self {
        let gate = Self {
            stop: CancellationToken::new(),
        };
        let stop = gate.stop.clone();
        tokio::spawn(async move {
            let signal_name = wait_for_signal().await;
            info!(signal = signal_name, "Stopping after the current tick");
            stop.cancel();
        });
        gate
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Sleeps for `delay` unless a stop arrives first. Returns false when the
    /// loop should not issue another tick.
    pub async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.stop_requested();
        }
        tokio::select! {
            _ = self.stop.cancelled() => false,
            _ = tokio::time::sleep(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "Next tick");
                true
            }
        }
    }
}

async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Process exit status of `relocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failed = 1,
    /// 128 + SIGINT, so wrappers can tell a resumable stop from a failure.
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
