use backon::{ConstantBuilder, Retryable};
use devstack_core::{ReadinessConfig, ReadinessResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Endpoint answered, but not with a success status (or not at all).
struct NotReady;

/// Polls an HTTP endpoint at a fixed interval until it answers 2xx or the
/// configured timeout elapses.
///
/// Connection failures are the normal case while a service boots and are
/// swallowed; only `Ready`, `TimedOut`, or a cancellation (`NotYetReady`)
/// come back out. Per-request timeout equals the polling interval so a
/// hanging endpoint cannot stall the schedule.
pub struct ReadinessProbe {
    client: reqwest::Client,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wait for the endpoint to become ready.
    ///
    /// Resolves `NotYetReady` promptly when `cancel` fires; no requests are
    /// issued after cancellation.
    pub async fn wait_until_ready(
        &self,
        config: &ReadinessConfig,
        cancel: &CancellationToken,
    ) -> ReadinessResult {
        if !config.initial_delay().is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return ReadinessResult::NotYetReady,
                _ = tokio::time::sleep(config.initial_delay()) => {}
            }
        }

        info!(
            url = %config.url,
            interval_ms = config.interval_ms,
            timeout_ms = config.timeout_ms,
            "Polling for readiness"
        );

        // One attempt per interval; the outer deadline is the authority,
        // the schedule only stops a fast-failing endpoint from spinning.
        let retries = (config.timeout_ms / config.interval_ms).max(1) as usize;
        let schedule = ConstantBuilder::default()
            .with_delay(config.interval())
            .with_max_times(retries);

        let poll = || self.check_once(config);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(url = %config.url, "Readiness wait cancelled");
                ReadinessResult::NotYetReady
            }
            outcome = tokio::time::timeout(config.timeout(), poll.retry(schedule)) => {
                match outcome {
                    Ok(Ok(())) => {
                        info!(url = %config.url, "Endpoint is ready");
                        ReadinessResult::Ready
                    }
                    Ok(Err(NotReady)) | Err(_) => ReadinessResult::TimedOut,
                }
            }
        }
    }

    async fn check_once(&self, config: &ReadinessConfig) -> Result<(), NotReady> {
        match self
            .client
            .get(&config.url)
            .timeout(config.interval())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                debug!(url = %config.url, status = %response.status(), "Endpoint not ready yet");
                Err(NotReady)
            }
            Err(_) => {
                // Not listening yet; expected while the service boots
                Err(NotReady)
            }
        }
    }
}
