//! Fixed retry schedule for transient provider failures.
//!
//! Unlike `node-sdk`'s reconnect backoff (exponential with jitter, unbounded
//! attempts), the chat provider retries on an exact, bounded schedule: wait
//! 0s, 1s, 2s, 4s between the four attempts, then give up. A rate limit or
//! a flaky 5xx the provider recovers from inside a few seconds succeeds
//! silently; anything that doesn't surfaces as `ProviderPermanent`.

use tf_domain::error::Error;
use tf_domain::trace::TraceEvent;

pub(crate) const RETRY_DELAYS_MS: [u64; 4] = [0, 1_000, 2_000, 4_000];

/// Whether an HTTP status is worth retrying.
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status.as_u16() == 429
}

/// Whether a `reqwest::Error` (no response received at all) is worth retrying.
pub(crate) fn is_transient_transport_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// Run `attempt` on the fixed retry schedule. `attempt` returns
/// `Ok(response)` or `Err((error, transient))`; a `transient` error is
/// retried while attempts remain, a non-transient one fails immediately.
pub(crate) async fn with_fixed_schedule<F, Fut>(provider_id: &str, mut attempt: F) -> Result<reqwest::Response, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, (Error, bool)>>,
{
    let mut last_err = None;
    for (idx, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        if *delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
        }
        match attempt().await {
            Ok(resp) => return Ok(resp),
            Err((err, transient)) => {
                if !transient {
                    return Err(err);
                }
                tracing::warn!(
                    provider = provider_id,
                    attempt = idx + 1,
                    delay_ms,
                    error = %err,
                    "provider call failed, retrying"
                );
                TraceEvent::LlmRetry {
                    provider: provider_id.to_string(),
                    attempt: (idx + 1) as u32,
                    delay_ms: *delay_ms,
                    reason: err.to_string(),
                }
                .emit();
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Provider {
        provider: provider_id.to_string(),
        message: "retry schedule exhausted".into(),
    }))
}
