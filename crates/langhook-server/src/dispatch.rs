//! Webhook channel dispatch with bounded retry.
//!
//! Retries 5xx and connect errors with exponential backoff (1s, 4s, 16s);
//! any other 4xx is treated as a final outcome on the first attempt, except
//! 408 and 429 which are retried like a 5xx.

use std::time::Duration;

use serde_json::Value;

const BACKOFFS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(4),
    Duration::from_secs(16),
];

/// Outcome of a webhook POST attempt sequence.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub sent: bool,
    pub last_status: Option<u16>,
}

fn should_retry(status: Option<u16>) -> bool {
    match status {
        None => true, // connect/transport error
        Some(408) | Some(429) => true,
        Some(s) if (500..600).contains(&s) => true,
        Some(_) => false,
    }
}

/// POST `body` to `url`, retrying per the schedule above. Each attempt uses
/// its own request; no request is reused across retries since the HTTP
/// client may have consumed the body stream.
pub async fn dispatch_webhook(client: &reqwest::Client, url: &str, body: &Value) -> DispatchOutcome {
    let mut last_status: Option<u16> = None;

    for (attempt, backoff) in std::iter::once(None)
        .chain(BACKOFFS.into_iter().map(Some))
        .enumerate()
    {
        if let Some(delay) = backoff {
            tokio::time::sleep(delay).await;
        }

        match client.post(url).json(body).send().await {
            Ok(response) => {
                let status = response.status();
                last_status = Some(status.as_u16());
                if status.is_success() {
                    return DispatchOutcome {
                        sent: true,
                        last_status,
                    };
                }
                if !should_retry(last_status) {
                    tracing::warn!(url, status = status.as_u16(), attempt, "webhook dispatch failed, not retrying");
                    return DispatchOutcome {
                        sent: false,
                        last_status,
                    };
                }
            }
            Err(err) => {
                tracing::warn!(url, attempt, error = %err, "webhook dispatch transport error");
                last_status = None;
            }
        }
    }

    DispatchOutcome {
        sent: false,
        last_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_5xx_and_408_429() {
        assert!(should_retry(Some(500)));
        assert!(should_retry(Some(503)));
        assert!(should_retry(Some(408)));
        assert!(should_retry(Some(429)));
        assert!(should_retry(None));
    }

    #[test]
    fn does_not_retry_other_4xx() {
        assert!(!should_retry(Some(400)));
        assert!(!should_retry(Some(404)));
        assert!(!should_retry(Some(401)));
    }
}
