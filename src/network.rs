//! HTTP reachability probe: parallel bounded-deadline endpoint batch,
//! reduced by majority vote to a single connectivity verdict

use std::collections::HashMap;
use std::error::Error as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::status::{InternetStatus, IpFamily, TransportError};

/// Default per-batch probe deadline in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Outcome of one probe batch
#[derive(Clone, Debug)]
pub struct ProbeVerdict {
    pub status: InternetStatus,
    /// Captive-portal candidate from a 302 Location header (last one wins)
    pub portal_url: Option<String>,
    /// Most recent transport failure in the batch, input to the DNS re-check
    pub last_error: TransportError,
}

impl ProbeVerdict {
    pub fn unavailable() -> Self {
        Self {
            status: InternetStatus::NotAvailable,
            portal_url: None,
            last_error: TransportError::None,
        }
    }
}

/// Reachability seam; the production impl issues real HTTP requests
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Probe every endpoint for one IP family within the configured deadline
    async fn probe(&self, endpoints: &[String], family: IpFamily) -> ProbeVerdict;
}

/// One completed HTTP attempt
struct Attempt {
    code: Option<u16>,
    location: Option<String>,
    error: Option<TransportError>,
}

/// HTTP probe against generate_204-style endpoints
pub struct HttpProbe {
    timeout: Duration,
    use_head: bool,
}

impl HttpProbe {
    pub fn new(timeout: Duration, use_head: bool) -> Self {
        Self { timeout, use_head }
    }

    fn build_client(&self, family: IpFamily) -> reqwest::Result<reqwest::Client> {
        let builder = reqwest::Client::builder()
            // 302 must stay observable, and every probe must reflect the
            // current path rather than a pooled connection or cached body
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(0);
        let builder = match family {
            IpFamily::V4 => builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            IpFamily::V6 => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            IpFamily::Unspecified => builder,
        };
        builder.build()
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self, endpoints: &[String], family: IpFamily) -> ProbeVerdict {
        if endpoints.is_empty() {
            tracing::debug!("No probe endpoints configured, reporting not-available");
            return ProbeVerdict::unavailable();
        }

        let client = match self.build_client(family) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client ({}): {}", family, e);
                let mut verdict = ProbeVerdict::unavailable();
                verdict.last_error = TransportError::Other;
                return verdict;
            }
        };

        let deadline = Instant::now() + self.timeout;
        let use_head = self.use_head;
        let mut batch = JoinSet::new();
        for url in endpoints {
            let client = client.clone();
            let url = url.clone();
            batch.spawn(async move {
                // Endpoints issued later get the budget that is left
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Attempt {
                        code: None,
                        location: None,
                        error: Some(TransportError::TimedOut),
                    };
                }
                let request = if use_head {
                    client.head(&url)
                } else {
                    client.get(&url)
                };
                let result = request
                    .header(header::CACHE_CONTROL, "no-cache")
                    .header(header::CONNECTION, "close")
                    .timeout(remaining)
                    .send()
                    .await;
                match result {
                    Ok(resp) => {
                        let code = resp.status().as_u16();
                        let location = if code == 302 {
                            resp.headers()
                                .get(header::LOCATION)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string)
                        } else {
                            None
                        };
                        tracing::debug!("Probe {} -> {}", url, code);
                        Attempt {
                            code: Some(code),
                            location,
                            error: None,
                        }
                    }
                    Err(e) => {
                        let error = classify_error(&e);
                        tracing::debug!("Probe {} failed: {:?} ({})", url, error, e);
                        Attempt {
                            code: None,
                            location: None,
                            error: Some(error),
                        }
                    }
                }
            });
        }

        let mut codes = Vec::with_capacity(endpoints.len());
        let mut portal_url = None;
        let mut last_error = TransportError::None;
        while let Some(joined) = batch.join_next().await {
            let Ok(attempt) = joined else { continue };
            if let Some(code) = attempt.code {
                codes.push(code);
            }
            if let Some(loc) = attempt.location {
                portal_url = Some(loc);
            }
            if let Some(err) = attempt.error {
                last_error = err;
            }
        }

        let status = reduce_codes(&codes);
        tracing::debug!(
            "Probe batch ({}): {} endpoint(s), {} response(s), verdict {}",
            family,
            endpoints.len(),
            codes.len(),
            status
        );
        ProbeVerdict {
            status,
            portal_url,
            last_error,
        }
    }
}

/// Majority-vote reduction: the response code covering >= 50% of collected
/// responses decides the verdict; no majority (or no responses) reads as
/// not-available. Ties break toward the numerically larger code so the
/// result is independent of collection order.
pub fn reduce_codes(codes: &[u16]) -> InternetStatus {
    if codes.is_empty() {
        return InternetStatus::NotAvailable;
    }
    let mut counts: HashMap<u16, usize> = HashMap::new();
    for &code in codes {
        *counts.entry(code).or_insert(0) += 1;
    }
    let (majority_code, count) = counts
        .into_iter()
        .max_by_key(|&(code, count)| (count, code))
        .unwrap();
    if count * 2 < codes.len() {
        return InternetStatus::NotAvailable;
    }
    InternetStatus::from_response_code(majority_code)
}

fn classify_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::TimedOut;
    }
    if err.is_connect() {
        // getaddrinfo failures surface inside the connect error chain
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string().to_ascii_lowercase();
            if text.contains("dns") || text.contains("resolve") {
                return TransportError::CouldNotResolveHost;
            }
            source = cause.source();
        }
        return TransportError::ConnectFailed;
    }
    if err.is_body() || err.is_decode() {
        return TransportError::RecvError;
    }
    TransportError::Other
}
