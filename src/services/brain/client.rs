//! REST client for the BRAIN platform

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::messages::{AlphaPage, AlphaPayload, CheckResponse, CorrelationPayload, RecordSetPayload};
use crate::core::poller::PollState;
use crate::error::ServiceError;
use crate::models::{
    AlphaDetails, AlphaId, CorrelationResult, PoolKind, ReadinessReport, ReturnSeries, SyncScope,
};
use crate::services::registry::{AlphaRegistry, CorrelationService, RosterPage};

pub const DEFAULT_BASE_URL: &str = "https://api.worldquantbrain.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Response of one poll against a long-running endpoint
enum PollResponse {
    Pending(Option<Duration>),
    Ready { status: StatusCode, body: String },
}

pub struct BrainClient {
    base_url: Url,
    http: Client,
}

impl BrainClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ServiceError::from)?;
        Self::with_client(base_url, http)
    }

    /// Client authenticated with an existing session cookie
    pub fn with_session(base_url: impl AsRef<str>, cookie: &str) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ServiceError::Transport(format!("invalid session cookie: {}", e)))?;
        headers.insert(COOKIE, value);

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(ServiceError::from)?;
        Self::with_client(base_url, http)
    }

    pub fn with_client(base_url: impl AsRef<str>, http: Client) -> Result<Self, ServiceError> {
        let raw = base_url.as_ref();
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{}/", raw)
        };
        let base_url = Url::parse(&normalized).map_err(|e| ServiceError::InvalidResponse {
            endpoint: raw.to_string(),
            detail: format!("invalid base URL: {}", e),
        })?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ServiceError::InvalidResponse {
                endpoint: path.to_string(),
                detail: format!("invalid endpoint: {}", e),
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let url = self.endpoint(path)?;
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::Gone(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                endpoint: path.to_string(),
                body,
            });
        }
        let body = response.text().await?;
        decode(path, &body)
    }

    /// One GET against an endpoint that answers "not ready" until its result exists.
    ///
    /// 403 is passed through as a ready response; callers decide whether it
    /// carries a result.
    async fn poll(&self, path: &str) -> Result<PollResponse, ServiceError> {
        let url = self.endpoint(path)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());

        match status {
            StatusCode::NOT_FOUND => return Err(ServiceError::Gone(path.to_string())),
            StatusCode::FORBIDDEN => {}
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ServiceError::Status {
                    status: s.as_u16(),
                    endpoint: path.to_string(),
                    body,
                });
            }
            _ => {}
        }

        if status.is_success() {
            if let Some(delay) = retry_after {
                debug!(endpoint = %path, retry_after_ms = delay.as_millis() as u64, "BrainClient: {} pending", path);
                return Ok(PollResponse::Pending(Some(delay)));
            }
        }

        let body = response.text().await?;
        if status.is_success() && body.trim().is_empty() {
            return Ok(PollResponse::Pending(None));
        }
        Ok(PollResponse::Ready { status, body })
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::InvalidResponse {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })
}

/// `Retry-After` in (possibly fractional) seconds; zero means no hint
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    (seconds.is_finite() && seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}

fn forbidden(endpoint: &str, body: String) -> ServiceError {
    ServiceError::Status {
        status: StatusCode::FORBIDDEN.as_u16(),
        endpoint: endpoint.to_string(),
        body,
    }
}

#[async_trait]
impl AlphaRegistry for BrainClient {
    async fn list_accepted(
        &self,
        scope: &SyncScope,
        offset: usize,
        limit: usize,
    ) -> Result<RosterPage, ServiceError> {
        let query = [
            ("stage", "OS".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("order", "-dateSubmitted".to_string()),
            ("settings.region", scope.region.clone()),
        ];
        let page: AlphaPage = self.get_json("users/self/alphas", &query).await?;
        debug!(
            scope = %scope,
            offset = offset,
            rows = page.results.len(),
            total = page.count,
            "BrainClient: roster page at offset {}",
            offset
        );
        Ok(RosterPage {
            total: page.count,
            alphas: page.results.into_iter().map(AlphaPayload::into_details).collect(),
        })
    }

    async fn alpha_details(&self, alpha_id: &AlphaId) -> Result<AlphaDetails, ServiceError> {
        let payload: AlphaPayload = self
            .get_json(&format!("alphas/{}", alpha_id), &[])
            .await?;
        Ok(payload.into_details())
    }

    async fn poll_daily_returns(
        &self,
        alpha_id: &AlphaId,
    ) -> Result<PollState<ReturnSeries>, ServiceError> {
        let path = format!("alphas/{}/recordsets/daily-pnl", alpha_id);
        match self.poll(&path).await? {
            PollResponse::Pending(retry_after) => Ok(PollState::Pending { retry_after }),
            PollResponse::Ready { status, body } if status.is_success() => {
                let payload: RecordSetPayload = decode(&path, &body)?;
                Ok(PollState::Complete(payload.into_series(&path)?))
            }
            PollResponse::Ready { body, .. } => Err(forbidden(&path, body)),
        }
    }
}

#[async_trait]
impl CorrelationService for BrainClient {
    async fn poll_correlation(
        &self,
        alpha_id: &AlphaId,
        pool_kind: PoolKind,
    ) -> Result<PollState<CorrelationResult>, ServiceError> {
        let path = format!("alphas/{}/correlations/{}", alpha_id, pool_kind.as_str());
        match self.poll(&path).await? {
            PollResponse::Pending(retry_after) => Ok(PollState::Pending { retry_after }),
            PollResponse::Ready { status, body } if status.is_success() => {
                let payload: CorrelationPayload = decode(&path, &body)?;
                Ok(PollState::Complete(payload.into_result(pool_kind)))
            }
            PollResponse::Ready { body, .. } => Err(forbidden(&path, body)),
        }
    }

    async fn poll_readiness(
        &self,
        alpha_id: &AlphaId,
    ) -> Result<PollState<ReadinessReport>, ServiceError> {
        let path = format!("alphas/{}/check", alpha_id);
        match self.poll(&path).await? {
            PollResponse::Pending(retry_after) => Ok(PollState::Pending { retry_after }),
            PollResponse::Ready { status, body } => {
                // 403 carries the resolved checks when some of them failed
                let rejected = status == StatusCode::FORBIDDEN;
                match decode::<CheckResponse>(&path, &body) {
                    Ok(response) => Ok(PollState::Complete(response.into_report(alpha_id, rejected))),
                    Err(_) if rejected => {
                        warn!(alpha_id = %alpha_id, "BrainClient: check for {} forbidden without a check payload", alpha_id);
                        Err(forbidden(&path, body))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}
