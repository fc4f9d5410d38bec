use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::SessionStore;
use crate::error::StoreError;
use crate::session::{NewSession, Session};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`RemoteSessionStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClearResponse {
    deleted: u64,
}

/// REST-backed [`SessionStore`].
///
/// Each instance carries its own client and token; nothing is shared
/// process-wide.
#[derive(Debug, Clone)]
pub struct RemoteSessionStore {
    client: reqwest::Client,
    base: Url,
    auth_token: Option<String>,
}

impl RemoteSessionStore {
    pub fn new(config: RemoteConfig) -> Result<Self, StoreError> {
        let mut base = Url::parse(&config.base_url)
            .map_err(|e| StoreError::Storage(format!("invalid base url '{}': {e}", config.base_url)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base,
            auth_token: config.auth_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, StoreError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| StoreError::Storage(format!("invalid path '{path}': {e}")))?;
        tracing::debug!(%method, %url, "remote store request");
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }
}

fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(StoreError::Storage(format!(
            "server returned {status} for {}",
            response.url().path()
        )))
    }
}

#[async_trait]
impl SessionStore for RemoteSessionStore {
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError> {
        let response = self
            .request(Method::POST, "sessions")?
            .json(&session)
            .send()
            .await?;
        Ok(ensure_success(response)?.json::<Session>().await?)
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        let response = self
            .request(Method::PUT, &format!("sessions/{}", session.id))?
            .json(session)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(StoreError::NotFound { id: session.id }),
            StatusCode::CONFLICT => return Err(StoreError::AlreadyFinalized { id: session.id }),
            _ => {}
        }
        ensure_success(response)?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let response = self
            .request(Method::GET, &format!("sessions/{id}"))?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(ensure_success(response)?.json::<Session>().await?))
    }

    async fn get_active(&self) -> Result<Option<Session>, StoreError> {
        let response = self
            .request(Method::GET, "sessions/active")?
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            _ => Ok(ensure_success(response)?.json::<Option<Session>>().await?),
        }
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let response = self
            .request(Method::GET, "sessions")?
            .query(&[
                ("from", start.timestamp_millis()),
                ("to", end.timestamp_millis()),
            ])
            .send()
            .await?;
        Ok(ensure_success(response)?.json::<Vec<Session>>().await?)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let response = self
            .request(Method::GET, "sessions")?
            .query(&[("limit", limit)])
            .send()
            .await?;
        Ok(ensure_success(response)?.json::<Vec<Session>>().await?)
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let response = self
            .request(Method::DELETE, "sessions")?
            .send()
            .await?;
        Ok(ensure_success(response)?.json::<ClearResponse>().await?.deleted)
    }
}
