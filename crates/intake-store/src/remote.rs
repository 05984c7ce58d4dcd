//! Remote persistence client.
//!
//! Each call is a single fallible request; retrying is the save
//! orchestrator's job, never the client's.

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;
use url::Url;

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::mapping::{ArtifactRecord, RemoteDocument, RemoteRecord, SavePayload};
use crate::store::{ComplexityMode, DocumentId};

/// Server-side storage for questionnaires.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a new questionnaire. The response usually carries its id.
    async fn create(&self, payload: SavePayload<'_>) -> Result<RemoteRecord, RemoteError>;

    /// Overwrite the questionnaire stored under `id`.
    async fn update(
        &self,
        id: DocumentId,
        payload: SavePayload<'_>,
    ) -> Result<RemoteRecord, RemoteError>;

    async fn fetch(&self, id: DocumentId) -> Result<RemoteDocument, RemoteError>;

    /// Generate a landing page from the questionnaire stored under `id`.
    async fn generate_artifact(
        &self,
        id: DocumentId,
        template_id: &str,
        mode: ComplexityMode,
    ) -> Result<ArtifactRecord, RemoteError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    template_id: &'a str,
    mode: ComplexityMode,
}

/// [`RemoteStore`] over the questionnaire HTTP API.
///
/// - `POST   {base}/questionnaires`
/// - `PUT    {base}/questionnaires/{id}`
/// - `GET    {base}/questionnaires/{id}`
/// - `POST   {base}/questionnaires/{id}/landing-pages`
#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base.join(path).map_err(|e| RemoteError::InvalidUrl {
            message: format!("{path}: {e}"),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        trace!(%status, url = %response.url(), "remote response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn create(&self, payload: SavePayload<'_>) -> Result<RemoteRecord, RemoteError> {
        let url = self.url("questionnaires")?;
        self.send(self.client.post(url).json(&payload)).await
    }

    async fn update(
        &self,
        id: DocumentId,
        payload: SavePayload<'_>,
    ) -> Result<RemoteRecord, RemoteError> {
        let url = self.url(&format!("questionnaires/{id}"))?;
        self.send(self.client.put(url).json(&payload)).await
    }

    async fn fetch(&self, id: DocumentId) -> Result<RemoteDocument, RemoteError> {
        let url = self.url(&format!("questionnaires/{id}"))?;
        self.send(self.client.get(url)).await
    }

    async fn generate_artifact(
        &self,
        id: DocumentId,
        template_id: &str,
        mode: ComplexityMode,
    ) -> Result<ArtifactRecord, RemoteError> {
        let url = self.url(&format!("questionnaires/{id}/landing-pages"))?;
        let body = GenerateRequest { template_id, mode };
        self.send(self.client.post(url).json(&body)).await
    }
}
