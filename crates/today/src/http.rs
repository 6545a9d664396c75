use std::time::Duration;

use imkitchen_shared::today::{CompletionStatus, TodaySnapshot};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::{RemoteError, TodayApi};

/// [`TodayApi`] over the `/api/v1` HTTP routes.
#[derive(Clone)]
pub struct HttpTodayApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct CompleteSlotRequest {
    status: CompletionStatus,
}

impl HttpTodayApi {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        token: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();

        Err(RemoteError::Rejected {
            status: Some(status.as_u16()),
            message,
        })
    }

    async fn fetch(&self, path: &str) -> Result<TodaySnapshot, RemoteError> {
        let response = self.send(self.client.get(self.url(path))).await?;

        Ok(response.json::<TodaySnapshot>().await?)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            return RemoteError::Rejected {
                status: Some(status.as_u16()),
                message: value.to_string(),
            };
        }

        if value.is_decode() {
            return RemoteError::Rejected {
                status: None,
                message: value.to_string(),
            };
        }

        RemoteError::Network(value.to_string())
    }
}

#[async_trait::async_trait]
impl TodayApi for HttpTodayApi {
    #[tracing::instrument(skip(self))]
    async fn fetch_today(&self) -> Result<TodaySnapshot, RemoteError> {
        self.fetch("/today").await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_yesterday(&self) -> Result<TodaySnapshot, RemoteError> {
        self.fetch("/yesterday").await
    }

    #[tracing::instrument(skip(self))]
    async fn mark_slot_complete(
        &self,
        slot_id: &str,
        status: CompletionStatus,
    ) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.url(&format!("/slots/{slot_id}/complete")))
            .json(&CompleteSlotRequest { status });

        self.send(request).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn clear_slot_completion(&self, slot_id: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.url(&format!("/slots/{slot_id}/complete")));

        self.send(request).await?;

        Ok(())
    }
}
