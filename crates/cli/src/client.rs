use anyhow::{anyhow, Result};
use qa_models::{
    DestroyRequest, DestroyResponse, ErrorShape, GcResponse, HealthResponse, ListResponse,
    ProvisionRequest, ProvisionResponse,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

pub struct ProvisionerClient {
    client: Client,
    base_url: String,
}

impl ProvisionerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionResponse> {
        let response = self
            .client
            .post(format!("{}/provision", self.base_url))
            .json(request)
            .send()
            .await?;
        decode(response, "Provision").await
    }

    pub async fn destroy(&self, env_id: &str) -> Result<DestroyResponse> {
        let response = self
            .client
            .post(format!("{}/destroy", self.base_url))
            .json(&DestroyRequest {
                env_id: env_id.to_string(),
            })
            .send()
            .await?;
        decode(response, "Destroy").await
    }

    pub async fn list(&self) -> Result<ListResponse> {
        let response = self
            .client
            .get(format!("{}/list", self.base_url))
            .send()
            .await?;
        decode(response, "List").await
    }

    pub async fn gc(&self) -> Result<GcResponse> {
        let response = self
            .client
            .post(format!("{}/gc", self.base_url))
            .send()
            .await?;
        decode(response, "Garbage collection").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await?;
        decode(response, "Health check").await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        let detail = serde_json::from_str::<ErrorShape>(&error_text)
            .map(|shape| shape.detail)
            .unwrap_or(error_text);
        return Err(anyhow!("{} failed ({}): {}", action, status.as_u16(), detail));
    }
    Ok(response.json().await?)
}
