use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    HealthResponse, ImageAnalysisRequest, ImageAnalysisResponse, TextAnalysisRequest,
    TextAnalysisResponse,
};
use url::Url;

use super::{Classifier, ClassifierError};
use crate::config::ClassifierConfig;

#[derive(Clone)]
pub struct ClassificationClient {
    client: Client,
    base_url: Url,
}

impl ClassificationClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .timeout(config.request_timeout())
            .build()?;

        log::info!("Classifier client configured for {}", base_url);
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClassifierError> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl Classifier for ClassificationClient {
    async fn health(&self) -> Result<HealthResponse, ClassifierError> {
        let url = self.endpoint("health")?;
        log::debug!("Probing classifier health at {}", url);
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    async fn analyze_text(&self, text: &str) -> Result<TextAnalysisResponse, ClassifierError> {
        let url = self.endpoint("analyze")?;
        log::debug!("Submitting {} characters for text analysis", text.len());
        let response = self
            .client
            .post(url)
            .json(&TextAnalysisRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                log::error!("Text analysis request failed: {}", e);
                ClassifierError::Transport(e)
            })?;
        decode(response).await
    }

    async fn analyze_image(&self, image: &str) -> Result<ImageAnalysisResponse, ClassifierError> {
        let url = self.endpoint("analyze-image")?;
        log::debug!("Submitting {} base64 bytes for image analysis", image.len());
        let response = self
            .client
            .post(url)
            .json(&ImageAnalysisRequest {
                image: image.to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                log::error!("Image analysis request failed: {}", e);
                ClassifierError::Transport(e)
            })?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClassifierError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::error!("Classifier error {}: {}", status, body);
        return Err(ClassifierError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ClassifierError::Decode(e.to_string()))
}
