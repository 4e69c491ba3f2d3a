//! Model-server backed classifier.
//!
//! Sends the model input as a JPEG body and expects `{"scores": [...]}`.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use tracing::debug;

use super::classifier::{ClassifierError, ImageClassifier};
use super::overlay::encode_jpeg;

const INPUT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Deserialize)]
struct ScoresResponse {
    scores: Vec<f64>,
}

pub struct HttpClassifier {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("leafguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Invocation {
                model: name.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }

    fn invocation(&self, reason: impl std::fmt::Display) -> ClassifierError {
        ClassifierError::Invocation {
            model: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ImageClassifier for HttpClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, input: &RgbImage) -> Result<Vec<f64>, ClassifierError> {
        let body = encode_jpeg(input, INPUT_JPEG_QUALITY).map_err(|e| self.invocation(e))?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await
            .map_err(|e| self.invocation(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.invocation(format!("model server returned {status}")));
        }

        let parsed: ScoresResponse =
            response
                .json()
                .await
                .map_err(|e| ClassifierError::MalformedOutput {
                    model: self.name.clone(),
                    reason: e.to_string(),
                })?;
        debug!(model = %self.name, scores = ?parsed.scores, "model scores");
        Ok(parsed.scores)
    }

    /// Round-trips a blank image so a misconfigured URL or a model with the
    /// wrong contract fails at startup instead of on the first frame.
    async fn probe(&self) -> Result<(), ClassifierError> {
        let scores = self.predict(&RgbImage::new(8, 8)).await?;
        if scores.is_empty() {
            return Err(ClassifierError::MalformedOutput {
                model: self.name.clone(),
                reason: "empty score vector".into(),
            });
        }
        Ok(())
    }
}
