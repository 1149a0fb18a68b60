use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::ClassifierConfig;

use super::decision::{ClassifierVerdict, ClassifyResponse, build_request, decide};

/// Seam for the remote scoring call so the pipeline can run against a
/// scripted classifier in tests.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        hostname: &str,
        url: &str,
        screenshot_base64: &str,
        languages: &[String],
    ) -> Result<ClassifierVerdict>;
}

#[derive(Clone)]
pub struct PhishClassifier {
    http: Client,
    config: ClassifierConfig,
}

impl PhishClassifier {
    pub fn new(http: Client, config: ClassifierConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl Classifier for PhishClassifier {
    async fn classify(
        &self,
        hostname: &str,
        url: &str,
        screenshot_base64: &str,
        languages: &[String],
    ) -> Result<ClassifierVerdict> {
        let request = build_request(url, languages, screenshot_base64);

        let mut call = self.http.post(&self.config.endpoint).json(&request);
        if let Some(api_key) = &self.config.api_key {
            call = call.bearer_auth(api_key);
        }

        let response: ClassifyResponse = call
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("classifier response was not valid JSON")?;

        tracing::debug!(
            target: "classifier",
            %hostname,
            is_phishing = response.is_phishing,
            is_login_page = response.is_login_page,
            website_domain = response.website_domain.as_deref(),
            reasoning = %response.reasoning,
            "classifier response"
        );

        Ok(decide(hostname, &response))
    }
}
