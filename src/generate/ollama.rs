use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::template::render;
use super::{GenerationRequest, Generator};

/// Local Ollama server, non-streaming `/api/generate`.
pub struct OllamaGenerator {
    http: reqwest::Client,
    base_url: String,
    model: String,
    template: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, template: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()
            .context("building ollama http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            template,
        })
    }
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        let prompt = render(&self.template, req);
        let rsp = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&Req {
                model: &self.model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await
            .with_context(|| format!("ollama request to {}", self.base_url))?;
        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("ollama HTTP {status}: {}", detail.trim()));
        }
        let parsed: Resp = rsp.json().await.context("decoding ollama response")?;
        Ok(parsed.response)
    }
}
