// service.rs - Generation Backend Client
// HTTP access to the Ollama text server and the Stable Diffusion image server.
//
// Key Features:
// - JSON request/response calls and streaming (byte stream) calls
// - Model listing and model info lookups that degrade to None on failure
// - Request/response types for /api/generate, /api/chat and /sdapi/v1/txt2img
//
// Used by: commands/ (chat, generate, text2img, models, registration)

use std::time::Duration;

use futures_util::stream::Stream;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};
use crate::history::ChatMessage;

pub const OLLAMA_TAGS: &str = "/api/tags";
pub const OLLAMA_SHOW: &str = "/api/show";
pub const OLLAMA_CHAT: &str = "/api/chat";
pub const OLLAMA_GENERATE: &str = "/api/generate";
pub const SD_MODELS: &str = "/sdapi/v1/sd-models";
pub const SD_TXT2IMG: &str = "/sdapi/v1/txt2img";

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: Option<ChatResponseMessage>,
    #[serde(default)]
    pub done: bool,
}

// Looser than history::ChatMessage, backends may send roles we do not model
#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Text2ImgRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub num_inference_steps: u32,
    pub n_iter: u32,
    pub batch_size: u32,
    pub enhance_prompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_settings: Option<OverrideSettings>,
}

#[derive(Debug, Serialize)]
pub struct OverrideSettings {
    pub sd_model_checkpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct Text2ImgResponse {
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct StableDiffusionModel {
    #[serde(default)]
    title: String,
    model_name: String,
}

/// Which backend a command talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    StableDiffusion,
}

impl Provider {
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama",
            Provider::StableDiffusion => "Stable Diffusion",
        }
    }

    pub fn option_value(self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::StableDiffusion => "stable_diffusion",
        }
    }

    pub fn from_option(value: &str) -> Option<Self> {
        match value {
            "ollama" => Some(Provider::Ollama),
            "stable_diffusion" => Some(Provider::StableDiffusion),
            _ => None,
        }
    }

    pub fn models_endpoint(self) -> &'static str {
        match self {
            Provider::Ollama => OLLAMA_TAGS,
            Provider::StableDiffusion => SD_MODELS,
        }
    }
}

/// A model as shown to users: display name plus the value sent back to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub name: String,
    pub value: String,
}

/// Normalize either backend's model listing
pub fn parse_model_list(provider: Provider, body: serde_json::Value) -> BotResult<Vec<ModelEntry>> {
    let entries = match provider {
        Provider::Ollama => serde_json::from_value::<OllamaTags>(body)?
            .models
            .into_iter()
            .map(|m| ModelEntry { name: m.name, value: m.model })
            .collect(),
        Provider::StableDiffusion => serde_json::from_value::<Vec<StableDiffusionModel>>(body)?
            .into_iter()
            .map(|m| ModelEntry {
                name: if m.title.is_empty() { m.model_name.clone() } else { m.title },
                value: m.model_name,
            })
            .collect(),
    };
    Ok(entries)
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct ServiceClient {
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(timeout: Duration) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B, R>(&self, server: Option<&str>, endpoint: &str, provider: Provider, body: &B) -> BotResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = endpoint_url(server, endpoint, provider)?;
        log::debug!("[SERVICE] Making request to {}", url);
        let response = self.send_checked(self.http.post(url.clone()).json(body), &url).await?;
        response
            .json::<R>()
            .await
            .map_err(|source| BotError::Request { url: url.to_string(), source })
    }

    /// POST a JSON body and hand back the raw response body as a byte stream
    pub async fn post_stream<B>(
        &self,
        server: Option<&str>,
        endpoint: &str,
        provider: Provider,
        body: &B,
    ) -> BotResult<impl Stream<Item = reqwest::Result<impl AsRef<[u8]>>>>
    where
        B: Serialize + ?Sized,
    {
        let url = endpoint_url(server, endpoint, provider)?;
        log::debug!("[SERVICE] Making streaming request to {}", url);
        let response = self.send_checked(self.http.post(url.clone()).json(body), &url).await?;
        Ok(response.bytes_stream())
    }

    /// List models, `None` when the server is unset or unreachable
    pub async fn get_models(&self, server: Option<&str>, provider: Provider) -> Option<Vec<ModelEntry>> {
        let url = endpoint_url(server, provider.models_endpoint(), provider).ok()?;
        log::debug!("[SERVICE] Getting models from {}", url);

        let result = async {
            let response = self.send_checked(self.http.get(url.clone()), &url).await?;
            let body = response
                .json::<serde_json::Value>()
                .await
                .map_err(|source| BotError::Request { url: url.to_string(), source })?;
            parse_model_list(provider, body)
        }
        .await;

        match result {
            Ok(models) => Some(models),
            Err(e) => {
                log::error!("[SERVICE] Failed to get models from {} - {}", url, e);
                None
            }
        }
    }

    /// Ollama model details, used for the model's own system prompt
    pub async fn get_model_info(&self, server: Option<&str>, model: &str) -> Option<ModelInfo> {
        let body = serde_json::json!({ "name": model });
        match self.post_json::<_, ModelInfo>(server, OLLAMA_SHOW, Provider::Ollama, &body).await {
            Ok(info) => Some(info),
            Err(e) => {
                log::error!("[SERVICE] Failed to get model info for {} - {}", model, e);
                None
            }
        }
    }

    /// Download an attachment body
    pub async fn download(&self, url: &str) -> BotResult<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|e| BotError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let response = self.send_checked(self.http.get(parsed.clone()), &parsed).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BotError::Request { url: url.to_string(), source })?;
        Ok(bytes.to_vec())
    }

    async fn send_checked(&self, request: reqwest::RequestBuilder, url: &Url) -> BotResult<reqwest::Response> {
        let response = request.send().await.map_err(|source| {
            log::error!("[SERVICE] Failed to make request to {} - {}", url, source);
            BotError::Request { url: url.to_string(), source }
        })?;

        if !response.status().is_success() {
            log::error!("[SERVICE] {} returned HTTP {}", url, response.status());
            return Err(BotError::Status { url: url.to_string(), status: response.status() });
        }

        Ok(response)
    }
}

/// Resolve an endpoint against the configured server URL
pub fn endpoint_url(server: Option<&str>, endpoint: &str, provider: Provider) -> BotResult<Url> {
    let server = server
        .map(str::trim)
        .filter(|server| !server.is_empty())
        .ok_or(BotError::MissingServer(provider.display_name()))?;

    let base = Url::parse(server).map_err(|e| BotError::InvalidUrl {
        url: server.to_string(),
        reason: e.to_string(),
    })?;

    base.join(endpoint).map_err(|e| BotError::InvalidUrl {
        url: format!("{}{}", server, endpoint),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_path() {
        let url = endpoint_url(Some("http://test-server:11434"), "/api/test", Provider::Ollama).unwrap();
        assert_eq!(url.as_str(), "http://test-server:11434/api/test");
    }

    #[test]
    fn test_endpoint_url_without_server() {
        let err = endpoint_url(None, OLLAMA_CHAT, Provider::Ollama).unwrap_err();
        assert!(err.to_string().contains("No Ollama server configured"));
        let err = endpoint_url(Some("  "), SD_TXT2IMG, Provider::StableDiffusion).unwrap_err();
        assert!(err.to_string().contains("No Stable Diffusion server configured"));
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        let err = endpoint_url(Some("not a url"), OLLAMA_TAGS, Provider::Ollama).unwrap_err();
        assert!(matches!(err, BotError::InvalidUrl { .. }));
    }

    #[test]
    fn test_parse_ollama_models() {
        let body = serde_json::json!({ "models": [{ "name": "llama3:latest", "model": "llama3:latest", "size": 1 }] });
        let models = parse_model_list(Provider::Ollama, body).unwrap();
        assert_eq!(models, vec![ModelEntry { name: "llama3:latest".into(), value: "llama3:latest".into() }]);
    }

    #[test]
    fn test_parse_stable_diffusion_models() {
        let body = serde_json::json!([
            { "title": "v1-5 [abc]", "model_name": "v1-5" },
            { "model_name": "xl" }
        ]);
        let models = parse_model_list(Provider::StableDiffusion, body).unwrap();
        assert_eq!(models[0].name, "v1-5 [abc]");
        assert_eq!(models[0].value, "v1-5");
        assert_eq!(models[1].name, "xl");
    }

    #[test]
    fn test_generate_request_skips_empty_fields() {
        let request = GenerateRequest {
            model: "m".into(),
            prompt: "p".into(),
            stream: false,
            system: None,
            images: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("images").is_none());
    }

    #[tokio::test]
    async fn test_requests_fail_fast_without_server() {
        let client = ServiceClient::new(Duration::from_secs(1)).unwrap();
        let body = serde_json::json!({});
        let result = client
            .post_json::<_, GenerateResponse>(None, OLLAMA_GENERATE, Provider::Ollama, &body)
            .await;
        assert!(matches!(result, Err(BotError::MissingServer("Ollama"))));
        assert!(client.get_models(None, Provider::Ollama).await.is_none());
    }
}
