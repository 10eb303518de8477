//! A connected local LLM server: its identity, its models, and a client for it.

use crate::openai_compat::OpenAiCompatProvider;
use crate::vendor::{self, VendorKind};
use codeloop_core::error::ProviderError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_PATH: &str = "/v1";

/// Metadata about the server we are talking to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInfo {
    pub kind: VendorKind,
    pub name: String,
    /// Base URL without a trailing slash
    pub host: String,
    /// The model requests are sent to, once selected
    pub model: String,
    /// Models reported by the server at last detection
    pub models: Vec<String>,
    pub api_path: String,
    pub supports_tools: bool,
}

/// A local server backend.
pub struct LocalBackend {
    info: ProviderInfo,
    api_key: String,
    client: reqwest::Client,
}

impl LocalBackend {
    /// Build a backend for a known vendor. `Unknown` is treated as a generic
    /// OpenAI-compatible (vLLM-style) server.
    pub fn new(kind: VendorKind, host: &str, api_key: impl Into<String>) -> Self {
        let kind = match kind {
            VendorKind::Unknown => VendorKind::Vllm,
            k => k,
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            info: ProviderInfo {
                kind,
                name: kind.display_name().to_string(),
                host: host.trim_end_matches('/').to_string(),
                model: String::new(),
                models: Vec::new(),
                api_path: API_PATH.to_string(),
                supports_tools: kind.supports_tools(),
            },
            api_key: api_key.into(),
            client,
        }
    }

    /// Resolve the configured vendor (detecting it when `auto`) and build
    /// the matching backend.
    pub async fn connect(
        host: &str,
        vendor: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        if host.trim().is_empty() {
            return Err(ProviderError::NotConfigured("host is required".into()));
        }

        let kind = match VendorKind::parse(vendor) {
            VendorKind::Unknown => vendor::detect(host).await,
            known => known,
        };
        info!(host, vendor = %kind, "Provider resolved");
        Ok(Self::new(kind, host, api_key))
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.info.model = model.into();
    }

    /// Ask the server which models it serves.
    ///
    /// Ollama falls back to its native `/api/tags` listing when the
    /// OpenAI-style endpoint fails or comes back empty.
    pub async fn detect_models(&mut self) -> Result<Vec<String>, ProviderError> {
        let models = match (self.info.kind, self.openai_models().await) {
            (VendorKind::Ollama, Ok(models)) if models.is_empty() => self.ollama_tags().await?,
            (VendorKind::Ollama, Err(e)) => {
                debug!(error = %e, "OpenAI model listing failed, trying /api/tags");
                self.ollama_tags().await?
            }
            (_, result) => result?,
        };
        self.info.models = models.clone();
        Ok(models)
    }

    /// A chat client pointed at this server.
    pub fn create_client(&self) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            self.info.name.clone(),
            format!("{}{}", self.info.host, self.info.api_path),
            self.api_key.clone(),
        )
    }

    async fn openai_models(&self) -> Result<Vec<String>, ProviderError> {
        #[derive(Deserialize)]
        struct Listing {
            #[serde(default)]
            data: Vec<Entry>,
        }
        #[derive(Deserialize)]
        struct Entry {
            id: String,
        }

        let mut req = self.client.get(format!("{}/v1/models", self.info.host));
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let listing: Listing = self.fetch_json(req).await?;
        Ok(listing.data.into_iter().map(|e| e.id).collect())
    }

    async fn ollama_tags(&self) -> Result<Vec<String>, ProviderError> {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<Tag>,
        }
        #[derive(Deserialize)]
        struct Tag {
            name: String,
        }

        let req = self.client.get(format!("{}/api/tags", self.info.host));
        let tags: Tags = self.fetch_json(req).await?;
        Ok(tags.models.into_iter().map(|t| t.name).collect())
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        resp.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("decode response: {e}"),
        })
    }
}

/// Where the selected model came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChoice {
    /// The configured model is served by the server
    Configured(String),
    /// Nothing configured; the server's first model
    Detected(String),
    /// The configured model is not served; the first served model instead
    Substituted { requested: String, using: String },
    /// Detection failed or returned nothing; the configured model is used blind
    Fallback(String),
}

impl ModelChoice {
    pub fn model(&self) -> &str {
        match self {
            Self::Configured(m) | Self::Detected(m) | Self::Fallback(m) => m,
            Self::Substituted { using, .. } => using,
        }
    }
}

/// Pick the model to talk to from the configured name and the detection result.
pub fn select_model(
    configured: Option<&str>,
    detected: Result<Vec<String>, ProviderError>,
) -> Result<ModelChoice, ProviderError> {
    let configured = configured.map(str::trim).filter(|m| !m.is_empty());

    let models = match detected {
        Ok(models) => models,
        Err(e) => {
            return match configured {
                Some(m) => {
                    warn!(error = %e, model = m, "Could not detect models, using configured model");
                    Ok(ModelChoice::Fallback(m.to_string()))
                }
                None => Err(ProviderError::ModelNotFound(format!(
                    "failed to detect model and no fallback configured: {e}"
                ))),
            };
        }
    };

    match (models.first(), configured) {
        (Some(_), Some(m)) if models.iter().any(|x| x == m) => {
            Ok(ModelChoice::Configured(m.to_string()))
        }
        (Some(first), Some(m)) => {
            warn!(requested = m, using = %first, available = ?models, "Configured model not served");
            Ok(ModelChoice::Substituted {
                requested: m.to_string(),
                using: first.clone(),
            })
        }
        (Some(first), None) => Ok(ModelChoice::Detected(first.clone())),
        (None, Some(m)) => Ok(ModelChoice::Fallback(m.to_string())),
        (None, None) => Err(ProviderError::ModelNotFound(
            "no models available and no fallback configured".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use codeloop_core::Provider;

    fn served(names: &[&str]) -> Result<Vec<String>, ProviderError> {
        Ok(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn configured_model_wins_when_served() {
        let choice = select_model(Some("b"), served(&["a", "b"])).unwrap();
        assert_eq!(choice, ModelChoice::Configured("b".into()));
    }

    #[test]
    fn unserved_configured_model_is_substituted() {
        let choice = select_model(Some("z"), served(&["a", "b"])).unwrap();
        assert_eq!(choice.model(), "a");
        assert!(matches!(choice, ModelChoice::Substituted { .. }));
    }

    #[test]
    fn first_model_when_nothing_configured() {
        let choice = select_model(None, served(&["a"])).unwrap();
        assert_eq!(choice, ModelChoice::Detected("a".into()));
        assert!(select_model(Some("  "), served(&[])).is_err());
    }

    #[test]
    fn detection_error_falls_back_to_config() {
        let err = || Err(ProviderError::Network("refused".into()));
        assert_eq!(
            select_model(Some("m"), err()).unwrap(),
            ModelChoice::Fallback("m".into())
        );
        assert!(select_model(None, err()).is_err());
        assert_eq!(select_model(Some("m"), served(&[])).unwrap().model(), "m");
    }

    #[test]
    fn unknown_vendor_builds_vllm_style_backend() {
        let backend = LocalBackend::new(VendorKind::Unknown, "http://box:8000/", "");
        let info = backend.info();
        assert_eq!(info.kind, VendorKind::Vllm);
        assert_eq!(info.host, "http://box:8000");
        assert_eq!(info.api_path, "/v1");
        assert!(info.supports_tools);

        let ollama = LocalBackend::new(VendorKind::Ollama, "http://box:11434", "");
        assert!(!ollama.info().supports_tools);
        assert_eq!(ollama.create_client().base_url(), "http://box:11434/v1");
        assert_eq!(ollama.create_client().name(), "Ollama");
    }

    #[tokio::test]
    async fn connect_requires_host() {
        assert!(LocalBackend::connect("", "vllm", "").await.is_err());
    }

    #[tokio::test]
    async fn detects_openai_style_models() {
        let app = Router::new().route(
            "/v1/models",
            get(|| async {
                axum::Json(serde_json::json!({"data": [{"id": "qwen2.5-coder"}]}))
            }),
        );
        let host = test_server::spawn(app).await;
        let mut backend = LocalBackend::connect(&host, "vllm", "key").await.unwrap();
        let models = backend.detect_models().await.unwrap();
        assert_eq!(models, vec!["qwen2.5-coder"]);
        assert_eq!(backend.info().models, models);
    }

    #[tokio::test]
    async fn ollama_falls_back_to_tags() {
        let app = Router::new()
            .route("/v1/models", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/api/tags",
                get(|| async {
                    axum::Json(serde_json::json!({"models": [{"name": "llama3:8b"}]}))
                }),
            );
        let host = test_server::spawn(app).await;
        let mut backend = LocalBackend::new(VendorKind::Ollama, &host, "");
        assert_eq!(backend.detect_models().await.unwrap(), vec!["llama3:8b"]);
    }

    #[tokio::test]
    async fn vllm_listing_failure_is_an_error() {
        let host = test_server::spawn(Router::new()).await;
        let mut backend = LocalBackend::new(VendorKind::Vllm, &host, "");
        assert!(backend.detect_models().await.is_err());
    }
}
