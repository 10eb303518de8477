//! Server vendor identification.
//!
//! Detection first looks at the host string, then probes endpoints that only
//! one vendor serves.

use std::fmt;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// The kind of LLM server behind a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorKind {
    Vllm,
    Ollama,
    LlamaCpp,
    Unknown,
}

impl VendorKind {
    /// Parse a configured vendor name. `auto`, empty and unrecognised values
    /// map to [`VendorKind::Unknown`], which triggers detection.
    pub fn parse(vendor: &str) -> Self {
        match vendor.trim().to_lowercase().as_str() {
            "vllm" => Self::Vllm,
            "ollama" => Self::Ollama,
            "llama.cpp" | "llamacpp" | "llama" => Self::LlamaCpp,
            _ => Self::Unknown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Vllm => "vLLM",
            Self::Ollama => "Ollama",
            Self::LlamaCpp => "llama.cpp",
            Self::Unknown => "Unknown",
        }
    }

    /// Only vLLM is trusted with native tool calling.
    pub fn supports_tools(&self) -> bool {
        matches!(self, Self::Vllm)
    }
}

impl fmt::Display for VendorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Identify the server at `host`.
pub async fn detect(host: &str) -> VendorKind {
    let host = host.trim_end_matches('/');
    if let Some(kind) = from_host_name(host) {
        debug!(host, vendor = %kind, "Vendor inferred from host name");
        return kind;
    }

    let client = match reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .connect_timeout(PROBE_CONNECT_TIMEOUT)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Could not build probe client");
            return VendorKind::Unknown;
        }
    };

    if probe(&client, host, "/api/tags").await {
        return VendorKind::Ollama;
    }
    if probe(&client, host, "/v1/models").await {
        return VendorKind::Vllm;
    }
    VendorKind::Unknown
}

fn from_host_name(host: &str) -> Option<VendorKind> {
    let lower = host.to_lowercase();
    if lower.contains("ollama") {
        Some(VendorKind::Ollama)
    } else if lower.contains("vllm") {
        Some(VendorKind::Vllm)
    } else if lower.contains("llama") {
        Some(VendorKind::LlamaCpp)
    } else {
        None
    }
}

/// An endpoint "exists" when it answers with anything below 500 other than 404;
/// 401 and 403 still prove the route is there.
async fn probe(client: &reqwest::Client, host: &str, path: &str) -> bool {
    let url = format!("{host}{path}");
    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            debug!(url = %url, status, "Probe response");
            (200..500).contains(&status) && status != 404
        }
        Err(e) => {
            debug!(url = %url, error = %e, "Probe failed");
            false
        }
    }
}
