//! LLM server access for codeloop.
//!
//! Every supported server (vLLM, Ollama, llama.cpp) speaks the OpenAI chat
//! completions protocol; they differ in how they are detected and how they
//! list models.

pub mod backend;
pub mod openai_compat;
pub mod vendor;

pub use backend::{LocalBackend, ModelChoice, ProviderInfo, select_model};
pub use openai_compat::OpenAiCompatProvider;
pub use vendor::{VendorKind, detect};

#[cfg(test)]
pub(crate) mod test_server {
    use axum::Router;

    /// Serve `app` on an ephemeral local port and return its base URL.
    pub async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}
