//! `codeloop onboard`: First-time setup.

use codeloop_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let default_path = AppConfig::config_dir().join("config.toml");
    let config_path = config_path.unwrap_or(&default_path);

    println!("codeloop: First-Time Setup");
    println!("===========================\n");

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    tokio::fs::write(config_path, AppConfig::default_toml()).await?;
    println!("✅ Created config at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set `host` to your model server (vLLM, Ollama or llama.cpp)");
    println!("   2. Optionally pin a `model`; otherwise the first served model is used");
    println!("   3. Run `codeloop` inside a project directory\n");

    Ok(())
}
