//! `threadbot ask` — one question, answer streamed to stdout.

use super::{CmdResult, build_orchestrator, load_config, open_stores};
use std::io::Write;
use std::path::Path;
use threadbot_config::AppConfig;
use threadbot_core::message::PromptEntry;
use tokio::sync::mpsc;

pub async fn run(config_path: Option<&Path>, message: String) -> CmdResult {
    let config = load_config(config_path)?;
    if config.provider.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set OPENAI_API_KEY, or add provider.api_key to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let stores = open_stores(&config).await?;
    let provider = threadbot_providers::provider_from_config(&config);
    let orchestrator = build_orchestrator(&config, provider, stores.cache);

    let mut prompts = vec![
        PromptEntry::system(&config.agent.system_prompt),
        PromptEntry::user(message),
    ];

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = async move {
        let mut stdout = std::io::stdout();
        while let Some(fragment) = rx.recv().await {
            print!("{fragment}");
            let _ = stdout.flush();
        }
        println!();
    };

    tokio::join!(orchestrator.generate_reply(&mut prompts, tx), printer);
    tracing::debug!(entries = prompts.len(), "Conversation finished");
    Ok(())
}
