//! `threadbot doctor` — Diagnose configuration.

use super::{CmdResult, load_config, open_stores};
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> CmdResult {
    println!("🩺 threadbot Doctor — Configuration Check");
    println!("=========================================\n");

    let mut issues = 0;

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            return Ok(());
        }
    };

    if config.provider.api_key.is_some() {
        println!("  ✅ OpenAI key configured (model {})", config.provider.model);
    } else if config.provider.allow_set_key {
        println!("  ⚠️  No OpenAI key yet — set one with /set-openai-key");
    } else {
        println!("  ❌ No OpenAI key — set OPENAI_API_KEY");
        issues += 1;
    }

    for (name, token) in [
        ("SLACK_BOT_TOKEN", &config.slack.bot_token),
        ("SLACK_APP_TOKEN", &config.slack.app_token),
    ] {
        if token.is_some() {
            println!("  ✅ {name} set");
        } else {
            println!("  ❌ {name} not set");
            issues += 1;
        }
    }

    if config.transcription_api_key().is_some() {
        println!("  ✅ Audio transcription enabled ({})", config.transcription.model);
    } else {
        println!("  ⚠️  Audio transcription disabled — no key");
    }

    let registry = threadbot_tools::default_registry(&config.tools);
    if registry.is_empty() {
        println!("  ⚠️  No tools configured");
    } else {
        println!("  ✅ Tools: {}", registry.names().join(", "));
    }

    match open_stores(&config).await {
        Ok(stores) => println!(
            "  ✅ Database {} ({}, cache {})",
            config.storage.db_path,
            stores.context.name(),
            if stores.cache.is_some() { "on" } else { "off" }
        ),
        Err(e) => {
            println!("  ❌ Database {}: {e}", config.storage.db_path);
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
