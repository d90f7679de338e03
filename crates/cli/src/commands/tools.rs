//! `threadbot tools` — print the tool schemas the model is offered.

use super::{CmdResult, load_config};
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;
    let registry = threadbot_tools::default_registry(&config.tools);

    if registry.is_empty() {
        println!("No tools configured. Set BROWSER_TEXT_API_URL, GOOGLE_SEARCH_KEY, ... to enable them.");
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
    Ok(())
}
