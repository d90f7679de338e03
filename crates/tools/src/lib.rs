//! Tool execution and built-in tools for threadbot.
//!
//! The [`ToolExecutor`] dispatches a round of model tool calls. The built-in
//! tools reach external extraction and search APIs; each registers only
//! when its endpoint (or keys) are configured.

pub mod browse;
pub mod cache_key;
pub mod executor;
pub mod search;

pub use browse::BrowseApiTool;
pub use executor::ToolExecutor;
pub use search::{SearchCredentials, SearchTool};

use std::sync::Arc;
use threadbot_config::ToolsConfig;
use threadbot_core::tool::ToolRegistry;

/// Build the registry of built-in tools enabled by `config`.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    if let Some(url) = &config.browser_text_api_url {
        registry.register(Arc::new(BrowseApiTool::browser_text(url)));
    }
    if let Some(url) = &config.github_api_url {
        registry.register(Arc::new(BrowseApiTool::github(url)));
    }
    if let Some(url) = &config.pdf_api_url {
        registry.register(Arc::new(BrowseApiTool::pdf(url)));
    }
    if let Some(url) = &config.youtube_api_url {
        registry.register(Arc::new(BrowseApiTool::youtube(url)));
    }

    match (
        &config.google_search_key,
        &config.google_search_cx,
        &config.bing_subscription_key,
        &config.bing_endpoint,
    ) {
        (Some(google_key), Some(google_cx), Some(bing_key), Some(bing_endpoint)) => {
            registry.register(Arc::new(SearchTool::new(SearchCredentials {
                google_key: google_key.clone(),
                google_cx: google_cx.clone(),
                bing_key: bing_key.clone(),
                bing_endpoint: bing_endpoint.clone(),
            })));
        }
        (None, None, None, None) => {}
        _ => tracing::warn!("Search tool disabled: Google and Bing credentials are both required"),
    }

    tracing::debug!(tools = ?registry.names(), "Tool registry built");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_registers_nothing() {
        assert!(default_registry(&ToolsConfig::default()).is_empty());
    }

    #[test]
    fn configured_endpoints_register_tools() {
        let config = ToolsConfig {
            pdf_api_url: Some("http://localhost:8000/pdf".into()),
            youtube_api_url: Some("http://localhost:8000/youtube".into()),
            google_search_key: Some("g".into()),
            google_search_cx: Some("cx".into()),
            bing_subscription_key: Some("b".into()),
            bing_endpoint: Some("https://api.bing.microsoft.com".into()),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        assert_eq!(registry.names(), vec!["pdf", "search", "youtube"]);
    }

    #[test]
    fn partial_search_credentials_skip_search() {
        let config = ToolsConfig {
            google_search_key: Some("g".into()),
            ..ToolsConfig::default()
        };
        assert!(default_registry(&config).get("search").is_none());
    }
}
