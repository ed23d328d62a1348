//! Translation system.
//!
//! Backends implement `TranslationBackend`; the `FallbackChain` tries them
//! in order behind circuit breakers; the `TranslationManager` layers the
//! translation memory, glossary, SRT-reference prompting, dialog/signs
//! awareness and quality self-evaluation on top.

mod backends;
mod chain;
mod manager;
mod normalize;
mod prompt;
mod types;

pub use backends::*;
pub use chain::*;
pub use manager::*;
pub use normalize::*;
pub use prompt::*;
pub use types::*;

use std::sync::Arc;

use crate::config::{BackendInstanceConfig, BackendKind};

/// Build chain entries from configuration, preserving order.
pub fn build_backends(configs: &[BackendInstanceConfig]) -> Vec<ChainEntry> {
    configs
        .iter()
        .map(|c| {
            let backend: Arc<dyn TranslationBackend> = match c.kind {
                BackendKind::Anthropic => Arc::new(AnthropicBackend::new(c)),
                BackendKind::Ollama => Arc::new(OllamaBackend::new(c)),
                BackendKind::Deepl => Arc::new(DeepLBackend::new(c)),
            };
            ChainEntry {
                backend,
                single_line_fallback: c.single_line_fallback,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_backends_preserves_order() {
        let configs = vec![
            BackendInstanceConfig {
                kind: BackendKind::Anthropic,
                name: "primary".to_string(),
                api_key: Some("k".to_string()),
                model: None,
                url: None,
                prompt_preset: None,
                single_line_fallback: true,
            },
            BackendInstanceConfig {
                kind: BackendKind::Deepl,
                name: "fallback".to_string(),
                api_key: Some("k".to_string()),
                model: None,
                url: None,
                prompt_preset: None,
                single_line_fallback: false,
            },
        ];
        let entries = build_backends(&configs);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].backend.name(), "primary");
        assert!(entries[0].single_line_fallback);
        assert_eq!(entries[1].backend.kind(), "deepl");
    }
}
