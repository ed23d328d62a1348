use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
///
/// Checks the cross-field rules serde cannot express: api_key auth needs a
/// key, instance names must be unique, language tags must be non-empty, and
/// the quality/memory thresholds must be in range.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if matches!(config.auth.method, AuthMethod::ApiKey)
        && config.auth.api_key.as_deref().unwrap_or("").is_empty()
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key is required when auth.method is api_key".to_string(),
        ));
    }

    if config.library.source_language.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "library.source_language cannot be empty".to_string(),
        ));
    }

    if config
        .library
        .target_languages
        .iter()
        .any(|l| l.trim().is_empty())
    {
        return Err(ConfigError::ValidationError(
            "library.target_languages entries cannot be empty".to_string(),
        ));
    }

    let mut provider_names = HashSet::new();
    for provider in &config.providers {
        if !provider_names.insert(provider.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate provider name: {}",
                provider.name
            )));
        }
    }

    let mut backend_names = HashSet::new();
    for backend in &config.translation.backends {
        if !backend_names.insert(backend.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate translation backend name: {}",
                backend.name
            )));
        }
    }

    let similarity = config.translation.memory.similarity_threshold;
    if !(0.0..=1.0).contains(&similarity) {
        return Err(ConfigError::ValidationError(format!(
            "translation.memory.similarity_threshold must be within 0.0..=1.0, got {}",
            similarity
        )));
    }

    if config.translation.quality.threshold > 100 {
        return Err(ConfigError::ValidationError(
            "translation.quality.threshold must be within 0..=100".to_string(),
        ));
    }

    if config.scanner.probe_workers == 0 {
        return Err(ConfigError::ValidationError(
            "scanner.probe_workers must be at least 1".to_string(),
        ));
    }

    Ok(())
}
