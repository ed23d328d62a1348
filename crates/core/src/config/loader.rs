//! Configuration loading.
//!
//! A TOML file is the base layer; every value can be overridden through the
//! environment with the `SUBLARR_` prefix, nested keys split on underscores
//! (`SUBLARR_SERVER_PORT=6767` overrides `server.port`). Environment wins
//! over the file, matching how the container images are deployed.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "SUBLARR_";

/// Load the configuration: TOML file merged with `SUBLARR_*` overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a bare TOML string, bypassing the environment entirely.
///
/// Used by tests and by config-import previews, where picking up the host's
/// `SUBLARR_*` variables would be surprising.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, ProviderKind};
    use std::io::Write;

    const FIXTURE: &str = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 7000

[library]
source_language = "en"
target_languages = ["de", "fr"]

[[providers]]
kind = "jimaku"
name = "jimaku-main"

[[translation.backends]]
kind = "ollama"
name = "local"
model = "llama3"
"#;

    fn write_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_str_loading_carries_full_shape() {
        let config = load_config_from_str(FIXTURE).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.library.target_languages, vec!["de", "fr"]);
        assert_eq!(config.providers.len(), 1);
        assert!(matches!(config.providers[0].kind, ProviderKind::Jimaku));
        assert_eq!(config.translation.backends.len(), 1);
        assert!(matches!(
            config.translation.backends[0].kind,
            BackendKind::Ollama
        ));
        assert_eq!(
            config.translation.backends[0].model.as_deref(),
            Some("llama3")
        );
    }

    #[test]
    fn test_str_loading_rejects_invalid_toml() {
        let result = load_config_from_str("[auth\nmethod = broken");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_is_a_distinct_error() {
        let result = load_config(Path::new("/nonexistent/sublarr.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_directory_path_is_not_a_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_config(dir.path());
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_env_override_beats_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_fixture(&dir);

        // Baseline: the file's value flows through
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 7000);

        // SUBLARR_SERVER_PORT splits into server.port and wins. Set, load
        // and unset in one test so no parallel test observes the variable.
        std::env::set_var("SUBLARR_SERVER_PORT", "9100");
        let overridden = load_config(&path);
        std::env::remove_var("SUBLARR_SERVER_PORT");

        let config = overridden.unwrap();
        assert_eq!(config.server.port, 9100);
        // Untouched sections keep their file values
        assert_eq!(config.providers.len(), 1);
    }
}
