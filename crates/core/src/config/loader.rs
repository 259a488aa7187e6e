use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Overrides use a double-underscore section separator so snake_case
/// fields stay addressable, e.g. `DEALBOT_MARKETPLACE__API_URL` maps to
/// `marketplace.api_url`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEALBOT_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[marketplace]
api_url = "https://coordinator.example"
refresh_interval_secs = 30

[storage]
longterm_dir = "/var/lib/dealbot/archives"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.marketplace.api_url, "https://coordinator.example");
        assert_eq!(config.marketplace.refresh_interval_secs, 30);
        assert_eq!(
            config.storage.longterm_dir.to_str().unwrap(),
            "/var/lib/dealbot/archives"
        );
    }

    #[test]
    fn test_load_config_from_str_malformed() {
        let result = load_config_from_str("[scheduler\nmax_workers = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[node]
rpc_url = "http://node.local:1234/rpc/v1"
retrieval_timeout_secs = 120

[scheduler]
max_workers = 2
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.node.rpc_url, "http://node.local:1234/rpc/v1");
        assert_eq!(config.node.retrieval_timeout_secs, 120);
        assert_eq!(config.scheduler.max_workers, 2);
    }

    #[test]
    fn test_env_override_reaches_snake_case_field() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[marketplace]
api_url = "https://file.example"
"#
        )
        .unwrap();

        std::env::set_var("DEALBOT_MARKETPLACE__API_URL", "https://env.example");
        let config = load_config(temp_file.path());
        std::env::remove_var("DEALBOT_MARKETPLACE__API_URL");

        assert_eq!(config.unwrap().marketplace.api_url, "https://env.example");
    }
}
