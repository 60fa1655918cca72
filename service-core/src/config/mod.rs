use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::path::Path;

/// Settings common to every service: listener port and the optional OTLP collector.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Load from `./configuration.*` (optional) overlaid with `APP__*` environment variables.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::load_from(Path::new("configuration"))
    }

    /// Same as [`Config::load`] but reads the file base name from `path`.
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let name = path.to_str().ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "configuration path {:?} is not valid UTF-8",
                path
            ))
        })?;

        let config = Cfg::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let config = Config::load_from(&dir.path().join("absent"))?;
        assert_eq!(config.port, 8080);
        Ok(())
    }

    #[test]
    fn file_values_are_read() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("configuration.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "port = 9191")?;
        writeln!(file, "otlp_endpoint = \"http://collector:4317\"")?;

        let config = Config::load_from(&dir.path().join("configuration"))?;
        assert_eq!(config.port, 9191);
        assert_eq!(
            config.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
        Ok(())
    }
}
