use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open config file '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse config file '{}'", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the given file, or fall back to the built-in defaults
pub fn load_config_or_default(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub utc_offset: Option<String>,
    pub top_n: Option<usize>,
    pub catalog_file: Option<PathBuf>,
    pub catalog_url: Option<String>,
    pub no_catalog: bool,
}

/// Apply CLI overrides to a configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(offset) = &overrides.utc_offset {
        info!("Overriding UTC offset: {}", offset);
        config.time.utc_offset = Some(offset.clone());
    }

    if let Some(top_n) = overrides.top_n {
        config.summary.top_n = top_n;
    }

    if let Some(path) = &overrides.catalog_file {
        config.catalog.path = Some(path.clone());
    }

    if let Some(url) = &overrides.catalog_url {
        // An explicit URL wins over a path from the file
        config.catalog.url = url.clone();
        if overrides.catalog_file.is_none() {
            config.catalog.path = None;
        }
    }

    if overrides.no_catalog {
        info!("Operation catalog disabled");
        config.catalog.enabled = false;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config() {
        let file = write_config(
            r#"
thresholds:
  traffic: 1000
catalog:
  path: /srv/spec3.json
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.thresholds.traffic, 1000);
        assert_eq!(config.catalog.path, Some(PathBuf::from("/srv/spec3.json")));
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let file = write_config("summary:\n  top_n: 0\n");
        assert!(load_config(file.path()).is_err());

        let file = write_config("thresholds: [1, 2]\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/apimetrics.yaml")).is_err());
        assert_eq!(load_config_or_default(None).unwrap(), Config::default());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config.catalog.path = Some(PathBuf::from("/srv/spec3.json"));

        let overrides = CliOverrides {
            utc_offset: Some("+01:00".to_string()),
            top_n: Some(10),
            catalog_url: Some("https://example.com/spec3.json".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut config, &overrides).unwrap();

        assert_eq!(config.time.utc_offset.as_deref(), Some("+01:00"));
        assert_eq!(config.summary.top_n, 10);
        assert_eq!(config.catalog.url, "https://example.com/spec3.json");
        assert_eq!(config.catalog.path, None);
        assert!(config.catalog.enabled);
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = Config::default();
        let overrides = CliOverrides {
            utc_offset: Some("noon".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, &overrides).is_err());
    }
}
