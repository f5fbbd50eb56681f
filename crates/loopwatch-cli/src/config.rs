//! Loading watchdog configuration files.

use std::path::Path;

use loopwatch::WatchdogConfig;

use crate::error::CliError;

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Guess the format from a file extension. Anything that is not YAML is
    /// read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// Parse and validate a configuration document.
pub fn parse_config(text: &str, format: ConfigFormat) -> Result<WatchdogConfig, CliError> {
    let config: WatchdogConfig = match format {
        ConfigFormat::Json => serde_json::from_str(text)?,
        ConfigFormat::Yaml => serde_yaml::from_str(text)?,
    };
    config
        .validate()
        .map_err(|e| CliError::InvalidConfiguration(e.to_string()))?;
    Ok(config)
}

/// Load the configuration at `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<WatchdogConfig, CliError> {
    let Some(path) = path else {
        return Ok(WatchdogConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text, ConfigFormat::from_path(path))?;
    tracing::info!(path = %path.display(), "Loaded watchdog configuration");
    Ok(config)
}

/// Render a configuration in the requested format.
pub fn render_config(config: &WatchdogConfig, format: ConfigFormat) -> Result<String, CliError> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopwatch::AlertOptions;
    use std::time::Duration;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("w.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("w.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("w.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("watchdog")), ConfigFormat::Json);
    }

    #[test]
    fn parse_partial_json_uses_defaults() -> TestResult {
        let config = parse_config(r#"{"stall_threshold_ms": 750}"#, ConfigFormat::Json)?;
        assert_eq!(config.stall_threshold, Duration::from_millis(750));
        assert_eq!(config.poll_interval, loopwatch::DEFAULT_POLL_INTERVAL);
        Ok(())
    }

    #[test]
    fn parse_yaml_with_debug_break() -> TestResult {
        let text = "heartbeat_interval_ms: 50\noptions: debug_break\n";
        let config = parse_config(text, ConfigFormat::Yaml)?;
        assert_eq!(config.heartbeat_interval, Duration::from_millis(50));
        assert_eq!(config.options, AlertOptions::DebugBreak);
        Ok(())
    }

    #[test]
    fn parse_rejects_zero_poll_interval() {
        let result = parse_config(r#"{"poll_interval_ms": 0}"#, ConfigFormat::Json);
        assert!(matches!(result, Err(CliError::InvalidConfiguration(_))));
    }

    #[test]
    fn missing_path_gives_defaults() -> TestResult {
        assert_eq!(load_config(None)?, WatchdogConfig::default());
        Ok(())
    }

    #[test]
    fn rendered_yaml_parses_back() -> TestResult {
        let config = WatchdogConfig::default();
        let text = render_config(&config, ConfigFormat::Yaml)?;
        assert!(text.contains("stall_threshold_ms: 300"));
        assert_eq!(parse_config(&text, ConfigFormat::Yaml)?, config);
        Ok(())
    }
}
