use super::PipeConfig;
use crate::error::{Error, Result};
use crate::watcher::expand_tilde;
use std::path::Path;
use tracing::{debug, info};

/// Load the configuration at `path`, or defaults when the file does not exist.
///
/// The watch root is tilde-expanded and the result validated.
pub async fn load_config(path: &Path) -> Result<PipeConfig> {
    let mut config = if tokio::fs::try_exists(path).await? {
        let content = tokio::fs::read_to_string(path).await?;
        debug!("Loaded configuration from {}", path.display());
        parse_config(path, &content)?
    } else {
        info!(
            "No configuration at {}, using defaults",
            path.display()
        );
        PipeConfig::default()
    };

    config.watch_dir = expand_tilde(&config.watch_dir);
    validate(&config)?;
    Ok(config)
}

/// Parse `content` as TOML or JSON depending on the extension of `path`.
///
/// Syntax and shape errors are reported as [`Error::Config`].
pub fn parse_config(path: &Path, content: &str) -> Result<PipeConfig> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let parsed = if is_toml {
        toml::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(content).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

pub fn validate(config: &PipeConfig) -> Result<()> {
    for (index, subscriber) in config.subscribers.iter().enumerate() {
        if subscriber.label.trim().is_empty() {
            return Err(Error::Config(format!(
                "subscribers[{index}]: label must not be empty"
            )));
        }
        let url = url::Url::parse(&subscriber.url).map_err(|e| {
            Error::Config(format!(
                "subscriber '{}': invalid url '{}': {e}",
                subscriber.label, subscriber.url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "subscriber '{}': unsupported scheme '{}'",
                subscriber.label,
                url.scheme()
            )));
        }
    }

    if config.send.program.trim().is_empty() {
        return Err(Error::Config("send.program must not be empty".to_string()));
    }
    if config.dispatch.session_capacity == 0 {
        return Err(Error::Config(
            "dispatch.sessionCapacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribers::SubscriberLevel;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    const JSON: &str = r#"{
        "watchDir": "/tmp/claude-projects",
        "port": 3200,
        "subscribers": [
            {"url": "http://localhost:1880/hook", "label": "node-red", "level": "stream-status"},
            {"url": "https://example.com/in", "label": "bot", "level": "summary",
             "authorization": "Bearer token"}
        ],
        "send": {"defaultAllowedTools": ["Read", "Grep"], "cancelTimeoutMs": 1500}
    }"#;

    #[test]
    fn test_parse_json_config() {
        let config = parse_config(Path::new("config.json"), JSON).unwrap();

        assert_eq!(config.watch_dir, PathBuf::from("/tmp/claude-projects"));
        assert_eq!(config.port, 3200);
        assert_eq!(config.subscribers.len(), 2);
        assert_eq!(config.subscribers[0].level, SubscriberLevel::StreamStatus);
        assert_eq!(
            config.subscribers[1].authorization.as_deref(),
            Some("Bearer token")
        );
        assert_eq!(config.send.default_allowed_tools, vec!["Read", "Grep"]);
        assert_eq!(config.send.cancel_grace(), Duration::from_millis(1500));
        // Unspecified keys keep their defaults.
        assert_eq!(config.send.identify_timeout_ms, 30_000);
        assert_eq!(config.send.program, "claude");
        assert_eq!(config.dispatch.failure_cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_toml_config() {
        let content = r#"
            watchDir = "/srv/logs"
            logDir = "/var/log/claude-pipe"

            [[subscribers]]
            url = "http://localhost:9000/"
            label = "local"
            level = "status"

            [dispatch]
            sessionCapacity = 16
        "#;
        let config = parse_config(Path::new("pipe.TOML"), content).unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("/srv/logs"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/claude-pipe"));
        assert_eq!(config.subscribers[0].level, SubscriberLevel::Status);
        assert_eq!(config.dispatch.session_capacity, 16);
        assert_eq!(config.port, 3100);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let content = r#"{"subscribers":[{"url":"http://x/","label":"a","level":"verbose"}]}"#;
        let result = parse_config(Path::new("config.json"), content);
        assert!(matches!(result, Err(Error::Config(message)) if message.contains("verbose")));
    }

    #[test]
    fn test_validation_rejects_bad_subscribers() {
        let mut config = parse_config(Path::new("config.json"), JSON).unwrap();
        assert!(validate(&config).is_ok());

        config.subscribers[0].url = "not a url".into();
        assert!(matches!(validate(&config), Err(Error::Config(_))));

        config.subscribers[0].url = "ftp://host/file".into();
        assert!(matches!(validate(&config), Err(Error::Config(_))));

        config.subscribers[0].url = "http://localhost/".into();
        config.subscribers[0].label = "  ".into();
        assert!(matches!(validate(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.port, 3100);
        assert!(config.subscribers.is_empty());
        assert!(!config.watch_dir.starts_with("~"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, JSON).await.unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.port, 3200);
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert!(load_config(&path).await.is_err());
    }
}
