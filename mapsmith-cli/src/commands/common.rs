//! Common utilities shared across CLI commands.

use std::path::Path;

use mapsmith::config::ConfigFile;
use mapsmith::mapconfig::MapConfig;
use mapsmith::widget::WidgetRequest;

use crate::error::CliError;

/// Loads a map configuration document.
pub fn load_map_config(path: &Path) -> Result<MapConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|error| CliError::Input {
        path: path.display().to_string(),
        error,
    })?;
    Ok(MapConfig::from_json(&text)?)
}

/// Parses `--params`: either inline JSON or `@path` to a JSON file.
pub fn parse_request(params: Option<&str>) -> Result<WidgetRequest, CliError> {
    let Some(params) = params else {
        return Ok(WidgetRequest::default());
    };

    let text = match params.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|error| CliError::Input {
            path: path.to_string(),
            error,
        })?,
        None => params.to_string(),
    };

    serde_json::from_str(&text).map_err(|e| CliError::Args(format!("--params: {}", e)))
}

/// Loads the configuration file from an explicit path or the default one.
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    Ok(match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_inline() {
        let request = parse_request(Some(
            r#"{"filters": {"pop": {"min": 10}}, "bbox": "-10,-10,10,10", "own_filter": true}"#,
        ))
        .unwrap();

        assert!(request.own_filter);
        assert_eq!(request.bbox.as_deref(), Some("-10,-10,10,10"));
        assert_eq!(request.filters["pop"].min, Some(10.0));
    }

    #[test]
    fn test_parse_request_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"overrides": {"bins": 6}}"#).unwrap();

        let request = parse_request(Some(&format!("@{}", path.display()))).unwrap();
        assert_eq!(request.overrides.bins, Some(6));
    }

    #[test]
    fn test_parse_request_defaults_and_errors() {
        assert_eq!(parse_request(None).unwrap(), WidgetRequest::default());
        assert!(matches!(parse_request(Some("{not json")), Err(CliError::Args(_))));
    }

    #[test]
    fn test_load_map_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(
            &path,
            r##"{"layers": [{"type": "plain", "options": {"color": "#112233"}}]}"##,
        )
        .unwrap();

        let config = load_map_config(&path).unwrap();
        assert_eq!(config.layers().len(), 1);

        assert!(matches!(
            load_map_config(&dir.path().join("missing.json")),
            Err(CliError::Input { .. })
        ));
    }
}
