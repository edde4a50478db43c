use std::path::Path;

use unisaver_core::fs_paths::{AppPaths, ServerPaths};

use crate::models::settings::Settings;

/// Settings plus whatever went wrong reading them. Loading happens before
/// tracing is installed, so the caller logs `warnings` once it is.
#[derive(Debug, Default)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub warnings: Vec<String>,
}

/// Reads `settings.json` from the data directory (or `UNISAVER_CONFIG`).
/// A missing or unreadable file falls back to defaults; `PORT` wins over the
/// configured port.
pub fn load_settings() -> LoadedSettings {
    let path = ServerPaths.config_file();
    let mut loaded = load_from(&path);
    if let Some(warning) = apply_port_override(&mut loaded.settings, std::env::var("PORT").ok().as_deref()) {
        loaded.warnings.push(warning);
    }
    loaded
}

pub fn load_from(path: &Path) -> LoadedSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadedSettings::default(),
        Err(e) => {
            return LoadedSettings {
                settings: Settings::default(),
                warnings: vec![format!("failed to read {}: {}", path.display(), e)],
            }
        }
    };

    match parse_settings(&raw) {
        Ok(settings) => LoadedSettings {
            settings,
            warnings: Vec::new(),
        },
        Err(e) => LoadedSettings {
            settings: Settings::default(),
            warnings: vec![format!("ignoring invalid settings file {}: {}", path.display(), e)],
        },
    }
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    if raw.trim().is_empty() {
        return Ok(Settings::default());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Returns a warning when `PORT` is set but unusable.
pub fn apply_port_override(settings: &mut Settings, port: Option<&str>) -> Option<String> {
    let raw = port.map(str::trim).filter(|p| !p.is_empty())?;
    match raw.parse::<u16>() {
        Ok(port) => {
            settings.server.port = port;
            None
        }
        Err(_) => Some(format!("ignoring invalid PORT value {:?}", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::DeliveryMode;

    fn temp_settings(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("unisaver-settings-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn empty_file_is_default() {
        let s = parse_settings("  \n").unwrap();
        assert_eq!(s.server.port, 8080);
    }

    #[test]
    fn parses_sections() {
        let s = parse_settings(r#"{"delivery":{"mode":"redirect"},"logging":{"json":true}}"#).unwrap();
        assert_eq!(s.delivery.mode, DeliveryMode::Redirect);
        assert!(s.logging.json);
        assert!(parse_settings("{not json").is_err());
    }

    #[test]
    fn missing_file_is_default_without_warning() {
        let loaded = load_from(Path::new("/definitely/not/here/settings.json"));
        assert_eq!(loaded.settings.server.port, 8080);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn invalid_file_falls_back_with_warning() {
        let path = temp_settings("{\"server\": {\"port\": \"nope\"");
        let loaded = load_from(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.settings.server.port, 8080);
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("ignoring invalid settings file"));
    }

    #[test]
    fn valid_file_is_read() {
        let path = temp_settings(r#"{"server":{"port":9000}}"#);
        let loaded = load_from(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.settings.server.port, 9000);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn port_override() {
        let mut s = Settings::default();
        assert!(apply_port_override(&mut s, Some("3000")).is_none());
        assert_eq!(s.server.port, 3000);

        let warning = apply_port_override(&mut s, Some("not-a-port")).unwrap();
        assert!(warning.contains("not-a-port"));
        assert_eq!(s.server.port, 3000);

        assert!(apply_port_override(&mut s, None).is_none());
        assert_eq!(s.server.port, 3000);
    }
}
