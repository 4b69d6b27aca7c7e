use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Unified config (figment-deserialized from defaults / shoal.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   shoal.toml:      [connection]
//                    url = "ws://localhost:4400/ws"
//
//   env var:         SHOAL_CONNECTION__URL=ws://localhost:4400/ws
//                    (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub connection: ConnectionFileConfig,
}

/// Connection tunables (lives under `[connection]` in shoal.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionFileConfig {
    /// WebSocket endpoint of the remote agent.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base delay for linear reconnect backoff (attempt N waits N x base).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for ConnectionFileConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

/// Build a figment that layers: struct defaults → shoal.toml → SHOAL_* env
/// vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `SHOAL_CONNECTION__URL=ws://host/ws`  →  `connection.url`
///   `SHOAL_CONNECTION__BASE_DELAY_MS=250` →  `connection.base_delay_ms`
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let base = Figment::from(Serialized::defaults(FileConfig::default()));
    let base = match config_path {
        Some(path) => base.merge(Toml::file(path)),
        None => base.merge(Toml::file("shoal.toml")),
    };
    base.merge(Env::prefixed("SHOAL_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used by the actors)
// =============================================================================

/// Connection configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
}

impl ConnectionConfig {
    pub fn from_file(fc: &ConnectionFileConfig) -> Self {
        Self {
            url: fc.url.clone(),
            max_reconnect_attempts: fc.max_reconnect_attempts,
            base_delay: Duration::from_millis(fc.base_delay_ms),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_file(&ConnectionFileConfig::default())
    }
}

/// Full client configuration (runtime view).
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            connection: ConnectionConfig::from_file(&fc.connection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let config: FileConfig = load_config(Some(Path::new("/nonexistent/shoal.toml")))
            .extract()
            .unwrap();
        assert!(config.connection.url.is_none());
        assert_eq!(config.connection.max_reconnect_attempts, 5);
        assert_eq!(config.connection.base_delay_ms, 1000);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shoal.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[connection]\nurl = \"ws://localhost:9999/ws\"\nbase_delay_ms = 250"
        )
        .unwrap();

        let config: FileConfig = load_config(Some(&path)).extract().unwrap();
        assert_eq!(
            config.connection.url.as_deref(),
            Some("ws://localhost:9999/ws")
        );
        assert_eq!(config.connection.base_delay_ms, 250);
        // Untouched fields keep their struct defaults.
        assert_eq!(config.connection.max_reconnect_attempts, 5);
    }

    #[test]
    fn runtime_view_converts_delay_to_duration() {
        let fc = ConnectionFileConfig {
            base_delay_ms: 250,
            ..Default::default()
        };
        let rc = ConnectionConfig::from_file(&fc);
        assert_eq!(rc.base_delay, Duration::from_millis(250));
    }
}
