//! Configuration for the Ephemera daemon.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file
//! (`ephemera.toml` in the working directory unless a path is given), and
//! `EPHEMERA__SECTION__KEY` environment variables.
//!
//! # Example
//!
//! ```no_run
//! use ephemera_kernel::infrastructure::config::Settings;
//!
//! let settings = Settings::new().expect("Failed to load configuration");
//! ```

pub mod cleanup;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod workspace;

pub use cleanup::CleanupSettings;
pub use server::ServerSettings;
pub use sync::SyncSettings;
pub use telemetry::TelemetrySettings;
pub use workspace::WorkspaceSettings;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "ephemera.toml";

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Server settings.
    pub server: ServerSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
    /// Workspace settings.
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    /// Cleanup settings.
    #[serde(default)]
    pub cleanup: CleanupSettings,
    /// Cloud sync settings.
    pub sync: Option<SyncSettings>,
}

impl Settings {
    /// Loads settings from defaults, `ephemera.toml` if present, and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Like [`Settings::new`], reading `file` instead of `ephemera.toml`.
    /// A file given explicitly must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 9090)?
            .set_default("telemetry.service_name", "ephemera")?
            .set_default("telemetry.sampling_ratio", 1.0)?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("EPHEMERA")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("workspace.folders")
                    .with_list_parse_key("workspace.snapshot_files")
                    .with_list_parse_key("workspace.registry_keys")
                    .with_list_parse_key("cleanup.temp_locations"),
            )
            .build()?;

        s.try_deserialize()
    }
}

/// Helper for strong typing addresses
pub struct BindAddress(pub String, pub u16);

impl BindAddress {
    /// Converts the bind address to a `SocketAddr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the IP address string cannot be parsed.
    pub fn to_socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        let ip = self
            .0
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid IP address '{}': {e}", self.0))?;
        Ok(std::net::SocketAddr::new(ip, self.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::{BackendKind, Escalation, UserFolder};
    use secrecy::ExposeSecret;
    use std::time::Duration;

    #[test]
    fn file_overrides_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ephemera.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9191

[workspace]
root = "/var/lib/ephemera"
folders = ["Documents", "Music"]
backend = "junction"
escalation = "simulate"
poll_interval_ms = 250

[cleanup]
window_minutes = 30
scrub_browsers = false

[sync]
endpoint = "http://localhost:3000"
token = "s3cret"
"#,
        )?;

        let settings = Settings::load(Some(&path))?;
        assert_eq!(settings.server.port, 9191);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.telemetry.service_name, "ephemera");
        assert_eq!(
            settings.workspace.folders,
            vec![UserFolder::Documents, UserFolder::Music]
        );
        assert_eq!(settings.workspace.backend, Some(BackendKind::Junction));
        assert_eq!(settings.workspace.escalation, Some(Escalation::Simulate));
        assert_eq!(settings.workspace.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.cleanup.window(), Duration::from_secs(30 * 60));
        assert!(!settings.cleanup.scrub_browsers);

        let sync = settings.sync.ok_or_else(|| anyhow::anyhow!("sync missing"))?;
        assert_eq!(sync.endpoint, "http://localhost:3000");
        assert_eq!(
            sync.token.as_ref().map(|t| t.expose_secret()),
            Some("s3cret")
        );
        Ok(())
    }

    #[test]
    fn sections_default_when_absent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("minimal.toml");
        std::fs::write(&path, "[telemetry]\nservice_name = \"test\"\n")?;

        let settings = Settings::load(Some(&path))?;
        assert!(settings.workspace.folders.is_empty());
        assert_eq!(settings.cleanup.window(), Duration::from_secs(180 * 60));
        assert!(settings.cleanup.scrub_browsers);
        assert!(settings.sync.is_none());
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = Path::new("/nonexistent/ephemera.toml");
        assert!(Settings::load(Some(path)).is_err());
    }

    #[test]
    fn bind_address_parses() -> anyhow::Result<()> {
        let addr = BindAddress("127.0.0.1".into(), 9090).to_socket_addr()?;
        assert_eq!(addr.port(), 9090);
        assert!(BindAddress("not-an-ip".into(), 1).to_socket_addr().is_err());
        Ok(())
    }
}
