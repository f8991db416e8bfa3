//! Composition root.
//!
//! [`WorkspaceHost`] turns [`Settings`] into a running engine: it picks the
//! privileged executor and the redirection variant, builds the matching
//! snapshot store and cleanup plan, and owns the single [`SessionManager`].

use anyhow::{Context, Result};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cleanup::{Browser, CleanupCoordinator, CleanupPlan, FileRemover, FsRemover};
use crate::infrastructure::config::Settings;
use crate::isolation::{
    BackendKind, BackendPaths, Escalation, IsolationBackend, JunctionBackend, OverlayBackend,
    PrivilegedExecutor, SimulatedExecutor, SystemExecutor, UserFolder,
};
use crate::session::{SessionManager, SessionOptions};
use crate::snapshot::{FileSnapshot, RegistrySnapshot, SnapshotStore, files, registry};
use crate::sync::{CloudProvider, HttpUploader};
use crate::tracker::DEFAULT_POLL_INTERVAL;
use crate::ws::Broadcaster;

/// Name of the working root below the platform data directory.
pub const APP_DIR: &str = "ephemera";

/// The running engine shared by the control plane.
#[derive(Debug)]
pub struct WorkspaceHost {
    manager: Arc<SessionManager>,
    uploader: Option<HttpUploader>,
    paths: BackendPaths,
}

impl WorkspaceHost {
    /// Builds the engine described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home or data directory cannot be determined or
    /// the sync endpoint is not a valid URL.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let workspace = &settings.workspace;
        let home = match &workspace.home {
            Some(home) => home.clone(),
            None => dirs::home_dir().context("Cannot determine the home directory")?,
        };
        let working_root = match &workspace.root {
            Some(root) => root.clone(),
            None => dirs::data_local_dir()
                .context("Cannot determine the data directory")?
                .join(APP_DIR),
        };
        let paths = BackendPaths { home, working_root };

        let escalation = workspace.escalation.unwrap_or_else(Escalation::host_default);
        let executor: Arc<dyn PrivilegedExecutor> = match escalation {
            Escalation::Simulate => Arc::new(SimulatedExecutor::new()),
            other => Arc::new(SystemExecutor::new(other)),
        };

        let cleanup = &settings.cleanup;
        let mut builder = HostBuilder::new(paths.clone(), executor)
            .folders(workspace.folders.clone())
            .poll_interval(workspace.poll_interval())
            .window(cleanup.window())
            .scrub_browsers(cleanup.scrub_browsers);
        if let Some(kind) = workspace.backend {
            builder = builder.backend(kind);
        }
        if !workspace.snapshot_files.is_empty() {
            builder = builder.snapshot_files(workspace.snapshot_files.clone());
        }
        if !workspace.registry_keys.is_empty() {
            builder = builder.registry_keys(workspace.registry_keys.clone());
        }
        if !cleanup.temp_locations.is_empty() {
            builder = builder.temp_locations(cleanup.temp_locations.clone());
        }
        if let Some(recent) = &cleanup.recent_list {
            builder = builder.recent_list(Some(recent.clone()));
        }
        if let Some(sync) = &settings.sync {
            let url = Url::parse(&sync.endpoint)
                .with_context(|| format!("Invalid sync endpoint '{}'", sync.endpoint))?;
            let mut uploader = HttpUploader::new(url, CloudProvider::Google);
            if let Some(token) = &sync.token {
                uploader = uploader.with_token(token.clone());
            }
            builder = builder.uploader(uploader);
        }

        Ok(builder.build())
    }

    /// Starts a builder for hosts assembled by hand.
    #[must_use]
    pub fn builder(paths: BackendPaths, executor: Arc<dyn PrivilegedExecutor>) -> HostBuilder {
        HostBuilder::new(paths, executor)
    }

    /// The session manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Uploader bound to `provider`, if sync is configured.
    #[must_use]
    pub fn uploader(&self, provider: CloudProvider) -> Option<HttpUploader> {
        self.uploader.as_ref().map(|u| u.for_provider(provider))
    }

    /// Home and working root in use.
    #[must_use]
    pub fn paths(&self) -> &BackendPaths {
        &self.paths
    }
}

/// Assembles a [`WorkspaceHost`]. Anything not set falls back to the
/// platform default.
#[derive(Debug)]
pub struct HostBuilder {
    paths: BackendPaths,
    executor: Arc<dyn PrivilegedExecutor>,
    backend: BackendKind,
    folders: Vec<UserFolder>,
    poll_interval: Duration,
    snapshot_files: Option<Vec<PathBuf>>,
    registry_keys: Option<Vec<String>>,
    browsers: Option<Vec<Browser>>,
    scrub_browsers: bool,
    temp_locations: Option<Vec<PathBuf>>,
    recent_list: Option<Option<PathBuf>>,
    window: Duration,
    remover: Arc<dyn FileRemover>,
    uploader: Option<HttpUploader>,
    broadcaster: Broadcaster,
}

impl HostBuilder {
    fn new(paths: BackendPaths, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            paths,
            executor,
            backend: BackendKind::host(),
            folders: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            snapshot_files: None,
            registry_keys: None,
            browsers: None,
            scrub_browsers: true,
            temp_locations: None,
            recent_list: None,
            window: crate::cleanup::purge::DEFAULT_WINDOW,
            remover: Arc::new(FsRemover),
            uploader: None,
            broadcaster: Broadcaster::new(),
        }
    }

    /// Redirection variant.
    #[must_use]
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.backend = kind;
        self
    }

    /// Folders to isolate; empty means the whole catalog.
    #[must_use]
    pub fn folders(mut self, folders: Vec<UserFolder>) -> Self {
        self.folders = folders;
        self
    }

    /// Change tracker period.
    #[must_use]
    pub fn poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = period;
        self
    }

    /// Files captured by the file snapshot.
    #[must_use]
    pub fn snapshot_files(mut self, files: Vec<PathBuf>) -> Self {
        self.snapshot_files = Some(files);
        self
    }

    /// Keys captured by the registry snapshot.
    #[must_use]
    pub fn registry_keys(mut self, keys: Vec<String>) -> Self {
        self.registry_keys = Some(keys);
        self
    }

    /// Browsers to scrub instead of the platform catalog.
    #[must_use]
    pub fn browsers(mut self, browsers: Vec<Browser>) -> Self {
        self.browsers = Some(browsers);
        self
    }

    /// Turns the browser scrub on or off.
    #[must_use]
    pub fn scrub_browsers(mut self, enabled: bool) -> Self {
        self.scrub_browsers = enabled;
        self
    }

    /// Temp locations to purge.
    #[must_use]
    pub fn temp_locations(mut self, locations: Vec<PathBuf>) -> Self {
        self.temp_locations = Some(locations);
        self
    }

    /// Recently-used list to reset; `None` disables the step.
    #[must_use]
    pub fn recent_list(mut self, path: Option<PathBuf>) -> Self {
        self.recent_list = Some(path);
        self
    }

    /// Purge age window.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// File remover used by scrub and purge.
    #[must_use]
    pub fn remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.remover = remover;
        self
    }

    /// Uploader for cloud sync.
    #[must_use]
    pub fn uploader(mut self, uploader: HttpUploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Broadcaster shared with other observers.
    #[must_use]
    pub fn broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Wires everything together.
    #[must_use]
    pub fn build(self) -> WorkspaceHost {
        let BackendPaths { home, working_root } = &self.paths;

        let backend: Arc<dyn IsolationBackend> = match self.backend {
            BackendKind::Overlay => {
                Arc::new(OverlayBackend::new(self.paths.clone(), Arc::clone(&self.executor)))
            }
            BackendKind::Junction => {
                Arc::new(JunctionBackend::new(self.paths.clone(), Arc::clone(&self.executor)))
            }
        };
        let snapshot: Arc<dyn SnapshotStore> = match self.backend {
            BackendKind::Overlay => Arc::new(FileSnapshot::new(
                working_root,
                self.snapshot_files
                    .unwrap_or_else(|| files::default_sources(home)),
            )),
            BackendKind::Junction => Arc::new(RegistrySnapshot::new(
                working_root,
                self.registry_keys.unwrap_or_else(default_registry_keys),
                Arc::clone(&self.executor),
            )),
        };

        let browsers = if self.scrub_browsers {
            self.browsers.unwrap_or_else(|| Browser::catalog(home))
        } else {
            Vec::new()
        };
        let plan = CleanupPlan {
            browsers,
            temp_locations: self
                .temp_locations
                .unwrap_or_else(|| default_temp_locations(home, std::env::temp_dir())),
            recent_list: self
                .recent_list
                .unwrap_or_else(|| default_recent_list(home)),
            window: self.window,
            working_root: working_root.clone(),
        };
        let cleanup = CleanupCoordinator::new(
            Arc::clone(&backend),
            Arc::clone(&snapshot),
            self.remover,
            plan,
        );

        info!(
            backend = %backend.kind(),
            home = %home.display(),
            working_root = %working_root.display(),
            "Workspace host assembled"
        );

        let manager = SessionManager::new(
            backend,
            snapshot,
            cleanup,
            self.broadcaster,
            SessionOptions {
                folders: self.folders,
                poll_interval: self.poll_interval,
            },
        );

        WorkspaceHost {
            manager: Arc::new(manager),
            uploader: self.uploader,
            paths: self.paths,
        }
    }
}

/// Temp and cache locations purged at teardown. Never a whole application
/// data root: on Windows the platform cache dir is all of `%LOCALAPPDATA%`.
fn default_temp_locations(home: &Path, temp: PathBuf) -> Vec<PathBuf> {
    let cache = if cfg!(windows) {
        home.join(r"AppData\Local\Temp")
    } else if cfg!(target_os = "macos") {
        home.join("Library/Caches")
    } else {
        home.join(".cache")
    };
    let mut locations = vec![temp];
    if !locations.contains(&cache) {
        locations.push(cache);
    }
    locations
}

fn default_registry_keys() -> Vec<String> {
    registry::DEFAULT_KEYS.iter().map(ToString::to_string).collect()
}

fn default_recent_list(home: &Path) -> Option<PathBuf> {
    if cfg!(windows) {
        Some(home.join(r"AppData\Roaming\Microsoft\Windows\Recent"))
    } else if cfg!(target_os = "macos") {
        None
    } else {
        Some(home.join(".local/share/recently-used.xbel"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    #[test]
    fn builder_selects_backend_variant() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BackendPaths {
            home: dir.path().join("home"),
            working_root: dir.path().join("root"),
        };
        let executor: Arc<dyn PrivilegedExecutor> = Arc::new(SimulatedExecutor::new());

        let host = WorkspaceHost::builder(paths.clone(), Arc::clone(&executor))
            .backend(BackendKind::Junction)
            .build();
        assert_eq!(host.manager().session().backend, BackendKind::Junction);
        assert_eq!(host.manager().status(), SessionStatus::Idle);
        assert!(host.uploader(CloudProvider::Dropbox).is_none());

        let host = WorkspaceHost::builder(paths, executor)
            .backend(BackendKind::Overlay)
            .build();
        assert_eq!(host.manager().session().backend, BackendKind::Overlay);
    }

    #[test]
    fn default_registry_keys_are_explorer_recent_activity() {
        let names: Vec<String> = default_registry_keys()
            .iter()
            .filter_map(|k| k.strip_prefix(r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\"))
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, ["UserAssist", "RecentDocs", "RunMRU", "TypedPaths"]);
    }

    #[test]
    fn default_temp_locations_stay_inside_temp_and_cache() {
        let home = Path::new("/home/u");
        let locations = default_temp_locations(home, PathBuf::from("/tmp"));

        assert_eq!(locations[0], PathBuf::from("/tmp"));
        let cache = &locations[1];
        if cfg!(windows) {
            assert_eq!(cache, &home.join(r"AppData\Local\Temp"));
        } else if cfg!(target_os = "macos") {
            assert_eq!(cache, &home.join("Library/Caches"));
        } else {
            assert_eq!(cache, &home.join(".cache"));
        }
        assert!(!locations.contains(&home.join("AppData").join("Local")));
        assert!(locations.iter().all(|l| l != home));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn default_temp_locations_are_deduplicated() {
        let home = Path::new("/home/u");
        let locations = default_temp_locations(home, home.join(".cache"));
        assert_eq!(locations, vec![home.join(".cache")]);
    }

    #[test]
    fn settings_produce_simulated_host() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join("ephemera.toml");
        std::fs::write(
            &config,
            format!(
                "[workspace]\nhome = {:?}\nroot = {:?}\nescalation = \"simulate\"\nbackend = \"overlay\"\n\n[sync]\nendpoint = \"http://127.0.0.1:3000\"\n",
                dir.path().join("home"),
                dir.path().join("root"),
            ),
        )?;
        let settings = Settings::load(Some(&config))?;

        let host = WorkspaceHost::from_settings(&settings)?;
        assert_eq!(host.paths().home, dir.path().join("home"));
        assert!(host.uploader(CloudProvider::OneDrive).is_some());
        Ok(())
    }

    #[test]
    fn invalid_sync_endpoint_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join("ephemera.toml");
        std::fs::write(
            &config,
            "[workspace]\nescalation = \"simulate\"\nhome = \"/tmp\"\nroot = \"/tmp/ephemera\"\n\n[sync]\nendpoint = \"not a url\"\n",
        )?;
        let settings = Settings::load(Some(&config))?;
        assert!(WorkspaceHost::from_settings(&settings).is_err());
        Ok(())
    }
}
