//! Shared fixture for lifecycle and control-plane scenarios.
//!
//! Every fixture lives in its own temp dir: a fake home with the folder
//! catalog, a private working root, browser profiles, a temp location and a
//! recent list. Privileged commands run through the simulated executor.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use ephemera_kernel::cleanup::{Browser, BrowserFamily, FileRemover, FsRemover};
use ephemera_kernel::host::WorkspaceHost;
use ephemera_kernel::isolation::{
    BackendKind, BackendPaths, PrivilegedExecutor, SimulatedExecutor, UserFolder,
};
use ephemera_kernel::session::SessionManager;
use ephemera_kernel::sync::HttpUploader;
use ephemera_kernel::ws::{BroadcastMessage, BroadcastReceiver, SessionEvent};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Tracker period used by every fixture.
pub const POLL: Duration = Duration::from_millis(50);

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Fails removals of any file whose path contains `needle`.
#[derive(Debug)]
pub struct LockedRemover {
    pub needle: String,
}

impl FileRemover for LockedRemover {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        if path.to_string_lossy().contains(&self.needle) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is locked by another process",
            ));
        }
        FsRemover.remove_file(path)
    }
}

/// Knobs of a [`Fixture`].
pub struct FixtureOptions {
    pub backend: BackendKind,
    pub folders: Vec<UserFolder>,
    pub executor: SimulatedExecutor,
    pub remover: Arc<dyn FileRemover>,
    pub uploader: Option<HttpUploader>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Overlay,
            folders: Vec::new(),
            executor: SimulatedExecutor::new(),
            remover: Arc::new(FsRemover),
            uploader: None,
        }
    }
}

/// A host wired to a private temp dir.
pub struct Fixture {
    pub dir: TempDir,
    pub host: Arc<WorkspaceHost>,
    pub executor: Arc<SimulatedExecutor>,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Self::with(FixtureOptions::default())
    }

    pub fn with(options: FixtureOptions) -> Result<Self> {
        let dir = TempDir::new()?;
        Self::in_dir(dir, options)
    }

    /// Builds a host over an existing fixture directory, as a restarted
    /// process would.
    pub fn in_dir(dir: TempDir, options: FixtureOptions) -> Result<Self> {
        let home = dir.path().join("home");
        for folder in UserFolder::ALL {
            fs::create_dir_all(folder.original_in(&home))?;
        }
        fs::create_dir_all(home.join(".config"))?;
        let user_dirs = home.join(".config/user-dirs.dirs");
        if !user_dirs.exists() {
            fs::write(&user_dirs, "XDG_DOCUMENTS_DIR=\"$HOME/Documents\"\n")?;
        }
        fs::create_dir_all(dir.path().join("browsers/chrome/Default"))?;
        fs::create_dir_all(dir.path().join("browsers/firefox/abc.default"))?;
        fs::create_dir_all(dir.path().join("tmp"))?;

        let executor = Arc::new(options.executor);
        let paths = BackendPaths {
            home: home.clone(),
            working_root: dir.path().join("root"),
        };
        let mut builder =
            WorkspaceHost::builder(paths, Arc::clone(&executor) as Arc<dyn PrivilegedExecutor>)
                .backend(options.backend)
                .folders(options.folders)
                .poll_interval(POLL)
                .snapshot_files(vec![user_dirs])
                .registry_keys(vec![r"HKCU\Software\Ephemera\Test".to_string()])
                .browsers(vec![
                    Browser {
                        name: "Chrome".into(),
                        root: dir.path().join("browsers/chrome"),
                        family: BrowserFamily::Chromium,
                    },
                    Browser {
                        name: "Firefox".into(),
                        root: dir.path().join("browsers/firefox"),
                        family: BrowserFamily::Firefox,
                    },
                ])
                .temp_locations(vec![dir.path().join("tmp")])
                .recent_list(Some(home.join("recently-used.xbel")))
                .remover(options.remover);
        if let Some(uploader) = options.uploader {
            builder = builder.uploader(uploader);
        }

        Ok(Self {
            host: Arc::new(builder.build()),
            dir,
            executor,
        })
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        self.host.manager()
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Writable surface of `folder`.
    pub fn surface(&self, folder: UserFolder) -> Result<PathBuf> {
        self.manager()
            .surfaces()
            .into_iter()
            .find(|s| s.folder == folder)
            .map(|s| s.writable)
            .ok_or_else(|| anyhow!("{folder} is not isolated"))
    }

    /// Writes `contents` next door and renames it into place, so a scan never
    /// sees a half-written file.
    pub fn drop_file(&self, folder: UserFolder, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let staging = self.dir.path().join("staging");
        fs::create_dir_all(&staging)?;
        let staged = staging.join(name);
        fs::write(&staged, contents)?;
        let target = self.surface(folder)?.join(name);
        fs::rename(&staged, &target)?;
        Ok(target)
    }
}

/// Waits for the first event matching `pred`.
pub async fn wait_for<F>(rx: &mut BroadcastReceiver, mut pred: F) -> Result<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let event = tokio::time::timeout(WAIT, async {
        loop {
            if let BroadcastMessage::Event(event) = rx.recv().await?
                && pred(&event)
            {
                return Ok::<_, anyhow::Error>(event);
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for event"))??;
    Ok(event)
}

/// Events already queued on `rx`.
pub fn drain(rx: &mut BroadcastReceiver) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(message) = rx.try_recv() {
        if let BroadcastMessage::Event(event) = message {
            events.push(event);
        }
    }
    events
}
