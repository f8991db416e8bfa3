//! Privileged command execution.
//!
//! Mounts, junction creation and registry export/import/delete are expressed as
//! typed [`PrivilegedCommand`]s and handed to a [`PrivilegedExecutor`]. Each
//! call is one consent step: the real executor wraps exactly one command in
//! the platform's elevation mechanism instead of elevating the whole process.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument, warn};

use super::catalog::UserFolder;
use super::error::PrivilegedError;
use super::{is_link, link_dir, remove_link};
use crate::infrastructure::audit::{self, AuditEvent};

/// pkexec exit status when the authentication dialog was dismissed.
const PKEXEC_DISMISSED: i32 = 126;
/// pkexec exit status when authorization was refused.
const PKEXEC_NOT_AUTHORIZED: i32 = 127;

/// An operation that needs elevated rights (or at least a user-visible step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PrivilegedCommand {
    /// Union mount of `lower` (read-only) under `upper`/`work` at `merged`.
    Mount {
        /// Read-only lower layer.
        lower: PathBuf,
        /// Writable upper layer.
        upper: PathBuf,
        /// Overlay work directory.
        work: PathBuf,
        /// Mount point.
        merged: PathBuf,
    },
    /// Unmount whatever is mounted at `target`.
    Unmount {
        /// Mount point.
        target: PathBuf,
    },
    /// Directory junction at `link` pointing to `target`.
    CreateJunction {
        /// Path that becomes the junction.
        link: PathBuf,
        /// Directory the junction resolves to.
        target: PathBuf,
    },
    /// Export a registry key to a `.reg` file.
    ExportRegistry {
        /// Key path, e.g. `HKCU\Software\...`.
        key: String,
        /// Destination file.
        destination: PathBuf,
    },
    /// Import a `.reg` file.
    ImportRegistry {
        /// Source file.
        source: PathBuf,
    },
    /// Delete a registry key with all its values and subkeys.
    DeleteRegistry {
        /// Key path, e.g. `HKCU\Software\...`.
        key: String,
    },
}

impl PrivilegedCommand {
    /// Short human-readable description used in logs and errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Mount { merged, .. } => format!("mount overlay at {}", merged.display()),
            Self::Unmount { target } => format!("unmount {}", target.display()),
            Self::CreateJunction { link, target } => {
                format!("junction {} -> {}", link.display(), target.display())
            }
            Self::ExportRegistry { key, .. } => format!("export {key}"),
            Self::ImportRegistry { source } => format!("import {}", source.display()),
            Self::DeleteRegistry { key } => format!("delete {key}"),
        }
    }

    /// Whether the command must go through the elevation mechanism.
    /// Registry operations on the current user's hive do not.
    #[must_use]
    pub fn requires_elevation(&self) -> bool {
        matches!(
            self,
            Self::Mount { .. } | Self::Unmount { .. } | Self::CreateJunction { .. }
        )
    }

    /// The unelevated program invocation for this command.
    #[must_use]
    pub fn invocation(&self) -> Invocation {
        match self {
            Self::Mount {
                lower,
                upper,
                work,
                merged,
            } => Invocation::new(
                "mount",
                vec![
                    "-t".into(),
                    "overlay".into(),
                    "overlay".into(),
                    "-o".into(),
                    format!(
                        "lowerdir={},upperdir={},workdir={}",
                        escape_overlay_option(lower),
                        escape_overlay_option(upper),
                        escape_overlay_option(work)
                    ),
                    path_arg(merged),
                ],
            ),
            Self::Unmount { target } => Invocation::new("umount", vec![path_arg(target)]),
            Self::CreateJunction { link, target } => Invocation::new(
                "cmd",
                vec![
                    "/c".into(),
                    "mklink".into(),
                    "/J".into(),
                    path_arg(link),
                    path_arg(target),
                ],
            ),
            Self::ExportRegistry { key, destination } => Invocation::new(
                "reg",
                vec![
                    "export".into(),
                    key.clone(),
                    path_arg(destination),
                    "/y".into(),
                ],
            ),
            Self::ImportRegistry { source } => {
                Invocation::new("reg", vec!["import".into(), path_arg(source)])
            }
            Self::DeleteRegistry { key } => {
                Invocation::new("reg", vec!["delete".into(), key.clone(), "/f".into()])
            }
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Overlay mount options are comma separated and use `:` between lower
/// layers, so both must be escaped inside paths.
fn escape_overlay_option(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | ':' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A concrete program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run.
    pub program: String,
    /// Arguments, already split.
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Output of a successful privileged command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
}

/// Port through which backends and snapshot stores run privileged commands.
///
/// Calls are synchronous and may block on a consent prompt; callers run them
/// on the blocking pool.
pub trait PrivilegedExecutor: Send + Sync + fmt::Debug {
    /// Runs one command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not run, was declined, or failed.
    fn execute(&self, command: &PrivilegedCommand) -> Result<CommandOutput, PrivilegedError>;
}

/// How a [`SystemExecutor`] obtains elevated rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// polkit graphical consent (`pkexec`).
    Pkexec,
    /// Non-interactive `sudo -n`.
    Sudo,
    /// UAC consent through PowerShell `Start-Process -Verb RunAs`.
    RunAs,
    /// The process is already elevated.
    None,
    /// Emulate primitives without elevation (see [`SimulatedExecutor`]).
    Simulate,
}

impl Escalation {
    /// Default escalation for the host platform.
    #[must_use]
    pub fn host_default() -> Self {
        if cfg!(windows) {
            Self::RunAs
        } else {
            Self::Pkexec
        }
    }

    /// Wraps `invocation` in this escalation mechanism.
    #[must_use]
    pub fn wrap(self, invocation: Invocation) -> Invocation {
        match self {
            Self::None | Self::Simulate => invocation,
            Self::Pkexec => {
                let mut args = Vec::with_capacity(invocation.args.len() + 1);
                args.push(invocation.program);
                args.extend(invocation.args);
                Invocation::new("pkexec", args)
            }
            Self::Sudo => {
                let mut args = Vec::with_capacity(invocation.args.len() + 2);
                args.push("-n".to_string());
                args.push(invocation.program);
                args.extend(invocation.args);
                Invocation::new("sudo", args)
            }
            Self::RunAs => {
                let arg_list = invocation
                    .args
                    .iter()
                    .map(|a| powershell_quote(a))
                    .collect::<Vec<_>>()
                    .join(",");
                let script = format!(
                    "$p = Start-Process -FilePath {} -ArgumentList @({arg_list}) -Verb RunAs -WindowStyle Hidden -Wait -PassThru; exit $p.ExitCode",
                    powershell_quote(&invocation.program)
                );
                Invocation::new(
                    "powershell",
                    vec![
                        "-NoProfile".into(),
                        "-NonInteractive".into(),
                        "-ExecutionPolicy".into(),
                        "Bypass".into(),
                        "-Command".into(),
                        script,
                    ],
                )
            }
        }
    }

    fn is_declined(self, code: Option<i32>, stderr: &str) -> bool {
        match self {
            Self::Pkexec => matches!(code, Some(PKEXEC_DISMISSED | PKEXEC_NOT_AUTHORIZED)),
            Self::RunAs => stderr.contains("canceled by the user"),
            Self::Sudo => stderr.contains("a password is required"),
            Self::None | Self::Simulate => false,
        }
    }
}

/// Single-quotes a PowerShell literal. Values containing spaces are wrapped in
/// double quotes too, so `Start-Process` passes them as one argument.
fn powershell_quote(value: &str) -> String {
    let inner = if value.contains(' ') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    };
    format!("'{}'", inner.replace('\'', "''"))
}

/// Runs privileged commands as real OS processes.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    escalation: Escalation,
}

impl SystemExecutor {
    /// Creates an executor using `escalation` for commands that need it.
    #[must_use]
    pub fn new(escalation: Escalation) -> Self {
        Self { escalation }
    }

    /// Full invocation that [`PrivilegedExecutor::execute`] would spawn.
    #[must_use]
    pub fn render(&self, command: &PrivilegedCommand) -> Invocation {
        let base = command.invocation();
        if command.requires_elevation() {
            self.escalation.wrap(base)
        } else {
            base
        }
    }
}

impl PrivilegedExecutor for SystemExecutor {
    #[instrument(skip(self), fields(command = %command.describe()))]
    fn execute(&self, command: &PrivilegedCommand) -> Result<CommandOutput, PrivilegedError> {
        let invocation = self.render(command);
        debug!(program = %invocation.program, args = ?invocation.args, "Spawning privileged command");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|source| PrivilegedError::Spawn {
                program: invocation.program.clone(),
                source,
            });
        let output = match output {
            Ok(output) => output,
            Err(e) => return audited(command, Err(e)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code();

        let result = if output.status.success() {
            Ok(CommandOutput { stdout })
        } else if command.requires_elevation() && self.escalation.is_declined(code, &stderr) {
            Err(PrivilegedError::Declined {
                command: command.describe(),
            })
        } else {
            Err(PrivilegedError::Failed {
                command: command.describe(),
                code,
                stderr,
            })
        };
        audited(command, result)
    }
}

fn audited(
    command: &PrivilegedCommand,
    result: Result<CommandOutput, PrivilegedError>,
) -> Result<CommandOutput, PrivilegedError> {
    let outcome = match &result {
        Ok(_) => "succeeded".to_string(),
        Err(e) if e.is_declined() => "declined".to_string(),
        Err(e) => {
            warn!(error = %e, "Privileged command failed");
            format!("failed: {e}")
        }
    };
    audit::log_audit(&AuditEvent::PrivilegedCommand {
        command: command.describe(),
        outcome,
    });
    result
}

type FaultMatcher = Box<dyn Fn(&PrivilegedCommand) -> bool + Send + Sync>;

struct Fault {
    reason: String,
    matcher: FaultMatcher,
}

/// Emulates privileged primitives with unprivileged filesystem operations.
///
/// A mount becomes a `merged -> upper` directory link, a junction becomes a
/// directory link, a registry export writes a placeholder `.reg` file. Every
/// command is recorded and faults can be injected per command.
#[derive(Default)]
pub struct SimulatedExecutor {
    executed: Mutex<Vec<PrivilegedCommand>>,
    faults: Vec<Fault>,
    missing_keys: Vec<String>,
}

impl fmt::Debug for SimulatedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedExecutor")
            .field("executed", &self.executed.lock().len())
            .field("faults", &self.faults.len())
            .field("missing_keys", &self.missing_keys)
            .finish()
    }
}

impl SimulatedExecutor {
    /// Creates an executor with no injected faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every command matching `matcher` with `reason`.
    #[must_use]
    pub fn fail_when(
        mut self,
        reason: impl Into<String>,
        matcher: impl Fn(&PrivilegedCommand) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.faults.push(Fault {
            reason: reason.into(),
            matcher: Box::new(matcher),
        });
        self
    }

    /// Fails the overlay mount or junction creation of `folder`.
    #[must_use]
    pub fn fail_redirect_of(self, folder: UserFolder) -> Self {
        self.fail_when(format!("injected failure for {folder}"), move |cmd| {
            let target = match cmd {
                PrivilegedCommand::Mount { merged, .. } => merged,
                PrivilegedCommand::CreateJunction { link, .. } => link,
                _ => return false,
            };
            target.file_name().and_then(|n| n.to_str()) == Some(folder.dir_name())
        })
    }

    /// Treats registry `key` as nonexistent: exporting or deleting it exits
    /// unsuccessfully the way `reg` does.
    #[must_use]
    pub fn without_key(mut self, key: impl Into<String>) -> Self {
        self.missing_keys.push(key.into());
        self
    }

    fn missing_key(&self, command: &PrivilegedCommand) -> bool {
        match command {
            PrivilegedCommand::ExportRegistry { key, .. } | PrivilegedCommand::DeleteRegistry { key } => {
                self.missing_keys.contains(key)
            }
            _ => false,
        }
    }

    /// Commands executed so far, including failed ones.
    #[must_use]
    pub fn executed(&self) -> Vec<PrivilegedCommand> {
        self.executed.lock().clone()
    }

    fn simulate(command: &PrivilegedCommand) -> Result<(), String> {
        match command {
            PrivilegedCommand::Mount {
                lower,
                upper,
                merged,
                ..
            } => {
                if !lower.is_dir() {
                    return Err(format!("lower layer {} is missing", lower.display()));
                }
                std::fs::remove_dir(merged).map_err(|e| format!("mount point busy: {e}"))?;
                link_dir(upper, merged).map_err(|e| e.to_string())
            }
            PrivilegedCommand::Unmount { target } => {
                if !is_link(target) {
                    return Err(format!("{}: not mounted", target.display()));
                }
                remove_link(target).map_err(|e| e.to_string())?;
                std::fs::create_dir(target).map_err(|e| e.to_string())
            }
            PrivilegedCommand::CreateJunction { link, target } => {
                if std::fs::symlink_metadata(link).is_ok() {
                    return Err(format!("{} already exists", link.display()));
                }
                link_dir(target, link).map_err(|e| e.to_string())
            }
            PrivilegedCommand::ExportRegistry { key, destination } => {
                let hive = key.replacen("HKCU", "HKEY_CURRENT_USER", 1);
                std::fs::write(
                    destination,
                    format!("Windows Registry Editor Version 5.00\r\n\r\n[{hive}]\r\n"),
                )
                .map_err(|e| e.to_string())
            }
            PrivilegedCommand::ImportRegistry { source } => std::fs::metadata(source)
                .map(|_| ())
                .map_err(|e| format!("{}: {e}", source.display())),
            PrivilegedCommand::DeleteRegistry { .. } => Ok(()),
        }
    }
}

impl PrivilegedExecutor for SimulatedExecutor {
    fn execute(&self, command: &PrivilegedCommand) -> Result<CommandOutput, PrivilegedError> {
        self.executed.lock().push(command.clone());

        if let Some(fault) = self.faults.iter().find(|f| (f.matcher)(command)) {
            return audited(
                command,
                Err(PrivilegedError::Simulated {
                    command: command.describe(),
                    reason: fault.reason.clone(),
                }),
            );
        }

        if self.missing_key(command) {
            return audited(
                command,
                Err(PrivilegedError::Failed {
                    command: command.describe(),
                    code: Some(1),
                    stderr: "ERROR: The system was unable to find the specified registry key or value."
                        .to_string(),
                }),
            );
        }

        let result = Self::simulate(command)
            .map(|()| CommandOutput::default())
            .map_err(|reason| PrivilegedError::Simulated {
                command: command.describe(),
                reason,
            });
        audited(command, result)
    }
}
