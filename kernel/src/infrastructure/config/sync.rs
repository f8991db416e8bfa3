//! Storage gateway used by cloud sync.

use secrecy::SecretString;
use serde::Deserialize;

/// Sync settings. Absent means sync is disabled.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// Gateway base URL, e.g. `http://localhost:3000`.
    pub endpoint: String,
    /// Bearer token sent with every upload.
    #[serde(default)]
    pub token: Option<SecretString>,
}
