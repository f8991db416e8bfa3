//! Uploader talking to the local storage gateway over HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{UploadError, UploadReceipt, UploadRequest, Uploader};

/// Storage provider the gateway forwards uploads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Google Drive.
    Google,
    /// Microsoft OneDrive.
    OneDrive,
    /// Dropbox.
    Dropbox,
}

impl CloudProvider {
    /// Path segment used by the gateway.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::OneDrive => "onedrive",
            Self::Dropbox => "dropbox",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "onedrive" => Ok(Self::OneDrive),
            "dropbox" => Ok(Self::Dropbox),
            other => Err(format!("Unknown cloud provider: {other}")),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody<'a> {
    file_path: String,
    file_name: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
    web_view_link: Option<String>,
    web_url: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Posts `{filePath, fileName, mimeType}` to `<base>/api/upload/<provider>`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    base_url: Url,
    provider: CloudProvider,
    token: Option<SecretString>,
}

impl HttpUploader {
    /// Creates an uploader for `provider` behind the gateway at `base_url`.
    #[must_use]
    pub fn new(base_url: Url, provider: CloudProvider) -> Self {
        Self {
            client: Client::new(),
            base_url,
            provider,
            token: None,
        }
    }

    /// Sends `token` as a bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Same gateway and credentials, different provider.
    #[must_use]
    pub fn for_provider(&self, provider: CloudProvider) -> Self {
        Self {
            provider,
            ..self.clone()
        }
    }

    fn endpoint(&self) -> Result<Url, UploadError> {
        self.base_url
            .join(&format!("api/upload/{}", self.provider))
            .map_err(|e| UploadError::Rejected {
                status: 0,
                message: format!("Invalid gateway URL: {e}"),
            })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, UploadError> {
        tokio::fs::metadata(&request.absolute_path)
            .await
            .map_err(|source| UploadError::Io {
                path: request.absolute_path.clone(),
                source,
            })?;

        let body = UploadBody {
            file_path: request.absolute_path.to_string_lossy().into_owned(),
            file_name: &request.suggested_name,
            mime_type: &request.mime_hint,
        };
        let mut builder = self.client.post(self.endpoint()?).json(&body);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let res = builder.send().await?;
        let status = res.status();
        debug!(provider = %self.provider, %status, file = %request.suggested_name, "Upload response");

        match status {
            s if s.is_success() => {
                let body: UploadResponse = res.json().await?;
                Ok(UploadReceipt {
                    remote_id: body.file_id,
                    remote_locator: body.web_view_link.or(body.web_url).or(body.path),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UploadError::Unauthorized),
            _ => {
                let text = res.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&text)
                    .map(|b| b.error)
                    .unwrap_or(text);
                Err(UploadError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
