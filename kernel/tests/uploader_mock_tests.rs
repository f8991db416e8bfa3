//! HTTP mock tests for the storage gateway uploader.
//!
//! Uses wiremock to simulate the gateway's upload endpoints.

use ephemera_kernel::sync::{CloudProvider, HttpUploader, UploadError, UploadRequest, Uploader};
use reqwest::Url;
use secrecy::SecretString;
use serde_json::json;
use std::path::PathBuf;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn uploader_for(server: &MockServer, provider: CloudProvider) -> HttpUploader {
    HttpUploader::new(Url::parse(&format!("{}/", server.uri())).unwrap(), provider)
}

fn request_for(file: PathBuf) -> UploadRequest {
    UploadRequest {
        suggested_name: file.file_name().unwrap().to_string_lossy().into_owned(),
        absolute_path: file,
        mime_hint: "text/plain".to_string(),
    }
}

fn temp_file(dir: &tempfile::TempDir) -> PathBuf {
    let file = dir.path().join("note.txt");
    std::fs::write(&file, b"0123456789").unwrap();
    file
}

// =============================================================================
// Success Tests
// =============================================================================

#[tokio::test]
async fn test_google_upload_posts_file_descriptor() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = temp_file(&dir);

    Mock::given(method("POST"))
        .and(path("/api/upload/google"))
        .and(body_json(json!({
            "filePath": file.to_string_lossy(),
            "fileName": "note.txt",
            "mimeType": "text/plain",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fileId": "g-123",
            "webViewLink": "https://drive.example/g-123",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = uploader_for(&server, CloudProvider::Google)
        .upload(request_for(file))
        .await
        .unwrap();

    assert_eq!(receipt.remote_id, "g-123");
    assert_eq!(
        receipt.remote_locator.as_deref(),
        Some("https://drive.example/g-123")
    );
}

#[tokio::test]
async fn test_dropbox_receipt_falls_back_to_path() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/upload/dropbox"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "fileId": "d-1",
            "path": "/Ephemera/note.txt",
        })))
        .mount(&server)
        .await;

    let receipt = uploader_for(&server, CloudProvider::Dropbox)
        .upload(request_for(temp_file(&dir)))
        .await
        .unwrap();

    assert_eq!(receipt.remote_locator.as_deref(), Some("/Ephemera/note.txt"));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/upload/onedrive"))
        .and(header("authorization", "Bearer gateway-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fileId": "o-7",
            "webUrl": "https://onedrive.example/o-7",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = uploader_for(&server, CloudProvider::OneDrive)
        .with_token(SecretString::new("gateway-token".into()));
    let receipt = uploader.upload(request_for(temp_file(&dir))).await.unwrap();

    assert_eq!(receipt.remote_id, "o-7");
}

// =============================================================================
// Error Tests
// =============================================================================

#[tokio::test]
async fn test_unauthorized_maps_to_unauthorized() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/upload/google"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "Not authenticated with Google Drive"
        })))
        .mount(&server)
        .await;

    let result = uploader_for(&server, CloudProvider::Google)
        .upload(request_for(temp_file(&dir)))
        .await;

    assert!(matches!(result, Err(UploadError::Unauthorized)));
}

#[tokio::test]
async fn test_server_error_carries_gateway_message() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/upload/google"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "quota exceeded"
        })))
        .mount(&server)
        .await;

    let result = uploader_for(&server, CloudProvider::Google)
        .upload(request_for(temp_file(&dir)))
        .await;

    match result {
        Err(UploadError::Rejected { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "quota exceeded");
        }
        other => panic!("Expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_text_error_body_is_kept() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/upload/dropbox"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let result = uploader_for(&server, CloudProvider::Dropbox)
        .upload(request_for(temp_file(&dir)))
        .await;

    assert!(matches!(
        result,
        Err(UploadError::Rejected { status: 502, ref message }) if message == "Bad Gateway"
    ));
}

#[tokio::test]
async fn test_missing_file_never_reaches_gateway() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = uploader_for(&server, CloudProvider::Google)
        .upload(request_for(PathBuf::from("/nonexistent/note.txt")))
        .await;

    assert!(matches!(result, Err(UploadError::Io { .. })));
}
