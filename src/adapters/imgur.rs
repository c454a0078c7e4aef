//! Image re-hosting for Telegram photos.
//!
//! Telegram file URLs embed the bot token, so photos are re-uploaded to
//! imgur by URL and the public link is relayed instead.

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// imgur anonymous upload endpoint.
const IMGUR_UPLOAD_URL: &str = "https://api.imgur.com/3/image";

/// An image upload that did not produce a link.
#[derive(Debug, Error)]
pub enum UploadError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// imgur answered with `success: false`.
    #[error("imgur rejected the upload (status {0})")]
    Rejected(u16),
}

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    #[serde(default)]
    data: Option<ImageData>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    status: u16,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    link: String,
    #[serde(default)]
    deletehash: String,
}

/// A successfully hosted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Public link.
    pub link: String,
    /// Token that allows deleting the image.
    pub deletehash: String,
}

impl UploadedImage {
    /// Page that deletes the image.
    pub fn deletion_link(&self) -> String {
        format!("https://imgur.com/delete/{}", self.deletehash)
    }
}

/// Decode an upload response body.
///
/// # Errors
///
/// Returns [`UploadError::Parse`] for malformed JSON and
/// [`UploadError::Rejected`] when imgur reports failure.
pub fn parse_upload_response(body: &str) -> Result<UploadedImage, UploadError> {
    let response: ImgurResponse = serde_json::from_str(body)?;
    match response.data {
        Some(data) if response.success && !data.link.is_empty() => Ok(UploadedImage {
            link: data.link,
            deletehash: data.deletehash,
        }),
        _ => Err(UploadError::Rejected(response.status)),
    }
}

/// Multipart body asking imgur to fetch the image itself.
fn upload_form(image_url: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .text("image", image_url.to_owned())
        .text("type", "url")
}

/// imgur API client authenticated with an application client id.
#[derive(Debug, Clone)]
pub struct ImgurClient {
    client: reqwest::Client,
    client_id: String,
}

impl ImgurClient {
    /// Create a client sharing the given HTTP connection pool.
    pub fn new(client: reqwest::Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
        }
    }

    /// Have imgur fetch and host the image at `image_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or imgur rejects the image.
    pub async fn upload_by_url(&self, image_url: &str) -> Result<UploadedImage, UploadError> {
        let body = self
            .client
            .post(IMGUR_UPLOAD_URL)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Client-ID {}", self.client_id),
            )
            .multipart(upload_form(image_url))
            .send()
            .await?
            .text()
            .await?;

        let image = parse_upload_response(&body)?;
        info!(
            link = %image.link,
            deletion_link = %image.deletion_link(),
            "image uploaded"
        );
        Ok(image)
    }
}
