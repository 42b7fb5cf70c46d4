//! Input loading: turn a user-supplied path or URL into document bytes.
//!
//! Both sources are checked for the `%PDF` magic before returning, so a
//! wrong file fails here with a readable error instead of deep inside PDFium.

use crate::error::ExtractionError;
use crate::pipeline::rasterize::check_pdf_magic;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL, returning validated PDF bytes.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractionError> {
    let bytes = if is_url(input) {
        download(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_pdf_magic(&bytes)?;
    Ok(bytes)
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ExtractionError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| ExtractionError::ReadFailed {
            path: path.clone(),
            source,
        })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractionError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| ExtractionError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {}s", timeout_secs))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
