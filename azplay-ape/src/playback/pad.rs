//! Program-associated data (PAD) publishing
//!
//! On every scheduled start the current cut is written as pretty JSON to the
//! PAD file. When an HTTP endpoint is configured (e.g. an audio processor's
//! `metadata_strm` parameter), a fire-and-forget `GET ?set=<artist> - <title>`
//! is sent as well. Failures are logged and never reach the scheduler.

use crate::error::{Error, Result};
use azplay_common::Cut;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Timeout for the PAD HTTP request
pub const PAD_HTTP_TIMEOUT: Duration = Duration::from_secs(2);

struct PadHttp {
    url: String,
    client: reqwest::Client,
    runtime: Handle,
}

pub struct PadPublisher {
    file: Option<PathBuf>,
    http: Option<PadHttp>,
}

impl PadPublisher {
    /// File-only publisher (`None` disables the file too)
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file, http: None }
    }

    /// Also send PAD to `url`, with requests spawned on `runtime`
    pub fn with_http(mut self, url: impl Into<String>, runtime: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PAD_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build PAD HTTP client: {}", e)))?;
        self.http = Some(PadHttp {
            url: url.into(),
            client,
            runtime,
        });
        Ok(self)
    }

    pub fn publish(&self, cut: &Cut) {
        if let Some(path) = &self.file {
            let written = serde_json::to_string_pretty(cut)
                .map_err(|e| e.to_string())
                .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
            match written {
                Ok(()) => debug!("Wrote PAD for cut {} to {}", cut.id, path.display()),
                Err(e) => warn!("Failed to write PAD file {}: {}", path.display(), e),
            }
        }

        if let Some(http) = &self.http {
            let request = http
                .client
                .get(&http.url)
                .query(&[("set", cut.display_line())]);
            let cut_id = cut.id.clone();
            http.runtime.spawn(async move {
                match request.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!("PAD sent for cut {}", cut_id);
                    }
                    Ok(resp) => warn!("PAD endpoint returned {} for cut {}", resp.status(), cut_id),
                    Err(e) => warn!("PAD request for cut {} failed: {}", cut_id, e),
                }
            });
        }
    }
}
