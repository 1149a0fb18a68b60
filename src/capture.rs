use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;

use crate::{
    browser::host::BrowserHost,
    config::CaptureConfig,
    domain::WindowId,
};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screenshot capture failed after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Captures the visible tab of a window, retrying transient failures.
///
/// Captures tend to fail right after navigation while the tab is still
/// painting, so every attempt (including the first) waits a fixed delay.
/// Callers must not run two captures concurrently for the same window;
/// the browser rate-limits the underlying call.
pub struct ScreenshotCapturer {
    host: Arc<dyn BrowserHost>,
    config: CaptureConfig,
}

impl ScreenshotCapturer {
    pub fn new(host: Arc<dyn BrowserHost>, config: CaptureConfig) -> Self {
        Self { host, config }
    }

    /// Returns the screenshot as a PNG data URI string.
    pub async fn capture(&self, window: WindowId) -> Result<String, CaptureError> {
        for attempt in 1..=self.config.max_attempts {
            sleep(self.config.retry_delay).await;
            match self.host.capture_visible_tab(window).await {
                Ok(data) if !data.is_empty() => return Ok(data),
                Ok(_) => {
                    tracing::warn!(
                        target: "capture",
                        window_id = window.0,
                        attempt,
                        "capture returned empty data"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        target: "capture",
                        window_id = window.0,
                        attempt,
                        error = %err,
                        "capture attempt failed"
                    );
                }
            }
        }
        Err(CaptureError::Exhausted {
            attempts: self.config.max_attempts,
        })
    }
}

/// Strips the `data:image/png;base64,` header from a data URI, leaving the
/// raw base64 payload the classifier expects.
pub fn strip_data_uri_header(data_uri: &str) -> &str {
    match data_uri.find("base64,") {
        Some(idx) => &data_uri[idx + "base64,".len()..],
        None => data_uri,
    }
}
