use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{TabDescriptor, TabId, WindowId};

#[derive(Debug, Error)]
pub enum HostError {
    /// The target tab has no content-script listener for the channel.
    #[error("receiving end does not exist")]
    NoListener,
    /// The browser rejected the call (tab gone, capture rate limit, ...).
    #[error("host call failed: {0}")]
    Call(String),
    #[error("host transport closed")]
    TransportClosed,
    #[error("malformed host payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Capability surface of the hosting browser. The production
/// implementation speaks native messaging ([`super::native::NativeHost`]);
/// tests substitute in-memory fakes.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Resolves a tab id to its full descriptor.
    async fn get_tab(&self, tab: TabId) -> Result<TabDescriptor, HostError>;

    /// Captures the visible tab of a window as a PNG data URI. One real
    /// browser capture per call; the browser rate-limits these.
    async fn capture_visible_tab(&self, window: WindowId) -> Result<String, HostError>;

    /// Reads a bundled extension resource as text.
    async fn fetch_resource(&self, path: &str) -> Result<String, HostError>;

    /// Round-trips a typed channel message to a tab's content script.
    async fn send_tab_message(
        &self,
        tab: TabId,
        channel: &str,
        payload: Value,
    ) -> Result<Value, HostError>;

    /// One-way broadcast toward the extension UI. Best effort.
    async fn post_message(&self, channel: &str, payload: Value) -> Result<(), HostError>;
}
