pub mod dispatch;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::{
    browser::host::{BrowserHost, HostError},
    domain::{PageInfo, TabId},
};

pub use dispatch::ChannelDispatcher;

/// Channel names shared with the content scripts and the popup UI.
pub const GET_PAGE_LANGUAGES: &str = "getPageLanguages";
pub const GET_PAGE_INFO: &str = "getPageInfo";
pub const NEW_PAGE_INFO: &str = "newPageInfo";

/// At most two detected languages are forwarded to the classifier.
pub const MAX_PAGE_LANGUAGES: usize = 2;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("tab {0} has no content-script listener")]
    NoListener(i64),
    #[error("host transport failure: {0}")]
    Transport(HostError),
    #[error("malformed reply on channel {channel}: {source}")]
    Payload {
        channel: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Background-side sender of typed channel messages. Requests go to a
/// specific tab's content script; broadcasts go to the extension UI.
#[derive(Clone)]
pub struct Messenger {
    host: Arc<dyn BrowserHost>,
}

impl Messenger {
    pub fn new(host: Arc<dyn BrowserHost>) -> Self {
        Self { host }
    }

    /// Asks the tab's content script for the languages detected in the
    /// page, ordered by prevalence and truncated to [`MAX_PAGE_LANGUAGES`].
    pub async fn request_page_languages(&self, tab: TabId) -> Result<Vec<String>, MessagingError> {
        let reply = self
            .host
            .send_tab_message(tab, GET_PAGE_LANGUAGES, Value::Null)
            .await
            .map_err(|err| match err {
                HostError::NoListener => MessagingError::NoListener(tab.0),
                other => MessagingError::Transport(other),
            })?;

        let mut languages: Vec<String> =
            serde_json::from_value(reply).map_err(|source| MessagingError::Payload {
                channel: GET_PAGE_LANGUAGES,
                source,
            })?;
        languages.truncate(MAX_PAGE_LANGUAGES);
        Ok(languages)
    }

    /// Fire-and-forget status push toward the popup UI. Failures are
    /// logged and swallowed; the UI catching up later is acceptable.
    pub async fn emit_page_info(&self, info: &PageInfo) {
        let payload = match serde_json::to_value(info) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(target: "messaging", error = %err, "failed to encode page info");
                return;
            }
        };
        if let Err(err) = self.host.post_message(NEW_PAGE_INFO, payload).await {
            tracing::warn!(target: "messaging", error = %err, "newPageInfo push failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::domain::{TabDescriptor, WindowId};

    use super::*;

    struct PolyglotHost;

    #[async_trait]
    impl BrowserHost for PolyglotHost {
        async fn get_tab(&self, _tab: TabId) -> Result<TabDescriptor, HostError> {
            unimplemented!("not used by messenger tests")
        }

        async fn capture_visible_tab(&self, _window: WindowId) -> Result<String, HostError> {
            unimplemented!("not used by messenger tests")
        }

        async fn fetch_resource(&self, _path: &str) -> Result<String, HostError> {
            unimplemented!("not used by messenger tests")
        }

        async fn send_tab_message(
            &self,
            _tab: TabId,
            channel: &str,
            _payload: Value,
        ) -> Result<Value, HostError> {
            assert_eq!(channel, GET_PAGE_LANGUAGES);
            Ok(json!(["ko", "en", "ja", "fr"]))
        }

        async fn post_message(&self, _channel: &str, _payload: Value) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn page_languages_keep_only_the_two_most_prevalent() {
        let messenger = Messenger::new(Arc::new(PolyglotHost));
        let languages = messenger.request_page_languages(TabId(4)).await.unwrap();
        assert_eq!(languages, ["ko", "en"]);
    }
}
