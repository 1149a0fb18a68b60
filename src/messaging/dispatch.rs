use std::collections::HashMap;

use anyhow::Result;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

/// Async handler for one named channel.
pub type ChannelHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for channel {0}")]
    UnknownChannel(String),
    #[error("handler for channel {channel} failed: {reason}")]
    Handler { channel: String, reason: anyhow::Error },
}

/// Channel-name → handler registry for requests arriving from content
/// scripts and the popup UI. Keeps the transport (native messaging)
/// decoupled from the pipeline: handlers are plain async closures, so
/// tests can drive them without any browser attached.
#[derive(Default)]
pub struct ChannelDispatcher {
    handlers: RwLock<HashMap<&'static str, ChannelHandler>>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, channel: &'static str, handler: F)
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        let previous = self.handlers.write().insert(channel, Box::new(handler));
        if previous.is_some() {
            tracing::warn!(target: "messaging", channel, "channel handler replaced");
        }
    }

    pub async fn dispatch(&self, channel: &str, payload: Value) -> Result<Value, DispatchError> {
        let future = {
            let handlers = self.handlers.read();
            match handlers.get(channel) {
                Some(handler) => handler(payload),
                None => return Err(DispatchError::UnknownChannel(channel.to_string())),
            }
        };
        future.await.map_err(|reason| DispatchError::Handler {
            channel: channel.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let dispatcher = ChannelDispatcher::new();
        dispatcher.register("echo", |payload| {
            Box::pin(async move { Ok(json!({ "echo": payload })) })
        });

        let reply = dispatcher.dispatch("echo", json!(42)).await.unwrap();
        assert_eq!(reply, json!({ "echo": 42 }));
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let dispatcher = ChannelDispatcher::new();
        let err = dispatcher.dispatch("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownChannel(_)));
    }
}
