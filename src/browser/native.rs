use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::{
    browser::{
        events::TabEvent,
        host::{BrowserHost, HostError},
    },
    domain::{TabDescriptor, TabId, WindowId},
    infrastructure::shutdown::Shutdown,
    messaging::ChannelDispatcher,
};

/// Inbound frames larger than this are a protocol violation.
const MAX_FRAME_LEN: u32 = 32 * 1024 * 1024;

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value, HostError>>>>;

/// Production [`BrowserHost`]: speaks Chrome native messaging with the
/// extension shim over length-prefixed JSON frames (u32 LE + payload).
///
/// Outbound calls are correlated by id against a pending map; the reader
/// task resolves replies, forwards pushed tab events onto the event feed,
/// and serves inbound channel requests through the dispatcher.
pub struct NativeHost {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl NativeHost {
    pub fn stdio(
        dispatcher: Arc<ChannelDispatcher>,
        shutdown: Shutdown,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TabEvent>) {
        Self::spawn(tokio::io::stdin(), tokio::io::stdout(), dispatcher, shutdown)
    }

    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        dispatcher: Arc<ChannelDispatcher>,
        shutdown: Shutdown,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TabEvent>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let host = Arc::new(Self {
            writer: tokio::sync::Mutex::new(Box::new(writer) as Box<dyn AsyncWrite + Send + Unpin>),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            host.clone()
                .read_loop(reader, dispatcher, events_tx, shutdown),
        );
        (host, events_rx)
    }

    async fn read_loop<R>(
        self: Arc<Self>,
        mut reader: R,
        dispatcher: Arc<ChannelDispatcher>,
        events_tx: mpsc::UnboundedSender<TabEvent>,
        shutdown: Shutdown,
    ) where
        R: AsyncRead + Send + Unpin + 'static,
    {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<IncomingFrame>(&bytes) {
                    Ok(frame) => Self::handle_frame(&self, frame, &dispatcher, &events_tx),
                    Err(err) => {
                        tracing::warn!(target: "native", error = %err, "unparseable frame dropped");
                    }
                },
                Ok(None) => {
                    tracing::info!(target: "native", "브라우저가 연결을 종료했습니다");
                    break;
                }
                Err(err) => {
                    tracing::error!(target: "native", error = %err, "transport read failed");
                    break;
                }
            }
        }
        shutdown.trigger();
        self.fail_pending();
    }

    fn handle_frame(
        host: &Arc<Self>,
        frame: IncomingFrame,
        dispatcher: &Arc<ChannelDispatcher>,
        events_tx: &mpsc::UnboundedSender<TabEvent>,
    ) {
        match frame {
            IncomingFrame::Event(event) => {
                let _ = events_tx.send(event.into());
            }
            IncomingFrame::ChannelRequest {
                id,
                channel,
                payload,
            } => {
                let host = host.clone();
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let reply = match dispatcher.dispatch(&channel, payload).await {
                        Ok(result) => json!({ "id": id, "result": result }),
                        Err(err) => {
                            tracing::warn!(
                                target: "native",
                                channel,
                                error = %err,
                                "channel request failed"
                            );
                            json!({ "id": id, "error": err.to_string() })
                        }
                    };
                    if let Err(err) = host.write_value(&reply).await {
                        tracing::warn!(target: "native", error = %err, "reply write failed");
                    }
                });
            }
            IncomingFrame::Response(response) => {
                let outcome = match response.error {
                    Some(message) => Err(match response.code.as_deref() {
                        Some("noListener") => HostError::NoListener,
                        _ => HostError::Call(message),
                    }),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                match host.pending.lock().remove(&response.id) {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => {
                        tracing::warn!(target: "native", id = response.id, "stray response frame");
                    }
                }
            }
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = json!({ "id": id, "method": method, "params": params });
        if let Err(err) = self.write_value(&frame).await {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        rx.await.map_err(|_| HostError::TransportClosed)?
    }

    async fn write_value(&self, value: &Value) -> Result<(), HostError> {
        let bytes = serde_json::to_vec(value)?;
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        write.await.map_err(|_| HostError::TransportClosed)
    }

    fn fail_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (_, tx) in pending {
            let _ = tx.send(Err(HostError::TransportClosed));
        }
    }
}

#[async_trait]
impl BrowserHost for NativeHost {
    async fn get_tab(&self, tab: TabId) -> Result<TabDescriptor, HostError> {
        let value = self.request("getTab", json!({ "tabId": tab })).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn capture_visible_tab(&self, window: WindowId) -> Result<String, HostError> {
        let value = self
            .request("captureVisibleTab", json!({ "windowId": window }))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_resource(&self, path: &str) -> Result<String, HostError> {
        let value = self.request("fetchResource", json!({ "path": path })).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn send_tab_message(
        &self,
        tab: TabId,
        channel: &str,
        payload: Value,
    ) -> Result<Value, HostError> {
        self.request(
            "sendTabMessage",
            json!({ "tabId": tab, "channel": channel, "payload": payload }),
        )
        .await
    }

    async fn post_message(&self, channel: &str, payload: Value) -> Result<(), HostError> {
        self.write_value(&json!({ "event": "channel", "channel": channel, "payload": payload }))
            .await
    }
}

async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit"),
        ));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingFrame {
    Event(EventFrame),
    ChannelRequest {
        id: u64,
        channel: String,
        #[serde(default)]
        payload: Value,
    },
    Response(ResponseFrame),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum EventFrame {
    TabUpdated {
        tab: TabDescriptor,
    },
    TabActivated {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

impl From<EventFrame> for TabEvent {
    fn from(frame: EventFrame) -> Self {
        match frame {
            EventFrame::TabUpdated { tab } => TabEvent::Updated(tab),
            EventFrame::TabActivated { tab_id } => TabEvent::Activated { tab_id },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseFrame {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}
