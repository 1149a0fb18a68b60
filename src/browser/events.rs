use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    browser::host::BrowserHost,
    domain::{TabDescriptor, TabId},
    infrastructure::shutdown::ShutdownListener,
    pipeline::Pipeline,
};

/// Tab lifecycle signal pushed by the host transport. Activation events
/// only carry an id and are resolved to a full descriptor here.
#[derive(Debug, Clone)]
pub enum TabEvent {
    Updated(TabDescriptor),
    Activated { tab_id: TabId },
}

/// Bridges tab events into pipeline runs. Spawned only after the list
/// store loaded successfully, so an unarmed pipeline never sees events.
pub struct TabEventSubscriber {
    feed: mpsc::UnboundedReceiver<TabEvent>,
    host: Arc<dyn BrowserHost>,
    pipeline: Arc<Pipeline>,
}

impl TabEventSubscriber {
    pub fn new(
        feed: mpsc::UnboundedReceiver<TabEvent>,
        host: Arc<dyn BrowserHost>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        Self {
            feed,
            host,
            pipeline,
        }
    }

    pub fn spawn(self, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(&mut shutdown).await;
        })
    }

    async fn run_loop(mut self, shutdown: &mut ShutdownListener) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                event = self.feed.recv() => {
                    let Some(event) = event else {
                        tracing::info!(target: "tabs", "tab event feed closed");
                        break;
                    };
                    self.dispatch_event(event);
                }
            }
        }
        tracing::info!(target: "tabs", "탭 이벤트 구독 종료");
    }

    /// Each event gets its own task; a deep check in flight (capture
    /// delay plus the classifier call) must not hold up events from
    /// other tabs. Overlapping runs for one URL are the pipeline's
    /// concern, not the dispatcher's.
    fn dispatch_event(&self, event: TabEvent) {
        let host = self.host.clone();
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            let tab = match event {
                TabEvent::Updated(tab) => tab,
                TabEvent::Activated { tab_id } => match host.get_tab(tab_id).await {
                    Ok(tab) => tab,
                    Err(err) => {
                        // activation of a tab that closed in the meantime
                        tracing::warn!(
                            target: "tabs",
                            tab_id = tab_id.0,
                            error = %err,
                            "tab lookup failed"
                        );
                        return;
                    }
                },
            };

            let outcome = pipeline.check_tab(&tab).await;
            tracing::debug!(
                target: "tabs",
                tab_id = tab.id.0,
                url = tab.url.as_deref(),
                ?outcome,
                "pipeline run finished"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::ai::{Classifier, ClassifierVerdict};
    use crate::browser::host::HostError;
    use crate::capture::ScreenshotCapturer;
    use crate::config::{CaptureConfig, PipelineConfig};
    use crate::domain::{TabStatus, Verdict, WindowId};
    use crate::infrastructure::shutdown::Shutdown;
    use crate::lists::ListStore;
    use crate::messaging::Messenger;

    use super::*;

    struct FakeHost {
        tabs: Mutex<HashMap<i64, TabDescriptor>>,
    }

    #[async_trait]
    impl BrowserHost for FakeHost {
        async fn get_tab(&self, tab: TabId) -> Result<TabDescriptor, HostError> {
            self.tabs
                .lock()
                .get(&tab.0)
                .cloned()
                .ok_or_else(|| HostError::Call(format!("no tab with id {}", tab.0)))
        }

        async fn capture_visible_tab(&self, _window: WindowId) -> Result<String, HostError> {
            Ok("data:image/png;base64,AAAA".into())
        }

        async fn fetch_resource(&self, _path: &str) -> Result<String, HostError> {
            unimplemented!("not used by subscriber tests")
        }

        async fn send_tab_message(
            &self,
            _tab: TabId,
            _channel: &str,
            _payload: Value,
        ) -> Result<Value, HostError> {
            Ok(json!(["en"]))
        }

        async fn post_message(&self, _channel: &str, _payload: Value) -> Result<(), HostError> {
            Ok(())
        }
    }

    struct NeverClassifier;

    #[async_trait]
    impl Classifier for NeverClassifier {
        async fn classify(
            &self,
            _hostname: &str,
            _url: &str,
            _screenshot_base64: &str,
            _languages: &[String],
        ) -> anyhow::Result<ClassifierVerdict> {
            Err(anyhow!("classifier must not be reached in this test"))
        }
    }

    /// Records when each call entered, then stalls for a second so
    /// overlapping runs are observable on the paused clock.
    struct SlowClassifier {
        base: tokio::time::Instant,
        started: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify(
            &self,
            _hostname: &str,
            _url: &str,
            _screenshot_base64: &str,
            _languages: &[String],
        ) -> anyhow::Result<ClassifierVerdict> {
            self.started.lock().push(self.base.elapsed());
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(ClassifierVerdict {
                phishing: false,
                error: false,
            })
        }
    }

    fn make_tab(id: i64, url: &str) -> TabDescriptor {
        TabDescriptor {
            id: TabId(id),
            window_id: WindowId(id),
            url: Some(url.to_string()),
            status: TabStatus::Complete,
            active: true,
        }
    }

    fn make_pipeline(host: Arc<dyn BrowserHost>, classifier: Arc<dyn Classifier>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            ListStore::from_parts([], []),
            ScreenshotCapturer::new(
                host.clone(),
                CaptureConfig {
                    max_attempts: 3,
                    retry_delay: Duration::from_millis(500),
                },
            ),
            Messenger::new(host),
            classifier,
            PipelineConfig {
                dedupe_checks: false,
            },
        ))
    }

    /// Spawned runs finish after the subscriber handle does, so the
    /// assertions poll the pipeline stats.
    async fn wait_for_scans(pipeline: &Pipeline, url: &str, count: u64) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while pipeline.page_info(url).urls_scanned < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn activation_resolves_descriptor_before_pipeline_run() {
        let host = Arc::new(FakeHost {
            tabs: Mutex::new(HashMap::from([(3, make_tab(3, "https://evil.com/"))])),
        });
        let host_dyn: Arc<dyn BrowserHost> = host.clone();
        let pipeline = Arc::new(Pipeline::new(
            ListStore::from_parts(["evil.com"], []),
            ScreenshotCapturer::new(
                host_dyn.clone(),
                CaptureConfig {
                    max_attempts: 3,
                    retry_delay: Duration::from_millis(500),
                },
            ),
            Messenger::new(host_dyn.clone()),
            Arc::new(NeverClassifier),
            PipelineConfig {
                dedupe_checks: false,
            },
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        let handle = TabEventSubscriber::new(rx, host_dyn, pipeline.clone())
            .spawn(shutdown.subscribe());

        tx.send(TabEvent::Activated { tab_id: TabId(3) }).unwrap();
        // unknown tab id is tolerated
        tx.send(TabEvent::Activated { tab_id: TabId(99) }).unwrap();
        drop(tx);
        handle.await.unwrap();
        wait_for_scans(&pipeline, "https://evil.com/", 1).await;

        let info = pipeline.page_info("https://evil.com/");
        assert_eq!(info.url_status, Some(Verdict::Dangerous));
        assert_eq!(info.urls_scanned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_different_tabs_run_concurrently() {
        let host = Arc::new(FakeHost {
            tabs: Mutex::new(HashMap::new()),
        });
        let host_dyn: Arc<dyn BrowserHost> = host;
        let classifier = Arc::new(SlowClassifier {
            base: tokio::time::Instant::now(),
            started: Mutex::new(Vec::new()),
        });
        let pipeline = make_pipeline(host_dyn.clone(), classifier.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        let handle = TabEventSubscriber::new(rx, host_dyn, pipeline.clone())
            .spawn(shutdown.subscribe());

        tx.send(TabEvent::Updated(make_tab(1, "https://one.example/")))
            .unwrap();
        tx.send(TabEvent::Updated(make_tab(2, "https://two.example/")))
            .unwrap();
        drop(tx);
        handle.await.unwrap();
        wait_for_scans(&pipeline, "https://one.example/", 2).await;

        // both deep checks entered the classifier right after the single
        // capture delay; a serialized loop would start the second one a
        // full run later (at 2000ms)
        let started = classifier.started.lock().clone();
        assert_eq!(started, vec![Duration::from_millis(500); 2]);
    }
}
