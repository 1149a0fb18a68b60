use std::{sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{
    ai::PhishClassifier,
    browser::{BrowserHost, NativeHost, TabEventSubscriber},
    capture::ScreenshotCapturer,
    config::AppConfig,
    infrastructure::{directories::ResolvedPaths, shutdown::Shutdown},
    lists::ListStore,
    messaging::{self, ChannelDispatcher, Messenger},
    pipeline::Pipeline,
};

pub struct PhishGuardApp {
    _paths: ResolvedPaths,
    subscriber_handle: JoinHandle<()>,
    shutdown: Shutdown,
}

impl PhishGuardApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);

        let http_client = Client::builder()
            .user_agent(format!("phishguard/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let classifier = Arc::new(PhishClassifier::new(
            http_client,
            config.classifier.clone(),
        ));

        let dispatcher = Arc::new(ChannelDispatcher::new());
        let (host, events) = NativeHost::stdio(dispatcher.clone(), shutdown.clone());
        let host: Arc<dyn BrowserHost> = host;

        // The pipeline is armed only after both lists loaded; a failure
        // here aborts startup and no tab event is ever consumed.
        let lists = ListStore::load(host.as_ref(), &config.lists).await?;

        let capturer = ScreenshotCapturer::new(host.clone(), config.capture.clone());
        let messenger = Messenger::new(host.clone());
        let pipeline = Arc::new(Pipeline::new(
            lists,
            capturer,
            messenger,
            classifier,
            config.pipeline.clone(),
        ));

        {
            let pipeline = pipeline.clone();
            dispatcher.register(messaging::GET_PAGE_INFO, move |payload| {
                let pipeline = pipeline.clone();
                Box::pin(async move {
                    let url = payload
                        .get("url")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Ok(serde_json::to_value(pipeline.page_info(&url))?)
                })
            });
        }

        let subscriber_handle =
            TabEventSubscriber::new(events, host, pipeline).spawn(shutdown.subscribe());

        Ok(Self {
            _paths: paths,
            subscriber_handle,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let PhishGuardApp {
            _paths: _,
            mut subscriber_handle,
            shutdown,
        } = self;

        tracing::info!("피싱 감지 백그라운드 서비스 시작");

        let mut shutdown_listener = shutdown.subscribe();
        let shutdown_timeout = Duration::from_secs(5);
        let mut subscriber_completed = false;

        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!("종료 신호 감지 (CTRL+C / SIGTERM / 연결 종료)");
            }
            res = &mut subscriber_handle => {
                subscriber_completed = true;
                if let Err(err) = res {
                    if err.is_panic() {
                        tracing::error!("탭 이벤트 구독 작업이 패닉으로 종료되었습니다");
                    }
                }
            }
        }

        shutdown.trigger();

        if !subscriber_completed {
            let wait = tokio::time::sleep(shutdown_timeout);
            tokio::pin!(wait);
            tokio::select! {
                res = &mut subscriber_handle => {
                    if let Err(err) = res {
                        if err.is_panic() {
                            tracing::error!("탭 이벤트 구독 작업이 패닉으로 종료되었습니다");
                        }
                    }
                }
                _ = &mut wait => {
                    tracing::warn!(
                        target: "tabs",
                        "구독 종료가 {:?} 내에 완료되지 않아 작업을 중단합니다",
                        shutdown_timeout
                    );
                    subscriber_handle.abort();
                }
            }
        }

        tracing::info!("서비스 종료 완료");
        Ok(())
    }
}
