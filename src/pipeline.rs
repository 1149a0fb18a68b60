use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use url::Url;

use crate::{
    ai::Classifier,
    cache::VerdictCache,
    capture::{CaptureError, ScreenshotCapturer, strip_data_uri_header},
    config::PipelineConfig,
    domain::{PageInfo, TabDescriptor, TabId, TabStatus, Verdict},
    lists::{ListStore, normalize_hostname},
    messaging::Messenger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoUrl,
    NotComplete,
    Inactive,
    NonWebScheme,
    AlreadyInFlight,
}

/// Terminal state of one pipeline run.
#[derive(Debug)]
pub enum RunOutcome {
    Skipped(SkipReason),
    CacheDecision(Verdict),
    ListDecision(Verdict),
    DeepCheck(Verdict),
    Error(PipelineError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed URL {url}: {source}")]
    UrlParse {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported protocol {scheme} for {url}")]
    UnsupportedProtocol { url: String, scheme: String },
    #[error("URL {0} has no hostname")]
    MissingHost(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("classifier call failed: {0}")]
    Classifier(anyhow::Error),
}

#[derive(Default)]
struct Stats {
    urls_scanned: AtomicU64,
    threats_blocked: AtomicU64,
}

/// Per-tab anti-phishing decision pipeline.
///
/// Every tab-updated / tab-activated event re-enters [`check_tab`]; the
/// cache and static lists are the only de-duplication unless
/// `dedupe_checks` is enabled, so overlapping deep checks for one URL can
/// race (last writer wins). All per-run failures stop at this boundary.
pub struct Pipeline {
    lists: ListStore,
    cache: VerdictCache,
    capturer: ScreenshotCapturer,
    messenger: Messenger,
    classifier: Arc<dyn Classifier>,
    config: PipelineConfig,
    stats: Stats,
    in_flight: Mutex<HashSet<String>>,
}

impl Pipeline {
    pub fn new(
        lists: ListStore,
        capturer: ScreenshotCapturer,
        messenger: Messenger,
        classifier: Arc<dyn Classifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            lists,
            cache: VerdictCache::new(),
            capturer,
            messenger,
            classifier,
            config,
            stats: Stats::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one detection pass for the given tab snapshot. Never
    /// propagates an error; failed runs are logged and reported as
    /// [`RunOutcome::Error`] while the pipeline stays armed.
    pub async fn check_tab(&self, tab: &TabDescriptor) -> RunOutcome {
        let Some(url) = tab.url.as_deref() else {
            return RunOutcome::Skipped(SkipReason::NoUrl);
        };
        if tab.status != TabStatus::Complete {
            return RunOutcome::Skipped(SkipReason::NotComplete);
        }
        if !tab.active {
            return RunOutcome::Skipped(SkipReason::Inactive);
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return RunOutcome::Skipped(SkipReason::NonWebScheme);
        }

        match self.run_check(tab, url).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    target: "pipeline",
                    tab_id = tab.id.0,
                    url,
                    error = %err,
                    "검사 실행 실패"
                );
                RunOutcome::Error(err)
            }
        }
    }

    async fn run_check(&self, tab: &TabDescriptor, url: &str) -> Result<RunOutcome, PipelineError> {
        let parsed = Url::parse(url).map_err(|source| PipelineError::UrlParse {
            url: url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::UnsupportedProtocol {
                url: url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }
        let hostname = normalize_hostname(
            parsed
                .host_str()
                .ok_or_else(|| PipelineError::MissingHost(url.to_string()))?,
        );

        // Deny takes precedence over allow, cached verdicts over lists.
        if self.cache.get(url) == Some(Verdict::Dangerous) {
            self.finish(url, Verdict::Dangerous, true).await;
            return Ok(RunOutcome::CacheDecision(Verdict::Dangerous));
        }
        if self.lists.is_denied(&hostname) {
            tracing::info!(target: "pipeline", %hostname, url, "거부 목록에서 차단됨");
            self.finish(url, Verdict::Dangerous, true).await;
            return Ok(RunOutcome::ListDecision(Verdict::Dangerous));
        }
        if self.cache.get(url) == Some(Verdict::Safe) {
            self.finish(url, Verdict::Safe, true).await;
            return Ok(RunOutcome::CacheDecision(Verdict::Safe));
        }
        if self.lists.is_allowed(&hostname) {
            self.finish(url, Verdict::Safe, true).await;
            return Ok(RunOutcome::ListDecision(Verdict::Safe));
        }

        let _guard = if self.config.dedupe_checks {
            match InFlightGuard::acquire(&self.in_flight, url) {
                Some(guard) => Some(guard),
                None => return Ok(RunOutcome::Skipped(SkipReason::AlreadyInFlight)),
            }
        } else {
            None
        };

        let (screenshot, languages) = tokio::join!(
            self.capturer.capture(tab.window_id),
            self.request_languages(tab.id),
        );
        let screenshot = screenshot?;
        let image_base64 = strip_data_uri_header(&screenshot);

        let verdict = self
            .classifier
            .classify(&hostname, url, image_base64, &languages)
            .await
            .map_err(PipelineError::Classifier)?;

        let page_verdict = if verdict.error {
            // Fail open: the classifier could not score the page, so it is
            // surfaced as suspicious but never cached.
            Verdict::Suspicious
        } else if verdict.phishing {
            Verdict::Dangerous
        } else {
            Verdict::Safe
        };

        if page_verdict == Verdict::Dangerous {
            tracing::warn!(target: "pipeline", %hostname, url, "피싱 페이지로 판정됨");
        }
        self.finish(url, page_verdict, page_verdict != Verdict::Suspicious)
            .await;
        Ok(RunOutcome::DeepCheck(page_verdict))
    }

    async fn request_languages(&self, tab: TabId) -> Vec<String> {
        match self.messenger.request_page_languages(tab).await {
            Ok(languages) => languages,
            Err(err) => {
                tracing::warn!(
                    target: "pipeline",
                    tab_id = tab.0,
                    error = %err,
                    "language probe failed; continuing without languages"
                );
                Vec::new()
            }
        }
    }

    async fn finish(&self, url: &str, verdict: Verdict, cache_write: bool) {
        if cache_write {
            self.cache.set(url, verdict);
        }
        self.stats.urls_scanned.fetch_add(1, Ordering::Relaxed);
        if verdict == Verdict::Dangerous {
            self.stats.threats_blocked.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            target: "pipeline",
            url,
            verdict = verdict.as_str(),
            cached = cache_write,
            cache_size = self.cache.len(),
            "verdict recorded"
        );
        self.messenger.emit_page_info(&self.page_info(url)).await;
    }

    /// Status snapshot for a URL, served to the UI over `getPageInfo`.
    pub fn page_info(&self, url: &str) -> PageInfo {
        PageInfo {
            url_status: self.cache.get(url),
            urls_scanned: self.stats.urls_scanned.load(Ordering::Relaxed),
            threats_blocked: self.stats.threats_blocked.load(Ordering::Relaxed),
        }
    }
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    url: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, url: &str) -> Option<Self> {
        if set.lock().insert(url.to_string()) {
            Some(Self {
                set,
                url: url.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.url);
    }
}
