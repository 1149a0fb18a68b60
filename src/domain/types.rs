use serde::{Deserialize, Serialize};

/// Verdict for a single page URL.
///
/// `Suspicious` is display-only: it is never written to the verdict cache,
/// so it never short-circuits a later check of the same URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Suspicious,
    Dangerous,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Safe => "safe",
            Verdict::Suspicious => "suspicious",
            Verdict::Dangerous => "dangerous",
        }
    }
}

/// Status payload served to the popup UI over `getPageInfo` and pushed
/// over `newPageInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Verdict for the queried URL, or `None` while undecided.
    pub url_status: Option<Verdict>,
    pub urls_scanned: u64,
    pub threats_blocked: u64,
}
