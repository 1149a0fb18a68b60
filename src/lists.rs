use std::collections::HashSet;

use thiserror::Error;

use crate::{browser::host::{BrowserHost, HostError}, config::ListSourceConfig};

#[derive(Debug, Error)]
pub enum ListLoadError {
    #[error("deny-list {path} could not be loaded: {source}")]
    Deny {
        path: String,
        #[source]
        source: ListFetchError,
    },
    #[error("allow-list {path} could not be loaded: {source}")]
    Allow {
        path: String,
        #[source]
        source: ListFetchError,
    },
}

#[derive(Debug, Error)]
pub enum ListFetchError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Static deny/allow hostname sets, loaded once at startup from bundled
/// extension resources. A load failure keeps the pipeline unarmed.
#[derive(Debug)]
pub struct ListStore {
    deny: HashSet<String>,
    allow: HashSet<String>,
}

impl ListStore {
    pub async fn load(
        host: &dyn BrowserHost,
        config: &ListSourceConfig,
    ) -> Result<Self, ListLoadError> {
        let deny = fetch_hostname_set(host, &config.deny_path)
            .await
            .map_err(|source| ListLoadError::Deny {
                path: config.deny_path.clone(),
                source,
            })?;

        let mut allow = HashSet::new();
        for path in &config.allow_paths {
            let set = fetch_hostname_set(host, path)
                .await
                .map_err(|source| ListLoadError::Allow {
                    path: path.clone(),
                    source,
                })?;
            allow.extend(set);
        }

        tracing::info!(
            target: "lists",
            deny = deny.len(),
            allow = allow.len(),
            "호스트 목록 로딩 완료"
        );
        Ok(Self { deny, allow })
    }

    pub fn is_denied(&self, hostname: &str) -> bool {
        self.deny.contains(normalize_hostname(hostname).as_str())
    }

    pub fn is_allowed(&self, hostname: &str) -> bool {
        self.allow.contains(normalize_hostname(hostname).as_str())
    }

    #[cfg(test)]
    pub fn from_parts<I, J>(deny: I, allow: J) -> Self
    where
        I: IntoIterator<Item = &'static str>,
        J: IntoIterator<Item = &'static str>,
    {
        Self {
            deny: deny.into_iter().map(|h| normalize_hostname(h)).collect(),
            allow: allow.into_iter().map(|h| normalize_hostname(h)).collect(),
        }
    }
}

async fn fetch_hostname_set(
    host: &dyn BrowserHost,
    path: &str,
) -> Result<HashSet<String>, ListFetchError> {
    let body = host.fetch_resource(path).await?;
    let hostnames: Vec<String> = serde_json::from_str(&body)?;
    Ok(hostnames
        .iter()
        .map(|h| normalize_hostname(h))
        .collect())
}

/// Lowercases and strips a leading `www.` so list entries and checked
/// hostnames compare on the same form.
pub fn normalize_hostname(hostname: &str) -> String {
    let lowered = hostname.trim().to_ascii_lowercase();
    lowered
        .strip_prefix("www.")
        .unwrap_or(&lowered)
        .to_string()
}
