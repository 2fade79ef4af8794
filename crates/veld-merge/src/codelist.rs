//! Authority code-list service.
//!
//! Instances reference competent and executing authorities by IRI. Every IRI
//! must resolve to a descriptive entry in the shared code list before a merge
//! completes; an authority missing from the list triggers a registry fetch
//! and a local upsert.
//!
//! The upsert is idempotent: concurrent duplicate upserts of the same IRI
//! must not fail. Registry fetches run under a configurable timeout and are
//! allowed to fail the enclosing merge, which is simply retried later.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MergeError, Result};
use crate::metrics::record_codelist_fetch;

/// A descriptive entry for one authority in the shared code list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityEntry {
    /// The authority's IRI in the external registry.
    pub iri: String,
    /// Preferred label, if the registry provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Administrative classification, if the registry provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    /// When the entry was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// External registry lookup for authority entries.
#[async_trait]
pub trait AuthorityRegistry: Send + Sync {
    /// Fetches the descriptive entry for an authority IRI.
    async fn fetch(&self, iri: &str) -> Result<AuthorityEntry>;
}

/// Ensures authority IRIs are present in the shared code list.
#[async_trait]
pub trait AuthorityCodeList: Send + Sync {
    /// Ensures an entry exists for the IRI, fetching and upserting if needed.
    async fn ensure_exists(&self, iri: &str) -> Result<()>;
}

/// Configuration for the code-list service.
#[derive(Debug, Clone, Copy)]
pub struct CodeListConfig {
    /// Budget for one registry fetch.
    pub fetch_timeout: Duration,
}

impl Default for CodeListConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Code list backed by a local cache and an external registry.
///
/// Lookups hit the cache first; a miss fetches from the registry under the
/// configured timeout and upserts the result. The upsert uses last-writer
/// wins semantics per IRI, so concurrent duplicates are harmless.
#[derive(Debug)]
pub struct CachingCodeList<R> {
    registry: R,
    config: CodeListConfig,
    entries: RwLock<HashMap<String, AuthorityEntry>>,
}

impl<R> CachingCodeList<R> {
    /// Creates a code list over the given registry with default configuration.
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self::with_config(registry, CodeListConfig::default())
    }

    /// Creates a code list with custom configuration.
    #[must_use]
    pub fn with_config(registry: R, config: CodeListConfig) -> Self {
        Self {
            registry,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached entry for an IRI, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(&self, iri: &str) -> Result<Option<AuthorityEntry>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.get(iri).cloned())
    }
}

fn poison_err<T>(_: PoisonError<T>) -> MergeError {
    MergeError::system("lock poisoned")
}

#[async_trait]
impl<R: AuthorityRegistry> AuthorityCodeList for CachingCodeList<R> {
    async fn ensure_exists(&self, iri: &str) -> Result<()> {
        {
            let entries = self.entries.read().map_err(poison_err)?;
            if entries.contains_key(iri) {
                return Ok(());
            }
        }

        let fetched = tokio::time::timeout(self.config.fetch_timeout, self.registry.fetch(iri))
            .await
            .map_err(|_| {
                record_codelist_fetch("timeout");
                MergeError::system(format!(
                    "authority registry fetch timed out for '{iri}' after {:?}",
                    self.config.fetch_timeout
                ))
            })?;

        let entry = match fetched {
            Ok(entry) => {
                record_codelist_fetch("ok");
                entry
            }
            Err(err) => {
                record_codelist_fetch("error");
                return Err(err);
            }
        };

        // Last-writer wins; a concurrent upsert of the same IRI is fine.
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.insert(iri.to_string(), entry);
        Ok(())
    }
}

/// Registry client fetching authority entries over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthorityRegistry {
    client: reqwest::Client,
}

impl HttpAuthorityRegistry {
    /// Creates a new HTTP registry client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpAuthorityRegistry {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

/// Shape of the registry's JSON response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryDocument {
    #[serde(default)]
    pref_label: Option<String>,
    #[serde(default)]
    classification: Option<String>,
}

#[async_trait]
impl AuthorityRegistry for HttpAuthorityRegistry {
    async fn fetch(&self, iri: &str) -> Result<AuthorityEntry> {
        let response = self
            .client
            .get(iri)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| MergeError::system_with_source("authority registry request failed", e))?;

        if !response.status().is_success() {
            return Err(MergeError::system(format!(
                "authority registry returned {} for '{iri}'",
                response.status()
            )));
        }

        let document: RegistryDocument = response
            .json()
            .await
            .map_err(|e| MergeError::system_with_source("authority registry response invalid", e))?;

        Ok(AuthorityEntry {
            iri: iri.to_string(),
            label: document.pref_label,
            classification: document.classification,
            fetched_at: Utc::now(),
        })
    }
}

/// A registry for testing that resolves every IRI to a minimal entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRegistry;

#[async_trait]
impl AuthorityRegistry for StaticRegistry {
    async fn fetch(&self, iri: &str) -> Result<AuthorityEntry> {
        Ok(AuthorityEntry {
            iri: iri.to_string(),
            label: None,
            classification: None,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRegistry {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AuthorityRegistry for CountingRegistry {
        async fn fetch(&self, iri: &str) -> Result<AuthorityEntry> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(AuthorityEntry {
                iri: iri.to_string(),
                label: Some("Gemeente".to_string()),
                classification: None,
                fetched_at: Utc::now(),
            })
        }
    }

    struct SlowRegistry;

    #[async_trait]
    impl AuthorityRegistry for SlowRegistry {
        async fn fetch(&self, iri: &str) -> Result<AuthorityEntry> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(AuthorityEntry {
                iri: iri.to_string(),
                label: None,
                classification: None,
                fetched_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn ensure_exists_fetches_once_per_iri() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let codelist = CachingCodeList::new(CountingRegistry {
            fetches: fetches.clone(),
        });

        codelist.ensure_exists("https://registry/aarschot").await.unwrap();
        codelist.ensure_exists("https://registry/aarschot").await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(codelist.get("https://registry/aarschot").unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_ensures_do_not_fail() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let codelist = Arc::new(CachingCodeList::new(CountingRegistry {
            fetches: fetches.clone(),
        }));

        let (a, b) = futures::join!(
            codelist.ensure_exists("https://registry/leuven"),
            codelist.ensure_exists("https://registry/leuven"),
        );
        a.unwrap();
        b.unwrap();

        assert!(codelist.get("https://registry/leuven").unwrap().is_some());
    }

    #[tokio::test]
    async fn slow_fetch_times_out_as_system_error() {
        let codelist = CachingCodeList::with_config(
            SlowRegistry,
            CodeListConfig {
                fetch_timeout: Duration::from_millis(10),
            },
        );

        let err = codelist
            .ensure_exists("https://registry/slow")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "system");
    }
}
