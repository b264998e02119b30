use crate::shortener::{BatchItem, BatchShortened, DeleteReport, ShortenOutcome, Shortener};
use async_trait::async_trait;
use pinhole_core::{OwnerId, ShortCode, ShortenerError, StorageError, UrlRecord, UrlStore};
use pinhole_generator::{GeneratorError, HashGenerator};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The store facade request handlers talk to.
///
/// The service wraps one [`UrlStore`] and a [`HashGenerator`] and handles:
/// - URL validation
/// - the "one live code per URL" check before generating a code
/// - collision probing over the generator's deterministic candidates
/// - mapping storage failures onto [`ShortenerError`]
///
/// It is cheap to clone; clones share the store.
#[derive(Clone)]
pub struct ShortenerService {
    store: Arc<dyn UrlStore>,
    generator: Arc<HashGenerator>,
}

impl ShortenerService {
    pub fn new(store: Arc<dyn UrlStore>, generator: HashGenerator) -> Self {
        Self {
            store,
            generator: Arc::new(generator),
        }
    }

    /// Validates that the URL has a valid format (http(s) scheme and a host).
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.trim().is_empty() {
            return Err(ShortenerError::InvalidInput(
                "URL cannot be empty".to_string(),
            ));
        }

        if url.chars().any(char::is_whitespace) {
            return Err(ShortenerError::InvalidInput(format!(
                "URL must not contain whitespace: {}",
                url
            )));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidInput(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidInput(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(ShortenerError::InvalidInput(format!(
                "URL must have a host: {}",
                url
            )));
        }

        Ok(())
    }

    /// Looks a code up, keeping soft-deleted records.
    pub async fn resolve_record(&self, code: &ShortCode) -> Result<UrlRecord, ShortenerError> {
        match self.store.find(code).await? {
            Some(record) if record.deleted => Err(ShortenerError::Gone(code.clone())),
            Some(record) => Ok(record),
            None => Err(ShortenerError::NotFound(code.clone())),
        }
    }

    /// Runs [`Shortener::delete_many`] on a background task.
    ///
    /// The caller can acknowledge the request immediately; the handle yields
    /// the report once every code has been processed.
    pub fn delete_many_in_background(
        &self,
        owner: OwnerId,
        codes: Vec<ShortCode>,
    ) -> JoinHandle<DeleteReport> {
        let service = self.clone();
        tokio::spawn(async move { service.delete_many(&owner, codes).await })
    }

    async fn store_first_free_candidate(
        &self,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortenOutcome, ShortenerError> {
        let store = &self.store;

        for _ in 0..self.generator.max_attempts() {
            // A live record for this very URL does not count as occupied: the
            // insert below then conflicts and the existing code is reported.
            let candidate = self
                .generator
                .generate(original_url, move |candidate| async move {
                    let occupied = match store.find(&candidate).await? {
                        Some(record) => record.deleted || record.original_url != original_url,
                        None => false,
                    };
                    if occupied {
                        trace!(code = %candidate, "candidate occupied, probing next");
                    }
                    Ok::<_, ShortenerError>(occupied)
                })
                .await?;

            let record = UrlRecord::new(candidate.clone(), original_url, owner.clone());
            match store.save(record).await {
                Ok(()) => {
                    debug!(code = %candidate, url = %original_url, "short code created");
                    return Ok(ShortenOutcome::Created(candidate));
                }
                // Another writer took the candidate between the probe and the insert.
                Err(StorageError::Conflict(_)) => {
                    if let Some(existing) = store.find_code_by_url(original_url).await? {
                        return Ok(ShortenOutcome::Conflict(existing));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(GeneratorError::Exhausted {
            attempts: self.generator.max_attempts(),
        }
        .into())
    }
}

#[async_trait]
impl Shortener for ShortenerService {
    async fn shorten(
        &self,
        original_url: &str,
        owner: Option<OwnerId>,
    ) -> Result<ShortenOutcome, ShortenerError> {
        Self::validate_url(original_url)?;

        if let Some(existing) = self.store.find_code_by_url(original_url).await? {
            debug!(code = %existing, url = %original_url, "url already shortened");
            return Ok(ShortenOutcome::Conflict(existing));
        }

        self.store_first_free_candidate(original_url, OwnerId::or_generate(owner))
            .await
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String, ShortenerError> {
        trace!(code = %code, "resolving short code");
        self.resolve_record(code)
            .await
            .map(|record| record.original_url)
    }

    async fn batch_shorten(
        &self,
        items: Vec<BatchItem>,
        owner: Option<OwnerId>,
    ) -> Result<Vec<BatchShortened>, ShortenerError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        for item in &items {
            Self::validate_url(&item.original_url).map_err(|e| {
                ShortenerError::InvalidInput(format!("item {}: {e}", item.correlation_id))
            })?;
        }

        let owner = OwnerId::or_generate(owner);
        let mut records = Vec::with_capacity(items.len());
        let mut shortened = Vec::with_capacity(items.len());

        for item in items {
            let code = self.generator.generate_without_check(&item.original_url);
            records.push(UrlRecord::new(code.clone(), item.original_url, owner.clone()));
            shortened.push(BatchShortened {
                correlation_id: item.correlation_id,
                short_code: code,
            });
        }

        self.store.save_batch(records).await?;
        debug!(records = shortened.len(), owner = %owner, "batch shortened");
        Ok(shortened)
    }

    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>, ShortenerError> {
        if owner.is_anonymous() {
            return Ok(Vec::new());
        }

        let mut records = self.store.list_by_owner(owner).await?;
        records.retain(|record| !record.deleted);
        Ok(records)
    }

    async fn delete_many(&self, owner: &OwnerId, codes: Vec<ShortCode>) -> DeleteReport {
        let mut report = DeleteReport::default();

        for code in codes {
            match self.store.delete(&code, owner).await {
                Ok(()) => report.deleted.push(code),
                Err(e) => {
                    warn!(code = %code, owner = %owner, error = %e, "delete failed");
                    report.failed.push((code, e.into()));
                }
            }
        }

        report
    }

    async fn ping(&self) -> Result<(), ShortenerError> {
        self.store.ping().await.map_err(ShortenerError::from)
    }
}
