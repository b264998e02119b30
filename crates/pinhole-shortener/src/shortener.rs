use async_trait::async_trait;
use pinhole_core::{OwnerId, ShortCode, ShortenerError, UrlRecord};

type Result<T> = std::result::Result<T, ShortenerError>;

/// Result of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenOutcome {
    /// A new code was stored.
    Created(ShortCode),
    /// The URL was already shortened; this is the existing code.
    Conflict(ShortCode),
}

impl ShortenOutcome {
    pub fn code(&self) -> &ShortCode {
        match self {
            ShortenOutcome::Created(code) | ShortenOutcome::Conflict(code) => code,
        }
    }

    pub fn into_code(self) -> ShortCode {
        match self {
            ShortenOutcome::Created(code) | ShortenOutcome::Conflict(code) => code,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, ShortenOutcome::Created(_))
    }
}

/// One URL of a batch request, tagged by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// The code assigned to one [`BatchItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub short_code: ShortCode,
}

/// Per-code result of a multi-delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub deleted: Vec<ShortCode>,
    pub failed: Vec<(ShortCode, ShortenerError)>,
}

impl DeleteReport {
    /// True when every requested code was deleted.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens `original_url`, or returns the code it already has.
    async fn shorten(&self, original_url: &str, owner: Option<OwnerId>) -> Result<ShortenOutcome>;

    /// Resolves a code to its original URL.
    ///
    /// Fails with `NotFound` for unknown codes and `Gone` for deleted ones.
    async fn resolve(&self, code: &ShortCode) -> Result<String>;

    /// Shortens many URLs at once without duplicate or collision checks.
    async fn batch_shorten(
        &self,
        items: Vec<BatchItem>,
        owner: Option<OwnerId>,
    ) -> Result<Vec<BatchShortened>>;

    /// Lists the live records created by `owner`.
    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>>;

    /// Deletes each code on behalf of `owner`, reporting per-code failures.
    async fn delete_many(&self, owner: &OwnerId, codes: Vec<ShortCode>) -> DeleteReport;

    /// Reports whether the storage backend is reachable.
    async fn ping(&self) -> Result<()>;
}
