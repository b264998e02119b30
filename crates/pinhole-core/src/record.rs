use crate::owner::OwnerId;
use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

/// A stored URL mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The code the URL is reachable under.
    pub short_code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The identity that created the record.
    pub owner_id: OwnerId,
    /// Set once the owner deleted the record; the row lingers until the
    /// sweeper purges it. In-memory backends remove records outright and
    /// never report `true`.
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a live record.
    pub fn new(short_code: ShortCode, original_url: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
            owner_id,
            deleted: false,
        }
    }

    /// Replaces an anonymous owner with a freshly generated identity.
    pub fn with_owner_or_generated(mut self) -> Self {
        if self.owner_id.is_anonymous() {
            self.owner_id = OwnerId::generate();
        }
        self
    }

    /// True when `owner` created this record. Records without an owner
    /// belong to nobody.
    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        !self.owner_id.is_anonymous() && &self.owner_id == owner
    }
}
