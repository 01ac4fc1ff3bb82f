//! Collection client abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use listsync_feed::Listing;

use crate::error::TargetResult;

/// Identifier the collection assigns to an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetItemId(String);

impl TargetItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TargetItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TargetItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An item that currently exists in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetItem {
    pub id: TargetItemId,
    /// URL slug, derived from the listing's source id.
    pub slug: String,
}

/// Mutations and reads against the target collection.
///
/// Implementations handle throttling and transient failures internally; an
/// error returned from these methods is final for that call.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Create an item for the listing and return its id.
    async fn create(&self, listing: &Listing) -> TargetResult<TargetItemId>;

    /// Replace the content of an existing item.
    async fn update(&self, id: &TargetItemId, listing: &Listing) -> TargetResult<()>;

    /// Remove an item. Fails with `NotFound` if it is already gone.
    async fn delete(&self, id: &TargetItemId) -> TargetResult<()>;

    /// Every item currently in the collection.
    async fn list_existing(&self) -> TargetResult<Vec<TargetItem>>;

    /// Slug the client assigns to a listing's item.
    fn slug_for(&self, source_id: &str) -> String {
        slugify(source_id)
    }
}

/// Lower-case the id and replace every non-alphanumeric character with `-`.
#[must_use]
pub fn slugify(source_id: &str) -> String {
    source_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("KR-100"), "kr-100");
        assert_eq!(slugify("AB/12 x"), "ab-12-x");
        assert_eq!(slugify(" Ref_7 "), "ref-7");
    }

    #[test]
    fn test_item_id_serializes_transparently() {
        let id = TargetItemId::new("64f1c2");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"64f1c2\"");
        assert_eq!(id.to_string(), "64f1c2");
    }
}
