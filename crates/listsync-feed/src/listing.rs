//! Listing records, snapshots and content digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Attribute keys produced by the feed parser.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const PROPERTY_TYPE: &str = "property_type";
    pub const SHORT_DESCRIPTION: &str = "short_description";
    pub const LONG_DESCRIPTION: &str = "long_description";
    pub const ADDRESS: &str = "address";
    pub const PRICE: &str = "price";
    pub const SIZE: &str = "size";
    pub const BEDROOMS: &str = "bedrooms";
    pub const BATHROOMS: &str = "bathrooms";
    pub const IMAGES: [&str; 5] = ["image_1", "image_2", "image_3", "image_4", "image_5"];
    pub const AGENT_NAME: &str = "agent_name";
    pub const AGENT_EMAIL: &str = "agent_email";
    pub const AGENT_PHONE: &str = "agent_phone";
    pub const AGENT_AVATAR: &str = "agent_avatar";
    pub const VIDEO_ID: &str = "video_id";
    pub const HAS_VIDEO: &str = "has_video";
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain text.
    Text(String),
    /// URL of an image asset.
    Image(String),
    /// Boolean switch.
    Flag(bool),
}

impl FieldValue {
    /// Text content for text and image values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Image(s) => Some(s),
            FieldValue::Flag(_) => None,
        }
    }

    fn to_canonical_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::json!({ "kind": "text", "value": s }),
            FieldValue::Image(s) => serde_json::json!({ "kind": "image", "value": s }),
            FieldValue::Flag(b) => serde_json::json!({ "kind": "flag", "value": b }),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

/// Ordered attribute map of a listing.
pub type Attributes = BTreeMap<String, FieldValue>;

/// A normalised source-side listing.
///
/// The digest is computed at construction and cannot drift from the
/// attributes, since both are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    source_id: String,
    attributes: Attributes,
    content_digest: String,
}

impl Listing {
    /// Create a listing and compute its content digest.
    pub fn new(source_id: impl Into<String>, attributes: Attributes) -> Self {
        let content_digest = content_digest(&attributes);
        Self {
            source_id: source_id.into(),
            attributes,
            content_digest,
        }
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[must_use]
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    /// Look up a single attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.attributes.get(key)
    }

    /// Text of a text or image attribute.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }
}

/// SHA-256 over the canonical JSON form of the attributes.
///
/// Keys are serialised in sorted order, so two attribute maps with the same
/// content always produce the same 64-character hex digest regardless of the
/// order fields appeared in the feed.
#[must_use]
pub fn content_digest(attributes: &Attributes) -> String {
    let canonical: serde_json::Map<String, serde_json::Value> = attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.to_canonical_json()))
        .collect();
    let encoded = serde_json::Value::Object(canonical).to_string();

    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}

/// The fully parsed set of listings for one run, keyed by source id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    listings: HashMap<String, Listing>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a listing, returning the entry it replaced.
    ///
    /// Replacement is the duplicate policy: the last-inserted entry for a
    /// source id wins.
    pub fn insert(&mut self, listing: Listing) -> Option<Listing> {
        self.listings.insert(listing.source_id.clone(), listing)
    }

    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<&Listing> {
        self.listings.get(source_id)
    }

    #[must_use]
    pub fn contains(&self, source_id: &str) -> bool {
        self.listings.contains_key(source_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.listings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values()
    }
}

impl FromIterator<Listing> for Snapshot {
    fn from_iter<T: IntoIterator<Item = Listing>>(iter: T) -> Self {
        let mut snapshot = Snapshot::new();
        for listing in iter {
            snapshot.insert(listing);
        }
        snapshot
    }
}

impl IntoIterator for Snapshot {
    type Item = Listing;
    type IntoIter = std::collections::hash_map::IntoValues<String, Listing>;

    fn into_iter(self) -> Self::IntoIter {
        self.listings.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let listing = Listing::new("A", attrs(&[("title", "Villa")]));
        assert_eq!(listing.content_digest().len(), 64);
        assert!(listing
            .content_digest()
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_ignores_insertion_order() {
        let mut first = Attributes::new();
        first.insert("title".into(), "Villa".into());
        first.insert("price".into(), "AED 2m".into());

        let mut second = Attributes::new();
        second.insert("price".into(), "AED 2m".into());
        second.insert("title".into(), "Villa".into());

        assert_eq!(content_digest(&first), content_digest(&second));
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = content_digest(&attrs(&[("title", "Villa")]));
        let b = content_digest(&attrs(&[("title", "Villa 2")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_distinguishes_value_kinds() {
        let mut text = Attributes::new();
        text.insert("image_1".into(), FieldValue::Text("a.jpg".into()));
        let mut image = Attributes::new();
        image.insert("image_1".into(), FieldValue::Image("a.jpg".into()));
        assert_ne!(content_digest(&text), content_digest(&image));
    }

    #[test]
    fn test_snapshot_last_insert_wins() {
        let snapshot: Snapshot = vec![
            Listing::new("A", attrs(&[("title", "first")])),
            Listing::new("B", attrs(&[("title", "b")])),
            Listing::new("A", attrs(&[("title", "second")])),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("A").unwrap().text("title"), Some("second"));
    }

    #[test]
    fn test_field_value_serialization() {
        let json = serde_json::to_string(&FieldValue::Flag(true)).unwrap();
        assert_eq!(json, r#"{"kind":"flag","value":true}"#);
        let parsed: FieldValue = serde_json::from_str(r#"{"kind":"image","value":"x"}"#).unwrap();
        assert_eq!(parsed, FieldValue::Image("x".into()));
    }
}
