//! Feed snapshot parser.
//!
//! Turns the CRM's `<list><property>…</property></list>` document into a
//! [`Snapshot`] of normalised listings. Structural problems with the document
//! are fatal; problems with a single `<property>` only skip that entry.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::format::{self, FieldError, Measure};
use crate::listing::{fields, Attributes, FieldValue, Listing, Snapshot};
use crate::video::VideoCatalog;
use crate::xml::{parse_document, XmlNode};

const ROOT_ELEMENT: &str = "list";
const ENTRY_ELEMENT: &str = "property";
const ID_ELEMENT: &str = "reference_number";

/// Number of photos carried onto a listing.
pub const MAX_IMAGES: usize = 5;

/// Parser settings.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// Fixed price that stands for "Price on Application".
    pub poa_value: Option<u64>,
    /// Fixed price that stands for "Coming Soon".
    pub coming_soon_value: Option<u64>,
    /// Listing videos. `None` leaves the video attributes off entirely.
    pub videos: Option<VideoCatalog>,
}

impl ParserOptions {
    #[must_use]
    pub fn with_poa_value(mut self, value: u64) -> Self {
        self.poa_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_coming_soon_value(mut self, value: u64) -> Self {
        self.coming_soon_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_videos(mut self, videos: VideoCatalog) -> Self {
        self.videos = Some(videos);
        self
    }
}

/// Why a feed entry was left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Zero-based position of the entry among `<property>` elements.
    pub position: usize,
    /// Source id, if the entry had one.
    pub source_id: Option<String>,
    pub reason: String,
}

/// Result of parsing one feed document.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub snapshot: Snapshot,
    pub skipped: Vec<SkippedEntry>,
    /// Source ids that appeared more than once, in first-repeat order.
    pub duplicates: Vec<String>,
}

/// Parses raw feed payloads into snapshots.
#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    options: ParserOptions,
}

impl FeedParser {
    #[must_use]
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse a feed document.
    ///
    /// When a source id appears more than once the last entry in document
    /// order wins.
    pub fn parse(&self, raw: &str) -> FeedResult<ParseOutcome> {
        let root = parse_document(raw)?;
        if root.name != ROOT_ELEMENT {
            return Err(FeedError::format(format!(
                "root element must be <{ROOT_ELEMENT}>, found <{}>",
                root.name
            )));
        }

        let mut outcome = ParseOutcome::default();

        for (position, entry) in root.children_named(ENTRY_ELEMENT).enumerate() {
            let Some(source_id) = entry.child_value(ID_ELEMENT) else {
                debug!(position, "Skipping feed entry without reference number");
                outcome.skipped.push(SkippedEntry {
                    position,
                    source_id: None,
                    reason: format!("missing <{ID_ELEMENT}>"),
                });
                continue;
            };

            let attributes = match self.build_attributes(source_id, entry) {
                Ok(attributes) => attributes,
                Err(err) => {
                    warn!(position, source_id, error = %err, "Skipping invalid feed entry");
                    outcome.skipped.push(SkippedEntry {
                        position,
                        source_id: Some(source_id.to_string()),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            if outcome
                .snapshot
                .insert(Listing::new(source_id, attributes))
                .is_some()
                && !outcome.duplicates.iter().any(|d| d == source_id)
            {
                warn!(source_id, "Duplicate reference number in feed, keeping last entry");
                outcome.duplicates.push(source_id.to_string());
            }
        }

        debug!(
            listings = outcome.snapshot.len(),
            skipped = outcome.skipped.len(),
            duplicates = outcome.duplicates.len(),
            "Parsed feed snapshot"
        );

        Ok(outcome)
    }

    fn build_attributes(&self, source_id: &str, entry: &XmlNode) -> Result<Attributes, FieldError> {
        let mut attrs = Attributes::new();

        put_text(&mut attrs, fields::TITLE, entry.child_value("title_en"));
        put_text(&mut attrs, fields::PROPERTY_TYPE, entry.child_value("property_type"));

        if let Some(description) = entry.child_value("description_en") {
            let (short, long) = format::split_description(description);
            attrs.insert(fields::SHORT_DESCRIPTION.into(), FieldValue::Text(short));
            attrs.insert(fields::LONG_DESCRIPTION.into(), FieldValue::Text(long));
        }

        let address = format::join_address(&[
            entry.child_value("property_name"),
            entry.child_value("community"),
            entry.child_value("city"),
        ]);
        if !address.is_empty() {
            attrs.insert(fields::ADDRESS.into(), FieldValue::Text(address));
        }

        if let Some(measure) = read_measure(entry, "askingPrice", "price")? {
            let price = format::format_price(
                &measure,
                self.options.poa_value,
                self.options.coming_soon_value,
            )?;
            attrs.insert(fields::PRICE.into(), FieldValue::Text(price));
        }

        if let Some(measure) = read_measure(entry, "size", "size")? {
            attrs.insert(fields::SIZE.into(), FieldValue::Text(format::format_size(&measure)?));
        }

        for (element, key, noun) in [
            ("bedroom", fields::BEDROOMS, "Bedrooms"),
            ("bathroom", fields::BATHROOMS, "Bathrooms"),
        ] {
            if let Some(measure) = read_measure(entry, element, key)? {
                attrs.insert(key.into(), FieldValue::Text(format::format_rooms(&measure, noun)));
            }
        }

        if let Some(photo) = entry.child("photo") {
            let urls = photo.children_named("url").filter_map(XmlNode::value);
            for (key, url) in fields::IMAGES.iter().take(MAX_IMAGES).zip(urls) {
                attrs.insert((*key).into(), FieldValue::Image(format::encode_url(url)));
            }
        }

        if let Some(agent) = entry.child("agent") {
            put_text(&mut attrs, fields::AGENT_NAME, agent.child_value("name"));
            put_text(&mut attrs, fields::AGENT_EMAIL, agent.child_value("email"));
            put_text(&mut attrs, fields::AGENT_PHONE, agent.child_value("phone"));
            if let Some(photo) = agent.child_value("photo") {
                attrs.insert(
                    fields::AGENT_AVATAR.into(),
                    FieldValue::Image(format::encode_url(photo)),
                );
            }
        }

        if let Some(videos) = &self.options.videos {
            let video_id = videos.video_id(source_id);
            attrs.insert(fields::HAS_VIDEO.into(), FieldValue::Flag(video_id.is_some()));
            attrs.insert(
                fields::VIDEO_ID.into(),
                FieldValue::Text(video_id.unwrap_or_default()),
            );
        }

        Ok(attrs)
    }
}

fn put_text(attrs: &mut Attributes, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        attrs.insert(key.to_string(), FieldValue::Text(value.to_string()));
    }
}

fn read_measure(
    entry: &XmlNode,
    element: &str,
    field: &'static str,
) -> Result<Option<Measure>, FieldError> {
    match entry.child(element) {
        Some(node) => Measure::read(node, field),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<list>
  <property>
    <reference_number>REF-1</reference_number>
    <title_en>Palm Villa</title_en>
    <property_type>Villa</property_type>
    <description_en>Stunning villa.

Private beach.
Five bedrooms.</description_en>
    <property_name>Frond A</property_name>
    <community>Palm Jumeirah</community>
    <city>Dubai</city>
    <askingPrice><type>fixed</type><value>12500000</value></askingPrice>
    <size>6200</size>
    <bedroom>5</bedroom>
    <bathroom><type>range</type><min>5</min><max>6</max></bathroom>
    <photo>
      <url>https://cdn.example.com/a 1.jpg</url>
      <url>https://cdn.example.com/b.jpg</url>
    </photo>
    <agent>
      <name>Sam Lee</name>
      <email>sam@example.com</email>
      <phone>+971500000000</phone>
      <photo>https://cdn.example.com/sam.jpg</photo>
    </agent>
  </property>
  <property>
    <reference_number>REF-2</reference_number>
    <title_en>Marina Flat</title_en>
    <askingPrice>999</askingPrice>
  </property>
</list>"#;

    #[test]
    fn test_parse_full_entry() {
        let outcome = FeedParser::default().parse(FEED).unwrap();
        assert_eq!(outcome.snapshot.len(), 2);
        assert!(outcome.skipped.is_empty());

        let listing = outcome.snapshot.get("REF-1").unwrap();
        assert_eq!(listing.text(fields::TITLE), Some("Palm Villa"));
        assert_eq!(listing.text(fields::PROPERTY_TYPE), Some("Villa"));
        assert_eq!(listing.text(fields::SHORT_DESCRIPTION), Some("Stunning villa."));
        assert_eq!(
            listing.text(fields::LONG_DESCRIPTION),
            Some("Private beach.<br><br>Five bedrooms.")
        );
        assert_eq!(
            listing.text(fields::ADDRESS),
            Some("Frond A, Palm Jumeirah, Dubai")
        );
        assert_eq!(listing.text(fields::PRICE), Some("AED 12.5m"));
        assert_eq!(listing.text(fields::SIZE), Some("BUA 6,200 sqft"));
        assert_eq!(listing.text(fields::BEDROOMS), Some("5 Bedrooms"));
        assert_eq!(listing.text(fields::BATHROOMS), Some("5-6 Bathrooms"));
        assert_eq!(
            listing.get("image_1"),
            Some(&FieldValue::Image("https://cdn.example.com/a%201.jpg".into()))
        );
        assert!(listing.get("image_3").is_none());
        assert_eq!(listing.text(fields::AGENT_NAME), Some("Sam Lee"));
        assert_eq!(listing.text(fields::AGENT_AVATAR), Some("https://cdn.example.com/sam.jpg"));
        assert!(listing.get(fields::HAS_VIDEO).is_none());
    }

    #[test]
    fn test_sentinel_prices() {
        let parser = FeedParser::new(ParserOptions::default().with_poa_value(999));
        let outcome = parser.parse(FEED).unwrap();
        let listing = outcome.snapshot.get("REF-2").unwrap();
        assert_eq!(listing.text(fields::PRICE), Some(format::PRICE_ON_APPLICATION));
    }

    #[test]
    fn test_wrong_root_is_format_error() {
        let err = FeedParser::default()
            .parse("<listings><property/></listings>")
            .unwrap_err();
        assert!(matches!(err, FeedError::Format { .. }));
    }

    #[test]
    fn test_malformed_is_format_error() {
        let err = FeedParser::default().parse("<list><property>").unwrap_err();
        assert_eq!(err.error_code(), "FEED_FORMAT");
    }

    #[test]
    fn test_empty_list_yields_empty_snapshot() {
        let outcome = FeedParser::default().parse("<list></list>").unwrap();
        assert!(outcome.snapshot.is_empty());
        assert!(outcome.skipped.is_empty());

        let outcome = FeedParser::default().parse("<list/>").unwrap();
        assert!(outcome.snapshot.is_empty());
    }

    #[test]
    fn test_missing_id_and_invalid_entries_skipped() {
        let xml = r#"<list>
          <property><title_en>No id</title_en></property>
          <property><reference_number>  </reference_number></property>
          <property>
            <reference_number>BAD</reference_number>
            <askingPrice><type>auction</type></askingPrice>
          </property>
          <property><reference_number>OK</reference_number></property>
        </list>"#;

        let outcome = FeedParser::default().parse(xml).unwrap();
        assert_eq!(outcome.snapshot.len(), 1);
        assert!(outcome.snapshot.contains("OK"));
        assert_eq!(outcome.skipped.len(), 3);
        assert_eq!(outcome.skipped[0].position, 0);
        assert_eq!(outcome.skipped[2].source_id.as_deref(), Some("BAD"));
        assert!(outcome.skipped[2].reason.contains("auction"));
    }

    #[test]
    fn test_duplicates_last_wins() {
        let xml = r#"<list>
          <property><reference_number>A</reference_number><title_en>first</title_en></property>
          <property><reference_number>A</reference_number><title_en>second</title_en></property>
          <property><reference_number>A</reference_number><title_en>third</title_en></property>
        </list>"#;

        let outcome = FeedParser::default().parse(xml).unwrap();
        assert_eq!(outcome.snapshot.len(), 1);
        assert_eq!(outcome.duplicates, vec!["A".to_string()]);
        assert_eq!(
            outcome.snapshot.get("A").unwrap().text(fields::TITLE),
            Some("third")
        );
    }

    #[test]
    fn test_video_attributes() {
        let mut videos = VideoCatalog::new();
        videos.insert("REF-1", "https://youtu.be/vid1");
        let parser = FeedParser::new(ParserOptions::default().with_videos(videos));

        let outcome = parser.parse(FEED).unwrap();
        let with = outcome.snapshot.get("REF-1").unwrap();
        assert_eq!(with.get(fields::HAS_VIDEO), Some(&FieldValue::Flag(true)));
        assert_eq!(with.text(fields::VIDEO_ID), Some("vid1"));

        let without = outcome.snapshot.get("REF-2").unwrap();
        assert_eq!(without.get(fields::HAS_VIDEO), Some(&FieldValue::Flag(false)));
        assert_eq!(without.text(fields::VIDEO_ID), Some(""));
    }

    #[test]
    fn test_digest_stable_across_element_order() {
        let a = r#"<list><property><reference_number>X</reference_number><title_en>T</title_en><city>Dubai</city></property></list>"#;
        let b = r#"<list><property><city>Dubai</city><title_en>T</title_en><reference_number>X</reference_number></property></list>"#;

        let a = FeedParser::default().parse(a).unwrap().snapshot;
        let b = FeedParser::default().parse(b).unwrap().snapshot;
        assert_eq!(
            a.get("X").unwrap().content_digest(),
            b.get("X").unwrap().content_digest()
        );
    }
}
