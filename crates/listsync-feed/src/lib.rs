//! Listing feed ingestion.
//!
//! Fetches the CRM's XML listing feed, parses it into a [`Snapshot`] of
//! normalised [`Listing`] records and computes the content digest used to
//! detect changes between runs.
//!
//! ```no_run
//! use listsync_feed::{FeedParser, ParserOptions};
//!
//! let parser = FeedParser::new(ParserOptions::default().with_poa_value(999));
//! let outcome = parser.parse("<list></list>")?;
//! assert!(outcome.snapshot.is_empty());
//! # Ok::<(), listsync_feed::FeedError>(())
//! ```

pub mod error;
pub mod format;
pub mod listing;
pub mod parser;
pub mod source;
pub mod video;
mod xml;

pub use error::{FeedError, FeedResult};
pub use listing::{content_digest, fields, Attributes, FieldValue, Listing, Snapshot};
pub use parser::{FeedParser, ParseOutcome, ParserOptions, SkippedEntry};
pub use source::{FeedSource, HttpFeedSource, StaticFeedSource, DEFAULT_FEED_TIMEOUT};
pub use video::{extract_youtube_id, VideoCatalog};
