//! Display formatting for listing fields.
//!
//! The feed carries raw numbers; the collection shows human-readable labels
//! such as `AED 2.5m`, `BUA 1,234 sqft` or `3 Bedrooms`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

use crate::xml::XmlNode;

/// Characters left untouched when encoding asset URLs.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b':')
    .remove(b'/');

pub const PRICE_ON_APPLICATION: &str = "Price on Application";
pub const COMING_SOON: &str = "Coming Soon";

const CURRENCY: &str = "AED";

/// A field value that could not be formatted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A numeric feed element: either a single value or a `min`/`max` range.
///
/// Accepts both the bare form (`<size>1200</size>`) and the structured form
/// (`<size><type>range</type><min>1000</min><max>2000</max></size>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measure {
    Fixed(String),
    Range { min: String, max: String },
}

impl Measure {
    /// Read a measure from an element, `Ok(None)` when the element is empty.
    pub(crate) fn read(node: &XmlNode, field: &'static str) -> Result<Option<Self>, FieldError> {
        if !node.has_children() {
            return Ok(node.value().map(|v| Measure::Fixed(v.to_string())));
        }

        let required = |name: &str| {
            node.child_value(name)
                .map(str::to_string)
                .ok_or_else(|| FieldError::new(field, format!("missing <{name}>")))
        };

        match node.child_value("type") {
            Some("fixed") => Ok(Some(Measure::Fixed(required("value")?))),
            Some("range") => Ok(Some(Measure::Range {
                min: required("min")?,
                max: required("max")?,
            })),
            Some(other) => Err(FieldError::new(field, format!("unsupported type '{other}'"))),
            None => Err(FieldError::new(field, "missing <type>")),
        }
    }
}

fn parse_amount(raw: &str, field: &'static str) -> Result<u64, FieldError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| FieldError::new(field, format!("'{raw}' is not a whole number")))
}

/// Insert thousands separators: `1234567` becomes `1,234,567`.
#[must_use]
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Compact a price amount.
///
/// Millions get one decimal with `.0` dropped (`2.5m`, `3m`), amounts from
/// ten thousand up are shown in whole thousands (`850k`), smaller amounts
/// keep separators (`9,500`).
#[must_use]
pub fn format_amount(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}m", value as f64 / 1_000_000.0).replace(".0", "")
    } else if value >= 10_000 {
        format!("{:.0}k", value as f64 / 1_000.0)
    } else {
        thousands(value)
    }
}

/// Price label, honouring the sentinel amounts for "Price on Application"
/// and "Coming Soon". Sentinels only apply to fixed prices.
pub fn format_price(
    measure: &Measure,
    poa_value: Option<u64>,
    coming_soon_value: Option<u64>,
) -> Result<String, FieldError> {
    match measure {
        Measure::Fixed(raw) => {
            let value = parse_amount(raw, "price")?;
            if poa_value == Some(value) {
                Ok(PRICE_ON_APPLICATION.to_string())
            } else if coming_soon_value == Some(value) {
                Ok(COMING_SOON.to_string())
            } else {
                Ok(format!("{CURRENCY} {}", format_amount(value)))
            }
        }
        Measure::Range { min, max } => {
            let min = parse_amount(min, "price")?;
            let max = parse_amount(max, "price")?;
            Ok(format!(
                "{CURRENCY} {} - {}",
                format_amount(min),
                format_amount(max)
            ))
        }
    }
}

/// Built-up area label.
pub fn format_size(measure: &Measure) -> Result<String, FieldError> {
    match measure {
        Measure::Fixed(raw) => Ok(format!("BUA {} sqft", thousands(parse_amount(raw, "size")?))),
        Measure::Range { min, max } => Ok(format!(
            "BUA {}-{} sqft",
            thousands(parse_amount(min, "size")?),
            thousands(parse_amount(max, "size")?)
        )),
    }
}

/// Room count label such as `3 Bedrooms` or `2-3 Bathrooms`.
#[must_use]
pub fn format_rooms(measure: &Measure, noun: &str) -> String {
    match measure {
        Measure::Fixed(value) => format!("{value} {noun}"),
        Measure::Range { min, max } => format!("{min}-{max} {noun}"),
    }
}

/// Split a description into its lead paragraph and the remainder.
///
/// Paragraphs are separated by one or more newlines; blank paragraphs are
/// dropped and the remainder is joined with `<br><br>`.
#[must_use]
pub fn split_description(text: &str) -> (String, String) {
    let mut parts = text.split('\n').map(str::trim).filter(|p| !p.is_empty());
    let short = parts.next().unwrap_or_default().to_string();
    let long = parts.collect::<Vec<_>>().join("<br><br>");
    (short, long)
}

/// Join the present address parts with `, `.
#[must_use]
pub fn join_address(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .filter_map(|p| p.map(str::trim).filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Percent-encode an asset URL, keeping `:` and `/` intact.
///
/// Photo filenames in the feed frequently contain spaces.
#[must_use]
pub fn encode_url(url: &str) -> String {
    utf8_percent_encode(url.trim(), URL_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn measure(xml: &str) -> Result<Option<Measure>, FieldError> {
        let node = parse_document(xml).unwrap();
        Measure::read(&node, "price")
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(2_500_000), "2.5m");
        assert_eq!(format_amount(3_000_000), "3m");
        assert_eq!(format_amount(10_000_000), "10m");
        assert_eq!(format_amount(850_000), "850k");
        assert_eq!(format_amount(10_000), "10k");
        assert_eq!(format_amount(9_500), "9,500");
        assert_eq!(format_amount(0), "0");
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(1), "1");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_read_measure_forms() {
        assert_eq!(
            measure("<p>1200</p>").unwrap(),
            Some(Measure::Fixed("1200".into()))
        );
        assert_eq!(
            measure("<p><type>fixed</type><value>5</value></p>").unwrap(),
            Some(Measure::Fixed("5".into()))
        );
        assert_eq!(
            measure("<p><type>range</type><min>1</min><max>2</max></p>").unwrap(),
            Some(Measure::Range {
                min: "1".into(),
                max: "2".into()
            })
        );
        assert_eq!(measure("<p/>").unwrap(), None);
    }

    #[test]
    fn test_read_measure_rejects_unknown_type() {
        let err = measure("<p><type>auction</type></p>").unwrap_err();
        assert!(err.reason.contains("auction"));
        assert!(measure("<p><type>range</type><min>1</min></p>").is_err());
        assert!(measure("<p><value>1</value></p>").is_err());
    }

    #[test]
    fn test_format_price() {
        let fixed = Measure::Fixed("2500000".into());
        assert_eq!(format_price(&fixed, None, None).unwrap(), "AED 2.5m");

        let range = Measure::Range {
            min: "999000".into(),
            max: "2300000".into(),
        };
        assert_eq!(format_price(&range, None, None).unwrap(), "AED 999k - 2.3m");
    }

    #[test]
    fn test_format_price_sentinels() {
        let poa = Measure::Fixed("999".into());
        assert_eq!(
            format_price(&poa, Some(999), Some(111)).unwrap(),
            PRICE_ON_APPLICATION
        );
        let cs = Measure::Fixed("111".into());
        assert_eq!(format_price(&cs, Some(999), Some(111)).unwrap(), COMING_SOON);
        let range = Measure::Range {
            min: "999".into(),
            max: "1000".into(),
        };
        assert_eq!(
            format_price(&range, Some(999), None).unwrap(),
            "AED 999 - 1,000"
        );
    }

    #[test]
    fn test_format_price_rejects_garbage() {
        let err = format_price(&Measure::Fixed("cheap".into()), None, None).unwrap_err();
        assert_eq!(err.field, "price");
    }

    #[test]
    fn test_format_size_and_rooms() {
        assert_eq!(
            format_size(&Measure::Fixed("1234".into())).unwrap(),
            "BUA 1,234 sqft"
        );
        assert_eq!(
            format_size(&Measure::Range {
                min: "1000".into(),
                max: "2000".into()
            })
            .unwrap(),
            "BUA 1,000-2,000 sqft"
        );
        assert_eq!(format_rooms(&Measure::Fixed("3".into()), "Bedrooms"), "3 Bedrooms");
        assert_eq!(
            format_rooms(
                &Measure::Range {
                    min: "2".into(),
                    max: "3".into()
                },
                "Bathrooms"
            ),
            "2-3 Bathrooms"
        );
    }

    #[test]
    fn test_split_description() {
        let (short, long) = split_description("Lead line\n\n\nSecond  \n  \nThird");
        assert_eq!(short, "Lead line");
        assert_eq!(long, "Second<br><br>Third");

        assert_eq!(split_description("Only"), ("Only".into(), String::new()));
        assert_eq!(split_description("\n\n"), (String::new(), String::new()));
    }

    #[test]
    fn test_join_address() {
        assert_eq!(
            join_address(&[Some("Villa"), Some("Palm"), Some("Dubai")]),
            "Villa, Palm, Dubai"
        );
        assert_eq!(join_address(&[None, Some("Palm"), Some(" ")]), "Palm");
    }

    #[test]
    fn test_encode_url() {
        assert_eq!(
            encode_url("https://cdn.example.com/WhatsApp Image 2025.jpg"),
            "https://cdn.example.com/WhatsApp%20Image%202025.jpg"
        );
        assert_eq!(
            encode_url("https://cdn.example.com/a_b-c~d.png"),
            "https://cdn.example.com/a_b-c~d.png"
        );
    }
}
