use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

lazy_static! {
    // 8-4-4-4-12 hex, version nibble 1-5, variant nibble 8/9/a/b.
    static ref PRODUCT_ID_RE: Regex = Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$"
    )
    .unwrap();
}

/// Returns true iff `s` is a well-formed product identifier. Never panics.
pub fn is_valid_identifier(s: &str) -> bool {
    PRODUCT_ID_RE.is_match(s)
}

/// Unique product identifier. Only constructible from a string that passes
/// [`is_valid_identifier`], so every `ProductId` in the system is well-formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductId(Uuid);

impl ProductId {
    pub fn parse(s: &str) -> Option<Self> {
        if !is_valid_identifier(s) {
            return None;
        }
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<ProductId> for Uuid {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // lowercase hyphenated, the form used in storage and URLs
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid product identifier: {0:?}")]
pub struct InvalidProductId(pub String);

impl FromStr for ProductId {
    type Err = InvalidProductId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidProductId(s.to_string()))
    }
}

impl Serialize for ProductId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Splits raw user input (a single id or a comma separated, possibly
/// URL-encoded list) into the valid identifiers it contains, in input order.
/// Invalid tokens are dropped individually.
pub fn parse_batch(raw: &str) -> Vec<ProductId> {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    decoded
        .split(',')
        .map(str::trim)
        .filter_map(ProductId::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const B: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    #[test]
    fn accepts_well_formed_ids() {
        assert!(is_valid_identifier(A));
        assert!(is_valid_identifier(&A.to_uppercase()));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("not-a-uuid"));
        // version nibble 0
        assert!(!is_valid_identifier("0f8fad5b-d9cb-069f-a165-70867728950e"));
        // variant nibble c
        assert!(!is_valid_identifier("0f8fad5b-d9cb-469f-c165-70867728950e"));
        // simple (unhyphenated) form
        assert!(!is_valid_identifier("0f8fad5bd9cb469fa16570867728950e"));
        assert!(!is_valid_identifier(&format!(" {A}")));
    }

    #[test]
    fn display_is_lowercase_hyphenated() {
        let id = ProductId::parse(&A.to_uppercase()).unwrap();
        assert_eq!(id.to_string(), A);
    }

    #[test]
    fn parse_batch_skips_invalid_tokens() {
        let ids = parse_batch(&format!("{A},not-a-uuid,{B}"));
        let got: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(got, vec![A, B]);
    }

    #[test]
    fn parse_batch_decodes_url_encoding() {
        let ids = parse_batch(&format!("{A}%2C%20{B}"));
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1].to_string(), B);
    }

    #[test]
    fn serde_round_trips_through_string() {
        let id: ProductId = serde_json::from_str(&format!("\"{A}\"")).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{A}\""));
        assert!(serde_json::from_str::<ProductId>("\"nope\"").is_err());
    }
}
