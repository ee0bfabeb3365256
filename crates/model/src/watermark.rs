use serde::{Deserialize, Serialize};
use std::fmt;

/// A totally ordered, string-encoded scalar that bounds the next extraction query.
///
/// Comparison is mode-specific: `full` mode never compares (there is no
/// watermark to compare), `incremental_pk` compares lexicographically unless
/// both sides parse as `u64` (in which case numeric order is used, so `"9" <
/// "10"`), and `incremental_timestamp` is an RFC 3339 / millisecond-epoch
/// string compared lexicographically (which is order-preserving for
/// millisecond-precision UTC timestamps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark(pub String);

impl Watermark {
    pub fn empty() -> Self {
        Watermark(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the greater of two watermarks, numerically if both parse as
    /// `u64`, lexicographically otherwise. Used by the Extractor to fold a
    /// batch's per-row watermark values into a single tentative watermark.
    pub fn max(self, other: Watermark) -> Watermark {
        if let (Ok(a), Ok(b)) = (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            return if a >= b { self } else { other };
        }
        if self.0 >= other.0 { self } else { other }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Watermark {
    fn from(s: String) -> Self {
        Watermark(s)
    }
}

impl From<&str> for Watermark {
    fn from(s: &str) -> Self {
        Watermark(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_max_uses_numeric_order() {
        let a = Watermark::from("9");
        let b = Watermark::from("10");
        assert_eq!(a.max(b), Watermark::from("10"));
    }

    #[test]
    fn empty_watermark_round_trips() {
        let w = Watermark::empty();
        assert!(w.is_empty());
        assert_eq!(w.as_str(), "");
    }
}
