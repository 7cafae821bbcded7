//! # Document Numbering
//!
//! Human-readable numbers of the form `{PREFIX}-{YYYYMMDD}-{NNNN}`.
//!
//! ```text
//! INV-20261019-0001
//! ─┬─ ───┬──── ──┬─
//!  │     │       └── sequence within (kind, day), zero-padded, starts at 1
//!  │     └────────── business day
//!  └──────────────── DocumentKind::prefix()
//! ```
//!
//! The sequence value comes from the durable counter in the database; this
//! module only formats and parses. More than 9999 documents in a day widens
//! the sequence field rather than wrapping.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::DocumentKind;

/// A minted document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentNumber {
    pub kind: DocumentKind,
    pub day: NaiveDate,
    pub sequence: i64,
}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, day: NaiveDate, sequence: i64) -> Self {
        Self {
            kind,
            day,
            sequence,
        }
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.kind.prefix(),
            self.day.format("%Y%m%d"),
            self.sequence
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "document_no".to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.splitn(3, '-');
        let (prefix, day, seq) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(d), Some(n)) => (p, d, n),
            _ => return Err(invalid("expected PREFIX-YYYYMMDD-NNNN")),
        };

        let kind = DocumentKind::from_prefix(prefix).ok_or_else(|| invalid("unknown prefix"))?;

        if day.len() != 8 {
            return Err(invalid("date must be YYYYMMDD"));
        }
        let day = NaiveDate::parse_from_str(day, "%Y%m%d")
            .map_err(|_| invalid("date must be YYYYMMDD"))?;

        if seq.len() < 4 || !seq.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("sequence must be at least four digits"));
        }
        let sequence: i64 = seq.parse().map_err(|_| invalid("sequence out of range"))?;
        if sequence < 1 {
            return Err(invalid("sequence starts at 0001"));
        }

        Ok(DocumentNumber::new(kind, day, sequence))
    }
}
