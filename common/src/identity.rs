use std::fmt;

use serde::{Deserialize, Serialize};

/// A marketplace user (buyer, bidder or seller) as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Length of a hyphenated company identifier: 32 hex digits + 4 hyphens.
pub const COMPANY_ID_LEN: usize = 36;

const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Returns true if `candidate` is a 36-character identifier of hex digits
/// grouped 8-4-4-4-12 by hyphens. Case insensitive.
pub fn is_company_id(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if bytes.len() != COMPANY_ID_LEN {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| {
        if HYPHEN_POSITIONS.contains(&i) {
            *b == b'-'
        } else {
            b.is_ascii_hexdigit()
        }
    })
}

/// A company identity that has passed the format check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

impl CompanyId {
    /// `None` when `raw` is not a well-formed identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        is_company_id(raw).then(|| CompanyId(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
