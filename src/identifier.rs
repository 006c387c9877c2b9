//! Identifier module
//!
//! Prefix-tagged, time-sortable identifiers for accounts, users,
//! transactions and ledger entries.
//!
//! Layout: `<prefix>_<time><entropy>`
//! - `prefix`: 1-8 lowercase ASCII letters
//! - `time`: 48-bit Unix milliseconds, 10 Crockford base32 characters
//! - `entropy`: 80 random bits, 16 Crockford base32 characters
//!
//! The alphabet is in ASCII order and the time field is fixed-width, so two
//! identifiers with the same prefix generated at different milliseconds
//! compare in creation order as plain strings. Listing cursors rely on this.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Crockford base32 (no I, L, O, U)
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const TIME_LEN: usize = 10;
const ENTROPY_LEN: usize = 16;
const BODY_LEN: usize = TIME_LEN + ENTROPY_LEN;
const MAX_PREFIX_LEN: usize = 8;
const SEPARATOR: char = '_';

/// Largest value representable in the 48-bit time component
const MAX_TIMESTAMP_MS: u64 = (1 << 48) - 1;

pub const ACCOUNT_PREFIX: &str = "acct";
pub const USER_PREFIX: &str = "usr";
pub const TRANSACTION_PREFIX: &str = "txn";
pub const LEDGER_ENTRY_PREFIX: &str = "le";

/// Errors produced while parsing an identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid identifier format: {0}")]
    InvalidFormat(String),

    #[error("Invalid identifier length: expected {expected} characters after the prefix, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A validated identifier.
///
/// Stored as TEXT (collation "C") in the database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Generate a new identifier for the current time.
    pub fn generate(prefix: &str) -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self::generate_at(prefix, now_ms, &mut rand::thread_rng())
    }

    /// Generate an identifier for an explicit timestamp and entropy source.
    pub fn generate_at<R: RngCore>(prefix: &str, timestamp_ms: u64, rng: &mut R) -> Self {
        debug_assert!(is_valid_prefix(prefix), "invalid identifier prefix: {prefix}");

        let mut entropy = [0u8; 10];
        rng.fill_bytes(&mut entropy);
        let entropy = entropy
            .iter()
            .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte));

        let mut id = String::with_capacity(prefix.len() + 1 + BODY_LEN);
        id.push_str(prefix);
        id.push(SEPARATOR);
        encode_into(&mut id, u128::from(timestamp_ms.min(MAX_TIMESTAMP_MS)), TIME_LEN);
        encode_into(&mut id, entropy, ENTROPY_LEN);

        Self(id)
    }

    /// Parse and validate an identifier string.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let (prefix, body) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| IdentifierError::InvalidFormat(format!("missing '{}' separator", SEPARATOR)))?;

        if !is_valid_prefix(prefix) {
            return Err(IdentifierError::InvalidFormat(format!(
                "prefix must be 1-{} lowercase letters",
                MAX_PREFIX_LEN
            )));
        }

        let actual = body.chars().count();
        if actual != BODY_LEN {
            return Err(IdentifierError::InvalidLength {
                expected: BODY_LEN,
                actual,
            });
        }

        if let Some(c) = body.bytes().find(|b| !ALPHABET.contains(b)) {
            return Err(IdentifierError::InvalidFormat(format!(
                "character '{}' is not in the identifier alphabet",
                c as char
            )));
        }

        // 10 base32 characters hold 50 bits; the top two must be zero.
        if body.as_bytes()[0] > b'7' {
            return Err(IdentifierError::InvalidFormat(
                "timestamp component overflows 48 bits".to_string(),
            ));
        }

        Ok(Self(s.to_string()))
    }

    /// Parse an identifier and require a specific prefix.
    pub fn parse_prefixed(s: &str, prefix: &str) -> Result<Self, IdentifierError> {
        let id = Self::parse(s)?;
        if id.prefix() != prefix {
            return Err(IdentifierError::InvalidFormat(format!(
                "expected '{}' identifier, got '{}'",
                prefix,
                id.prefix()
            )));
        }
        Ok(id)
    }

    /// Check whether a string is a well-formed identifier.
    pub fn validate(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    pub fn prefix(&self) -> &str {
        self.0
            .split_once(SEPARATOR)
            .map(|(prefix, _)| prefix)
            .unwrap_or_default()
    }

    /// Milliseconds since the Unix epoch encoded in the identifier.
    ///
    /// Values decoded from the database skip `parse`; a malformed one yields 0.
    pub fn timestamp_ms(&self) -> u64 {
        let body = self
            .0
            .len()
            .checked_sub(BODY_LEN)
            .and_then(|start| self.0.get(start..))
            .unwrap_or_default();
        body.bytes()
            .take(TIME_LEN)
            .fold(0u64, |acc, b| (acc << 5) | decode_char(b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix.bytes().all(|b| b.is_ascii_lowercase())
}

/// Append `len` base32 characters of `value`, most significant first.
fn encode_into(out: &mut String, value: u128, len: usize) {
    for i in (0..len).rev() {
        let index = ((value >> (5 * i)) & 0x1F) as usize;
        out.push(ALPHABET[index] as char);
    }
}

fn decode_char(b: u8) -> u64 {
    ALPHABET.iter().position(|&c| c == b).unwrap_or(0) as u64
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identifier::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_generate_shape() {
        let id = Identifier::generate(TRANSACTION_PREFIX);
        let s = id.as_str();

        assert!(s.starts_with("txn_"));
        assert_eq!(s.len(), "txn_".len() + BODY_LEN);
        assert_eq!(id.prefix(), "txn");
        assert!(Identifier::validate(s));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let mut rng = StepRng::new(7, 13);
        let id = Identifier::generate_at(ACCOUNT_PREFIX, 1_700_000_000_123, &mut rng);
        assert_eq!(id.timestamp_ms(), 1_700_000_000_123);
    }

    #[test]
    fn test_ids_sort_by_creation_time() {
        let mut rng = rand::thread_rng();
        let earlier = Identifier::generate_at(TRANSACTION_PREFIX, 1_700_000_000_000, &mut rng);
        let later = Identifier::generate_at(TRANSACTION_PREFIX, 1_700_000_000_001, &mut rng);
        let much_later = Identifier::generate_at(TRANSACTION_PREFIX, 1_900_000_000_000, &mut rng);

        assert!(earlier.as_str() < later.as_str());
        assert!(later.as_str() < much_later.as_str());
    }

    #[test]
    fn test_zero_timestamp_encodes_as_zeros() {
        let mut rng = StepRng::new(0, 0);
        let id = Identifier::generate_at(USER_PREFIX, 0, &mut rng);
        assert_eq!(id.as_str(), "usr_00000000000000000000000000");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let err = Identifier::parse("txn01HQZX3V5K8M2N4P6R7S9T0W1Y").unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidFormat(_)));
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        let err = Identifier::parse("txn_01HQZX3V5K").unwrap_err();
        assert_eq!(
            err,
            IdentifierError::InvalidLength {
                expected: BODY_LEN,
                actual: 10
            }
        );
    }

    #[test]
    fn test_parse_rejects_confusable_characters() {
        // 'O', 'I', 'L' and 'U' are excluded from the alphabet
        for bad in ["txn_0000000000000000000000000O", "txn_0000000000000000000000000I", "txn_0000000000000000000000000L", "txn_0000000000000000000000000U"] {
            assert!(
                matches!(Identifier::parse(bad), Err(IdentifierError::InvalidFormat(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_lowercase_body_and_bad_prefix() {
        assert!(!Identifier::validate("txn_0000000000000000000000000a"));
        assert!(!Identifier::validate("TXN_00000000000000000000000000"));
        assert!(!Identifier::validate("_00000000000000000000000000"));
        assert!(!Identifier::validate("toolongprefix_00000000000000000000000000"));
    }

    #[test]
    fn test_parse_rejects_timestamp_overflow() {
        assert!(!Identifier::validate("txn_80000000000000000000000000"));
        assert!(Identifier::validate("txn_7ZZZZZZZZZ0000000000000000"));
    }

    #[test]
    fn test_parse_never_panics_on_garbage() {
        for input in ["", "_", "__", "txn_", "ü_ü", "txn_ÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄ"] {
            assert!(!Identifier::validate(input));
        }
    }

    #[test]
    fn test_parse_prefixed() {
        let id = Identifier::generate(ACCOUNT_PREFIX);
        assert!(Identifier::parse_prefixed(id.as_str(), ACCOUNT_PREFIX).is_ok());
        assert!(matches!(
            Identifier::parse_prefixed(id.as_str(), TRANSACTION_PREFIX),
            Err(IdentifierError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_serde_validates() {
        let id = Identifier::generate(LEDGER_ENTRY_PREFIX);
        let json = serde_json::to_string(&id).unwrap();
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<Identifier>("\"not-an-id\"").is_err());
    }

    #[test]
    fn test_timestamp_of_short_stored_value_is_zero() {
        // Rows are decoded without validation
        let short = Identifier("acct_123".to_string());
        assert_eq!(short.timestamp_ms(), 0);
        assert_eq!(Identifier(String::new()).timestamp_ms(), 0);
    }
}
