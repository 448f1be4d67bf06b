// src/identity.rs
//! Identity resolution: the single join key used across the whole pipeline.
//!
//! A record is identified by its trimmed `(title, published)` pair. `published` is
//! taken verbatim, so the same instant written in two formats yields two keys.
//! Untitled records fall back to a SHA-256 digest of their canonical (sorted-key)
//! JSON serialization; two distinct untitled records with identical content
//! therefore collide, which is accepted.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    Titled { title: String, published: String },
    Hashed(String),
}

impl IdentityKey {
    /// Two-branch constructor. `record` is only serialized when `title` is empty.
    pub fn resolve<T: Serialize>(title: &str, published: &str, record: &T) -> Self {
        let title = title.trim();
        if title.is_empty() {
            Self::Hashed(content_hash(record))
        } else {
            Self::Titled {
                title: title.to_string(),
                published: published.trim().to_string(),
            }
        }
    }

    /// Key from bare fields, hashing the pair itself when the title is empty.
    pub fn from_fields(title: &str, published: &str) -> Self {
        Self::resolve(title, published, &(title.trim(), published.trim()))
    }

    /// Parse a rendered key back. Splits on the last `|`, so a titled key whose
    /// `published` contains `|` does not round-trip; output records rebuild titled
    /// keys from their own fields and only parse hashed ones.
    pub fn parse(rendered: &str) -> Self {
        match rendered.rsplit_once('|') {
            Some((t, p)) if !t.trim().is_empty() => Self::Titled {
                title: t.trim().to_string(),
                published: p.trim().to_string(),
            },
            _ => Self::Hashed(rendered.trim().to_string()),
        }
    }

    pub fn is_hashed(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Titled { title, published } => write!(f, "{title}|{published}"),
            Self::Hashed(h) => f.write_str(h),
        }
    }
}

/// Hex SHA-256 of the canonical serialization. `serde_json::Value` objects are
/// BTreeMap-backed, so round-tripping through `Value` sorts keys at every level.
pub fn content_hash<T: Serialize>(record: &T) -> String {
    let canonical = serde_json::to_value(record)
        .and_then(|v| serde_json::to_string(&v))
        .unwrap_or_default();
    hex_digest(canonical.as_bytes())
}

fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Short anonymised id for log lines; raw titles are never logged.
pub fn anon_id(text: &str) -> String {
    let mut h = hex_digest(text.as_bytes());
    h.truncate(12);
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArticleRecord;

    fn art(title: &str, published: &str, source: &str) -> ArticleRecord {
        ArticleRecord {
            title: Some(title.into()),
            published: Some(published.into()),
            source: Some(source.into()),
            ..ArticleRecord::default()
        }
    }

    #[test]
    fn same_title_and_published_share_a_key_regardless_of_other_fields() {
        let a = art("Apple beats", "2024-01-01", "Reuters");
        let mut b = art("  Apple beats ", "2024-01-01 ", "CNBC");
        b.tickers = vec!["AAPL".into()];
        let ka = IdentityKey::resolve(a.title_str(), a.published_str(), &a);
        let kb = IdentityKey::resolve(b.title_str(), b.published_str(), &b);
        assert_eq!(ka, kb);
        assert_eq!(ka.to_string(), "Apple beats|2024-01-01");
    }

    #[test]
    fn different_published_strings_give_different_keys() {
        let a = art("Apple beats", "2024-01-01", "");
        let b = art("Apple beats", "Mon, 01 Jan 2024", "");
        assert_ne!(
            IdentityKey::resolve(a.title_str(), a.published_str(), &a),
            IdentityKey::resolve(b.title_str(), b.published_str(), &b)
        );
    }

    #[test]
    fn untitled_records_hash_their_content_stably() {
        let mut a = art("", "2024-01-01", "Reuters");
        a.tickers = vec!["MSFT".into()];
        let k1 = IdentityKey::resolve(a.title_str(), a.published_str(), &a);
        let k2 = IdentityKey::resolve(a.title_str(), a.published_str(), &a.clone());
        assert!(k1.is_hashed());
        assert_eq!(k1, k2);

        let mut b = a.clone();
        b.source = Some("CNBC".into());
        assert_ne!(k1, IdentityKey::resolve(b.title_str(), b.published_str(), &b));
    }

    #[test]
    fn rendered_keys_parse_back() {
        let k = IdentityKey::from_fields("T1", "2024-01-01");
        assert_eq!(IdentityKey::parse(&k.to_string()), k);
        let h = IdentityKey::from_fields("", "x");
        assert_eq!(IdentityKey::parse(&h.to_string()), h);
    }
}
