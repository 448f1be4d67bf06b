// src/signal.rs
//! Persisted signal model: ticker-level sentiment judgments grouped per article.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::identity::IdentityKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Sentiment::Positive => 0,
            Sentiment::Neutral => 1,
            Sentiment::Negative => 2,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = ();

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            _ => Err(()),
        }
    }
}

/// One validated judgment. Only the normalizer constructs these from backend data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub justification: String,
}

/// All signals recorded for one article identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Rendered identity key; absent in files written by other producers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "crate::normalize::de_lossy_string")]
    pub title: String,
    #[serde(default, deserialize_with = "crate::normalize::de_lossy_string")]
    pub published: String,
    #[serde(default, deserialize_with = "crate::normalize::de_lossy_string")]
    pub source: String,
    #[serde(default, deserialize_with = "crate::normalize::de_lossy_string")]
    pub url: String,
    #[serde(
        default,
        alias = "gpt_signals",
        alias = "finbert_signals",
        deserialize_with = "crate::normalize::de_signals"
    )]
    pub signals: Vec<Signal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputRecord {
    /// Titled records are keyed by their own `title`/`published` fields, so a `|`
    /// inside either never changes the key. Untitled records use the persisted
    /// content hash.
    pub fn identity(&self) -> IdentityKey {
        if !self.title.trim().is_empty() {
            return IdentityKey::from_fields(&self.title, &self.published);
        }
        match self.key.as_deref() {
            Some(k) if !k.trim().is_empty() => IdentityKey::parse(k),
            _ => IdentityKey::from_fields(&self.title, &self.published),
        }
    }

    pub fn is_completed(&self) -> bool {
        !self.signals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parses_case_insensitively() {
        assert_eq!(" Positive ".parse::<Sentiment>(), Ok(Sentiment::Positive));
        assert_eq!("NEGATIVE".parse::<Sentiment>(), Ok(Sentiment::Negative));
        assert!("bullish".parse::<Sentiment>().is_err());
    }

    #[test]
    fn legacy_signal_field_names_are_accepted() {
        let raw = r#"{"title":"T1","published":"2024-01-01","source":"","url":"",
            "gpt_signals":[{"ticker":"aapl","sentiment":"Positive","confidence":0.8,"justification":"x"}]}"#;
        let rec: OutputRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.signals.len(), 1);
        assert_eq!(rec.signals[0].ticker, "AAPL");
        assert_eq!(rec.identity().to_string(), "T1|2024-01-01");
    }

    #[test]
    fn pipe_in_published_keeps_the_same_identity() {
        let key = IdentityKey::from_fields("Fed | rates", "Mon | 01 Jan 2024");
        let rec = OutputRecord {
            key: Some(key.to_string()),
            title: "Fed | rates".into(),
            published: "Mon | 01 Jan 2024".into(),
            ..OutputRecord::default()
        };
        assert_eq!(rec.identity(), key);

        let reloaded: OutputRecord =
            serde_json::from_str(&serde_json::to_string(&rec).unwrap()).unwrap();
        assert_eq!(reloaded.identity(), key);
    }

    #[test]
    fn persisted_key_is_used_for_untitled_records() {
        let rec = OutputRecord {
            key: Some("abc123".into()),
            ..OutputRecord::default()
        };
        assert_eq!(rec.identity(), IdentityKey::Hashed("abc123".into()));
    }
}
