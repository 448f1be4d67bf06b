// src/types.rs
//! Upstream record shapes: enriched articles and clustered work items.
//!
//! Both are produced by collaborators outside this crate, so deserialization is
//! lenient: nulls become defaults, numbers and strings are accepted where the
//! upstream tools disagree, and unknown fields are preserved in `extra`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::identity::IdentityKey;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Triplet {
    #[serde(default, deserialize_with = "de_opt_text")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub verb: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub object: Option<String>,
}

impl Triplet {
    pub fn is_complete(&self) -> bool {
        [&self.subject, &self.verb, &self.object]
            .iter()
            .all(|p| p.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.verb.is_none() && self.object.is_none()
    }
}

/// One enriched article as written by the upstream NLP stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "de_string_list", skip_serializing_if = "Vec::is_empty")]
    pub tickers: Vec<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triplet: Option<Triplet>,
    #[serde(default, deserialize_with = "de_opt_f64", skip_serializing_if = "Option::is_none")]
    pub polarity: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub article_text: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub cleaned_article_text: Option<String>,
    /// Enrichment fields this crate does not interpret (entities, POS tags, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArticleRecord {
    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or_default().trim()
    }

    pub fn published_str(&self) -> &str {
        self.published.as_deref().unwrap_or_default().trim()
    }

    /// Nested triplet if present, else the flattened subject/verb/object fields.
    pub fn triplet(&self) -> Triplet {
        match &self.triplet {
            Some(t) if !t.is_empty() => t.clone(),
            _ => Triplet {
                subject: self.subject.clone(),
                verb: self.verb.clone(),
                object: self.object.clone(),
            },
        }
    }

    /// Best available body text: raw article text, then the cleaned variant.
    pub fn body_text(&self) -> Option<&str> {
        [&self.article_text, &self.cleaned_article_text]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .map(str::trim)
            .find(|t| !t.is_empty())
    }

    /// Length of the compact JSON serialization; used to pick the most enriched copy.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

/// One queued classification unit, typically a clustered subject-verb-object triplet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    /// Identity of the indexed article this item was built from. Never read
    /// from or written to disk, and excluded from the content hash.
    #[serde(skip)]
    pub key: Option<IdentityKey>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, deserialize_with = "de_string_list", skip_serializing_if = "Vec::is_empty")]
    pub tickers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triplet: Option<Triplet>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,
    #[serde(
        default,
        alias = "label",
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_label: Option<String>,
    #[serde(
        default,
        alias = "textblob_polarity",
        deserialize_with = "de_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub polarity: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or_default().trim()
    }

    pub fn published_str(&self) -> &str {
        self.published.as_deref().unwrap_or_default().trim()
    }

    pub fn triplet(&self) -> Triplet {
        match &self.triplet {
            Some(t) if !t.is_empty() => t.clone(),
            _ => Triplet {
                subject: self.subject.clone(),
                verb: self.verb.clone(),
                object: self.object.clone(),
            },
        }
    }

    /// Fallback work item when no clustered queue exists: the article itself,
    /// pinned to the key it is indexed under.
    pub fn from_article(key: IdentityKey, art: &ArticleRecord) -> Self {
        let triplet = art.triplet();
        Self {
            key: Some(key),
            title: art.title.clone(),
            published: art.published.clone(),
            tickers: art.tickers.clone(),
            triplet: (!triplet.is_empty()).then_some(triplet),
            sentence: art.sentence.clone(),
            polarity: art.polarity,
            ..Self::default()
        }
    }
}

// ------------------------------------------------------------
// Lenient field deserializers
// ------------------------------------------------------------

/// Strings pass through; numbers and booleans are stringified; null/other → None.
fn de_opt_text<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Numbers or numeric strings; anything else → None.
fn de_opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// A list of strings; null → empty, a bare string → one-element list, non-strings skipped.
fn de_string_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|it| match it {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_tolerates_nulls_and_keeps_unknown_fields() {
        let raw = r#"{
            "title": "Fed holds rates",
            "published": null,
            "tickers": null,
            "polarity": "0.25",
            "entities": [["Fed", "ORG"]]
        }"#;
        let art: ArticleRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(art.title_str(), "Fed holds rates");
        assert_eq!(art.published_str(), "");
        assert!(art.tickers.is_empty());
        assert_eq!(art.polarity, Some(0.25));
        assert!(art.extra.contains_key("entities"));
    }

    #[test]
    fn work_item_accepts_label_aliases_and_numeric_cluster() {
        let raw = r#"{"title":"T","published":"P","label":7,"textblob_polarity":-0.5,
                      "subject":"Apple","verb":"beats","object":"estimates"}"#;
        let item: WorkItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.cluster_label.as_deref(), Some("7"));
        assert_eq!(item.polarity, Some(-0.5));
        let t = item.triplet();
        assert!(t.is_complete());
        assert_eq!(t.verb.as_deref(), Some("beats"));
    }

    #[test]
    fn nested_triplet_wins_over_flat_fields() {
        let art = ArticleRecord {
            subject: Some("flat".into()),
            triplet: Some(Triplet {
                subject: Some("nested".into()),
                verb: None,
                object: None,
            }),
            ..ArticleRecord::default()
        };
        assert_eq!(art.triplet().subject.as_deref(), Some("nested"));
    }
}
