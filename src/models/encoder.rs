//! Fitted categorical encoders and the per-column registry

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How the substitute for an unseen label is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// First label of the fitted class list
    #[default]
    FirstKnown,
    /// Label with the highest training count (ties resolve to the earlier label)
    MostFrequent,
}

/// Encoder as stored in the artifact manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSpec {
    /// Fitted labels; a label's code is its position
    #[serde(alias = "classes_")]
    pub classes: Vec<String>,
    /// Training frequency per label, parallel to `classes`
    #[serde(default)]
    pub counts: Option<Vec<u64>>,
}

/// Read-only label encoder with a resolved fallback label.
#[derive(Debug, Clone)]
pub struct Encoder {
    classes: Vec<String>,
    codes: HashMap<String, i64>,
    fallback: usize,
}

impl Encoder {
    /// Build an encoder from its fitted classes, resolving the fallback label now.
    pub fn from_spec(spec: EncoderSpec, policy: FallbackPolicy) -> Result<Self, String> {
        if spec.classes.is_empty() {
            return Err("encoder has no known labels".to_string());
        }

        let mut codes = HashMap::with_capacity(spec.classes.len());
        for (code, label) in spec.classes.iter().enumerate() {
            if codes.insert(label.clone(), code as i64).is_some() {
                return Err(format!("duplicate label {label:?}"));
            }
        }

        let fallback = match policy {
            FallbackPolicy::FirstKnown => 0,
            FallbackPolicy::MostFrequent => {
                let counts = spec
                    .counts
                    .as_ref()
                    .ok_or("most_frequent fallback requires label counts")?;
                if counts.len() != spec.classes.len() {
                    return Err(format!(
                        "{} counts for {} labels",
                        counts.len(),
                        spec.classes.len()
                    ));
                }
                // max_by_key keeps the last maximum, so scan in reverse
                counts
                    .iter()
                    .enumerate()
                    .rev()
                    .max_by_key(|(_, &count)| count)
                    .map(|(idx, _)| idx)
                    .unwrap_or(0)
            }
        };

        Ok(Self {
            classes: spec.classes,
            codes,
            fallback,
        })
    }

    /// Convenience constructor with the default fallback policy.
    pub fn new<I, S>(classes: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_spec(
            EncoderSpec {
                classes: classes.into_iter().map(Into::into).collect(),
                counts: None,
            },
            FallbackPolicy::FirstKnown,
        )
    }

    /// Fitted labels in code order
    pub fn known_labels(&self) -> &[String] {
        &self.classes
    }

    pub fn is_known(&self, label: &str) -> bool {
        self.codes.contains_key(label)
    }

    /// Code for a known label
    pub fn code_of(&self, label: &str) -> Option<i64> {
        self.codes.get(label).copied()
    }

    /// Inverse mapping
    pub fn decode(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.classes.get(idx))
            .map(String::as_str)
    }

    /// Label substituted for unseen or missing values
    pub fn fallback_label(&self) -> &str {
        &self.classes[self.fallback]
    }

    pub fn fallback_code(&self) -> i64 {
        self.fallback as i64
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Explicit `column -> Encoder` mapping, validated at bundle load.
#[derive(Debug, Clone, Default)]
pub struct EncoderRegistry {
    encoders: BTreeMap<String, Encoder>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, encoder: Encoder) {
        self.encoders.insert(column.into(), encoder);
    }

    pub fn get(&self, column: &str) -> Option<&Encoder> {
        self.encoders.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.encoders.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Encoder)> {
        self.encoders.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}
