use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name recorded for every visitor, since a stranger has no known identity.
pub const UNKNOWN_VISITOR_NAME: &str = "Stranger";

/// Emotion label to intensity score, as estimated by the provider.
///
/// Labels are kept in lexical order, so iteration (and therefore the
/// dominant-emotion tie-break) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionScores(BTreeMap<String, f64>);

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop NaN and infinite scores, which have no JSON representation.
    pub fn retain_finite(&mut self) {
        self.0.retain(|_, score| score.is_finite());
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(label, score)| (label.as_str(), *score))
    }

    /// The label with the highest score.
    ///
    /// On equal scores the first label in iteration order wins, i.e. the
    /// alphabetically smallest one. NaN scores never win.
    pub fn dominant(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (label, score) in self.iter() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((label, score)),
            }
        }
        best.map(|(label, _)| label)
    }
}

impl<L: Into<String>> FromIterator<(L, f64)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (L, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(l, s)| (l.into(), s)).collect())
    }
}

/// Best-effort attribute estimates for one detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub emotion: EmotionScores,
}

/// One face returned by the provider's detect capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Stable per-detection token; becomes a user's `face_id` on enrollment.
    pub face_token: String,
    pub attributes: FaceAttributes,
}

/// One entry of a face-collection search, confidence on a 0 to 100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub face_token: String,
    pub confidence: f64,
}

/// A registered identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub face_id: String,
    pub registered_at: DateTime<Utc>,
}

/// A user about to be persisted; the store assigns `id` and `registered_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub face_id: String,
}

/// An unrecognized-face observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub emotion: EmotionScores,
    pub dominant_emotion: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// A visitor about to be persisted; the store assigns `id` and `detected_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisitor {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub emotion: EmotionScores,
    pub dominant_emotion: Option<String>,
}

impl NewVisitor {
    /// Build a stranger record from a detected face's attributes.
    pub fn from_attributes(attributes: FaceAttributes) -> Self {
        let mut emotion = attributes.emotion;
        emotion.retain_finite();
        let dominant_emotion = emotion.dominant().map(str::to_owned);
        Self {
            name: UNKNOWN_VISITOR_NAME.to_string(),
            age: attributes.age,
            gender: attributes.gender,
            emotion,
            dominant_emotion,
        }
    }
}

/// Raw registration fields as submitted by a client.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
}

/// Validated registration fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub age: u32,
    pub gender: String,
}

impl RegistrationForm {
    /// Check that every field is present and well-typed.
    ///
    /// The error string names the offending field.
    pub fn validate(&self) -> Result<Profile, String> {
        let name = required(&self.name, "name")?;
        let gender = required(&self.gender, "gender")?;
        let age_raw = required(&self.age, "age")?;
        let age = match age_raw.parse::<u32>() {
            Ok(age) if age > 0 => age,
            _ => return Err(format!("age must be a positive integer, got {age_raw:?}")),
        };
        Ok(Profile { name, age, gender })
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(format!("{field} is required")),
    }
}

/// Outcome of resolving an image against registered users.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    UserMatched {
        user: User,
        current_emotion: Option<String>,
    },
    VisitorRecorded(Visitor),
}
