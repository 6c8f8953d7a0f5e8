//! Typed field extraction from nested JSON documents.
//!
//! A path such as `media.files[0].url` is parsed once into a sequence of
//! [`PathStep`]s and then evaluated against any number of documents.
//! Evaluation never panics: a missing key, a non-array under an index, an
//! out-of-range index, or a JSON `null` anywhere along the way all resolve
//! to `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub key: String,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    steps: Vec<PathStep>,
}

impl FieldPath {
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for step in &self.steps {
            current = current.as_object()?.get(&step.key)?;
            if let Some(i) = step.index {
                current = current.as_array()?.get(i)?;
            }
            if current.is_null() {
                return None;
            }
        }
        Some(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePathError(String);

impl fmt::Display for ParsePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid field path: {}", self.0)
    }
}

impl std::error::Error for ParsePathError {}

impl FromStr for FieldPath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParsePathError("empty path".into()));
        }
        let steps = s
            .split('.')
            .map(|segment| parse_step(segment).ok_or_else(|| ParsePathError(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }
}

fn parse_step(segment: &str) -> Option<PathStep> {
    let (key, index) = match segment.split_once('[') {
        Some((key, rest)) => {
            let digits = rest.strip_suffix(']')?;
            (key, Some(digits.parse::<usize>().ok()?))
        }
        None => (segment, None),
    };
    if key.is_empty() || key.contains(']') {
        return None;
    }
    Some(PathStep {
        key: key.to_string(),
        index,
    })
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&step.key)?;
            if let Some(idx) = step.index {
                write!(f, "[{}]", idx)?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
