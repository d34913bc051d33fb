use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One multiple-choice question as generated by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionItem {
    /// Question text (may contain markdown and `$...$` LaTeX).
    pub question: String,
    /// Option label → whether it is the correct answer, in model order.
    pub options: OptionSet,
}

/// Ordered mapping from option label to correctness.
///
/// Serializes as a JSON object whose key order is the display order.
/// Inserting an existing label replaces its flag in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet(Vec<(String, bool)>);

impl QuestionItem {
    /// Create a question from its text and options
    pub fn new(question: impl Into<String>, options: OptionSet) -> Self {
        Self {
            question: question.into(),
            options,
        }
    }

    /// Number of options flagged correct.
    pub fn correct_count(&self) -> usize {
        self.options.correct_count()
    }
}

impl OptionSet {
    /// Create an empty option set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace an option, keeping the original position on replace.
    pub fn insert(&mut self, label: impl Into<String>, is_correct: bool) {
        let label = label.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = is_correct,
            None => self.0.push((label, is_correct)),
        }
    }

    /// Correctness of `label`, or `None` if the label is not an option.
    pub fn is_correct(&self, label: &str) -> Option<bool> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, c)| *c)
    }

    /// Option labels in display order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    /// Iterate `(label, is_correct)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(l, c)| (l.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of options flagged correct.
    pub fn correct_count(&self) -> usize {
        self.0.iter().filter(|(_, c)| *c).count()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for (label, is_correct) in iter {
            set.insert(label, is_correct);
        }
        set
    }
}

impl Serialize for OptionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, is_correct) in &self.0 {
            map.serialize_entry(label, is_correct)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OptionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionSetVisitor;

        impl<'de> Visitor<'de> for OptionSetVisitor {
            type Value = OptionSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from option label to boolean")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OptionSet, A::Error> {
                let mut set = OptionSet::new();
                while let Some((label, is_correct)) = access.next_entry::<String, bool>()? {
                    set.insert(label, is_correct);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(OptionSetVisitor)
    }
}
