//! Step Metadata
//!
//! Descriptive metadata attached to a step definition. Immutable once the
//! definition is built; the builder methods are consumed before attachment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive metadata for a step.
///
/// Tags keep their insertion order for display, but behave as a set:
/// inserting a tag twice has no effect.
///
/// # Example
///
/// ```
/// use stepwise::step::StepMetadata;
///
/// let meta = StepMetadata::new("align-reads", "1.2.0")
///     .with_description("Aligns reads against the reference")
///     .with_category("alignment")
///     .with_tag("cpu-heavy")
///     .with_author("pipeline-team");
///
/// assert!(meta.has_tag("cpu-heavy"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    /// Human-readable step name
    pub name: String,

    /// Semantic version of the step implementation
    pub version: String,

    /// Longer description of what the step does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Grouping category for registry search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Tags for filtering (set semantics, insertion order preserved)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Author identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Whether this step is deprecated
    #[serde(default)]
    pub deprecated: bool,

    /// Message shown for deprecated steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,

    /// When the metadata was created
    pub created_at: DateTime<Utc>,
}

impl StepMetadata {
    /// Creates metadata with the required name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            version: version.into().trim().to_string(),
            description: None,
            category: None,
            tags: Vec::new(),
            author: None,
            deprecated: false,
            deprecation_message: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Adds a tag, ignoring duplicates.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Adds multiple tags, ignoring duplicates.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Marks the step as deprecated with a message.
    pub fn deprecate(mut self, message: impl Into<String>) -> Self {
        self.deprecated = true;
        self.deprecation_message = Some(message.into());
        self
    }

    /// Returns true if the metadata carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_creation() {
        let meta = StepMetadata::new("align", "1.0.0");
        assert_eq!(meta.name, "align");
        assert_eq!(meta.version, "1.0.0");
        assert!(!meta.deprecated);
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn test_metadata_trims_whitespace() {
        let meta = StepMetadata::new("  align  ", " 1.0.0 ");
        assert_eq!(meta.name, "align");
        assert_eq!(meta.version, "1.0.0");
    }

    #[test]
    fn test_tag_set_semantics_preserve_order() {
        let meta = StepMetadata::new("align", "1.0.0")
            .with_tag("b")
            .with_tag("a")
            .with_tag("b");

        assert_eq!(meta.tags, vec!["b", "a"]);
        assert!(meta.has_tag("a"));
        assert!(!meta.has_tag("c"));
    }

    #[test]
    fn test_with_tags_dedup() {
        let meta = StepMetadata::new("align", "1.0.0")
            .with_tag("x")
            .with_tags(vec!["y".to_string(), "x".to_string(), "z".to_string()]);

        assert_eq!(meta.tags, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_deprecate() {
        let meta = StepMetadata::new("old", "0.1.0").deprecate("use 'new' instead");
        assert!(meta.deprecated);
        assert_eq!(meta.deprecation_message.as_deref(), Some("use 'new' instead"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let meta = StepMetadata::new("align", "1.0.0")
            .with_category("bio")
            .with_tag("slow")
            .with_author("team");

        let json = serde_json::to_string(&meta).unwrap();
        let back: StepMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
