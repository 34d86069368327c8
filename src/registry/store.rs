//! Step Registry
//!
//! A catalogue of step definitions keyed by id. Entries carry lifecycle
//! bookkeeping (registration time, usage counts, soft-delete flag) on top
//! of the definition itself. Unregistering never physically deletes an
//! entry; the id stays reserved and the history stays queryable.
//!
//! Registry maps are single-writer per instance; callers that share a
//! registry across threads must wrap it in their own lock (see
//! `default_registry` for the crate-provided convenience).

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::execution::engine::StepExecutor;
use crate::step::definition::StepDefinition;
use crate::step::validation::validate_definition;

/// One catalogued step with its lifecycle bookkeeping.
#[derive(Clone)]
pub struct StepRegistryEntry {
    /// The registered definition, shared with executors built from it
    pub definition: Arc<StepDefinition>,
    /// False once the step has been unregistered
    pub active: bool,
    /// When the step was registered
    pub registered_at: DateTime<Utc>,
    /// Who registered the step, if recorded
    pub registered_by: Option<String>,
    /// How many executors have been created for this step
    pub usage_count: u64,
    /// When an executor was last created for this step
    pub last_used_at: Option<DateTime<Utc>>,
    /// Whether the definition passed structural validation
    pub validated: bool,
    /// Issues found by the most recent validation pass
    pub validation_issues: Vec<String>,
}

/// Search criteria for [`StepRegistry::search`].
///
/// All set criteria must match. The default filter matches every active
/// entry.
#[derive(Debug, Clone)]
pub struct StepFilter {
    /// Exact category match
    pub category: Option<String>,
    /// Entry must carry every listed tag
    pub tags: Vec<String>,
    /// Regex applied to the metadata name
    pub name_pattern: Option<String>,
    /// Exact version match
    pub version: Option<String>,
    /// Exact author match
    pub author: Option<String>,
    /// When true (the default), inactive entries never match
    pub active_only: bool,
    /// When true, entries with validation issues never match
    pub validated_only: bool,
    /// When false, deprecated entries never match
    pub include_deprecated: bool,
}

impl Default for StepFilter {
    fn default() -> Self {
        Self {
            category: None,
            tags: Vec::new(),
            name_pattern: None,
            version: None,
            author: None,
            active_only: true,
            validated_only: false,
            include_deprecated: true,
        }
    }
}

impl StepFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires an exact category match.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Requires the entry to carry the given tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Requires the metadata name to match the given regex.
    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    /// Requires an exact version match.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Requires an exact author match.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Includes inactive entries in the results.
    pub fn include_inactive(mut self) -> Self {
        self.active_only = false;
        self
    }

    /// Restricts results to entries without validation issues.
    pub fn validated_only(mut self) -> Self {
        self.validated_only = true;
        self
    }

    /// Excludes deprecated entries from the results.
    pub fn exclude_deprecated(mut self) -> Self {
        self.include_deprecated = false;
        self
    }

    fn matches(&self, entry: &StepRegistryEntry, name_regex: Option<&Regex>) -> bool {
        let meta = &entry.definition.metadata;

        if self.active_only && !entry.active {
            return false;
        }
        if self.validated_only && !entry.validated {
            return false;
        }
        if !self.include_deprecated && meta.deprecated {
            return false;
        }
        if let Some(category) = &self.category {
            if meta.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if !self.tags.iter().all(|tag| meta.has_tag(tag)) {
            return false;
        }
        if let Some(version) = &self.version {
            if &meta.version != version {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if meta.author.as_deref() != Some(author.as_str()) {
                return false;
            }
        }
        if let Some(regex) = name_regex {
            if !regex.is_match(&meta.name) {
                return false;
            }
        }

        true
    }
}

/// An in-memory snapshot of a registry's entries.
///
/// Entries clone cheaply: the definitions (and their closures) are shared
/// through `Arc`. Used by [`StepRegistry::import`] to move catalogues
/// between registry instances with usage metadata intact.
#[derive(Clone)]
pub struct RegistryExport {
    pub entries: Vec<StepRegistryEntry>,
    pub exported_at: DateTime<Utc>,
}

/// Serializable per-step manifest line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub active: bool,
    pub deprecated: bool,
    pub usage_count: u64,
    pub registered_at: DateTime<Utc>,
}

/// Serializable description of a registry's contents.
///
/// The manifest carries no executable code, only the catalogue shape, so
/// it can be persisted and diffed. Saved as YAML for `.yaml`/`.yml` paths
/// and JSON otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Renders the manifest as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, Box<dyn Error>> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Renders the manifest as YAML.
    pub fn to_yaml(&self) -> Result<String, Box<dyn Error>> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Saves the manifest to a file, choosing the format by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        let content = if is_yaml_path(path) {
            self.to_yaml()?
        } else {
            self.to_json()?
        };
        fs::write(path, content)?;
        info!("Saved registry manifest to {}", path.display());
        Ok(())
    }

    /// Loads a manifest from a file, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let manifest = if is_yaml_path(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        info!("Loaded registry manifest from {}", path.display());
        Ok(manifest)
    }
}

fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// The step catalogue.
///
/// # Example
///
/// ```
/// use stepwise::registry::StepRegistry;
/// use stepwise::step::{StepDefinition, StepMetadata};
/// use serde_json::json;
///
/// let mut registry = StepRegistry::new();
/// registry
///     .register(StepDefinition::new(
///         "greet",
///         StepMetadata::new("greet", "1.0.0"),
///         |_| Ok(json!("hello")),
///     ))
///     .unwrap();
///
/// assert!(registry.get("greet").is_some());
/// ```
#[derive(Default)]
pub struct StepRegistry {
    entries: HashMap<String, StepRegistryEntry>,
}

impl StepRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step definition.
    ///
    /// Fails with `DUPLICATE_STEP` if any entry, active or not, already
    /// holds the id, and with `INVALID_STEP_DEFINITION` if the definition
    /// fails structural validation.
    pub fn register(&mut self, definition: StepDefinition) -> Result<(), WorkflowError> {
        self.register_as(definition, None)
    }

    /// Registers a step definition, recording who registered it.
    pub fn register_as(
        &mut self,
        definition: StepDefinition,
        registered_by: Option<String>,
    ) -> Result<(), WorkflowError> {
        if self.entries.contains_key(&definition.id) {
            return Err(WorkflowError::DuplicateStep {
                step_id: definition.id.clone(),
            });
        }

        validate_definition(&definition)?;

        info!("registering step '{}'", definition.id);
        let id = definition.id.clone();
        self.entries.insert(
            id,
            StepRegistryEntry {
                definition: Arc::new(definition),
                active: true,
                registered_at: Utc::now(),
                registered_by,
                usage_count: 0,
                last_used_at: None,
                validated: true,
                validation_issues: Vec::new(),
            },
        );
        Ok(())
    }

    /// Soft-deletes a step: the entry stays but no longer resolves.
    ///
    /// Fails with `STEP_NOT_FOUND` for unknown or already-inactive ids.
    pub fn unregister(&mut self, step_id: &str) -> Result<(), WorkflowError> {
        match self.entries.get_mut(step_id) {
            Some(entry) if entry.active => {
                info!("unregistering step '{}'", step_id);
                entry.active = false;
                Ok(())
            }
            _ => Err(WorkflowError::StepNotFound {
                step_id: step_id.to_string(),
            }),
        }
    }

    /// Returns an active step's definition.
    pub fn get(&self, step_id: &str) -> Option<Arc<StepDefinition>> {
        self.entries
            .get(step_id)
            .filter(|entry| entry.active)
            .map(|entry| Arc::clone(&entry.definition))
    }

    /// Returns the entry for a step, active or not.
    pub fn entry(&self, step_id: &str) -> Option<&StepRegistryEntry> {
        self.entries.get(step_id)
    }

    /// Lists entries, ordered by id.
    pub fn list(&self, include_inactive: bool) -> Vec<&StepRegistryEntry> {
        let mut entries: Vec<_> = self
            .entries
            .values()
            .filter(|entry| include_inactive || entry.active)
            .collect();
        entries.sort_by(|a, b| a.definition.id.cmp(&b.definition.id));
        entries
    }

    /// Searches entries against a filter, ordered by id.
    ///
    /// An unparseable name pattern is logged and ignored rather than
    /// failing the search.
    pub fn search(&self, filter: &StepFilter) -> Vec<&StepRegistryEntry> {
        let name_regex = filter.name_pattern.as_ref().and_then(|pattern| {
            match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    warn!("ignoring invalid name pattern '{}': {}", pattern, error);
                    None
                }
            }
        });

        let mut matches: Vec<_> = self
            .entries
            .values()
            .filter(|entry| filter.matches(entry, name_regex.as_ref()))
            .collect();
        matches.sort_by(|a, b| a.definition.id.cmp(&b.definition.id));
        matches
    }

    /// Builds an executor for an active step, bumping its usage counters.
    pub fn create_executable_step(
        &mut self,
        step_id: &str,
    ) -> Result<StepExecutor, WorkflowError> {
        let entry = self
            .entries
            .get_mut(step_id)
            .filter(|entry| entry.active)
            .ok_or_else(|| WorkflowError::StepNotFound {
                step_id: step_id.to_string(),
            })?;

        entry.usage_count += 1;
        entry.last_used_at = Some(Utc::now());
        debug!(
            "creating executor for step '{}' (usage {})",
            step_id, entry.usage_count
        );

        StepExecutor::from_arc(Arc::clone(&entry.definition))
    }

    /// Re-runs structural validation over every entry.
    ///
    /// Updates each entry's `validated` flag and issue list and returns
    /// the ids of entries that now carry issues.
    pub fn revalidate(&mut self) -> Vec<String> {
        let mut failing = Vec::new();
        for entry in self.entries.values_mut() {
            match validate_definition(&entry.definition) {
                Ok(()) => {
                    entry.validated = true;
                    entry.validation_issues.clear();
                }
                Err(WorkflowError::InvalidDefinition { issues, .. }) => {
                    entry.validated = false;
                    entry.validation_issues = issues;
                    failing.push(entry.definition.id.clone());
                }
                Err(_) => {}
            }
        }
        failing.sort();
        failing
    }

    /// Snapshots every entry for transfer to another registry.
    pub fn export(&self) -> RegistryExport {
        RegistryExport {
            entries: self.entries.values().cloned().collect(),
            exported_at: Utc::now(),
        }
    }

    /// Imports entries from an export, preserving their usage metadata.
    ///
    /// Without `overwrite`, the first id collision fails with
    /// `DUPLICATE_STEP` and nothing is imported. Returns the number of
    /// entries imported.
    pub fn import(
        &mut self,
        export: RegistryExport,
        overwrite: bool,
    ) -> Result<usize, WorkflowError> {
        if !overwrite {
            if let Some(entry) = export
                .entries
                .iter()
                .find(|entry| self.entries.contains_key(&entry.definition.id))
            {
                return Err(WorkflowError::DuplicateStep {
                    step_id: entry.definition.id.clone(),
                });
            }
        }

        let count = export.entries.len();
        for entry in export.entries {
            self.entries.insert(entry.definition.id.clone(), entry);
        }
        info!("imported {} registry entries", count);
        Ok(count)
    }

    /// Builds a serializable manifest of the catalogue.
    pub fn manifest(&self) -> Manifest {
        let entries = self
            .list(true)
            .into_iter()
            .map(|entry| {
                let meta = &entry.definition.metadata;
                ManifestEntry {
                    id: entry.definition.id.clone(),
                    name: meta.name.clone(),
                    version: meta.version.clone(),
                    category: meta.category.clone(),
                    tags: meta.tags.clone(),
                    dependencies: entry.definition.dependencies.clone(),
                    active: entry.active,
                    deprecated: meta.deprecated,
                    usage_count: entry.usage_count,
                    registered_at: entry.registered_at,
                }
            })
            .collect();

        Manifest {
            generated_at: Utc::now(),
            entries,
        }
    }

    /// Returns the number of active entries.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|entry| entry.active).count()
    }

    /// Returns true if the registry has no active entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
