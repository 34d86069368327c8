//! Step Definition Module
//!
//! Provides the declarative description of a step and its validation.
//!
//! # Structure
//!
//! - [`metadata`]: descriptive metadata attached to definitions
//! - [`definition`]: StepDefinition and its policy configuration
//! - [`validation`]: schema collaborators and structural validation

pub mod definition;
pub mod metadata;
pub mod validation;

pub use definition::{
    CleanupFn, ConditionFn, ExecutionConfig, RateLimit, StepDefinition, StepFn, StepOutput,
    ValidationConfig,
};
pub use metadata::StepMetadata;
pub use validation::{validate_definition, CustomValidator, Schema, SchemaReport};
