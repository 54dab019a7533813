pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod types;
pub mod validation;

pub use crate::config::{AppConfig, PipelineConfig, ValidationConfig};
pub use crate::errors::{PipelineError, ProviderError, SchemaError, StateError};
pub use crate::pipeline::{Pipeline, PipelineState, PipelineStatus, PipelineStep, StepResult};
pub use crate::providers::{Constraints, Generation, GenerationRequest, LLMProvider};
pub use crate::types::{ModelId, PipelineId};
pub use crate::validation::{ValidationEngine, ValidationIssue, ValidationResult};
