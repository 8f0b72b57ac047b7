//! formstate-core
//!
//! Core engine for schema-driven data-entry forms:
//! - Structured field paths and relative path resolution
//! - Conditional visibility of wrapper regions
//! - Calculated fields with overwrite protection and bounded propagation
//! - Repeatable groups (lists and tables) with contiguous reindexing
//! - Validation registry and submission assembly
//!
//! The crate performs no I/O. Schemas, initial data and configuration are
//! passed in by the caller; everything runs synchronously on the caller's
//! thread through [`controller::FormController`].

pub mod array;
pub mod calc;
pub mod condition;
pub mod config;
pub mod controller;
pub mod errors;
pub mod path;
pub mod schema;
pub mod submit;
pub mod tree;
pub mod validation;

pub use crate::errors::{FormError, FormResult};

/// Default values shared with the CLI.
pub mod defaults {
    /// Root of every field identifier.
    pub const ROOT_PREFIX: &str = "object";
    /// Decimal delimiter for calculation inputs and results.
    pub const DECIMAL_DELIMITER: char = '.';
}

/// Convenience re-exports.
pub mod prelude {
    pub use crate::array::{ArrayOp, ArrayOutcome, RegistryDiff};
    pub use crate::calc::{CalcOutcome, CalculationEngine, Suggestion};
    pub use crate::condition::{ConditionEvaluator, WrapperPhase};
    pub use crate::config::{validate_config, CyclePolicy, EngineConfig};
    pub use crate::controller::{
        CascadeReport, Diagnostic, DiagnosticLevel, FormController, FormEvent, FormSnapshot, FormState,
    };
    pub use crate::path::{resolve, FieldIndex, FieldPath, RelativePath, Segment};
    pub use crate::schema::{FormSchema, PropertySchema};
    pub use crate::submit::assemble_submission;
    pub use crate::tree::{render_form, FieldTree};
    pub use crate::validation::ValidationRegistry;
    pub use crate::{FormError, FormResult};
}
