//! Domain services
//!
//! Pure lead-processing logic with no I/O.

pub mod dedupe;
pub mod mapping;
pub mod merge;
pub mod validation;
pub mod write_plan;

pub use dedupe::{DedupeMode, KeyKind, KeyScope, LeadIndex, LookupKey};
pub use mapping::{FieldMapping, MappingTarget, StandardField};
pub use merge::{merge_lead, new_lead_record};
pub use validation::{FieldError, RowErrorCode, RowValidator};
pub use write_plan::{PlannedAction, WritePlan, WritePlanner};
