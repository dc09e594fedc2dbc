//! Core data model
//!
//! Defines the types flowing through a comparison run: dataset descriptors,
//! typed scalar values, canonical records, aligned entries, difference
//! records, and job metadata.

pub mod aligned;
pub mod dataset;
pub mod difference;
pub mod job;
pub mod record;
pub mod request;
pub mod value;

pub use aligned::AlignedEntry;
pub use dataset::{DatasetDescriptor, DerivedColumn};
pub use difference::{DifferenceRecord, DifferenceType};
pub use job::{Job, JobErrorCode, JobFailure, JobProgress, JobStatus};
pub use record::{CanonicalRecord, ComparisonKey, KEY_SEPARATOR};
pub use request::{CompareConfig, ComparisonRequest, DuplicateKeyPolicy};
pub use value::{DeclaredType, NULL_TOKEN, ScalarValue};
