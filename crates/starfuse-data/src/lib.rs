//! Schema-driven star records, cross-matching and provenance-aware merging

pub mod error;
pub mod origin;
pub mod schema;
pub mod property;
pub mod stars;
pub mod crossmatch;
pub mod merge;
pub mod list;
pub mod config;

pub use error::{StarError, StarResult};
pub use origin::{Confidence, Origin};
pub use schema::{fields, FieldInfo, PrintFormat, PropertyDescriptor, PropertySchema, PropertyType, SchemaBuilder};
pub use property::{CellValue, PropertyCell};
pub use stars::{Normalization, StarRecord};
pub use crossmatch::{Criteria, CriteriaBuilder, CriterionInfo, CriterionKind, MatchDiagnostics, MatchResult};
pub use merge::{update, update_counted, MergeRules, OverwritePolicy, PropertyMask, UpdateCounters};
pub use list::{BestMatch, MergeStats, StarList};
pub use config::{load_json, MatchConfig, MergeSettings};
