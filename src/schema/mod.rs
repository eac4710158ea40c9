// ABOUTME: Schema phase of a migration: reading the source catalog and replaying DDL
// ABOUTME: Exports the schema reader, DDL normalization, view ordering, and schema applier

pub mod applier;
pub mod normalize;
pub mod ordering;
pub mod reader;

pub use applier::{
    apply_schema, apply_statements, ApplyReport, SchemaApplyReport, StatementOutcome,
    StatementStatus,
};
pub use normalize::normalize_create_statement;
pub use reader::{read_schema, ReadOptions, SchemaSnapshot, SkippedRelation, StatementErrorPolicy};
