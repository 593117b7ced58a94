//! Shared `FieldKind` enum for the criteria type system.

use std::fmt;

/// Logical field types supported in criteria operations.
///
/// Describes the data type of a field for the purpose of value coercion in
/// filters (converting criteria values to `SeaORM` values) and of projection
/// column typing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    I32,
    I64,
    F64,
    Bool,
    Uuid,
    DateTimeUtc,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "String"),
            FieldKind::I32 => write!(f, "I32"),
            FieldKind::I64 => write!(f, "I64"),
            FieldKind::F64 => write!(f, "F64"),
            FieldKind::Bool => write!(f, "Bool"),
            FieldKind::Uuid => write!(f, "Uuid"),
            FieldKind::DateTimeUtc => write!(f, "DateTimeUtc"),
        }
    }
}
