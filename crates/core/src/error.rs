use std::fmt;

/// Errors that can occur while canonicalizing an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// A representation tag from an untyped boundary was not recognized.
    UnsupportedRepresentation { kind: String },
    /// A document field held a list with more than one element, which this
    /// pipeline does not encode. The caller is expected to surface the
    /// failure rather than guess an encoding.
    NotImplementedFieldKind { field: String },
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::UnsupportedRepresentation { kind } => {
                write!(f, "unsupported storage representation: '{}'", kind)
            }
            NormalizeError::NotImplementedFieldKind { field } => {
                write!(
                    f,
                    "multi-element list field '{}' is not supported on document entities",
                    field
                )
            }
        }
    }
}

impl std::error::Error for NormalizeError {}
