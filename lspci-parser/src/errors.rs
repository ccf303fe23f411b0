use thiserror::Error;

/// Error produced while parsing a report or building a range forest.
///
/// Every variant is fatal: a report either parses completely or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The report does not have the expected line structure.
    #[error("line {line}: {reason}: {text:?}")]
    Format {
        line: u32,
        reason: &'static str,
        text: String,
    },

    /// A field was structurally sound but its value did not match its grammar.
    #[error("line {line}: {source}")]
    Field {
        line: u32,
        #[source]
        source: FieldError,
    },

    /// A range starts inside another one but extends past its end.
    #[error(
        "range {start:#x}-{end:#x} partially overlaps range {outer_start:#x}-{outer_end:#x}"
    )]
    RangeViolation {
        start: u64,
        end: u64,
        outer_start: u64,
        outer_end: u64,
    },

    /// A range whose end lies before its start.
    #[error("range {start:#x}-{end:#x} ends before it starts")]
    InvertedRange { start: u64, end: u64 },
}

impl Error {
    pub(crate) fn format(line: u32, reason: &'static str, text: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason,
            text: text.into(),
        }
    }
}

/// Error produced by a single field grammar.
///
/// Field parsers do not know where their input came from, so these errors carry no
/// position. The device assembler wraps them into [`Error::Field`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("invalid {field} value {text:?}")]
    Format { field: String, text: String },

    #[error("invalid region {text:?}")]
    InvalidRegion { text: String },

    #[error("flag {flag:?} repeated in {field}")]
    DuplicateFlag { field: String, flag: String },
}

impl FieldError {
    pub(crate) fn format(field: &str, text: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            text: text.to_string(),
        }
    }

    pub(crate) fn at(self, line: u32) -> Error {
        Error::Field { line, source: self }
    }
}
