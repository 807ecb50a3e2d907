//! Errors raised while compiling or evaluating signatures.

use thiserror::Error;

/// Errors surfaced by the signature engine.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The generated pattern failed to compile.
    #[error("failed to compile signature pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A builder finished without declaring any shape.
    #[error("signature for '{command}' declares no shapes")]
    NoShapes {
        /// Command the signature was built for.
        command: String,
    },

    /// A shape description named an unknown parameter kind.
    #[error("unknown parameter kind '{token}'")]
    UnknownParamKind {
        /// Offending token.
        token: String,
    },

    /// The command name differs from the signature's.
    #[error("signature for '{expected}' cannot match command '{actual}'")]
    NameMismatch {
        /// Name the signature accepts.
        expected: String,
        /// Name carried by the command.
        actual: String,
    },

    /// No declared shape accepts the parameter string.
    #[error("parameters '{parameters}' match no shape of '{command}'")]
    NoMatch {
        /// Command name.
        command: String,
        /// Rejected parameter string.
        parameters: String,
    },

    /// A captured token could not be converted to its declared type.
    #[error("cannot convert '{raw}' to {kind}: {reason}")]
    Conversion {
        /// Declared parameter kind.
        kind: String,
        /// Captured text.
        raw: String,
        /// Why conversion failed.
        reason: String,
    },

    /// The matching shape is bound to a type list rather than a handler.
    #[error("shape {shape} has no handler bound")]
    Unbound {
        /// Index of the matching shape.
        shape: usize,
    },
}

impl SignatureError {
    pub(crate) fn conversion(
        kind: impl ToString,
        raw: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Conversion {
            kind: kind.to_string(),
            raw: raw.into(),
            reason: reason.to_string(),
        }
    }
}
