//! IR error types.

use shaderweave_core::PassError;
use thiserror::Error;

/// Errors raised while building, verifying or decoding IR.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    /// A binary stream could not be decoded.
    #[error("malformed binary at word {offset}: {detail}")]
    Malformed { offset: usize, detail: String },

    /// A structural rule of the IR was violated.
    #[error("in function '{function}' {location}: {message}")]
    Verify {
        function: String,
        location: String,
        message: String,
    },

    /// The builder was asked to do something that breaks block structure.
    #[error("builder: {0}")]
    Builder(String),

    /// A module could not be encoded.
    #[error("encode: {0}")]
    Encode(String),
}

impl IrError {
    pub(crate) fn malformed(offset: usize, detail: impl Into<String>) -> Self {
        IrError::Malformed {
            offset,
            detail: detail.into(),
        }
    }

    pub(crate) fn verify(
        function: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        IrError::Verify {
            function: function.into(),
            location: location.into(),
            message: message.into(),
        }
    }

    /// Convert into a pipeline failure attributed to `pass`.
    pub fn into_pass_error(self, pass: &str) -> PassError {
        match self {
            IrError::Malformed { offset, detail } => PassError::Malformed {
                pass: pass.to_string(),
                offset,
                detail,
            },
            other => PassError::failed(pass, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_keeps_offset() {
        let error = IrError::malformed(7, "bad opcode").into_pass_error("validate");
        assert!(matches!(
            error,
            PassError::Malformed { ref pass, offset: 7, .. } if pass == "validate"
        ));
    }

    #[test]
    fn verify_becomes_failure() {
        let error = IrError::verify("main", "bb0", "missing terminator").into_pass_error("validate");
        assert_eq!(error.pass_name(), Some("validate"));
        assert!(error.to_string().contains("missing terminator"));
    }
}
