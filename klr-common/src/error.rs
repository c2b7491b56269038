//! Error handling for the IR layer
//! 
//! The IR assumes a well-typed input graph. Violations of the builder
//! contract surface as `IrError`; callers are expected to treat them as fatal,
//! since they point at a front-end bug rather than at a bad user program.

use crate::types::TypeDesc;
use thiserror::Error;

/// Contract violations detected while constructing or configuring IR
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    #[error("'{op}' requires {expected}, got {found}")]
    InvalidOperand {
        op: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("'{op}' requires the same types, got {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: TypeDesc,
        rhs: TypeDesc,
    },

    #[error("parameter index {index} out of range (0 ..< {count})")]
    ParamOutOfRange { index: usize, count: usize },

    #[error("unknown pass '{0}'")]
    UnknownPass(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl IrError {
    pub fn invalid_operand(op: &'static str, expected: &'static str, found: impl Into<String>) -> Self {
        IrError::InvalidOperand {
            op,
            expected,
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = IrError::invalid_operand("store", "a local/param/global var", "constant");
        assert_eq!(err.to_string(), "'store' requires a local/param/global var, got constant");

        let err = IrError::TypeMismatch {
            op: "add",
            lhs: TypeDesc::Int32,
            rhs: TypeDesc::Bool,
        };
        assert_eq!(err.to_string(), "'add' requires the same types, got int32 and bool");

        let err = IrError::ParamOutOfRange { index: 3, count: 2 };
        assert_eq!(err.to_string(), "parameter index 3 out of range (0 ..< 2)");
    }
}
