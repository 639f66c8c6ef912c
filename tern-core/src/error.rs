//! Errors produced while reading, resolving and verifying IR.
//!
//! The lowering passes themselves never fail: malformed input there is an
//! invariant violation and panics. Everything that consumes untrusted input
//! reports a `CompilerError` instead.

use thiserror::Error;

use crate::ast::Span;
use crate::ir::verify::VerifyError;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Parse error at {1}: {0}")]
    ParseError(String, Span),

    #[error("Type error at {1}: {0}")]
    TypeError(String, Span),

    #[error("Undefined name '{0}' at {1}")]
    UndefinedVariable(String, Span),

    #[error("IR verification failed after {pass}:\n{}", format_verify_errors(.errors))]
    VerificationError { pass: String, errors: Vec<VerifyError> },
}

pub type Result<T> = std::result::Result<T, CompilerError>;

fn format_verify_errors(errors: &[VerifyError]) -> String {
    errors.iter().map(|e| format!("  {}", e)).collect::<Vec<_>>().join("\n")
}

#[macro_export]
macro_rules! err_parse_at {
    ($span:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::ParseError(format!($($arg)*), $span)
    };
}

#[macro_export]
macro_rules! bail_parse_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::err_parse_at!($span, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_type_at {
    ($span:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::TypeError(format!($($arg)*), $span)
    };
}

#[macro_export]
macro_rules! bail_type_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::err_type_at!($span, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_undef_at {
    ($span:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::UndefinedVariable(format!($($arg)*), $span)
    };
}
