use thiserror::Error;

/// Errors raised by the parsing machinery itself. Grammar-level problems are
/// reported through the log sink instead, so parsing can continue.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid token pattern: {0}")]
    BadTokenPattern(String),
    #[error("unrecognized character `{0}`")]
    UnknownToken(String),
    #[error("parse budget exceeded")]
    BudgetExceeded,
}
