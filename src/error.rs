//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP pipeline and
//! the identity subsystem, along with the HTTP status mapping.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::SessionCreateError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Auth { code: String, message: String },
    Policy { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Policy { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Policy { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn policy<S: Into<String>>(code: S, msg: S) -> Self { AppError::Policy { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Auth { .. } => 401,
            // A policy violation is a wiring bug inside the process, not a client fault
            AppError::Policy { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<SessionCreateError> for AppError {
    fn from(err: SessionCreateError) -> Self {
        match err {
            SessionCreateError::PolicyViolation { .. } => {
                AppError::Policy { code: "session_policy_violation".into(), message: err.to_string() }
            }
            SessionCreateError::TokenCollision => {
                AppError::Internal { code: "session_token_collision".into(), message: err.to_string() }
            }
            SessionCreateError::Entropy(_) => {
                AppError::Internal { code: "session_token_entropy".into(), message: err.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::policy("policy", "gated").http_status(), 500);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn session_create_error_mapping() {
        let e: AppError = SessionCreateError::PolicyViolation { policy: "never".into() }.into();
        assert!(matches!(e, AppError::Policy { .. }));
        assert_eq!(e.code_str(), "session_policy_violation");

        let e: AppError = SessionCreateError::TokenCollision.into();
        assert!(matches!(e, AppError::Internal { .. }));
    }
}
