use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{AuthorisationId, AuthorisationType, ChecksumType, ConsentId, ConsentStatus, ScaApproach, ScaStatus},
    spi::{SpiError, SpiErrorKind},
    traits::ConsentDatabaseError,
};

/// Coarse error classes. The HTTP layer maps these onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Format,
    Unauthorized,
    Timeout,
    ServiceUnavailable,
    IllegalTransition,
    ChecksumRejected,
    AccessExceeded,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageErrorCode {
    ConsentUnknown,
    PaymentUnknown,
    ResourceUnknown,
    StatusInvalid,
    ServiceInvalid,
    FormatError,
    PsuCredentialsInvalid,
    ScaInvalid,
    ScaMethodUnknown,
    Unauthorized,
    ConsentInvalid,
    ConsentExpired,
    AccessExceeded,
    ChecksumVerificationFailed,
    RequestTimeout,
    ServiceUnavailable,
    InternalServerError,
}

impl MessageErrorCode {
    pub fn category(&self) -> ErrorCategory {
        use MessageErrorCode::*;
        match self {
            ConsentUnknown | PaymentUnknown | ResourceUnknown => ErrorCategory::NotFound,
            StatusInvalid | ServiceInvalid => ErrorCategory::IllegalTransition,
            FormatError | ScaMethodUnknown => ErrorCategory::Format,
            PsuCredentialsInvalid | ScaInvalid | Unauthorized | ConsentInvalid | ConsentExpired => {
                ErrorCategory::Unauthorized
            },
            AccessExceeded => ErrorCategory::AccessExceeded,
            ChecksumVerificationFailed => ErrorCategory::ChecksumRejected,
            RequestTimeout => ErrorCategory::Timeout,
            ServiceUnavailable => ErrorCategory::ServiceUnavailable,
            InternalServerError => ErrorCategory::Internal,
        }
    }
}

/// A business failure carried inside a processor response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHolder {
    pub code: MessageErrorCode,
    pub message: String,
}

impl ErrorHolder {
    pub fn new<S: Display>(code: MessageErrorCode, message: S) -> Self {
        Self { code, message: message.to_string() }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn already_finalised(status: ScaStatus) -> Self {
        Self::new(MessageErrorCode::StatusInvalid, format!("Authorisation is already finalised ({status})"))
    }
}

impl Display for ErrorHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Connector detail stays in the logs. The caller only sees the category and a fixed message.
impl From<&SpiError> for ErrorHolder {
    fn from(e: &SpiError) -> Self {
        let (code, message) = match e.kind {
            SpiErrorKind::Format => (MessageErrorCode::FormatError, "The bank rejected the request format"),
            SpiErrorKind::Unauthorized => (MessageErrorCode::PsuCredentialsInvalid, "The PSU could not be authorised"),
            SpiErrorKind::ScaInvalid => (MessageErrorCode::ScaInvalid, "The SCA authentication data is invalid"),
            SpiErrorKind::Timeout => (MessageErrorCode::RequestTimeout, "The bank did not respond in time"),
            SpiErrorKind::ServiceUnavailable => {
                (MessageErrorCode::ServiceUnavailable, "The bank service is currently unavailable")
            },
            SpiErrorKind::Internal => (MessageErrorCode::InternalServerError, "The bank reported an internal error"),
        };
        Self::new(code, message)
    }
}

impl From<SpiError> for ErrorHolder {
    fn from(e: SpiError) -> Self {
        Self::from(&e)
    }
}

#[derive(Debug, Clone, Error)]
pub enum StrategyResolutionError {
    #[error("No SCA approach strategy is registered for {0}")]
    NotRegistered(ScaApproach),
}

/// Faults that abort an authorisation request. Business failures are reported inside the response instead.
#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] ConsentDatabaseError),
    #[error("Configuration fault. {0}")]
    StrategyNotRegistered(#[from] StrategyResolutionError),
    #[error("Authorisation {0} does not exist")]
    AuthorisationNotFound(AuthorisationId),
    #[error("Authorisation {0} was modified by a concurrent request")]
    ConcurrentModification(AuthorisationId),
    #[error("Illegal SCA status transition from {from} to {to}")]
    IllegalTransition { from: ScaStatus, to: ScaStatus },
    #[error("The business object {0} does not exist")]
    ParentNotFound(String),
    #[error("The business object {0} is finalised and cannot be authorised")]
    ParentFinalised(String),
    #[error("This flow handles {expected} authorisations, not {requested}")]
    AuthorisationTypeMismatch { expected: AuthorisationType, requested: AuthorisationType },
    #[error("{0}")]
    ExpirationError(#[from] ExpirationError),
}

#[derive(Debug, Clone, Error)]
pub enum ChecksumError {
    #[error("Checksum verification failed for {0}")]
    VerificationFailed(ChecksumType),
    #[error("Could not calculate checksum. {0}")]
    SerializationError(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] ConsentDatabaseError),
}

impl From<serde_json::Error> for ChecksumError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ExpirationError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] ConsentDatabaseError),
    #[error("Consent {0} does not exist")]
    ConsentNotFound(ConsentId),
    #[error("Consent {id} has already ended with status {status}")]
    AlreadyFinalised { id: ConsentId, status: ConsentStatus },
}

#[derive(Debug, Clone, Error)]
pub enum ConsentApiError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] ConsentDatabaseError),
    #[error("Consent {0} does not exist")]
    ConsentNotFound(ConsentId),
    #[error("Consent {0} belongs to a different TPP")]
    TppMismatch(ConsentId),
    #[error("Consent {id} cannot be used in status {status}")]
    InvalidStatus { id: ConsentId, status: ConsentStatus },
    #[error("Consent {id} does not grant access to {resource_id}")]
    AccessNotGranted { id: ConsentId, resource_id: String },
    #[error("Consent {id} has been used {limit} times today for {resource_id}")]
    AccessExceeded { id: ConsentId, resource_id: String, limit: i64 },
    #[error("{0}")]
    ChecksumError(#[from] ChecksumError),
    #[error("{0}")]
    ExpirationError(#[from] ExpirationError),
}

impl ConsentApiError {
    pub fn error_code(&self) -> MessageErrorCode {
        match self {
            Self::DatabaseError(_) => MessageErrorCode::InternalServerError,
            Self::ConsentNotFound(_) | Self::TppMismatch(_) => MessageErrorCode::ConsentUnknown,
            Self::InvalidStatus { status: ConsentStatus::Expired, .. } => MessageErrorCode::ConsentExpired,
            Self::InvalidStatus { .. } | Self::AccessNotGranted { .. } => MessageErrorCode::ConsentInvalid,
            Self::AccessExceeded { .. } => MessageErrorCode::AccessExceeded,
            Self::ChecksumError(ChecksumError::VerificationFailed(_)) => MessageErrorCode::ChecksumVerificationFailed,
            Self::ChecksumError(_) | Self::ExpirationError(ExpirationError::DatabaseError(_)) => {
                MessageErrorCode::InternalServerError
            },
            Self::ExpirationError(ExpirationError::ConsentNotFound(_)) => MessageErrorCode::ConsentUnknown,
            Self::ExpirationError(ExpirationError::AlreadyFinalised { .. }) => MessageErrorCode::StatusInvalid,
        }
    }
}
