// SPDX-License-Identifier: MIT

//! Common error types.
//!
//! `SandboxError` is what a provider reports for a single OS-level operation.
//! `LaunchError` is what the gatekeeper reports for a whole launch attempt; each
//! variant corresponds to one of the stable interface codes.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Broad category of a failure, independent of which step raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller's arguments were malformed.  Nothing was attempted.
    InvalidInput,
    /// The scanning or sandboxing service is absent or could not start.
    ResourceUnavailable,
    /// The access-control mutation failed or could not be verified.
    PermissionDenied,
    /// An underlying create, derive or launch call failed.
    OsOperationFailed,
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} failed ({code:#010x}): {message}")]
    Os {
        operation: &'static str,
        code: i32,
        message: String,
    },

    #[error("`{0}` already exists")]
    AlreadyExists(String),

    #[error("`{0}` was not found")]
    NotFound(String),

    #[error("access grant on {} could not be verified: {reason}", .path.display())]
    Unverified { path: PathBuf, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("sandbox setup failed: {0}")]
    Setup(String),

    /// The service context was closed before the call could use it.
    #[error("{0} is not open")]
    Closed(&'static str),

    #[error("not supported on {platform}: {reason}")]
    NotSupported {
        platform: &'static str,
        reason: String,
    },
}

impl SandboxError {
    pub fn os(operation: &'static str, code: i32, message: impl Into<String>) -> Self {
        SandboxError::Os {
            operation,
            code,
            message: message.into(),
        }
    }

    pub fn setup(reason: impl Into<String>) -> Self {
        SandboxError::Setup(reason.into())
    }

    pub fn not_supported(platform: &'static str, reason: impl Into<String>) -> Self {
        SandboxError::NotSupported {
            platform,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                std::io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
                _ => ErrorKind::OsOperationFailed,
            },
            Self::Os { .. } | Self::AlreadyExists(_) | Self::NotFound(_) | Self::Setup(_) => {
                ErrorKind::OsOperationFailed
            }
            Self::Unverified { .. } => ErrorKind::PermissionDenied,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotSupported { .. } | Self::Closed(_) => ErrorKind::ResourceUnavailable,
        }
    }

    /// The underlying OS status code, when one was reported.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Os { code, .. } => Some(*code),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

impl From<SandboxError> for std::io::Error {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Io(e) => e,
            SandboxError::NotFound(_) => std::io::Error::new(std::io::ErrorKind::NotFound, e),
            SandboxError::AlreadyExists(_) => {
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, e)
            }
            SandboxError::Unverified { .. } => {
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, e)
            }
            SandboxError::InvalidInput(_) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
            }
            SandboxError::NotSupported { .. } => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, e)
            }
            SandboxError::Closed(_) => std::io::Error::new(std::io::ErrorKind::NotConnected, e),
            SandboxError::Os { .. } | SandboxError::Setup(_) => std::io::Error::other(e),
        }
    }
}

/// Interface code for a failed profile create/derive.
pub const PROFILE_CREATION_FAILED: i32 = -1;
/// Interface code for a failed or unverifiable workspace grant.
pub const ACL_FAILURE: i32 = -2;
/// Interface code for a failed process creation or attribute build.
pub const PROCESS_CREATION_FAILED: i32 = -3;
/// Interface code for rejected caller arguments.
pub const INVALID_ARGUMENTS: i32 = -4;
/// Interface code for a required capability that could not be resolved.
pub const CAPABILITY_ERROR: i32 = -5;
/// Interface code for a host that has no sandbox support.
pub const UNSUPPORTED_PLATFORM: i32 = -6;

/// Failure of one sandboxed launch attempt.
///
/// No process exists when one of these is returned.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid launch arguments: {0}")]
    InvalidArguments(String),

    #[error("failed to create the sandbox profile")]
    ProfileCreationFailed(#[source] SandboxError),

    #[error("failed to grant workspace access to the sandbox identity")]
    AclFailure(#[source] SandboxError),

    #[error("failed to resolve a required sandbox capability")]
    CapabilityError(#[source] SandboxError),

    #[error("failed to create the sandboxed process")]
    ProcessCreationFailed(#[source] SandboxError),

    #[error("sandboxed launch is unsupported on this platform ({0})")]
    Unsupported(&'static str),
}

impl LaunchError {
    /// The stable negative interface code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArguments(_) => INVALID_ARGUMENTS,
            Self::ProfileCreationFailed(_) => PROFILE_CREATION_FAILED,
            Self::AclFailure(_) => ACL_FAILURE,
            Self::CapabilityError(_) => CAPABILITY_ERROR,
            Self::ProcessCreationFailed(_) => PROCESS_CREATION_FAILED,
            Self::Unsupported(_) => UNSUPPORTED_PLATFORM,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArguments(_) => ErrorKind::InvalidInput,
            Self::Unsupported(_) => ErrorKind::ResourceUnavailable,
            Self::AclFailure(_) => ErrorKind::PermissionDenied,
            Self::ProfileCreationFailed(e)
            | Self::CapabilityError(e)
            | Self::ProcessCreationFailed(e) => match e.kind() {
                ErrorKind::ResourceUnavailable => ErrorKind::ResourceUnavailable,
                _ => ErrorKind::OsOperationFailed,
            },
        }
    }

    /// The provider error that caused this failure, if any.
    pub fn cause(&self) -> Option<&SandboxError> {
        match self {
            Self::ProfileCreationFailed(e)
            | Self::AclFailure(e)
            | Self::CapabilityError(e)
            | Self::ProcessCreationFailed(e) => Some(e),
            Self::InvalidArguments(_) | Self::Unsupported(_) => None,
        }
    }

    pub fn os_code(&self) -> Option<i32> {
        self.cause().and_then(SandboxError::os_code)
    }

    /// Describe an interface code, for hosts that only kept the number.
    pub fn describe_code(code: i32) -> &'static str {
        match code {
            PROFILE_CREATION_FAILED => "failed to create the sandbox profile",
            ACL_FAILURE => "failed to grant workspace access to the sandbox identity",
            PROCESS_CREATION_FAILED => "failed to create the sandboxed process",
            INVALID_ARGUMENTS => "invalid launch arguments",
            CAPABILITY_ERROR => "failed to resolve a required sandbox capability",
            UNSUPPORTED_PLATFORM => "sandboxed launch is unsupported on this platform",
            c if c > 0 => "launched",
            _ => "unknown launch result",
        }
    }
}
