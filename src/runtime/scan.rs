// SPDX-License-Identifier: MIT

//! Content scanning and verdict classification.
//!
//! The scanning engine is an OS service behind `ScanProvider`.  This module
//! owns the part that must never vary between hosts: turning a numeric result
//! code into a clean/unsafe verdict.

use std::{borrow::Cow, path::Path};

use serde::Serialize;
use tracing::{debug, warn};

use crate::runtime::error::SandboxError;

pub const RESULT_CLEAN: i32 = 0;
pub const RESULT_NOT_DETECTED: i32 = 1;
pub const RESULT_BLOCKED_BY_ADMIN_START: i32 = 0x4000;
pub const RESULT_BLOCKED_BY_ADMIN_END: i32 = 0x4fff;
pub const RESULT_DETECTED: i32 = 0x8000;

/// Reserved: the request was malformed.
pub const CODE_INVALID_ARGUMENTS: i32 = -1;
/// Reserved: the scanning service could not be initialized.
pub const CODE_SCANNER_UNAVAILABLE: i32 = -2;
/// Reserved: the scan call itself failed.
pub const CODE_SCAN_FAILED: i32 = -3;
/// Reserved: the file could not be read.
pub const CODE_FILE_READ_FAILED: i32 = -4;

/// Whether a result code means the content may run.
pub fn is_clean(code: i32) -> bool {
    code == RESULT_CLEAN || code == RESULT_NOT_DETECTED
}

/// Classification band of a result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum VerdictTier {
    Clean,
    NotDetected,
    BlockedByPolicy,
    Detected { level: i32 },
    Unknown,
    InvalidArguments,
    ScannerUnavailable,
    ScanFailed,
    FileReadFailed,
    /// No scan happened because the host has no scanning service.
    Skipped,
}

pub fn classify(code: i32) -> VerdictTier {
    match code {
        RESULT_CLEAN => VerdictTier::Clean,
        RESULT_NOT_DETECTED => VerdictTier::NotDetected,
        RESULT_BLOCKED_BY_ADMIN_START..=RESULT_BLOCKED_BY_ADMIN_END => VerdictTier::BlockedByPolicy,
        c if c >= RESULT_DETECTED => VerdictTier::Detected {
            level: c - RESULT_DETECTED,
        },
        CODE_INVALID_ARGUMENTS => VerdictTier::InvalidArguments,
        CODE_SCANNER_UNAVAILABLE => VerdictTier::ScannerUnavailable,
        CODE_SCAN_FAILED => VerdictTier::ScanFailed,
        CODE_FILE_READ_FAILED => VerdictTier::FileReadFailed,
        _ => VerdictTier::Unknown,
    }
}

/// Human description of a result code.
pub fn describe(code: i32) -> Cow<'static, str> {
    match classify(code) {
        VerdictTier::Clean => "Content is clean".into(),
        VerdictTier::NotDetected => "No threat detected".into(),
        VerdictTier::BlockedByPolicy => "Blocked by administrator policy".into(),
        VerdictTier::Detected { level: 0 } => "Malware detected".into(),
        VerdictTier::Detected { level } => format!("Threat detected (level: {level})").into(),
        VerdictTier::InvalidArguments => "Invalid arguments".into(),
        VerdictTier::ScannerUnavailable => "Content scanner not available".into(),
        VerdictTier::ScanFailed => "Content scan failed".into(),
        VerdictTier::FileReadFailed => "Failed to read file".into(),
        VerdictTier::Unknown | VerdictTier::Skipped => format!("Unknown result: {code}").into(),
    }
}

/// Outcome of one scan.  `clean` always follows from `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanVerdict {
    clean: bool,
    code: i32,
    description: String,
    #[serde(flatten)]
    tier: VerdictTier,
}

impl ScanVerdict {
    pub fn from_code(code: i32) -> Self {
        Self {
            clean: is_clean(code),
            code,
            description: describe(code).into_owned(),
            tier: classify(code),
        }
    }

    /// Verdict for a host without a scanning service.  Reported as clean so
    /// callers can proceed, but the tier says no check happened.
    pub fn skipped(platform: &str) -> Self {
        Self {
            clean: is_clean(RESULT_CLEAN),
            code: RESULT_CLEAN,
            description: format!("Scan skipped: content scanning is not available on {platform}"),
            tier: VerdictTier::Skipped,
        }
    }

    pub fn clean(&self) -> bool {
        self.clean
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tier(&self) -> VerdictTier {
        self.tier
    }

    pub fn is_skipped(&self) -> bool {
        self.tier == VerdictTier::Skipped
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    pub content: &'a [u8],
    /// Logical file name the content is reported under.
    pub label: &'a str,
}

impl<'a> ScanRequest<'a> {
    pub fn new(content: &'a [u8], label: &'a str) -> Self {
        Self { content, label }
    }
}

/// The OS content-scanning service.
pub trait ScanProvider: Send + Sync {
    fn platform(&self) -> &'static str;

    fn is_supported(&self) -> bool;

    fn is_initialized(&self) -> bool;

    /// Open the scanning context.  Succeeds without doing anything when the
    /// context is already open.
    fn initialize(&self) -> Result<(), SandboxError>;

    /// Close the scanning context, if open.
    fn uninitialize(&self);

    /// Submit the content and return the engine's raw result code.
    ///
    /// Reports `SandboxError::Closed` when the context is not open, which
    /// happens when `uninitialize` ran after the caller's `initialize`.
    fn scan_buffer(&self, content: &[u8], label: &str) -> Result<i32, SandboxError>;
}

/// Applies the scan contract on top of a provider.
pub struct ContentScanner {
    provider: Box<dyn ScanProvider>,
}

impl ContentScanner {
    pub fn new(provider: Box<dyn ScanProvider>) -> Self {
        Self { provider }
    }

    pub fn scan(&self, request: &ScanRequest<'_>) -> ScanVerdict {
        // An empty label is allowed; the engine treats it as "no name".
        if u32::try_from(request.content.len()).is_err() {
            return ScanVerdict::from_code(CODE_INVALID_ARGUMENTS);
        }
        if !self.provider.is_supported() {
            debug!(label = request.label, "content scanning unavailable; skipping");
            return ScanVerdict::skipped(self.provider.platform());
        }
        let verdict = match self.initialize_and_scan(request) {
            Ok(verdict) => verdict,
            Err(verdict) => return verdict,
        };
        if verdict.clean() {
            debug!(label = request.label, code = verdict.code(), "content is clean");
        } else {
            warn!(
                label = request.label,
                code = verdict.code(),
                description = verdict.description(),
                "content was not classified clean"
            );
        }
        verdict
    }

    /// Open the context if needed and submit the content.  A context closed
    /// by a concurrent `shutdown` between the two steps is reopened once.
    fn initialize_and_scan(&self, request: &ScanRequest<'_>) -> Result<ScanVerdict, ScanVerdict> {
        let mut reopened = false;
        loop {
            if let Err(e) = self.provider.initialize() {
                warn!(error = %e, "content scanner failed to initialize");
                return Err(ScanVerdict::from_code(CODE_SCANNER_UNAVAILABLE));
            }
            match self.provider.scan_buffer(request.content, request.label) {
                Ok(code) => return Ok(ScanVerdict::from_code(code)),
                Err(SandboxError::Closed(what)) if !reopened => {
                    debug!(label = request.label, "{what} closed before the scan; reopening");
                    reopened = true;
                }
                Err(e) => {
                    warn!(label = request.label, error = %e, "content scan call failed");
                    return Err(ScanVerdict::from_code(CODE_SCAN_FAILED));
                }
            }
        }
    }

    /// Read the whole file, then scan it under its base name.
    pub fn scan_file(&self, path: &Path) -> ScanVerdict {
        if path.as_os_str().is_empty() {
            return ScanVerdict::from_code(CODE_INVALID_ARGUMENTS);
        }
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read file for scanning");
                return ScanVerdict::from_code(CODE_FILE_READ_FAILED);
            }
        };
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        self.scan(&ScanRequest::new(&content, &label))
    }

    /// Whether the scanning context is open right now.
    pub fn is_available(&self) -> bool {
        self.provider.is_supported() && self.provider.is_initialized()
    }

    /// Close the scanning context.  The next scan opens it again.
    pub fn shutdown(&self) {
        if self.provider.is_initialized() {
            debug!("closing content scanner");
            self.provider.uninitialize();
        }
    }
}
