// SPDX-License-Identifier: MIT

//! Gatekeeper runtime.
//!
//! Two independent flows are exposed through `Gatekeeper`: launching a command
//! line inside a zero-permission sandbox identity, and scanning script content
//! before it is handed to that launcher.  OS services sit behind
//! `SandboxProvider` and `ScanProvider`; `host_providers` picks the
//! implementations for the running host.

pub mod capability;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod identity;
pub mod scan;
pub mod spawn;

mod unsupported;

#[cfg(target_os = "windows")]
mod spawn_windows;

pub use capability::{CapabilityKind, CapabilitySet};
pub use config::GatekeeperConfig;
pub use error::{ErrorKind, LaunchError, SandboxError};
pub use gatekeeper::{GateError, Gatekeeper, LaunchStage, PlatformInfo};
pub use scan::{ScanProvider, ScanRequest, ScanVerdict, VerdictTier};
pub use spawn::{LaunchRequest, NetworkPolicy, PreparedLaunch, SandboxProvider, SecurityPrincipal};
pub use unsupported::{UnsupportedSandbox, UnsupportedScanner};

/// Pick each provider by checking the running host.  A missing OS component
/// falls back to the unsupported provider for that flow only.
#[cfg(target_os = "windows")]
pub fn host_providers(
    config: &GatekeeperConfig,
) -> (Box<dyn SandboxProvider>, Box<dyn ScanProvider>) {
    let platform = std::env::consts::OS;
    let sandbox = spawn_windows::WindowsSandbox::new();
    let sandbox: Box<dyn SandboxProvider> = if sandbox.is_supported() {
        Box::new(sandbox)
    } else {
        tracing::warn!("AppContainer profiles are unavailable on this host");
        Box::new(UnsupportedSandbox::new(platform))
    };
    let scanner = spawn_windows::AmsiScanner::new(&config.scanner.app_name);
    let scanner: Box<dyn ScanProvider> = if scanner.is_supported() {
        Box::new(scanner)
    } else {
        tracing::warn!("AMSI is unavailable on this host");
        Box::new(UnsupportedScanner::new(platform))
    };
    (sandbox, scanner)
}

#[cfg(not(target_os = "windows"))]
pub fn host_providers(
    _config: &GatekeeperConfig,
) -> (Box<dyn SandboxProvider>, Box<dyn ScanProvider>) {
    (
        Box::new(UnsupportedSandbox::new(std::env::consts::OS)),
        Box::new(UnsupportedScanner::new(std::env::consts::OS)),
    )
}
