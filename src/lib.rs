//! # grackle-gate
//!
//! Gates agent-produced scripts behind a malware pre-scan and a
//! zero-permission sandbox launch.

pub mod runtime;

pub use runtime::{
    GateError, Gatekeeper, GatekeeperConfig, LaunchError, LaunchRequest, NetworkPolicy,
    PlatformInfo, ScanVerdict,
};
