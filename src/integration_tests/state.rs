//! Recorded OS state for the fake providers.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::runtime::capability::CapabilityKind;

/// One OS-level operation, in the order the gatekeeper issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateProfile(String),
    DeriveProfile(String),
    DeleteProfile(String),
    GrantAccess { path: PathBuf, sid: String },
    ResolveCapability(CapabilityKind),
    BuildAttributes { sid: String, capabilities: Vec<CapabilityKind> },
    Spawn { command_line: String, workspace: PathBuf },
    ReleaseAttributes,
    ScanInit,
    ScanBuffer { label: String, len: usize },
    ScanUninit,
}

/// Operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateProfile,
    DeriveProfile,
    DeleteProfile,
    GrantAccess,
    Capability(CapabilityKind),
    BuildAttributes,
    Spawn,
    /// Process creation "succeeds" but reports process id 0.
    SpawnZeroPid,
    ScanInit,
    /// The next `initialize` opens the context and it is closed again before
    /// the scan, as a concurrent shutdown would.
    CloseAfterInit,
    ScanBuffer,
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub calls: Vec<Call>,
    pub faults: HashSet<Fault>,
    /// Profiles that exist on the fake machine.
    pub profiles: HashSet<String>,
    /// Principal ids granted on each path, in grant order.
    pub acl: HashMap<PathBuf, Vec<String>>,
    pub processes: Vec<u32>,
    pub next_pid: u32,
    pub scanner_open: bool,
    pub scan_result: i32,
    /// Attribute lists built but not yet released.
    pub live_attributes: usize,
}

/// Shared between the fake providers and the test's `MachineCheck`.
#[derive(Clone)]
pub struct FakeMachine {
    inner: Arc<Mutex<Inner>>,
}

impl FakeMachine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_pid: 4100,
                ..Inner::default()
            })),
        }
    }

    pub fn monitor(&self) -> MachineCheck {
        MachineCheck {
            machine: self.clone(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake machine lock poisoned")
    }

    /// Record the call and report whether the operation should fail.
    pub(crate) fn record(&self, call: Call, fault: Fault) -> bool {
        let mut inner = self.lock();
        inner.calls.push(call);
        inner.faults.contains(&fault)
    }
}

/// Lets a test inspect and steer the fake machine.
pub struct MachineCheck {
    machine: FakeMachine,
}

impl MachineCheck {
    pub fn fail(&self, fault: Fault) {
        self.machine.lock().faults.insert(fault);
    }

    pub fn heal(&self, fault: Fault) {
        self.machine.lock().faults.remove(&fault);
    }

    pub fn set_scan_result(&self, code: i32) {
        self.machine.lock().scan_result = code;
    }

    pub fn add_profile(&self, name: &str) {
        self.machine.lock().profiles.insert(name.to_string());
    }

    pub fn profile_exists(&self, name: &str) -> bool {
        self.machine.lock().profiles.contains(name)
    }

    pub fn grant_directly(&self, path: &Path, sid: &str) {
        self.machine
            .lock()
            .acl
            .entry(path.to_path_buf())
            .or_default()
            .push(sid.to_string());
    }

    pub fn acl(&self, path: &Path) -> Vec<String> {
        self.machine.lock().acl.get(path).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.machine.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.machine.lock().calls.clear();
    }

    pub fn processes(&self) -> Vec<u32> {
        self.machine.lock().processes.clone()
    }

    pub fn live_attributes(&self) -> usize {
        self.machine.lock().live_attributes
    }

    pub fn scanner_open(&self) -> bool {
        self.machine.lock().scanner_open
    }

    /// Count the calls matching `f`.
    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.machine.lock().calls.iter().filter(|c| f(c)).count()
    }

    pub fn spawned(&self) -> bool {
        self.count(|c| matches!(c, Call::Spawn { .. })) > 0
    }
}
