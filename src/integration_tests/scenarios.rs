//! Gatekeeper behavior over the fake providers.

use std::path::PathBuf;

use super::fakes::{self, sid_for};
use super::state::{Call, FakeMachine, Fault};
use crate::runtime::{
    capability::CapabilityKind,
    config::{DEFAULT_PROFILE_NAME, GatekeeperConfig, LaunchConfig},
    error::{self, ErrorKind, LaunchError},
    gatekeeper::{GateError, Gatekeeper},
    scan::{self, VerdictTier},
    spawn::{LaunchRequest, NetworkPolicy},
    UnsupportedSandbox, UnsupportedScanner,
};

fn workspace() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = crate::runtime::spawn::full_path_name(dir.path()).unwrap();
    (dir, path)
}

#[test]
fn launch_runs_every_step_in_order() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    let pid = gate
        .launch(&LaunchRequest::new("powershell.exe -File a.ps1", &ws).with_network(true))
        .unwrap();

    let sid = sid_for(DEFAULT_PROFILE_NAME);
    assert_eq!(m.processes(), vec![pid.get()]);
    assert_eq!(
        m.calls(),
        vec![
            Call::CreateProfile(DEFAULT_PROFILE_NAME.to_string()),
            Call::GrantAccess {
                path: ws.clone(),
                sid: sid.clone()
            },
            Call::ResolveCapability(CapabilityKind::InternetClient),
            Call::ResolveCapability(CapabilityKind::PrivateNetworkClientServer),
            Call::BuildAttributes {
                sid: sid.clone(),
                capabilities: vec![
                    CapabilityKind::InternetClient,
                    CapabilityKind::PrivateNetworkClientServer
                ],
            },
            Call::Spawn {
                command_line: "powershell.exe -File a.ps1".to_string(),
                workspace: ws.clone(),
            },
            Call::ReleaseAttributes,
        ]
    );
    assert_eq!(m.acl(&ws), vec![sid]);
    assert_eq!(m.live_attributes(), 0);
}

#[test]
fn network_disabled_has_no_capabilities() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    gate.launch(&LaunchRequest::new("cmd.exe /c exit 0", &ws).with_network(false))
        .unwrap();

    assert_eq!(m.count(|c| matches!(c, Call::ResolveCapability(_))), 0);
    assert!(m.calls().contains(&Call::BuildAttributes {
        sid: sid_for(DEFAULT_PROFILE_NAME),
        capabilities: vec![],
    }));
}

#[test]
fn network_default_follows_configuration() {
    let machine = FakeMachine::new();
    let config = GatekeeperConfig {
        launch: LaunchConfig {
            network_by_default: false,
        },
        ..GatekeeperConfig::default()
    };
    let (gate, m) = fakes::on_machine(&machine, config);
    let (_dir, ws) = workspace();

    let request = LaunchRequest::new("cmd.exe", &ws);
    assert_eq!(request.network, NetworkPolicy::Default);
    gate.launch(&request).unwrap();
    assert_eq!(m.count(|c| matches!(c, Call::ResolveCapability(_))), 0);

    let (gate, m) = fakes::new();
    gate.launch(&request).unwrap();
    assert_eq!(m.count(|c| matches!(c, Call::ResolveCapability(_))), 2);
}

#[test]
fn existing_profile_is_derived() {
    let (gate, m) = fakes::new();
    m.add_profile(DEFAULT_PROFILE_NAME);
    let (_dir, ws) = workspace();

    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();

    let calls = m.calls();
    assert_eq!(calls[0], Call::CreateProfile(DEFAULT_PROFILE_NAME.to_string()));
    assert_eq!(calls[1], Call::DeriveProfile(DEFAULT_PROFILE_NAME.to_string()));
    assert_eq!(gate.identity_principal(), sid_for(DEFAULT_PROFILE_NAME));
}

#[test]
fn identity_is_cached() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();
    assert_eq!(gate.identity_principal(), "");

    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    let first = gate.identity_principal();
    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    let second = gate.identity_principal();

    assert_eq!(first, second);
    assert_eq!(
        m.count(|c| matches!(c, Call::CreateProfile(_) | Call::DeriveProfile(_))),
        1
    );
    assert_eq!(m.processes().len(), 2);
}

#[test]
fn identity_resolves_once_across_threads() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap());
        }
    });

    assert_eq!(
        m.count(|c| matches!(c, Call::CreateProfile(_) | Call::DeriveProfile(_))),
        1
    );
    assert_eq!(m.processes().len(), 8);
}

#[test]
fn a_restarted_host_derives_the_same_identity() {
    let machine = FakeMachine::new();
    let (_dir, ws) = workspace();

    let (gate, _) = fakes::on_machine(&machine, GatekeeperConfig::default());
    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    let before = gate.identity_principal();
    drop(gate);

    let (gate, m) = fakes::on_machine(&machine, GatekeeperConfig::default());
    m.clear_calls();
    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();

    assert_eq!(gate.identity_principal(), before);
    assert!(m.calls().contains(&Call::DeriveProfile(DEFAULT_PROFILE_NAME.to_string())));
    // The grant is not duplicated.
    assert_eq!(m.acl(&ws), vec![before]);
}

#[test]
fn teardown_then_resolve_creates_again() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    let before = gate.identity_principal();

    assert!(gate.teardown_identity());
    assert!(!m.profile_exists(DEFAULT_PROFILE_NAME));
    assert_eq!(gate.identity_principal(), "");

    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    assert_eq!(gate.identity_principal(), before);
    assert_eq!(m.count(|c| matches!(c, Call::CreateProfile(_))), 2);
}

#[test]
fn teardown_of_missing_profile_succeeds() {
    let (gate, m) = fakes::new();
    assert!(gate.teardown_identity());
    assert_eq!(
        m.calls(),
        vec![Call::DeleteProfile(DEFAULT_PROFILE_NAME.to_string())]
    );
}

#[test]
fn failed_teardown_keeps_the_cache() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();
    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    let before = gate.identity_principal();

    m.fail(Fault::DeleteProfile);
    assert!(!gate.teardown_identity());
    assert_eq!(gate.identity_principal(), before);
    assert!(m.profile_exists(DEFAULT_PROFILE_NAME));
}

#[test]
fn empty_command_line_is_rejected_before_side_effects() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("", &ws)).unwrap_err();

    assert!(matches!(err, LaunchError::InvalidArguments(_)));
    assert_eq!(err.code(), error::INVALID_ARGUMENTS);
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(m.calls().is_empty());
}

#[test]
fn missing_workspace_is_rejected_before_side_effects() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    let err = gate
        .launch(&LaunchRequest::new("cmd.exe", ws.join("nope")))
        .unwrap_err();

    assert_eq!(err.code(), error::INVALID_ARGUMENTS);
    assert!(m.calls().is_empty());
}

#[test]
fn acl_failure_never_creates_a_process() {
    let (gate, m) = fakes::new();
    m.fail(Fault::GrantAccess);
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();

    assert!(matches!(err, LaunchError::AclFailure(_)));
    assert_eq!(err.code(), error::ACL_FAILURE);
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.os_code(), Some(5));
    assert!(!m.spawned());
    assert!(m.processes().is_empty());
    assert_eq!(m.count(|c| matches!(c, Call::ResolveCapability(_))), 0);
    assert_eq!(m.count(|c| matches!(c, Call::BuildAttributes { .. })), 0);
}

#[test]
fn profile_failure_is_reported() {
    let (gate, m) = fakes::new();
    m.fail(Fault::CreateProfile);
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();
    assert_eq!(err.code(), error::PROFILE_CREATION_FAILED);
    assert_eq!(err.kind(), ErrorKind::OsOperationFailed);
    assert_eq!(gate.identity_principal(), "");
    assert_eq!(m.count(|c| matches!(c, Call::GrantAccess { .. })), 0);

    // Not cached, so the next attempt goes back to the OS.
    m.heal(Fault::CreateProfile);
    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();
    assert_eq!(m.count(|c| matches!(c, Call::CreateProfile(_))), 2);
}

#[test]
fn derive_failure_is_a_profile_failure() {
    let (gate, m) = fakes::new();
    m.add_profile(DEFAULT_PROFILE_NAME);
    m.fail(Fault::DeriveProfile);
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();
    assert!(matches!(err, LaunchError::ProfileCreationFailed(_)));
}

#[test]
fn required_capability_failure_stops_the_launch() {
    let (gate, m) = fakes::new();
    m.fail(Fault::Capability(CapabilityKind::InternetClient));
    let (_dir, ws) = workspace();

    let err = gate
        .launch(&LaunchRequest::new("cmd.exe", &ws).with_network(true))
        .unwrap_err();

    assert_eq!(err.code(), error::CAPABILITY_ERROR);
    assert!(!m.spawned());
    assert_eq!(m.count(|c| matches!(c, Call::BuildAttributes { .. })), 0);
}

#[test]
fn optional_capability_failure_is_skipped() {
    let (gate, m) = fakes::new();
    m.fail(Fault::Capability(CapabilityKind::PrivateNetworkClientServer));
    let (_dir, ws) = workspace();

    gate.launch(&LaunchRequest::new("cmd.exe", &ws).with_network(true))
        .unwrap();

    assert!(m.calls().contains(&Call::BuildAttributes {
        sid: sid_for(DEFAULT_PROFILE_NAME),
        capabilities: vec![CapabilityKind::InternetClient],
    }));
}

#[test]
fn attribute_failure_is_a_process_failure() {
    let (gate, m) = fakes::new();
    m.fail(Fault::BuildAttributes);
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();
    assert_eq!(err.code(), error::PROCESS_CREATION_FAILED);
    assert!(!m.spawned());
}

#[test]
fn process_failure_releases_attributes() {
    let (gate, m) = fakes::new();
    m.fail(Fault::Spawn);
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();
    assert_eq!(err.code(), error::PROCESS_CREATION_FAILED);
    assert!(m.processes().is_empty());
    assert_eq!(m.live_attributes(), 0);
    assert_eq!(m.calls().last(), Some(&Call::ReleaseAttributes));
}

#[test]
fn zero_process_id_is_a_failure() {
    let (gate, m) = fakes::new();
    m.fail(Fault::SpawnZeroPid);
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();
    assert_eq!(err.code(), error::PROCESS_CREATION_FAILED);
}

#[test]
fn each_launch_yields_a_pid_or_one_code() {
    let faults = [
        None,
        Some(Fault::CreateProfile),
        Some(Fault::GrantAccess),
        Some(Fault::Capability(CapabilityKind::InternetClient)),
        Some(Fault::BuildAttributes),
        Some(Fault::Spawn),
        Some(Fault::SpawnZeroPid),
    ];
    for fault in faults {
        let (gate, m) = fakes::new();
        if let Some(fault) = fault {
            m.fail(fault);
        }
        let (_dir, ws) = workspace();
        match gate.launch(&LaunchRequest::new("cmd.exe", &ws).with_network(true)) {
            Ok(pid) => {
                assert!(fault.is_none());
                assert_eq!(m.processes(), vec![pid.get()]);
            }
            Err(e) => {
                assert!(fault.is_some());
                assert!(e.code() < 0);
                assert!(m.processes().is_empty(), "{fault:?} left a process");
            }
        }
    }
}

#[test]
fn grants_are_additive() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();
    let other = "S-1-15-2-1111";
    m.grant_directly(&ws, other);

    gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap();

    let acl = m.acl(&ws);
    assert!(acl.contains(&other.to_string()));
    assert!(acl.contains(&sid_for(DEFAULT_PROFILE_NAME)));
}

#[test]
fn clean_scan() {
    let (gate, m) = fakes::new();
    m.set_scan_result(scan::RESULT_NOT_DETECTED);

    let v = gate.scan_buffer(b"echo hello", "a.ps1");

    assert!(v.clean());
    assert!(v.code() == 0 || v.code() == 1);
    assert_eq!(
        m.calls(),
        vec![
            Call::ScanInit,
            Call::ScanBuffer {
                label: "a.ps1".to_string(),
                len: 10
            }
        ]
    );
    assert!(gate.platform_info().scanner_available);
}

#[test]
fn scanner_initializes_once() {
    let (gate, m) = fakes::new();
    gate.scan_buffer(b"a", "a.ps1");
    gate.scan_buffer(b"b", "b.ps1");
    assert_eq!(m.count(|c| matches!(c, Call::ScanInit)), 1);

    gate.shutdown_scanner();
    assert!(!m.scanner_open());
    gate.scan_buffer(b"c", "c.ps1");
    assert_eq!(m.count(|c| matches!(c, Call::ScanInit)), 2);
    assert_eq!(m.count(|c| matches!(c, Call::ScanUninit)), 1);
}

#[test]
fn scanner_closed_before_the_scan_is_reopened() {
    let (gate, m) = fakes::new();
    m.fail(Fault::CloseAfterInit);

    let v = gate.scan_buffer(b"echo hello", "a.ps1");

    assert!(v.clean(), "unexpected verdict {v:?}");
    assert_eq!(v.code(), scan::RESULT_CLEAN);
    assert_eq!(m.count(|c| matches!(c, Call::ScanInit)), 2);
    assert_eq!(m.count(|c| matches!(c, Call::ScanBuffer { .. })), 2);
    assert!(m.scanner_open());
}

#[test]
fn unavailable_scanner_is_not_clean() {
    let (gate, m) = fakes::new();
    m.fail(Fault::ScanInit);

    let v = gate.scan_buffer(b"echo hello", "a.ps1");

    assert!(!v.clean());
    assert_eq!(v.code(), scan::CODE_SCANNER_UNAVAILABLE);
    assert_eq!(v.tier(), VerdictTier::ScannerUnavailable);
    assert_eq!(m.count(|c| matches!(c, Call::ScanBuffer { .. })), 0);
}

#[test]
fn failed_scan_call_is_not_clean() {
    let (gate, m) = fakes::new();
    m.fail(Fault::ScanBuffer);
    let v = gate.scan_buffer(b"echo hello", "a.ps1");
    assert!(!v.clean());
    assert_eq!(v.code(), scan::CODE_SCAN_FAILED);
}

#[test]
fn detected_and_blocked_are_not_clean() {
    let (gate, m) = fakes::new();
    for code in [0x4000, 0x8000, 0x8010, 7] {
        m.set_scan_result(code);
        let v = gate.scan_buffer(b"x", "x.ps1");
        assert!(!v.clean(), "{code:#x}");
        assert_eq!(v.code(), code);
    }
}

#[test]
fn empty_label_is_scanned() {
    let (gate, m) = fakes::new();
    let v = gate.scan_buffer(b"echo hello", "");
    assert!(v.clean());
    assert!(m.calls().contains(&Call::ScanBuffer {
        label: String::new(),
        len: 10,
    }));
}

#[test]
fn scan_file_uses_base_name() {
    let (gate, m) = fakes::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("install.ps1");
    std::fs::write(&path, b"Write-Host hi").unwrap();

    let v = gate.scan_file(&path);

    assert!(v.clean());
    assert!(m.calls().contains(&Call::ScanBuffer {
        label: "install.ps1".to_string(),
        len: 13
    }));
}

#[test]
fn scan_file_missing_is_a_read_failure() {
    let (gate, m) = fakes::new();
    let dir = tempfile::tempdir().unwrap();

    let v = gate.scan_file(&dir.path().join("missing.ps1"));

    assert!(!v.clean());
    assert_eq!(v.code(), scan::CODE_FILE_READ_FAILED);
    assert_eq!(v.tier(), VerdictTier::FileReadFailed);
    assert!(m.calls().is_empty());
}

#[test]
fn scan_then_launch_refuses_unsafe_content() {
    let (gate, m) = fakes::new();
    m.set_scan_result(0x8001);
    let (_dir, ws) = workspace();

    let err = gate
        .scan_then_launch(b"evil", "evil.ps1", &LaunchRequest::new("cmd.exe", &ws))
        .unwrap_err();

    match err {
        GateError::Rejected(v) => assert_eq!(v.code(), 0x8001),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(m.count(|c| matches!(c, Call::CreateProfile(_))), 0);
    assert!(!m.spawned());
}

#[test]
fn scan_then_launch_runs_clean_content() {
    let (gate, m) = fakes::new();
    let (_dir, ws) = workspace();

    let pid = gate
        .scan_then_launch(b"echo hi", "ok.ps1", &LaunchRequest::new("cmd.exe", &ws))
        .unwrap();

    assert_eq!(m.processes(), vec![pid.get()]);
    let calls = m.calls();
    let scanned = calls.iter().position(|c| matches!(c, Call::ScanBuffer { .. }));
    let spawned = calls.iter().position(|c| matches!(c, Call::Spawn { .. }));
    assert!(scanned < spawned);
}

#[test]
fn unsupported_platform() {
    let gate = Gatekeeper::new(
        GatekeeperConfig::default(),
        Box::new(UnsupportedSandbox::new("plan9")),
        Box::new(UnsupportedScanner::new("plan9")),
    );
    let (_dir, ws) = workspace();

    let err = gate.launch(&LaunchRequest::new("cmd.exe", &ws)).unwrap_err();
    assert!(matches!(err, LaunchError::Unsupported("plan9")));
    assert_eq!(err.code(), error::UNSUPPORTED_PLATFORM);
    assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);

    let v = gate.scan_buffer(b"echo hello", "a.ps1");
    assert!(v.clean());
    assert!(v.is_skipped());
    assert!(v.description().contains("skipped"));

    let err = gate
        .scan_then_launch(b"echo hello", "a.ps1", &LaunchRequest::new("cmd.exe", &ws))
        .unwrap_err();
    assert!(matches!(err, GateError::Launch(LaunchError::Unsupported(_))));

    assert!(gate.teardown_identity());
    assert_eq!(gate.identity_principal(), "");
    let info = gate.platform_info();
    assert!(!info.sandbox_supported);
    assert!(!info.scanner_available);
}

#[test]
fn resolve_identity_without_launch() {
    let (gate, m) = fakes::new();

    let sid = gate.resolve_identity().unwrap();

    assert_eq!(sid, sid_for(DEFAULT_PROFILE_NAME));
    assert_eq!(gate.identity_principal(), sid);
    assert_eq!(m.calls(), vec![Call::CreateProfile(DEFAULT_PROFILE_NAME.to_string())]);

    m.fail(Fault::CreateProfile);
    assert_eq!(gate.resolve_identity().unwrap(), sid);
}
