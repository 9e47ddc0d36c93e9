// SPDX-License-Identifier: MIT

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gracklegate::{Gatekeeper, GatekeeperConfig, LaunchError, LaunchRequest, NetworkPolicy, ScanVerdict};

#[derive(Parser)]
#[command(name = "grackle-gate")]
#[command(about = "Scan agent-produced scripts and run them in a zero-permission sandbox")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch a command line inside the sandbox
    Launch {
        /// Full command line, passed to the OS unchanged
        command_line: String,

        /// Directory the sandbox may use; also the working directory
        #[arg(short, long)]
        workspace: PathBuf,

        /// Grant network capabilities
        #[arg(long, conflicts_with = "no_network")]
        network: bool,

        /// Deny network capabilities
        #[arg(long)]
        no_network: bool,
    },

    /// Scan content read from --content or stdin
    Scan {
        /// Logical file name reported to the scanner
        #[arg(short, long)]
        label: String,

        #[arg(long)]
        content: Option<String>,
    },

    /// Scan a file
    ScanFile { path: PathBuf },

    /// Print the sandbox identity, creating the profile if needed
    Sid,

    /// Delete the sandbox profile
    Teardown,

    /// Report what this host supports
    Info,
}

#[derive(Serialize)]
struct LaunchOutput {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    /// Failure code; a successful launch reports only `pid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl LaunchOutput {
    fn from_result(res: Result<std::num::NonZeroU32, LaunchError>) -> Self {
        match res {
            Ok(pid) => Self {
                success: true,
                pid: Some(pid.get()),
                code: None,
                error: None,
            },
            Err(e) => Self {
                success: false,
                pid: None,
                code: Some(e.code()),
                error: Some(match e.cause() {
                    Some(cause) => format!("{e}: {cause}"),
                    None => e.to_string(),
                }),
            },
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gracklegate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the operation succeeded (or the content is clean).
fn run(args: Args) -> Result<bool> {
    let config = match &args.config {
        Some(path) => GatekeeperConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GatekeeperConfig::default(),
    };
    let gate = Gatekeeper::for_host(config);

    match args.command {
        Command::Launch {
            command_line,
            workspace,
            network,
            no_network,
        } => {
            let policy = match (network, no_network) {
                (true, _) => NetworkPolicy::Enabled,
                (_, true) => NetworkPolicy::Disabled,
                _ => NetworkPolicy::Default,
            };
            let request = LaunchRequest::new(command_line, workspace).with_network(policy);
            let out = LaunchOutput::from_result(gate.launch(&request));
            if args.json {
                println!("{}", serde_json::to_string(&out)?);
            } else if let Some(pid) = out.pid {
                println!("launched process {pid}");
            } else {
                println!(
                    "launch failed ({}): {}",
                    out.code.unwrap_or_default(),
                    out.error.as_deref().unwrap_or_default()
                );
            }
            Ok(out.success)
        }
        Command::Scan { label, content } => {
            let content = match content {
                Some(c) => c.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
                    buf
                }
            };
            let verdict = gate.scan_buffer(&content, &label);
            print_verdict(&verdict, args.json)?;
            Ok(verdict.clean())
        }
        Command::ScanFile { path } => {
            let verdict = gate.scan_file(&path);
            print_verdict(&verdict, args.json)?;
            Ok(verdict.clean())
        }
        Command::Sid => {
            let res = gate.resolve_identity();
            let ok = res.is_ok();
            if args.json {
                let value = match &res {
                    Ok(sid) => serde_json::json!({ "success": true, "sid": sid }),
                    Err(e) => serde_json::json!({ "success": false, "code": e.code(), "error": e.to_string() }),
                };
                println!("{value}");
            } else {
                match res {
                    Ok(sid) => println!("{sid}"),
                    Err(e) => println!("{e}"),
                }
            }
            Ok(ok)
        }
        Command::Teardown => {
            let ok = gate.teardown_identity();
            if args.json {
                println!("{}", serde_json::json!({ "success": ok }));
            } else if ok {
                println!("sandbox profile removed");
            } else {
                println!("sandbox profile could not be removed");
            }
            Ok(ok)
        }
        Command::Info => {
            let info = gate.platform_info();
            if args.json {
                println!("{}", serde_json::to_string(&info)?);
            } else {
                println!("os: {}", info.os);
                println!("sandbox supported: {}", info.sandbox_supported);
                println!("scanner available: {}", info.scanner_available);
            }
            Ok(true)
        }
    }
}

fn print_verdict(verdict: &ScanVerdict, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(verdict)?);
    } else {
        println!(
            "{} ({}): {}",
            if verdict.clean() { "clean" } else { "unsafe" },
            verdict.code(),
            verdict.description()
        );
    }
    Ok(())
}
