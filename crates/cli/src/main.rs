//! pipewarden - probe a line-delimited JSON-RPC server over stdio
//!
//! Composition root: wires the process supervisor, the line reader and the
//! probe exchange together, then prints what came back.

mod logging;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use logging::LogFormat;
use pipewarden_core::application::{mcp_handshake, run_probe, ProbeConfig};
use pipewarden_core::domain::{CapturePolicy, ProcessSpec, RequestMessage};
use pipewarden_core::SupervisorError;
use pipewarden_infra_system::{LineReader, ProcessSupervisor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

const EXIT_CAPTURED: u8 = 0;
const EXIT_NOTHING_CAPTURED: u8 = 1;
const EXIT_SPAWN_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "pipewarden")]
#[command(about = "Launch a stdio JSON-RPC server, talk to it, and shut it down cleanly", long_about = None)]
#[command(version)]
struct Cli {
    /// Milliseconds to wait after SIGTERM before killing the child
    #[arg(long = "grace", env = "PIPEWARDEN_GRACE_MS", default_value = "5000")]
    grace_ms: u64,

    /// Milliseconds to wait for each answer
    #[arg(
        long = "response-timeout",
        env = "PIPEWARDEN_RESPONSE_TIMEOUT_MS",
        default_value = "10000"
    )]
    response_timeout_ms: u64,

    /// Keep reading after the first message
    #[arg(long)]
    continuous: bool,

    /// Extra environment variable for the child (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Working directory for the child
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Skip the default MCP handshake
    #[arg(long)]
    no_handshake: bool,

    /// Extra request to send, as a JSON object (repeatable)
    #[arg(long = "request", value_parser = parse_request)]
    requests: Vec<RequestMessage>,

    /// Log output format
    #[arg(long, value_enum, env = "PIPEWARDEN_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Executable followed by its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    command: Vec<String>,
}

impl Cli {
    fn process_spec(&self) -> ProcessSpec {
        let (executable, args) = match self.command.split_first() {
            Some((exe, args)) => (exe.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };

        let mut spec = ProcessSpec::new(executable).args(args);
        for (key, value) in &self.env {
            spec = spec.env(key.clone(), value.clone());
        }
        if let Some(dir) = &self.cwd {
            spec = spec.working_dir(dir.clone());
        }
        spec
    }

    fn requests(&self) -> Vec<RequestMessage> {
        let mut requests = if self.no_handshake {
            Vec::new()
        } else {
            mcp_handshake()
        };
        requests.extend(self.requests.iter().cloned());
        requests
    }

    fn policy(&self) -> CapturePolicy {
        if self.continuous {
            CapturePolicy::Continuous
        } else {
            CapturePolicy::SingleShot
        }
    }

    fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            policy: self.policy(),
        }
    }
}

fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_request(s: &str) -> std::result::Result<RequestMessage, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid request JSON: {}", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if let Some(SupervisorError::Spawn { .. }) = e.downcast_ref::<SupervisorError>() {
                eprintln!("{} {}", "✗".red().bold(), e);
                return ExitCode::from(EXIT_SPAWN_FAILED);
            }
            error!(error = %format!("{:#}", e), "Probe failed");
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::from(EXIT_NOTHING_CAPTURED)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let spec = cli.process_spec();
    let command = spec.display_command();
    let requests = cli.requests();
    let config = cli.probe_config();

    let supervisor = ProcessSupervisor::new(Duration::from_millis(cli.grace_ms));
    let child = supervisor.start(&spec)?;

    let (output, token) = child.output().context("Failed to attach the line reader")?;
    let reader = LineReader::new(config.policy).spawn(output, report::print_message, token);
    let progress = reader.progress();

    let supervised = supervisor
        .scoped(child, move |child| {
            Box::pin(async move {
                let mut progress = progress;
                if requests.is_empty() {
                    // Nothing to send: give the child one window to speak first
                    let _ = tokio::time::timeout(
                        config.response_timeout,
                        progress.wait_for(|n| *n >= 1),
                    )
                    .await;
                }
                run_probe(child, &requests, &mut progress, &config).await
            })
        })
        .await;

    let summary = reader.join().await;
    info!(
        delivered = summary.delivered,
        discarded = summary.discarded,
        final_state = %supervised.teardown.final_state,
        "Probe finished"
    );

    println!();
    println!("{}", "Probe summary".green().bold());
    println!(
        "{}",
        report::render(&command, &supervised.value, &supervised.teardown, &summary)
    );

    if summary.captured_any() {
        Ok(EXIT_CAPTURED)
    } else {
        Ok(EXIT_NOTHING_CAPTURED)
    }
}
