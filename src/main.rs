use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use wipectl::config::OrchestratorConfig;
use wipectl::host;
use wipectl::scan::Device;
use wipectl::session::{LogLevel, SessionOutcome, WipeEvent};
use wipectl::tools::ToolMode;
use wipectl::ui::{human_bytes, ProgressBar};
use wipectl::wipe_log::WipeStatus;
use wipectl::wipe_orchestrator::WipeOrchestrator;
use wipectl::{Capability, WipeMethod, WipeRequest};

#[derive(Parser)]
#[command(name = "wipectl")]
#[command(about = "Safety-gated storage sanitization with NIST 800-88 logs and certificates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Configuration file (defaults + WIPECTL_* environment apply on top)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail instead of falling back to simulated tools
    #[arg(long, global = true)]
    require_real: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List wipe targets detected by the scan tool
    List {
        /// Emit the device list as JSON
        #[arg(long)]
        json: bool,

        /// Include devices the safety policy would refuse to wipe
        #[arg(long)]
        include_unsafe: bool,
    },

    /// Wipe a device and write its log
    Wipe {
        /// Device path (e.g. /dev/sdb)
        device: String,

        /// Sanitization method (clear, purge, destroy)
        #[arg(short, long, default_value = "clear")]
        method: String,

        /// Where to write the wipe log (generated under the log dir by default)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Generate a certificate when the wipe succeeds
        #[arg(long)]
        certificate: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate a certificate from a wipe log
    Certify {
        /// Wipe log path
        log: PathBuf,

        /// Certificate JSON output path
        #[arg(long)]
        out_json: Option<PathBuf>,

        /// Certificate PDF output path (real certifier only)
        #[arg(long)]
        out_pdf: Option<PathBuf>,
    },

    /// Verify a certificate artifact
    Verify {
        /// Certificate JSON path
        cert: PathBuf,

        /// Public key for signature verification
        #[arg(long)]
        pubkey: Option<PathBuf>,
    },

    /// List past wipes and their certificates
    History {
        /// Emit the history as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report tool availability and privilege state
    Doctor,

    /// Show host platform facts
    PlatformInfo {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = setup_logging(cli.debug, cli.log_file.as_deref())?;
    setup_signal_handlers()?;

    let mut config = OrchestratorConfig::load(cli.config.as_deref())?;
    if cli.require_real {
        config.require_real = true;
    }
    let orchestrator = WipeOrchestrator::new(config);

    match &cli.command {
        Commands::List {
            json,
            include_unsafe,
        } => {
            list_devices(&orchestrator, *json, *include_unsafe).await?;
        }
        Commands::Wipe {
            device,
            method,
            output,
            certificate,
            yes,
        } => {
            run_wipe(
                &orchestrator,
                device,
                method,
                output.clone(),
                *certificate,
                *yes,
                cli.debug,
            )
            .await?;
        }
        Commands::Certify {
            log,
            out_json,
            out_pdf,
        } => {
            certify(&orchestrator, log, out_json.as_deref(), out_pdf.as_deref()).await?;
        }
        Commands::Verify { cert, pubkey } => {
            verify(&orchestrator, cert, pubkey.as_deref()).await?;
        }
        Commands::History { json } => {
            history(&orchestrator, *json)?;
        }
        Commands::Doctor => {
            doctor(&orchestrator).await;
        }
        Commands::PlatformInfo { json } => {
            platform_info(&orchestrator, *json)?;
        }
    }

    Ok(())
}

async fn list_devices(
    orchestrator: &WipeOrchestrator,
    json: bool,
    include_unsafe: bool,
) -> Result<()> {
    let outcome = orchestrator.scan_devices().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.devices)?);
        return Ok(());
    }

    if outcome.mock {
        println!(
            "{}",
            "No scan tool installed; showing the simulated device.".yellow()
        );
    }
    if outcome.devices.is_empty() {
        println!("No devices detected.");
        return Ok(());
    }

    let platform = orchestrator.config().platform;
    println!(
        "{:<18} {:<24} {:>10} {:<12} {:<16}",
        "Device", "Name", "Size", "Type", "Serial"
    );
    println!("{}", "-".repeat(84));

    let mut hidden = 0;
    for device in &outcome.devices {
        if !include_unsafe && !wipectl::safety::is_safe_target(&device.path, platform) {
            hidden += 1;
            continue;
        }
        println!(
            "{:<18} {:<24} {:>10} {:<12} {:<16}",
            device.path,
            truncate_string(&device.name, 24),
            human_bytes(device.size_bytes as f64),
            truncate_string(&device.device_type, 12),
            truncate_string(&device.serial, 16),
        );
    }

    if hidden > 0 {
        println!(
            "\n{} protected device(s) hidden for safety. Use --include-unsafe to show them.",
            hidden
        );
    }

    Ok(())
}

async fn run_wipe(
    orchestrator: &WipeOrchestrator,
    device: &str,
    method: &str,
    output: Option<PathBuf>,
    certificate: bool,
    yes: bool,
    debug: bool,
) -> Result<()> {
    let method: WipeMethod = method.parse()?;

    // Scan metadata enriches the log; an unknown device is still wipeable
    let scanned = orchestrator
        .scan_devices()
        .await
        .ok()
        .and_then(|outcome| outcome.devices.into_iter().find(|d| d.path == device));
    if scanned.is_none() {
        println!(
            "{}",
            format!("Note: {} did not appear in the device scan.", device).yellow()
        );
    }

    // Real wipes need elevated privileges; simulated runs do not
    let report = orchestrator.doctor().await;
    let wipe_is_real = report
        .tools
        .iter()
        .any(|status| status.capability == Capability::Wipe && status.mode.is_real());
    if wipe_is_real && !host::is_root() {
        eprintln!(
            "{}",
            format!(
                "Error: real wipes require {} privileges.",
                report.host.required_privilege
            )
            .red()
        );
        eprintln!("Re-run with elevated privileges (e.g. sudo).");
        std::process::exit(1);
    }

    if !yes && !confirm_wipe(device, method, scanned.as_ref())? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let mut request = WipeRequest::new(device, method);
    request.output_log = output;
    if let Some(found) = scanned {
        request = request.with_device(found);
    }

    let started = Instant::now();
    let mut handle = orchestrator.start_wipe(request)?;
    println!(
        "Wiping {} with method {} (log: {})",
        device.bold(),
        method,
        handle.log_path().display()
    );

    let mut bar = ProgressBar::new(48);
    let mut outcome = None;
    while let Some(event) = handle.next_event().await {
        match event {
            WipeEvent::Progress { percent, message } => {
                bar.render(percent, message.as_deref().unwrap_or(""));
            }
            WipeEvent::Log { level, text, .. } => match level {
                LogLevel::Error => eprintln!("{} {}", "error:".red().bold(), text),
                LogLevel::Warn => eprintln!("{} {}", "warning:".yellow().bold(), text),
                LogLevel::Info => {
                    if debug {
                        eprintln!("{} {}", "info:".dimmed(), text);
                    }
                }
            },
            WipeEvent::Done(result) => outcome = Some(result),
        }
    }

    match outcome {
        Some(SessionOutcome::Succeeded {
            log_path,
            wipe_log,
            mock,
        }) => {
            let elapsed = Duration::from_secs(started.elapsed().as_secs());
            println!(
                "\n{} in {}",
                "Wipe completed".green().bold(),
                humantime::format_duration(elapsed)
            );
            if mock {
                println!(
                    "{}",
                    "Simulated run: no wipe tool is installed, no data was touched.".yellow()
                );
            }
            if wipe_log.is_none() {
                println!(
                    "{}",
                    "The tool exited cleanly but its log could not be read back.".yellow()
                );
            }
            println!("Log: {}", log_path.display());

            if certificate {
                let cert = orchestrator
                    .generate_certificate(&log_path, None, None)
                    .await?;
                print_certificate(&cert);
            }
            Ok(())
        }
        Some(SessionOutcome::Failed(err)) => {
            eprintln!("\n{} {}", "Wipe failed:".red().bold(), err);
            std::process::exit(1);
        }
        None => {
            eprintln!("\n{}", "Wipe session ended without an outcome.".red());
            std::process::exit(1);
        }
    }
}

fn confirm_wipe(device: &str, method: WipeMethod, scanned: Option<&Device>) -> Result<bool> {
    println!(
        "\n{}",
        "WARNING: this will permanently erase ALL data on the target."
            .red()
            .bold()
    );
    println!("  Device: {}", device);
    if let Some(info) = scanned {
        println!("  Name:   {}", info.name);
        println!("  Size:   {}", human_bytes(info.size_bytes as f64));
        println!("  Serial: {}", info.serial);
    }
    println!("  Method: {} ({} pass(es))", method, method.pass_count());

    print!("\nType the device path to confirm: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim() == device)
}

async fn certify(
    orchestrator: &WipeOrchestrator,
    log: &Path,
    out_json: Option<&Path>,
    out_pdf: Option<&Path>,
) -> Result<()> {
    let cert = orchestrator
        .generate_certificate(log, out_json, out_pdf)
        .await?;
    print_certificate(&cert);
    Ok(())
}

fn print_certificate(cert: &wipectl::certificate::Certificate) {
    println!(
        "{} {}",
        "Certificate generated:".green().bold(),
        cert.certificate_id
    );
    if cert.mock {
        println!(
            "{}",
            "Mock certificate: no signing tool is installed.".yellow()
        );
    }
    println!("JSON: {}", cert.json_path.display());
    if let Some(pdf) = &cert.pdf_path {
        println!("PDF:  {}", pdf.display());
    }
}

async fn verify(orchestrator: &WipeOrchestrator, cert: &Path, pubkey: Option<&Path>) -> Result<()> {
    let verdict = orchestrator.verify_certificate(cert, pubkey).await?;

    if verdict.mock {
        println!(
            "{}",
            "No verifier tool installed; this is a mock verification.".yellow()
        );
    }
    if verdict.valid {
        println!("{}", "Certificate is valid.".green().bold());
        println!("{}", verdict.detail);
        Ok(())
    } else {
        eprintln!("{}", "Certificate FAILED verification.".red().bold());
        eprintln!("{}", verdict.detail);
        std::process::exit(1);
    }
}

fn history(orchestrator: &WipeOrchestrator, json: bool) -> Result<()> {
    let entries = orchestrator.history();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No wipe history found.");
        return Ok(());
    }

    println!(
        "{:<26} {:<18} {:<20} {:<8} {:<8} {}",
        "Finished", "Device", "Name", "Method", "Status", "Certificate"
    );
    println!("{}", "-".repeat(100));

    for entry in &entries {
        let status = match entry.status {
            WipeStatus::Success => "success".green(),
            WipeStatus::Failed => "failed".red(),
        };
        let certificate = entry
            .certificate
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<18} {:<20} {:<8} {:<8} {}",
            truncate_string(&entry.finished_at, 26),
            entry.device_path,
            truncate_string(&entry.device_name, 20),
            entry.method,
            status,
            certificate,
        );
    }

    Ok(())
}

async fn doctor(orchestrator: &WipeOrchestrator) {
    let report = orchestrator.doctor().await;

    println!("{}", "Tooling".bold());
    for status in &report.tools {
        let mode = match &status.mode {
            ToolMode::Real(spec) => format!("real ({})", spec.path.display()).green(),
            ToolMode::Simulated => "simulated".yellow(),
        };
        println!("  {:<8} {}", status.capability.to_string(), mode);
        if status.mode.is_simulated() {
            if let Some(candidate) = &status.candidate {
                println!(
                    "           configured path is not executable: {}",
                    candidate.display()
                );
            }
        }
    }

    println!("\n{}", "Privileges".bold());
    if report.host.is_admin {
        println!(
            "  running as {} ({})",
            report.host.required_privilege,
            "ok".green()
        );
    } else {
        println!(
            "  not running as {} ({})",
            report.host.required_privilege,
            "real wipes will be refused".yellow()
        );
    }

    println!("\n{}", "Host".bold());
    println!("  platform: {}", report.host.facts.platform);
    println!("  os:       {}", report.host.facts.os_version);
    println!("  operator: {}", report.host.facts.operator);
}

fn platform_info(orchestrator: &WipeOrchestrator, json: bool) -> Result<()> {
    let report = host::host_report(orchestrator.config().operator.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Platform:  {}", report.facts.platform);
    println!("OS:        {}", report.facts.os_version);
    println!("Kernel:    {}", report.facts.kernel_version);
    println!("Hostname:  {}", report.facts.hostname);
    println!("Operator:  {}", report.facts.operator);
    println!("Privilege: {}", report.required_privilege);
    println!("Elevated:  {}", report.is_admin);

    Ok(())
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

fn setup_signal_handlers() -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new(&[SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                eprintln!("\nInterrupt received: new wipe sessions are blocked.");
                eprintln!("A wipe that is already running cannot be safely cancelled.");
                wipectl::set_interrupted();
            }
        }
    });

    Ok(())
}

fn setup_logging(
    debug: bool,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if debug { "wipectl=debug,info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}
