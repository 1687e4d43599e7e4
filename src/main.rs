use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, Command};
use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use packpress::core::api::{ApiContext, HttpBackend};
use packpress::core::events::SessionEvent;
use packpress::core::model::{OptimizeRequest, SessionState, ALLOWED_EXTENSIONS};
use packpress::core::session::Session;
use packpress::i18n::{messages, Locale, Messages};

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

fn build_cli() -> Command {
    let common = |cmd: Command| {
        cmd.arg(
            Arg::new("api_base")
                .long("api-base")
                .help("Optimization service base URL (or PACKPRESS_API env)")
                .num_args(1),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("CLI message locale (en, zh)")
                .default_value("en")
                .num_args(1),
        )
    };

    let optimize = common(
        Command::new("optimize")
            .about("Upload an archive and save the optimized result")
            .arg(Arg::new("file").help("Archive to optimize").required(true).num_args(1))
            .arg(
                Arg::new("quality")
                    .long("quality")
                    .help("Image recompression quality (1-100)")
                    .default_value("85")
                    .num_args(1),
            )
            .arg(
                Arg::new("max_size")
                    .long("max-size")
                    .help("Optional texture dimension cap in pixels")
                    .num_args(1),
            )
            .arg(
                Arg::new("out_dir")
                    .long("out-dir")
                    .help("Where to save the optimized archive")
                    .default_value(".")
                    .num_args(1),
            )
            .arg(
                Arg::new("timeout_secs")
                    .long("timeout-secs")
                    .help("Deadline to first response headers")
                    .default_value("300")
                    .num_args(1),
            ),
    );

    let check = common(
        Command::new("check")
            .about("Validate an archive without optimizing it")
            .arg(Arg::new("file").help("Archive to validate").required(true).num_args(1)),
    );

    Command::new("packpress")
        .about(format!(
            "Resource pack optimizer client (accepts: {})",
            ALLOWED_EXTENSIONS.join(", ")
        ))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(optimize)
        .subcommand(check)
}

fn resolve_api_base(m: &clap::ArgMatches) -> anyhow::Result<Url> {
    let raw = m
        .get_one::<String>("api_base")
        .cloned()
        .or_else(|| std::env::var("PACKPRESS_API").ok())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    // Url::join drops the last path segment without a trailing slash.
    let normalized = if raw.ends_with('/') { raw } else { format!("{raw}/") };
    Url::parse(&normalized).with_context(|| format!("invalid api base {normalized}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    match matches.subcommand() {
        Some(("optimize", m)) => run_optimize(m).await,
        Some(("check", m)) => run_check(m).await,
        _ => unreachable!("subcommand required"),
    }
}

async fn run_optimize(m: &clap::ArgMatches) -> anyhow::Result<()> {
    let msgs = messages(Locale::from_str(m.get_one::<String>("locale").unwrap()));
    let file: PathBuf = m.get_one::<String>("file").unwrap().into();
    let out_dir: PathBuf = m.get_one::<String>("out_dir").unwrap().into();
    let quality: u8 = m.get_one::<String>("quality").unwrap().parse().context("quality")?;
    let max_size: Option<u32> = m
        .get_one::<String>("max_size")
        .map(|s| s.parse().context("max-size"))
        .transpose()?;
    let timeout_secs: u64 = m.get_one::<String>("timeout_secs").unwrap().parse().context("timeout-secs")?;

    let mut ctx = ApiContext::new(resolve_api_base(m)?);
    ctx.submit_timeout = Duration::from_secs(timeout_secs.max(1));

    let staging = out_dir.join(".packpress-staging");
    let session = Session::new(Arc::new(HttpBackend::new(ctx)), staging.clone());

    let rx = session.subscribe();
    let ui_task = tokio::spawn(run_progress_ui(rx, msgs));

    if !session.select_path(&file).await? {
        let snap = session.snapshot().await;
        let reason = snap.error.unwrap_or_else(|| "rejected".to_string());
        let _ = ui_task.await;
        anyhow::bail!("{}: {}", msgs.rejected, reason);
    }

    let request = OptimizeRequest::new(quality, max_size)?;
    let attempt = session.start_optimize(request).await?;
    session.wait_attempt(attempt).await;

    let snap = session.snapshot().await;
    let _ = ui_task.await;

    match snap.state {
        SessionState::Success => {
            if let Some(stats) = &snap.stats {
                println!();
                println!("{}:", msgs.summary_header);
                println!("  {:<24} {}", msgs.original_label, fmt_bytes(stats.original_size));
                println!("  {:<24} {}", msgs.optimized_label, fmt_bytes(stats.optimized_size));
                println!("  {:<24} {:.1}%", msgs.ratio_label, stats.compression_ratio);
                println!(
                    "  {:<24} {}/{}",
                    msgs.files_label, stats.optimized_files, stats.total_files
                );
                println!("  {:<24} {}", msgs.bytes_saved_label, fmt_bytes(stats.bytes_saved));
                println!("  {:<24} {}", msgs.actual_saved_label, fmt_bytes(stats.actual_bytes_saved));
                if !stats.file_types.is_empty() {
                    println!("  {}:", msgs.categories_header);
                    for (name, c) in &stats.file_types {
                        println!(
                            "    {:<8} count={} optimized={} saved={}",
                            name,
                            c.count,
                            c.optimized,
                            fmt_bytes(c.saved)
                        );
                    }
                }
            }

            let dest = session.download_to(&out_dir).await?;
            println!("{} {}", msgs.saved_to, dest.display());

            session.reset().await;
            let _ = tokio::fs::remove_dir(&staging).await;
            Ok(())
        }
        _ => {
            let reason = snap.error.unwrap_or_else(|| "unknown error".to_string());
            session.reset().await;
            let _ = tokio::fs::remove_dir(&staging).await;
            anyhow::bail!("{}: {}", msgs.optimize_failed, reason);
        }
    }
}

async fn run_check(m: &clap::ArgMatches) -> anyhow::Result<()> {
    let msgs = messages(Locale::from_str(m.get_one::<String>("locale").unwrap()));
    let file: PathBuf = m.get_one::<String>("file").unwrap().into();

    let ctx = ApiContext::new(resolve_api_base(m)?);
    let session = Session::new(
        Arc::new(HttpBackend::new(ctx)),
        std::env::temp_dir().join("packpress-staging"),
    );

    if session.select_path(&file).await? {
        println!("{}: {}", msgs.check_valid, file.display());
        Ok(())
    } else {
        let snap = session.snapshot().await;
        let reason = snap.error.unwrap_or_else(|| "rejected".to_string());
        anyhow::bail!("{}: {}", msgs.check_invalid, reason)
    }
}

/// Consume session events until a submission reaches a terminal state or the
/// channel closes, driving one spinner.
async fn run_progress_ui(
    mut rx: tokio::sync::broadcast::Receiver<SessionEvent>,
    msgs: &'static Messages,
) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {wide_msg}")
            .expect("progress template")
            .tick_chars("|/-\\ "),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(msgs.selecting.to_string());

    loop {
        let evt = match rx.recv().await {
            Ok(e) => e,
            Err(_) => break,
        };
        match evt {
            SessionEvent::FileAccepted { name, size } => {
                pb.set_message(format!("{}: {} ({})", msgs.accepted, name, fmt_bytes(size)));
            }
            SessionEvent::FileRejected { reason } => {
                pb.finish_and_clear();
                eprintln!("{} {}: {}", msgs.error_prefix, msgs.rejected, reason);
                break;
            }
            SessionEvent::AdvisoryRejected { name, reason } => {
                pb.finish_and_clear();
                eprintln!("{} {} ({}): {}", msgs.error_prefix, msgs.advisory_rejected, name, reason);
                break;
            }
            SessionEvent::UploadStarted { name, size, .. } => {
                pb.set_message(format!("{}: {} ({})", msgs.uploading, name, fmt_bytes(size)));
            }
            SessionEvent::StatsReady { stats, .. } => {
                pb.set_message(format!(
                    "{}: {}/{} ({:.1}%)",
                    msgs.optimize_done, stats.optimized_files, stats.total_files, stats.compression_ratio
                ));
            }
            SessionEvent::ArtifactReady { filename, size, .. } => {
                pb.set_message(format!("{} ({})", filename, fmt_bytes(size)));
            }
            SessionEvent::Error { scope, message } => {
                pb.finish_and_clear();
                eprintln!("{} {}: {}", msgs.error_prefix, scope, message);
            }
            SessionEvent::Info { scope, message } => {
                pb.println(format!("{} {}: {}", msgs.info_prefix, scope, message));
            }
            SessionEvent::StateChanged { state } => match state {
                SessionState::Success => {
                    pb.finish_with_message(msgs.optimize_done.to_string());
                    break;
                }
                SessionState::Error => {
                    pb.finish_and_clear();
                    break;
                }
                _ => {}
            },
        }
    }
}

fn fmt_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let f = n as f64;
    if f >= GB {
        format!("{:.2}GiB", f / GB)
    } else if f >= MB {
        format!("{:.2}MiB", f / MB)
    } else if f >= KB {
        format!("{:.2}KiB", f / KB)
    } else {
        format!("{}B", n)
    }
}
