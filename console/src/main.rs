use anyhow::{anyhow, Result};
#[cfg(feature = "watch")]
use audit_api::CreateAuditResponse;
#[cfg(feature = "watch")]
use audit_api::RunStatus;
use audit_api::{ApiClient, AuditListItem};
use clap::{Parser, Subcommand};
#[cfg(feature = "report")]
use clap::ValueEnum;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
#[cfg(feature = "watch")]
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Debug, Parser)]
#[command(name = "audit-console", version, about = "Console for the website audit service")]
struct Cli {
    /// Backend base URL (overrides AUDIT_CONSOLE_API_BASE and config)
    #[arg(long, global = true, value_name = "URL")]
    api_base: Option<String>,
    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    /// Optional config file (YAML). If omitted, loads ./audit-console.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "report")]
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SeverityFilter {
    Critical,
    Important,
    Info,
}

#[cfg(feature = "report")]
impl From<SeverityFilter> for audit_api::IssueSeverity {
    fn from(filter: SeverityFilter) -> Self {
        match filter {
            SeverityFilter::Critical => audit_api::IssueSeverity::Critical,
            SeverityFilter::Important => audit_api::IssueSeverity::Important,
            SeverityFilter::Info => audit_api::IssueSeverity::Info,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Submit a URL for analysis
    Submit {
        /// Absolute http(s) URL or bare domain (a path is allowed)
        url: String,
        /// Keep polling the new run until it reaches a terminal status
        #[arg(long, default_value_t = false)]
        watch: bool,
        /// Poll interval in milliseconds
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
    /// List known audits with their latest run
    List {
        /// Include pretty-printed result JSON for finished audits
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Output file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Poll every pending run until the whole list settles
    #[cfg(feature = "watch")]
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
    /// Fetch a published report by token and render it
    #[cfg(feature = "report")]
    Report {
        /// Share token from a completed audit
        token: String,
        /// Only list issues with this severity
        #[arg(long, value_enum)]
        severity: Option<SeverityFilter>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let json = cli.json;
    let api_base_flag = cli.api_base.clone();
    let loaded_cfg = config::load_config(cli.config.as_deref());
    match cli.command {
        Commands::Version => {
            println!(
                "audit-console {} (core {})",
                env!("CARGO_PKG_VERSION"),
                console_core::version()
            );
        }
        Commands::Submit {
            url,
            watch,
            interval_ms,
        } => {
            let checked = console_core::validate::check_url(&url)
                .map_err(|e| anyhow!("invalid url: {e}"))?;
            #[cfg(not(feature = "watch"))]
            if watch {
                let _ = interval_ms;
                return Err(anyhow!(
                    "this build does not include watch support; rebuild with --features watch"
                ));
            }
            // Resolved before the POST; a rejected interval must not
            // create an audit.
            #[cfg(feature = "watch")]
            let interval = if watch {
                Some(poll_interval(interval_ms, loaded_cfg.as_ref())?)
            } else {
                None
            };
            let api = api_client(api_base_flag.as_deref(), loaded_cfg.as_ref())?;
            let rt = tokio::runtime::Runtime::new()?;
            let created = rt.block_on(api.create_audit(checked.as_str()))?;
            if json {
                if !watch {
                    println!("{}", serde_json::to_string(&created)?);
                }
            } else {
                println!(
                    "audit created: auditId={} runId={} status={} url={}",
                    created.audit_id, created.run_id, created.status, created.normalized_url
                );
            }
            #[cfg(feature = "watch")]
            if let Some(interval) = interval {
                let mut list = run_watch::WatchList::default();
                list.upsert_front(entry_from_create(checked.as_str(), &created));
                rt.block_on(run_watch::watch(&api, &mut list, interval, |l| {
                    if !json {
                        print_tick(l);
                    }
                }));
                if let Some(entry) = list.get(created.run_id) {
                    if json {
                        println!("{}", serde_json::to_string(entry)?);
                    } else {
                        print_entry(entry, true);
                        match (entry.status, entry.report_token.as_deref()) {
                            (RunStatus::Completed, Some(token)) => {
                                println!("report ready: audit-console report {token}");
                            }
                            (RunStatus::Failed, _) => {
                                let reason = rt
                                    .block_on(api.run_status(created.run_id))
                                    .ok()
                                    .and_then(|s| s.last_error);
                                match reason {
                                    Some(reason) => println!("run failed: {reason}"),
                                    None => println!("run failed."),
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        Commands::List { full, out, csv } => {
            if csv && out.is_none() {
                return Err(anyhow!("--csv requires --out <file>"));
            }
            let api = api_client(api_base_flag.as_deref(), loaded_cfg.as_ref())?;
            let rt = tokio::runtime::Runtime::new()?;
            let mut items = rt.block_on(api.list_audits())?;
            // Newest first when the backend dated the entries.
            items.sort_by(|a, b| {
                console_core::rfc3339_desc(a.created_at.as_deref(), b.created_at.as_deref())
            });
            if let Some(path) = out {
                if csv {
                    write_csv(&path, &items)?;
                } else {
                    write_text(&path, &items, full)?;
                }
                println!("wrote {} entries to {}", items.len(), path.display());
            } else if json {
                println!("{}", serde_json::to_string(&items)?);
            } else if items.is_empty() {
                println!("no audits yet.");
            } else {
                for item in &items {
                    print_entry(item, full);
                }
            }
        }
        #[cfg(feature = "watch")]
        Commands::Watch { interval_ms } => {
            let interval = poll_interval(interval_ms, loaded_cfg.as_ref())?;
            let api = api_client(api_base_flag.as_deref(), loaded_cfg.as_ref())?;
            let rt = tokio::runtime::Runtime::new()?;
            let items = rt.block_on(api.list_audits())?;
            let mut list = run_watch::WatchList::from_list(items);
            if list.is_settled() {
                if json {
                    println!("{}", serde_json::to_string(list.entries())?);
                } else {
                    for entry in list.entries() {
                        print_entry(entry, false);
                    }
                    println!("nothing pending.");
                }
            } else {
                if !json {
                    for entry in list.entries() {
                        print_entry(entry, false);
                    }
                    println!("polling every {} ms...", interval.as_millis());
                }
                rt.block_on(run_watch::watch(&api, &mut list, interval, |l| {
                    if !json {
                        print_tick(l);
                    }
                }));
                if json {
                    println!("{}", serde_json::to_string(list.entries())?);
                } else {
                    println!("all runs settled:");
                    for entry in list.entries() {
                        print_entry(entry, false);
                    }
                }
            }
        }
        #[cfg(feature = "report")]
        Commands::Report { token, severity } => {
            let api = api_client(api_base_flag.as_deref(), loaded_cfg.as_ref())?;
            let rt = tokio::runtime::Runtime::new()?;
            match rt.block_on(api.fetch_report(&token)) {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        let opts = report_render::RenderOptions {
                            severity: severity.map(Into::into),
                            token: Some(token.as_str()),
                        };
                        print!("{}", report_render::render_report(&report, &opts));
                    }
                }
                Err(err) if err.is_not_found() => {
                    if json {
                        println!(
                            "{}",
                            serde_json::json!({
                                "error": "not_found",
                                "token": console_core::abbrev_token(&token),
                            })
                        );
                    } else {
                        eprintln!("report not found: the token is unknown or the link expired.");
                    }
                    std::process::exit(1);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
    Ok(())
}

/// Resolution order for the backend address: flag, environment, config
/// file, built-in default.
fn api_client(flag: Option<&str>, cfg: Option<&config::Config>) -> Result<ApiClient> {
    let api_cfg = cfg.and_then(|c| c.api.clone()).unwrap_or_default();
    let base = flag
        .map(str::to_string)
        .or_else(|| {
            std::env::var("AUDIT_CONSOLE_API_BASE")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
        .or(api_cfg.base_url)
        .unwrap_or_else(|| audit_api::DEFAULT_BASE_URL.to_string());
    let timeout_ms = api_cfg.timeout_ms.unwrap_or(audit_api::DEFAULT_TIMEOUT_MS);
    tracing::debug!(%base, timeout_ms, "api base resolved");
    Ok(ApiClient::new(&base, timeout_ms)?)
}

/// Flag wins over config, config over the built-in default. A zero
/// interval, from either source, is rejected.
#[cfg(feature = "watch")]
fn poll_interval(flag_ms: Option<u64>, cfg: Option<&config::Config>) -> Result<Duration> {
    let ms = flag_ms
        .or_else(|| cfg.and_then(|c| c.watch.as_ref()).and_then(|w| w.interval_ms))
        .unwrap_or(run_watch::DEFAULT_INTERVAL_MS);
    if ms == 0 {
        return Err(anyhow!("--interval-ms must be > 0"));
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(feature = "watch")]
fn entry_from_create(input_url: &str, created: &CreateAuditResponse) -> AuditListItem {
    AuditListItem {
        audit_id: created.audit_id,
        input_url: input_url.to_string(),
        normalized_url: created.normalized_url.clone(),
        run_id: created.run_id,
        status: created.status,
        created_at: None,
        finished_at: None,
        result_json: None,
        report_token: None,
    }
}

fn entry_line(item: &AuditListItem) -> String {
    let mut line = format!(
        "[{}] runId={} auditId={} {}",
        item.status, item.run_id, item.audit_id, item.normalized_url
    );
    if let Some(created) = item.created_at.as_deref() {
        line.push_str(&format!(" created={created}"));
    }
    if let Some(finished) = item.finished_at.as_deref() {
        line.push_str(&format!(" finished={finished}"));
    }
    if let Some(token) = item.report_token.as_deref() {
        line.push_str(&format!(" report={token}"));
    }
    line
}

/// One entry as it appears on screen and in `--out` text exports: the
/// summary line, then the pretty-printed result or a placeholder when
/// `full` is set.
fn render_entry(item: &AuditListItem, full: bool) -> String {
    let mut text = entry_line(item);
    if full {
        match item.result_json.as_deref() {
            Some(raw) => {
                for line in console_core::pretty_json(raw).lines() {
                    text.push_str("\n    ");
                    text.push_str(line);
                }
            }
            None if item.status.is_terminal() => text.push_str("\n    no result payload."),
            None => text.push_str("\n    waiting for result..."),
        }
    }
    text
}

fn print_entry(item: &AuditListItem, full: bool) {
    println!("{}", render_entry(item, full));
}

#[cfg(feature = "watch")]
fn print_tick(list: &run_watch::WatchList) {
    let states: Vec<String> = list
        .entries()
        .iter()
        .filter(|e| !e.status.is_terminal())
        .map(|e| format!("runId={} {}", e.run_id, e.status))
        .collect();
    if !states.is_empty() {
        println!("pending {}: {}", states.len(), states.join(", "));
    }
}

fn write_text(path: &Path, items: &[AuditListItem], full: bool) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for item in items {
        writeln!(w, "{}", render_entry(item, full))?;
    }
    w.flush()?;
    Ok(())
}

fn write_csv(path: &Path, items: &[AuditListItem]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(File::create(path)?);
    wtr.write_record([
        "audit_id",
        "run_id",
        "status",
        "input_url",
        "normalized_url",
        "created_at",
        "finished_at",
        "report_token",
    ])?;
    for item in items {
        wtr.write_record([
            item.audit_id.to_string(),
            item.run_id.to_string(),
            item.status.to_string(),
            item.input_url.clone(),
            item.normalized_url.clone(),
            item.created_at.clone().unwrap_or_default(),
            item.finished_at.clone().unwrap_or_default(),
            item.report_token.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
