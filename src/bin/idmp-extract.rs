//! CLI binary for idmp-extract.
//!
//! `serve` runs the web UI; `analyze` runs the same pipeline over files on
//! disk. Both map CLI flags onto `SessionConfig`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use idmp_extract::{
    generate_wordcloud, process_paths, serve, ExtractError, ProgressCallback, SessionConfig,
    SessionOutcome, SessionProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One line per document above a bar counting analysed documents.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analyzing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map_or(0.0, |t| t.elapsed().as_secs_f64())
    }
}

impl SessionProgressCallback for CliProgressCallback {
    fn on_session_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(error.lines().next().unwrap_or(error)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_session_complete(&self, total_documents: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} document(s) analysed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} document(s) analysed  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Web UI on http://127.0.0.1:8501
  idmp-extract serve

  # Analyse files, print a summary
  idmp-extract analyze label.pdf leaflet.pdf

  # Write text, word cloud and layout JSON per document
  idmp-extract analyze *.pdf -o out/

  # Everything as one JSON document
  idmp-extract analyze --json label.pdf > session.json

ENVIRONMENT VARIABLES:
  FORM_RECOGNIZER_ENDPOINT     Form Recognizer resource endpoint (required)
  FORM_RECOGNIZER_KEY          Form Recognizer subscription key (required)
  FORM_RECOGNIZER_API_VERSION  REST API version (default 2023-07-31)
  FORM_RECOGNIZER_MODEL        Analysis model (default prebuilt-layout)
  PDFIUM_LIB_PATH              Path to libpdfium (file or directory)
  RUST_LOG                     Log filter, overrides -v / -q

A .env file in the working directory is loaded first.
"#;

/// Upload PDFs, run Form Recognizer layout analysis, browse word clouds.
#[derive(Parser, Debug)]
#[command(
    name = "idmp-extract",
    version,
    about = "Upload PDFs, run Form Recognizer layout analysis, and browse word clouds",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IDMP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IDMP_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Form Recognizer endpoint URL.
    #[arg(long, global = true, env = "FORM_RECOGNIZER_ENDPOINT", hide_env_values = true)]
    endpoint: Option<String>,

    /// Form Recognizer subscription key.
    #[arg(long, global = true, env = "FORM_RECOGNIZER_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Analysis model id.
    #[arg(long, global = true, env = "FORM_RECOGNIZER_MODEL", default_value = "prebuilt-layout")]
    model_id: String,

    /// REST API version.
    #[arg(long, global = true, env = "FORM_RECOGNIZER_API_VERSION", default_value = "2023-07-31")]
    api_version: String,

    /// Delay between operation polls in milliseconds.
    #[arg(long, global = true, env = "IDMP_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, env = "IDMP_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Documents analysed at once.
    #[arg(short, long, global = true, env = "IDMP_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web UI.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "IDMP_BIND", default_value = "127.0.0.1:8501")]
        bind: SocketAddr,
    },
    /// Analyse PDF files from disk.
    Analyze {
        /// PDF files, processed in the given order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write `<name>.txt`, `<name>.wordcloud.png` and `<name>.layout.json` here.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the whole session as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Disable the progress bar.
        #[arg(long, env = "IDMP_NO_PROGRESS")]
        no_progress: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = match cli.command {
        Command::Analyze {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SessionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli.service, progress)?;

    match cli.command {
        Command::Serve { bind } => {
            if let Err(e) = config.credentials() {
                warn!("{}", e);
            }
            if !cli.quiet {
                eprintln!("{} {}", green("◆"), bold(&format!("http://{bind}")));
            }
            serve(config, bind)
                .await
                .with_context(|| format!("Server on {bind} failed"))?;
        }
        Command::Analyze {
            files,
            output,
            json,
            ..
        } => {
            let outcome = process_paths(&files, &config)
                .await
                .context("Analysis failed")?;

            if let Some(ref dir) = output {
                write_outputs(&outcome, dir, &config).await?;
            }

            if json {
                let json =
                    serde_json::to_string_pretty(&outcome).context("Failed to serialise session")?;
                println!("{json}");
            } else if !cli.quiet {
                print_summary(&outcome);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `SessionConfig`.
fn build_config(args: &ServiceArgs, progress: Option<ProgressCallback>) -> Result<SessionConfig> {
    let mut builder = SessionConfig::builder()
        .endpoint(args.endpoint.clone().unwrap_or_default())
        .key(args.key.clone().unwrap_or_default())
        .model_id(&args.model_id)
        .api_version(&args.api_version)
        .poll_interval_ms(args.poll_interval_ms)
        .request_timeout_secs(args.request_timeout)
        .concurrency(args.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(outcome: &SessionOutcome) {
    for (key, record) in outcome.store.iter() {
        println!(
            "{}  {} chars  {} pages  {} tables  {} paragraphs",
            bold(key),
            record.text.chars().count(),
            record.analysis.page_count(),
            record.analysis.table_count(),
            record.analysis.paragraph_count(),
        );
    }
    for failure in &outcome.failures {
        eprintln!("{} {}", red("✗"), failure);
    }
    eprintln!(
        "{}",
        dim(&format!(
            "{}/{} documents in {}ms",
            outcome.stats.succeeded, outcome.stats.documents, outcome.stats.duration_ms
        ))
    );
}

/// Write text, word cloud and layout per stored document.
async fn write_outputs(outcome: &SessionOutcome, dir: &Path, config: &SessionConfig) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for (key, stem) in outcome.store.export_stems() {
        let Some(record) = outcome.store.get(key) else {
            continue;
        };

        let text_path = dir.join(format!("{stem}.txt"));
        tokio::fs::write(&text_path, &record.text)
            .await
            .with_context(|| format!("Failed to write {}", text_path.display()))?;

        let layout_path = dir.join(format!("{stem}.layout.json"));
        let layout =
            serde_json::to_vec_pretty(&record.analysis).context("Failed to serialise layout")?;
        tokio::fs::write(&layout_path, layout)
            .await
            .with_context(|| format!("Failed to write {}", layout_path.display()))?;

        let text = record.text.clone();
        let wc_config = config.wordcloud.clone();
        let png = tokio::task::spawn_blocking(move || generate_wordcloud(&text, &wc_config)?.to_png())
            .await
            .context("Word cloud task panicked")?;
        match png {
            Ok(png) => {
                let png_path = dir.join(format!("{stem}.wordcloud.png"));
                tokio::fs::write(&png_path, png)
                    .await
                    .with_context(|| format!("Failed to write {}", png_path.display()))?;
            }
            Err(ExtractError::NoWords) => warn!("'{}': no words for a word cloud", key),
            Err(e) => return Err(e).with_context(|| format!("Word cloud for '{key}' failed")),
        }
    }
    Ok(())
}
