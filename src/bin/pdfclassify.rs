//! CLI binary for pdfclassify.
//!
//! A thin shim over the library crate that maps CLI flags to `ScanConfig`,
//! runs the scan, applies the renamer and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfclassify::pipeline::llm::resolve_provider;
use pdfclassify::{
    read_results, run_scan, Adapters, ProgressCallback, RenameAction, RenameMode, Renamer,
    RunReport, ScanConfig, ScanProgressCallback, VisionOcr,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one bar over the documents of the run plus a
/// log line per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Classifying");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_documents} PDF(s)"))
        ));
    }

    fn on_document_start(&self, name: &str, _index: usize, _total: usize) {
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, name: &str, index: usize, total: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            name
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, name: &str, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_documents: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} document(s) classified",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} document(s) classified  ({} skipped)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify, write results.csv next to the scans, touch nothing else
  pdfclassify --pdf-in scans --pdf-out classified

  # Copy classified PDFs to descriptive names
  pdfclassify --pdf-in scans --pdf-out classified --copy

  # See what --move would do
  pdfclassify --pdf-in scans --pdf-out classified --move --dry-run

  # Recompute every artifact
  pdfclassify --pdf-in scans --pdf-out classified --force

  # OCR with a vision model instead of Tesseract
  pdfclassify --pdf-in scans --pdf-out classified --ocr-engine vision

OUTPUT LAYOUT:
  <pdf-in>/results.csv                 one row per classified PDF
  <pdf-out>/<name>.pdf-feature.csv     best-page fields per PDF
  <pdf-out>/all-features.csv           all feature tables combined
  <pdf-out>/work.d/<stem>/page_<n>.*   cached page image, OCR, features

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY / GOOGLE_API_KEY  Google Gemini key (default provider)
  OPENAI_API_KEY                   OpenAI key
  EDGEQUAKE_LLM_PROVIDER           Override provider (gemini, openai, ollama, ...)
  EDGEQUAKE_MODEL                  Override model ID
  PDFCLASSIFY_PDFIUM_LIB           libpdfium file or the directory holding it
  RUST_LOG                         Override the log filter

REQUIREMENTS:
  pdfium shared library; tesseract with the chosen language pack on PATH
  (unless --ocr-engine vision).
"#;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OcrEngineArg {
    Tesseract,
    Vision,
}

/// Classify scanned PDFs by date, type, sender and invoice number.
#[derive(Parser, Debug)]
#[command(
    name = "pdfclassify",
    version,
    about = "Classify scanned PDFs by date, type, sender and invoice number",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing the PDFs to classify.
    #[arg(long, env = "PDFCLASSIFY_PDF_IN")]
    pdf_in: PathBuf,

    /// Folder for work files, feature tables and renamed PDFs.
    #[arg(long, env = "PDFCLASSIFY_PDF_OUT")]
    pdf_out: PathBuf,

    /// Move classified PDFs to <pdf-out> under their new names.
    #[arg(long, conflicts_with = "copy")]
    r#move: bool,

    /// Copy classified PDFs to <pdf-out> under their new names.
    #[arg(long)]
    copy: bool,

    /// Report what --move/--copy would do without touching files.
    #[arg(long, env = "PDFCLASSIFY_DRY_RUN")]
    dry_run: bool,

    /// Recompute every artifact, ignoring the work area.
    #[arg(long, env = "PDFCLASSIFY_FORCE")]
    force: bool,

    /// Replace existing files in <pdf-out> when copying or moving.
    #[arg(long, env = "PDFCLASSIFY_OVERWRITE")]
    overwrite: bool,

    /// Do not write the results table.
    #[arg(long, env = "PDFCLASSIFY_NO_RESULTS")]
    no_results: bool,

    /// Results table file name, written into <pdf-in>.
    #[arg(long, env = "PDFCLASSIFY_RESULTS_NAME", default_value = "results.csv")]
    results_name: String,

    /// Do not write feature tables.
    #[arg(long, env = "PDFCLASSIFY_NO_FEATURES")]
    no_features: bool,

    /// Per-PDF feature table name; must contain {pdf_name}.
    #[arg(
        long,
        env = "PDFCLASSIFY_FEATURES_NAME_FMT",
        default_value = "{pdf_name}-feature.csv"
    )]
    features_name_fmt: String,

    /// OCR engine.
    #[arg(long, env = "PDFCLASSIFY_OCR_ENGINE", value_enum, default_value = "tesseract")]
    ocr_engine: OcrEngineArg,

    /// Tesseract language(s), e.g. deu or deu+eng.
    #[arg(long, env = "PDFCLASSIFY_LANG", default_value = "deu")]
    lang: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFCLASSIFY_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "PDFCLASSIFY_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Minimum milliseconds between two LLM calls.
    #[arg(long, env = "PDFCLASSIFY_LLM_INTERVAL_MS", default_value_t = 2000)]
    llm_interval_ms: u64,

    /// LLM model ID (e.g. gemini-2.0-flash-lite, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, ...
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// libpdfium file or the directory containing it.
    #[arg(long, env = "PDFCLASSIFY_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "PDFCLASSIFY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFCLASSIFY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFCLASSIFY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFCLASSIFY_QUIET")]
    quiet: bool,
}

impl Cli {
    fn rename_mode(&self) -> RenameMode {
        if self.r#move {
            RenameMode::Move
        } else if self.copy {
            RenameMode::Copy
        } else {
            RenameMode::None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let mut adapters = Adapters::from_config(&config);
    if cli.ocr_engine == OcrEngineArg::Vision {
        let provider = resolve_provider(&config).context("Vision OCR needs an LLM provider")?;
        adapters = adapters.with_ocr(Arc::new(VisionOcr::new(provider)));
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = run_scan(&config, adapters)
        .await
        .context("Classification failed")?;

    // ── Rename ───────────────────────────────────────────────────────────
    // Prefer the results table on disk so hand edits are honoured.
    let rows = if config.write_results {
        read_results(&config.results_path()).context("Failed to read results table")?
    } else {
        report.rows.clone()
    };
    let renamer = Renamer::new(&config.output_dir, cli.rename_mode())
        .dry_run(cli.dry_run)
        .overwrite(cli.overwrite);
    let outcomes = renamer
        .apply(&rows, &config.input_dir)
        .context("Failed to apply renames")?;

    if cli.json {
        let json = serde_json::json!({ "report": report, "renames": outcomes });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise report")?
        );
        return Ok(());
    }

    if !cli.quiet {
        for o in &outcomes {
            let name = o
                .target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = o
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let marker = match o.action {
                RenameAction::Failed(_) | RenameAction::MissingSource => red("✗"),
                RenameAction::SkippedExisting => cyan("⚠"),
                _ => green("→"),
            };
            println!("{marker} {source} {} {}", bold(&name), dim(&o.action.to_string()));
        }
        print_summary(&report, show_progress);
    }

    Ok(())
}

fn print_summary(report: &RunReport, progress_shown: bool) {
    let s = &report.stats;
    if !progress_shown {
        eprintln!(
            "Classified {}/{} documents in {}ms",
            s.classified_documents, s.total_documents, s.total_duration_ms
        );
        for doc in report.failed() {
            eprintln!(
                "  {} {}: {}",
                red("✗"),
                doc.file_name,
                doc.error.as_deref().unwrap_or_default()
            );
        }
    }
    eprintln!(
        "   {}",
        dim(&format!(
            "pages {}  rendered {}/{}  ocr {}/{}  features {}/{}  (run/reused)",
            s.total_pages,
            s.stages.images_rendered,
            s.stages.images_reused,
            s.stages.ocr_run,
            s.stages.ocr_reused,
            s.stages.features_run,
            s.stages.features_reused,
        ))
    );
    if s.failed_pages > 0 {
        eprintln!("   {} page(s) could not be read", s.failed_pages);
    }
}

/// Map CLI args to `ScanConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder()
        .input_dir(&cli.pdf_in)
        .output_dir(&cli.pdf_out)
        .force(cli.force)
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .ocr_language(cli.lang.clone())
        .llm_min_interval_ms(cli.llm_interval_ms)
        .write_features(!cli.no_features)
        .features_name_fmt(cli.features_name_fmt.clone())
        .write_results(!cli.no_results)
        .results_name(cli.results_name.clone());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
