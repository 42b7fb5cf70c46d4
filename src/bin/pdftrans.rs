//! CLI binary for edgequake-pdf-translate.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`, runs
//! one job through `JobRunner`, and writes the translated PDF.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_translate::{
    load_input, InMemoryJobStore, JobId, JobRunner, JobState, JobStatus, Pipeline, PipelineConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # English → Spanish (defaults)
  pdftrans scan.pdf -o scan.es.pdf

  # Other language pair
  pdftrans --from German --to English bericht.pdf -o report.pdf

  # From a URL, with a specific model
  pdftrans --provider openai --model gpt-4.1-mini https://example.com/flyer.pdf -o flyer.pdf

  # Final job status as JSON (result inlined as base64 when small)
  pdftrans --status-json doc.pdf -o doc.es.pdf > status.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Provider name (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model ID
  FONT_PATH               TrueType font for the overlay text
  WORKER_CONCURRENCY      Parallel page detection / concurrent jobs
  PDFIUM_LIB_PATH         Path to libpdfium if not installed system-wide
"#;

/// Translate the text of a PDF in place using an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdftrans",
    version,
    about = "Translate the text of a PDF in place using an LLM",
    long_about = "Detect text regions on every page of a PDF, blur the original text and \
draw the translation in the same position. The output is a new PDF with one image per page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Where to write the translated PDF. Default: <input>.translated.pdf
    #[arg(short, long, env = "PDFTRANS_OUTPUT")]
    output: Option<PathBuf>,

    /// Source language.
    #[arg(long = "from", env = "PDFTRANS_SOURCE_LANGUAGE", default_value = "English")]
    source_language: String,

    /// Target language.
    #[arg(long = "to", env = "PDFTRANS_TARGET_LANGUAGE", default_value = "Spanish")]
    target_language: String,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFTRANS_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Estimated-token budget per translation request.
    #[arg(long, env = "PDFTRANS_MAX_TOKENS_PER_REQUEST", default_value_t = 3000)]
    max_tokens_per_request: usize,

    /// Attempts per translation request, including the first.
    #[arg(long, env = "PDFTRANS_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// TrueType font for the overlay text.
    #[arg(long, env = "FONT_PATH")]
    font: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDFTRANS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the final job status as JSON on stdout.
    #[arg(long)]
    status_json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFTRANS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTRANS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTRANS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFTRANS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let started = Instant::now();
    let config = build_config(&cli).await?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    // ── Load input ───────────────────────────────────────────────────────
    let document = load_input(&cli.input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to load {}", cli.input))?;

    // ── Run one job ──────────────────────────────────────────────────────
    let pipeline = Arc::new(Pipeline::from_config(&config).context("Failed to set up pipeline")?);
    let runner = JobRunner::new(
        Arc::new(InMemoryJobStore::new()),
        pipeline,
        1,
        config.inline_result_limit,
    );
    let id = runner.submit(document).await.context("Failed to submit job")?;

    let status = if show_progress {
        watch_progress(&runner, &id).await?
    } else {
        runner.wait(&id).await.context("Failed to wait for job")?
    };

    if cli.status_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialise status")?
        );
    }

    if status.state == JobState::Failed {
        let error = status.error.unwrap_or_else(|| "unknown error".to_string());
        if !cli.quiet {
            eprintln!(
                "{} Translation failed at {}% ({}): {}",
                red("✘"),
                status.progress,
                status.stage,
                error
            );
        }
        anyhow::bail!("{}", error);
    }

    let output = runner.download(&id).await.context("Failed to fetch result")?;
    write_atomic(&output_path, &output)?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  {}  →  {}",
            green("✔"),
            dim(&format!("{} bytes", output.len())),
            dim(&format!("{:.1}s", started.elapsed().as_secs_f64())),
            bold(&output_path.display().to_string()),
        );
    }
    Ok(())
}

/// Poll the job and mirror its progress on a bar until it finishes.
async fn watch_progress(runner: &JobRunner, id: &JobId) -> Result<JobStatus> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.enable_steady_tick(Duration::from_millis(80));

    loop {
        let status = runner.status(id).await.context("Failed to query job")?;
        bar.set_prefix(format!("{:?}", status.phase));
        bar.set_position(status.progress as u64);
        bar.set_message(status.detail.clone());
        if status.state.is_terminal() {
            bar.finish_and_clear();
            return Ok(status);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Map CLI args to `PipelineConfig`, on top of the environment defaults.
async fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let env = PipelineConfig::from_env();

    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .concurrency(env.concurrency)
        .source_language(cli.source_language.clone())
        .target_language(cli.target_language.clone())
        .max_tokens_per_request(cli.max_tokens_per_request)
        .max_attempts(cli.max_attempts)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    let font = cli
        .font
        .as_deref()
        .and_then(|p| edgequake_pdf_translate::config::resolve_font_override(&p.to_string_lossy()))
        .or(env.font_path);
    if let Some(font) = font {
        builder = builder.font_path(font);
    }
    if let Some(url) = env.broker_url {
        builder = builder.broker_url(url);
    }
    if let Some(models) = env.ocr_models {
        builder = builder.ocr_models(models);
    }

    builder.build().context("Invalid configuration")
}

/// `doc.pdf` → `doc.translated.pdf`; URLs land in the current directory.
fn default_output_path(input: &str) -> PathBuf {
    let name = input
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("document.pdf");
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let file = format!("{stem}.translated.pdf");
    if input.starts_with("http://") || input.starts_with("https://") {
        PathBuf::from(file)
    } else {
        Path::new(input).with_file_name(file)
    }
}

/// Write through a temp file in the target directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("Failed to write output")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
