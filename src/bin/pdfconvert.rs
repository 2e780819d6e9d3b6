//! CLI binary for edgequake-pdfconvert.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdfconvert::{
    convert, convert_to_file, inspect, optimize_file, CommandConverter, ConversionConfig,
    ConversionProgressCallback, Delivery, OutputFormat, ProgressCallback, Rgb, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner per stage, switching to a page bar once
/// text extraction knows the page count.
struct CliProgressCallback {
    bar: ProgressBar,
    images: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            images: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
    }

    fn on_stage(&self, stage: Stage) {
        match stage {
            Stage::ConvertingToWord => self.bar.set_prefix("Converting"),
            Stage::OptimizingImages => self.bar.set_prefix("Optimizing"),
            Stage::ExtractingText => self.bar.set_prefix("Extracting"),
            Stage::Done => return,
        }
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_page_extracted(&self, _page_num: usize, _total_pages: usize, _chars: usize) {
        self.bar.inc(1);
    }

    fn on_image_optimized(&self, part: &str, bytes_before: usize, bytes_after: usize) {
        self.images.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<32}  {}",
            green("✓"),
            part,
            dim(&format!("{bytes_before} → {bytes_after} bytes")),
        ));
    }

    fn on_conversion_complete(&self, output_bytes: usize) {
        self.bar.finish_and_clear();
        let images = self.images.load(Ordering::SeqCst);
        if images > 0 {
            eprintln!(
                "{} {} bytes written, {} images recompressed",
                green("✔"),
                bold(&output_bytes.to_string()),
                images
            );
        } else {
            eprintln!("{} {} bytes written", green("✔"), bold(&output_bytes.to_string()));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word document with recompressed images
  pdfconvert convert report.pdf --format word -o report.docx

  # Plain text to stdout
  pdfconvert convert report.pdf --format extracted

  # Text file from a URL
  pdfconvert convert https://arxiv.org/pdf/1706.03762 --format text -o attention.txt

  # Keep images as they came out of the converter
  pdfconvert --no-optimize convert scan.pdf -o scan.docx

  # Recompress the images of an existing .docx on a white background
  pdfconvert --background white optimize big.docx -o small.docx

  # Inspect PDF metadata
  pdfconvert inspect report.pdf --json

  # Web form on http://127.0.0.1:8501
  pdfconvert serve

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH          Path to libpdfium (file or directory)
  PDFCONVERT_CONVERTER     Converter command, e.g. "pdf2docx convert {input} {output}"
  PDFCONVERT_JPEG_QUALITY  JPEG quality for embedded images (default 50)
  PDFCONVERT_BACKGROUND    Background behind transparent pixels (default black)
  RUST_LOG                 Tracing filter, overrides -v / -q

SETUP:
  Word output runs an external converter; the default needs
    pip install pdf2docx
  Text output needs the pdfium shared library next to the binary, on the
  library search path, or named by PDFIUM_LIB_PATH.
"#;

/// Convert PDF documents to Word or plain text.
#[derive(Parser, Debug)]
#[command(
    name = "pdfconvert",
    version,
    about = "Convert PDF documents to Word or plain text",
    long_about = "Convert PDF documents (local files or URLs) to an editable Word document \
with recompressed images, a plain-text file, or text printed to the terminal. \
`pdfconvert serve` runs the same conversions behind a browser form.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    options: ConfigArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFCONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFCONVERT_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFCONVERT_NO_PROGRESS")]
    no_progress: bool,
}

/// Flags shared by every subcommand that converts.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to the pdfium shared library (file or directory).
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "PDFCONVERT_PASSWORD")]
    password: Option<String>,

    /// JPEG quality for embedded images (1–100).
    #[arg(long, global = true, env = "PDFCONVERT_JPEG_QUALITY", default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Colour behind transparent pixels: black, white or #rrggbb.
    #[arg(long, global = true, env = "PDFCONVERT_BACKGROUND", default_value = "black")]
    background: String,

    /// Deliver the converter's DOCX without recompressing images.
    #[arg(long, global = true, env = "PDFCONVERT_NO_OPTIMIZE")]
    no_optimize: bool,

    /// Converter command line; `{input}` and `{output}` are replaced with paths.
    #[arg(long, global = true, env = "PDFCONVERT_CONVERTER")]
    converter: Option<String>,

    /// Kill the converter after this many seconds.
    #[arg(long, global = true, env = "PDFCONVERT_CONVERTER_TIMEOUT")]
    converter_timeout: Option<u64>,

    /// Directory for scratch files.
    #[arg(long, global = true, env = "PDFCONVERT_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDFCONVERT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a PDF file or URL.
    Convert {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Output format.
        #[arg(short, long, env = "PDFCONVERT_FORMAT", value_enum, default_value = "word")]
        format: FormatArg,

        /// Output path. Text formats print to stdout when omitted; Word
        /// output defaults to converted_document.docx.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print PDF metadata.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Print metadata as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Recompress the embedded images of an existing .docx.
    Optimize {
        /// Word document to optimize.
        input: PathBuf,

        /// Output path. Defaults to overwriting the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the web form.
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "PDFCONVERT_HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(long, env = "PDFCONVERT_PORT", default_value_t = 8501)]
        port: u16,

        /// Largest accepted upload in MiB.
        #[arg(long, env = "PDFCONVERT_MAX_UPLOAD_MB", default_value_t = 200)]
        max_upload_mb: usize,

        /// Drop sessions idle for this many seconds.
        #[arg(long, env = "PDFCONVERT_SESSION_IDLE_SECS", default_value_t = 3600)]
        session_idle_secs: u64,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Word,
    Text,
    Extracted,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Word => OutputFormat::WordDocument,
            FormatArg::Text => OutputFormat::TextFile,
            FormatArg::Extracted => OutputFormat::ExtractedText,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; serve always logs requests.
    let serving = is_serve(&cli.command);
    let show_progress = !cli.quiet && !cli.no_progress && !serving;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli.options, progress_cb)?;

    match cli.command {
        Command::Convert {
            input,
            format,
            output,
        } => run_convert(&input, format.into(), output, &config, cli.quiet).await,
        Command::Inspect { input, json } => run_inspect(&input, json, &config).await,
        Command::Optimize { input, output } => {
            let output = output.unwrap_or_else(|| input.clone());
            let report = optimize_file(&input, &output, &config)
                .await
                .context("Optimization failed")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} images recompressed, {} skipped  {} → {} bytes  →  {}",
                    green("✔"),
                    report.images_optimized,
                    report.images_skipped,
                    report.bytes_before,
                    report.bytes_after,
                    bold(&output.display().to_string()),
                );
            }
            Ok(())
        }
        #[cfg(feature = "server")]
        Command::Serve {
            host,
            port,
            max_upload_mb,
            session_idle_secs,
        } => {
            let server = edgequake_pdfconvert::server::ServerConfig {
                host,
                port,
                max_upload_bytes: max_upload_mb * 1024 * 1024,
                session_idle_timeout: Duration::from_secs(session_idle_secs),
                ..Default::default()
            };
            edgequake_pdfconvert::server::serve(config, server)
                .await
                .context("Server failed")
        }
    }
}

fn is_serve(command: &Command) -> bool {
    #[cfg(feature = "server")]
    if matches!(command, Command::Serve { .. }) {
        return true;
    }
    let _ = command;
    false
}

async fn run_convert(
    input: &str,
    format: OutputFormat,
    output: Option<PathBuf>,
    config: &ConversionConfig,
    quiet: bool,
) -> Result<()> {
    let output = match (output, format) {
        (Some(path), _) => Some(path),
        (None, OutputFormat::WordDocument) => format.filename().map(PathBuf::from),
        (None, _) => None,
    };

    if let Some(path) = output {
        let stats = convert_to_file(input, format, &path, config)
            .await
            .context("Conversion failed")?;
        if !quiet {
            eprintln!(
                "{}  {}  {}ms  →  {}",
                green("✔"),
                format,
                stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
            if format == OutputFormat::WordDocument {
                eprintln!(
                    "   {} images recompressed  /  {} skipped",
                    dim(&stats.images_optimized.to_string()),
                    dim(&stats.images_skipped.to_string()),
                );
            }
        }
        return Ok(());
    }

    let result = convert(input, format, config)
        .await
        .context("Conversion failed")?;
    let text = match result.delivery {
        Delivery::Inline { text, .. } => text.into_bytes(),
        Delivery::Download(artifact) => artifact.bytes.to_vec(),
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(&text)
        .context("Failed to write to stdout")?;
    if !text.ends_with(b"\n") {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

async fn run_inspect(input: &str, json: bool, config: &ConversionConfig) -> Result<()> {
    let meta = inspect(input, config)
        .await
        .context("Failed to inspect PDF")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
        );
        return Ok(());
    }

    println!("File:         {}", cyan(input));
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    if let Some(ref s) = meta.subject {
        println!("Subject:      {}", s);
    }
    println!("Pages:        {}", meta.page_count);
    println!("PDF Version:  {}", meta.pdf_version);
    if let Some(ref p) = meta.producer {
        println!("Producer:     {}", p);
    }
    if let Some(ref c) = meta.creator {
        println!("Creator:      {}", c);
    }
    if let Some(ref d) = meta.creation_date {
        println!("Created:      {}", dim(d));
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(args: &ConfigArgs, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let background = Rgb::parse(&args.background).context("Invalid --background")?;

    let mut builder = ConversionConfig::builder()
        .jpeg_quality(args.jpeg_quality)
        .background(background)
        .optimize_images(!args.no_optimize)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if let Some(ref path) = args.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(ref dir) = args.temp_dir {
        builder = builder.temp_dir(dir);
    }

    let converter = match args.converter {
        Some(ref line) => {
            let mut words = line.split_whitespace();
            let Some(program) = words.next() else {
                bail!("--converter must name a program");
            };
            CommandConverter::new(program, words)
        }
        None => CommandConverter::default(),
    };
    let converter = match args.converter_timeout {
        Some(secs) => converter.with_timeout(Duration::from_secs(secs)),
        None => converter,
    };
    builder = builder.converter(Arc::new(converter));

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
