use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use trialex_core::config_file::{self, ConfigFile};
use trialex_core::{
    AnthropicClient, BatchReport, Config, ModelBackend, PdfBackend, ProgressEvent, Session,
    Upload, is_pdf_path, process_files,
};
use trialex_pdf_mupdf::MupdfBackend;
use trialex_reporting::ExportFormat;

mod output;
mod shell;

use output::ColorMode;

/// Research Paper Data Extractor - pull trial metadata out of PDFs with an LLM
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable debug logging for trialex crates
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract data from PDF files and export it in one go
    Extract {
        /// PDF files to process, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory for the exported file
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Export format: xlsx (default), csv or json
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,

        /// Only print the results; do not write an export file
        #[arg(long)]
        no_export: bool,
    },

    /// Start an interactive session (add, process, show, clear, export)
    Session {
        /// PDF files to queue at startup
        files: Vec<PathBuf>,

        /// Default directory for exports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Default export format: xlsx (default), csv or json
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,
    },
}

/// Settings resolved from CLI flags > env vars > config file > defaults.
struct Resolved {
    config: Config,
    output_dir: PathBuf,
    format: ExportFormat,
}

fn resolve(
    file: &ConfigFile,
    model: Option<String>,
    output_dir: Option<PathBuf>,
    format: Option<ExportFormat>,
) -> anyhow::Result<Resolved> {
    let mut config = Config::from_file(file);
    if let Some(model) = model.or_else(|| std::env::var("TRIALEX_MODEL").ok()) {
        config.model = model;
    }

    let export = file.export.clone().unwrap_or_default();
    let output_dir = output_dir
        .or_else(|| std::env::var("TRIALEX_OUTPUT_DIR").ok().map(PathBuf::from))
        .or_else(|| export.output_dir.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let format = match format {
        Some(f) => f,
        None => match export.format {
            Some(s) => s.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            None => ExportFormat::default(),
        },
    };

    Ok(Resolved {
        config,
        output_dir,
        format,
    })
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "trialex=debug,trialex_core=debug,trialex_pdf_mupdf=debug,trialex_reporting=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// Reject missing files and anything without a `.pdf` extension.
pub(crate) fn validate_pdf_paths(paths: &[PathBuf]) -> anyhow::Result<()> {
    for path in paths {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        if !is_pdf_path(path) {
            anyhow::bail!("Not a PDF file: {}", path.display());
        }
    }
    Ok(())
}

/// Run one batch with a progress bar on stderr.
pub(crate) async fn run_batch(
    uploads: &[Upload],
    session: &mut Session,
    pdf: &dyn PdfBackend,
    model: &dyn ModelBackend,
    config: &Config,
    color: ColorMode,
) -> BatchReport {
    let bar = ProgressBar::new(uploads.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/dim} {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }

    let report = process_files(uploads, session, pdf, model, config, |event| {
        bar.println(output::progress_line(&event, color));
        match event {
            ProgressEvent::Processing { filename, .. } => bar.set_message(filename),
            ProgressEvent::Extracted { .. } | ProgressEvent::Failed { .. } => bar.inc(1),
            ProgressEvent::Truncated { .. } => {}
        }
    })
    .await;

    bar.finish_and_clear();
    report
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;
    let color = ColorMode(!cli.no_color);

    // The credential is checked before anything else touches a file.
    let api_key = trialex_core::resolve_api_key()?;
    let file_config = config_file::load_config();

    match cli.command {
        Command::Extract {
            files,
            output_dir,
            format,
            model,
            no_export,
        } => {
            let resolved = resolve(&file_config, model, output_dir, format)?;
            extract(files, api_key, resolved, no_export, color).await
        }
        Command::Session {
            files,
            output_dir,
            format,
            model,
        } => {
            let resolved = resolve(&file_config, model, output_dir, format)?;
            session(files, api_key, resolved, color).await
        }
    }
}

async fn extract(
    files: Vec<PathBuf>,
    api_key: String,
    resolved: Resolved,
    no_export: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    validate_pdf_paths(&files)?;
    let uploads: Vec<Upload> = files.into_iter().map(Upload::from_path).collect();

    let client = AnthropicClient::new(api_key, &resolved.config);
    tracing::info!(?client, files = uploads.len(), "starting extraction");
    let pdf = MupdfBackend::new();
    let mut session = Session::new();

    let report = run_batch(
        &uploads,
        &mut session,
        &pdf,
        &client,
        &resolved.config,
        color,
    )
    .await;

    let export = (!no_export).then_some((resolved.format, resolved.output_dir.as_path()));
    report_and_export(&mut std::io::stdout(), &report, &session, export, color)
}

/// Print the batch outcome, then write the export if one was requested.
///
/// If the export cannot be written, every record is printed in full before
/// the error is returned, so the extracted values still reach the user.
pub(crate) fn report_and_export(
    out: &mut dyn Write,
    report: &BatchReport,
    session: &Session,
    export: Option<(ExportFormat, &Path)>,
    color: ColorMode,
) -> anyhow::Result<()> {
    output::print_batch_summary(out, report, color)?;
    writeln!(out)?;
    output::print_records_table(out, session.snapshot(), color)?;

    let Some((format, dir)) = export else {
        return Ok(());
    };
    if session.is_empty() {
        return Ok(());
    }

    match trialex_reporting::write_export(session.snapshot(), format, dir) {
        Ok(path) => {
            writeln!(out)?;
            output::print_export_written(out, &path, session.len(), color)?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, dir = %dir.display(), "export failed");
            writeln!(out)?;
            output::print_record_details(out, session.snapshot(), color)?;
            anyhow::bail!("Error creating export file: {e}")
        }
    }
}

async fn session(
    files: Vec<PathBuf>,
    api_key: String,
    resolved: Resolved,
    color: ColorMode,
) -> anyhow::Result<()> {
    let client = AnthropicClient::new(api_key, &resolved.config);
    let pdf = MupdfBackend::new();
    let mut shell = shell::Shell::new(
        &pdf,
        &client,
        &resolved.config,
        resolved.format,
        resolved.output_dir.clone(),
        color,
    );

    let mut stdout = std::io::stdout();
    if !files.is_empty() {
        shell
            .execute(shell::ShellCommand::Add(files), &mut stdout)
            .await?;
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    shell.run(&mut input, &mut stdout).await
}
