//! Interactive session: queue PDFs, process them, inspect, clear and export.
//!
//! Records live only as long as the shell does.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use owo_colors::OwoColorize;
use trialex_core::{Config, ModelBackend, PdfBackend, Session, Upload};
use trialex_reporting::ExportFormat;

use crate::output::{self, ColorMode};
use crate::{run_batch, validate_pdf_paths};

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add(Vec<PathBuf>),
    Files,
    Process,
    Show { all: bool },
    Clear,
    Export {
        format: Option<ExportFormat>,
        dir: Option<PathBuf>,
    },
    Help,
    Quit,
}

const HELP: &str = "\
Commands:
  add <PDF>...               queue PDF files (quote paths with spaces)
  files                      list queued files
  process                    extract data from all queued files
  show [--all]               preview extracted data (--all prints every field)
  clear                      clear all extracted data
  export [FORMAT] [DIR]      write extracted data (xlsx, csv or json)
  help                       show this help
  quit                       leave the session (extracted data is discarded)";

/// Split a command line into words.
///
/// Whitespace separates words. Single or double quotes group a word that
/// contains spaces, and a backslash escapes a following space, quote or
/// backslash. Any other backslash is kept literally.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') if matches!(chars.peek(), Some('"' | '\\')) => {
                current.extend(chars.next());
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') if chars.peek().is_some_and(|n| escapable(*n)) => {
                current.extend(chars.next());
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".into());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn escapable(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '\\')
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let words = split_args(line)?;
    let Some((verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "add" | "upload" => {
            if args.is_empty() {
                return Err("usage: add <PDF>...".into());
            }
            ShellCommand::Add(args.iter().map(PathBuf::from).collect())
        }
        "files" | "ls" => ShellCommand::Files,
        "process" | "run" => ShellCommand::Process,
        "show" => match args {
            [] => ShellCommand::Show { all: false },
            [flag] if flag == "--all" || flag == "all" => ShellCommand::Show { all: true },
            _ => return Err("usage: show [--all]".into()),
        },
        "clear" => ShellCommand::Clear,
        "export" | "download" => {
            let mut format = None;
            let mut dir = None;
            for arg in args {
                match arg.parse::<ExportFormat>() {
                    Ok(f) if format.is_none() && dir.is_none() => format = Some(f),
                    _ if dir.is_none() => dir = Some(PathBuf::from(arg)),
                    _ => return Err("usage: export [FORMAT] [DIR]".into()),
                }
            }
            ShellCommand::Export { format, dir }
        }
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(cmd))
}

/// State owned by a running shell.
pub struct Shell<'a> {
    pub queued: Vec<Upload>,
    pub session: Session,
    pdf: &'a dyn PdfBackend,
    model: &'a dyn ModelBackend,
    config: &'a Config,
    default_format: ExportFormat,
    default_dir: PathBuf,
    color: ColorMode,
}

impl<'a> Shell<'a> {
    pub fn new(
        pdf: &'a dyn PdfBackend,
        model: &'a dyn ModelBackend,
        config: &'a Config,
        default_format: ExportFormat,
        default_dir: PathBuf,
        color: ColorMode,
    ) -> Self {
        Self {
            queued: Vec::new(),
            session: Session::new(),
            pdf,
            model,
            config,
            default_format,
            default_dir,
            color,
        }
    }

    /// Read commands from `input` until `quit` or end of input.
    pub async fn run(
        &mut self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        writeln!(out, "Research Paper Data Extractor - type 'help' for commands")?;
        loop {
            write!(out, "trialex> ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }

            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(ShellCommand::Quit)) => break,
                Ok(Some(cmd)) => self.execute(cmd, out).await?,
                Err(msg) => self.error(out, &msg)?,
            }
        }
        Ok(())
    }

    /// Run a single command. `Quit` is handled by [`Shell::run`].
    pub async fn execute(&mut self, cmd: ShellCommand, out: &mut dyn Write) -> anyhow::Result<()> {
        match cmd {
            ShellCommand::Add(paths) => match validate_pdf_paths(&paths) {
                Ok(()) => {
                    for path in paths {
                        let upload = Upload::from_path(path);
                        writeln!(out, "Queued {}", upload.filename)?;
                        self.queued.push(upload);
                    }
                }
                Err(e) => self.error(out, &e.to_string())?,
            },
            ShellCommand::Files => {
                if self.queued.is_empty() {
                    writeln!(out, "No files queued.")?;
                }
                for (i, upload) in self.queued.iter().enumerate() {
                    writeln!(out, "  {}. {}", i + 1, upload.filename)?;
                }
            }
            ShellCommand::Process => {
                if self.queued.is_empty() {
                    self.error(out, "no files queued (use 'add <PDF>...')")?;
                    return Ok(());
                }
                let uploads = std::mem::take(&mut self.queued);
                let report = run_batch(
                    &uploads,
                    &mut self.session,
                    self.pdf,
                    self.model,
                    self.config,
                    self.color,
                )
                .await;
                output::print_batch_summary(out, &report, self.color)?;
            }
            ShellCommand::Show { all } => {
                if all {
                    output::print_record_details(out, self.session.snapshot(), self.color)?;
                } else {
                    output::print_records_table(out, self.session.snapshot(), self.color)?;
                }
            }
            ShellCommand::Clear => {
                self.session.clear();
                if self.color.enabled() {
                    writeln!(out, "{}", "Data cleared!".green())?;
                } else {
                    writeln!(out, "Data cleared!")?;
                }
            }
            ShellCommand::Export { format, dir } => {
                let format = format.unwrap_or(self.default_format);
                let dir = dir.unwrap_or_else(|| self.default_dir.clone());
                match trialex_reporting::write_export(self.session.snapshot(), format, &dir) {
                    Ok(path) => {
                        output::print_export_written(out, &path, self.session.len(), self.color)?
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "export failed");
                        self.error(out, &format!("Error creating export file: {e}"))?;
                    }
                }
            }
            ShellCommand::Help => writeln!(out, "{HELP}")?,
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    fn error(&self, out: &mut dyn Write, msg: &str) -> std::io::Result<()> {
        if self.color.enabled() {
            writeln!(out, "{} {}", "error:".red(), msg)
        } else {
            writeln!(out, "error: {}", msg)
        }
    }
}
