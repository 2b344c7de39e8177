//! CLI Application logic
//!
//! Contains the command-line interface implementation.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use embedscope_core::config::DEFAULT_CONFIG_FILE;
use embedscope_core::{CommentStyle, Position, ScopeService, Settings, TextDocument, Token};

/// Log filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "warn";

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for tool consumption
    Json,
}

#[derive(Parser)]
#[command(name = "embedscope")]
#[command(author, version, about = "Which language is the cursor in?", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./embedscope.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by the position-based commands
#[derive(clap::Args)]
struct PositionArgs {
    /// Input document
    input: PathBuf,

    /// 0-based line
    #[arg(short, long)]
    line: usize,

    /// 0-based UTF-16 column
    #[arg(short, long)]
    character: usize,

    /// Root scope of the document grammar
    #[arg(short, long)]
    root_scope: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the scope stack at a position
    Scopes(PositionArgs),

    /// Print the comment style that applies at a position
    CommentStyle(PositionArgs),

    /// Dump the tokens of a document
    Tokens {
        /// Input document
        input: PathBuf,

        /// Only print this 0-based line
        #[arg(short, long)]
        line: Option<usize>,

        /// Root scope of the document grammar
        #[arg(short, long)]
        root_scope: Option<String>,

        /// Output format (text or json)
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// Run the CLI application
///
/// This is the main entry point for the command-line interface.
/// It parses arguments and dispatches to the appropriate command.
pub fn run_cli() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let output = runtime.block_on(async {
        match cli.command {
            Commands::Scopes(args) => {
                scopes_command(
                    &args.input,
                    Position::new(args.line, args.character),
                    args.root_scope.as_deref(),
                    args.format,
                    &settings,
                )
                .await
            }
            Commands::CommentStyle(args) => {
                comment_style_command(
                    &args.input,
                    Position::new(args.line, args.character),
                    args.root_scope.as_deref(),
                    args.format,
                    &settings,
                )
                .await
            }
            Commands::Tokens {
                input,
                line,
                root_scope,
                format,
            } => tokens_command(&input, line, root_scope.as_deref(), format, &settings).await,
        }
    })?;

    print!("{}", output);
    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG`
fn init_tracing() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter for the given `RUST_LOG` directives; warnings only when unset,
/// empty or unparsable
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Scope stack at `position` in `input`
pub async fn scopes_command(
    input: &Path,
    position: Position,
    root_scope: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<String> {
    let doc = read_document(input)?;
    let service = ScopeService::from_settings(settings);
    let root_scope = root_scope.unwrap_or(service.root_scope()).to_string();

    let scopes = service
        .scopes_at(&doc, position, Some(root_scope.as_str()))
        .await;

    match format {
        OutputFormat::Json => {
            let value = json!({
                "line": position.line,
                "character": position.character,
                "rootScope": root_scope,
                "scopes": scopes,
            });
            to_json(&value)
        }
        OutputFormat::Text => Ok(match scopes {
            Some(scopes) => scopes.iter().map(|scope| format!("{}\n", scope)).collect(),
            None => format!(
                "No scopes at {}:{} (grammar {} unavailable or position out of range)\n",
                position.line, position.character, root_scope
            ),
        }),
    }
}

/// Comment style at `position` in `input`
pub async fn comment_style_command(
    input: &Path,
    position: Position,
    root_scope: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<String> {
    let doc = read_document(input)?;
    let service = ScopeService::from_settings(settings);

    let style = service.comment_style_at(&doc, position, root_scope).await;

    match format {
        OutputFormat::Json => {
            let value = json!({
                "style": style,
                "open": style.open(),
                "close": style.close(),
            });
            to_json(&value)
        }
        OutputFormat::Text => Ok(format!("{}\n", style)),
    }
}

#[derive(Serialize)]
struct LineReport<'a> {
    line: usize,
    tokens: &'a [Token],
}

/// Tokens of every line of `input`, or of one line
pub async fn tokens_command(
    input: &Path,
    line: Option<usize>,
    root_scope: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<String> {
    let doc = read_document(input)?;
    let service = ScopeService::from_settings(settings);

    let lines = service
        .tokenize(&doc, root_scope)
        .await
        .with_context(|| format!("Failed to tokenize {}", input.display()))?;

    if let Some(line) = line {
        if line >= lines.len() {
            anyhow::bail!(
                "Line {} is out of range ({} has {} lines)",
                line,
                input.display(),
                lines.len()
            );
        }
    }

    let reports: Vec<LineReport<'_>> = lines
        .iter()
        .enumerate()
        .filter(|(index, _)| line.map_or(true, |line| line == *index))
        .map(|(index, tokens)| LineReport {
            line: index,
            tokens,
        })
        .collect();

    match format {
        OutputFormat::Json => to_json(&reports),
        OutputFormat::Text => {
            let mut out = String::new();
            for report in &reports {
                for token in report.tokens {
                    let _ = writeln!(
                        out,
                        "{}:{}-{} {}",
                        report.line,
                        token.start_index,
                        token.end_index,
                        token.scopes.join(" ")
                    );
                }
            }
            Ok(out)
        }
    }
}

/// Load settings from a config file or use defaults
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            read_settings(path)
        }
        None => {
            let candidate = Path::new(DEFAULT_CONFIG_FILE);
            if candidate.exists() {
                return read_settings(candidate);
            }
            Ok(Settings::default())
        }
    }
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let mut settings = Settings::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    // Grammar directories are relative to the config file
    if let Some(base) = path.parent() {
        settings.grammars.rebase(base);
    }
    debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn read_document(input: &Path) -> Result<TextDocument> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    Ok(TextDocument::new(&content))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    json.push('\n');
    Ok(json)
}
