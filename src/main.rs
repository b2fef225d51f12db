use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reference_checker::config::{find_config_file, get_config, init_config, load_config, Config};
use reference_checker::consistency::NumberingConvention;
use reference_checker::extract::{extract_entities, extract_with_reference_list, ExtractionError};
use reference_checker::report::{annotate, render_text, to_json};
use reference_checker::sources::SourceRegistry;
use reference_checker::ui::{is_terminal, print_status, Status, VerificationProgress};
use reference_checker::utils::{HttpClient, VerificationCache};
use reference_checker::verify::VerificationOrchestrator;
use reference_checker::{check_document, CheckOptions, CheckOutcome};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reference Checker - Verify citations and reference lists of manuscripts
#[derive(Parser, Debug)]
#[command(name = "reference-checker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify the citations and reference list of a manuscript", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for the report
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Severity-grouped human-readable report
    Text,
    /// JSON format (machine-readable)
    Json,
}

/// Citation style of the manuscript
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Style {
    #[value(name = "gbt7714")]
    Gbt7714,
    #[value(name = "ieee")]
    Ieee,
    #[value(name = "vancouver")]
    Vancouver,
    #[value(name = "ams")]
    Ams,
}

impl Style {
    fn convention(self) -> NumberingConvention {
        match self {
            Style::Gbt7714 | Style::Ieee | Style::Vancouver => NumberingConvention::CitationOrder,
            Style::Ams => NumberingConvention::Alphabetical,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check citations and references of a document
    #[command(alias = "c")]
    Check {
        /// Plain-text document to check
        document: PathBuf,

        /// Reference list kept in a separate file
        #[arg(long, short)]
        references: Option<PathBuf>,

        /// Treat every consistency issue as requiring revision
        #[arg(long)]
        strict: bool,

        /// Citation style, which decides whether numbering order is checked
        #[arg(long, value_enum, default_value_t = Style::Gbt7714)]
        style: Style,

        /// Report format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write the report to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write a copy of the document with inline flags
        #[arg(long)]
        annotate: Option<PathBuf>,

        /// Skip online verification entirely
        #[arg(long)]
        offline: bool,

        /// Re-verify references even when cached results exist
        #[arg(long)]
        refresh: bool,

        /// Maximum number of references verified at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Give up on unfinished verifications after this many seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Disable the verification cache for this run
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the citations and references found in a document as JSON
    #[command(alias = "x")]
    Extract {
        /// Plain-text document
        document: PathBuf,

        /// Reference list kept in a separate file
        #[arg(long, short)]
        references: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write it (default: ./reference-checker.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Process exit codes
///
/// Codes 0 to 3 describe the document. Anything that stops the run before
/// or after checking (bad configuration, unwritable `--output`) exits with
/// `FAILED` so it cannot be mistaken for findings.
mod exit {
    pub const CLEAN: u8 = 0;
    pub const FINDINGS: u8 = 1;
    /// No reference section, or the document could not be read
    pub const EXTRACTION_FAILED: u8 = 2;
    pub const UNAVAILABLE: u8 = 3;
    pub const FAILED: u8 = 4;
}

/// Print environment variables documentation
fn print_env_vars() {
    println!("Environment Variables:");
    println!();
    println!("API Keys:");
    println!("  NCBI_API_KEY                NCBI E-utilities key (higher PubMed rate limits)");
    println!("  CROSSREF_MAILTO             Contact address for the Crossref polite pool");
    println!();
    println!("Configuration Overrides (REFERENCE_CHECKER__<SECTION>__<KEY>):");
    println!("  REFERENCE_CHECKER__VERIFICATION__MAX_CONCURRENT     References verified at once (default: 4)");
    println!("  REFERENCE_CHECKER__VERIFICATION__REQUESTS_PER_SECOND  Outbound request rate (default: 3)");
    println!("  REFERENCE_CHECKER__VERIFICATION__TIMEOUT_SECS       Per-request timeout (default: 15)");
    println!("  REFERENCE_CHECKER__VERIFICATION__MAX_RETRIES        Retries on transient errors (default: 2)");
    println!("  REFERENCE_CHECKER__THRESHOLDS__SEARCH_MATCH         Search confidence to accept a match (default: 0.85)");
    println!("  REFERENCE_CHECKER__VERIFICATION__BREAKER_FAILURES   Failures before a provider is skipped (default: 5)");
    println!("  REFERENCE_CHECKER__CACHE__ENABLED                   Enable the verification cache (default: true)");
    println!("  REFERENCE_CHECKER__CACHE__DIRECTORY                 Custom cache directory");
    println!("  REFERENCE_CHECKER__LOGGING__FORMAT                  \"json\" for structured logs");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export NCBI_API_KEY=\"your-key-here\"");
    println!("  export REFERENCE_CHECKER__VERIFICATION__MAX_CONCURRENT=\"8\"");
}

fn init_logging(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("reference_checker={}", level)),
    );
    let json = config.logging.is_json();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn load_configuration(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display()));
    }
    match find_config_file() {
        Some(path) => load_config(&path)
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(get_config()),
    }
}

/// Read an input document; an unreadable input is an extraction failure
fn read_input(path: &Path) -> Result<String, u8> {
    std::fs::read_to_string(path).map_err(|err| {
        print_status(
            Status::Error,
            &format!("Cannot read {}: {}", path.display(), err),
        );
        exit::EXTRACTION_FAILED
    })
}

fn write_or_print(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

fn report_extraction_error(err: &ExtractionError) -> ExitCode {
    print_status(Status::Error, &format!("Extraction failed: {}", err));
    eprintln!("  hint: {}", err.hint());
    ExitCode::from(exit::EXTRACTION_FAILED)
}

/// Verification was attempted but nothing could be checked
fn verification_unavailable(outcome: &CheckOutcome) -> bool {
    let attempted: Vec<_> = outcome
        .extraction
        .references
        .iter()
        .filter(|r| r.is_verifiable())
        .filter_map(|r| outcome.results.get(&r.index))
        .collect();
    !attempted.is_empty() && attempted.iter().all(|r| r.could_not_check())
}

/// Exit code for a completed check
///
/// An offline run never reports the lookup services as unavailable.
fn exit_code(outcome: &CheckOutcome, offline: bool) -> u8 {
    if !offline && verification_unavailable(outcome) {
        exit::UNAVAILABLE
    } else if outcome.report.has_findings() {
        exit::FINDINGS
    } else {
        exit::CLEAN
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            print_status(Status::Error, &format!("{:#}", err));
            ExitCode::from(exit::FAILED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.env {
        print_env_vars();
        return Ok(ExitCode::from(exit::CLEAN));
    }

    let mut config = load_configuration(cli.config.as_deref())?;
    init_logging(&cli, &config);

    match cli.command {
        Some(Commands::Check {
            document,
            references,
            strict,
            style,
            format,
            output,
            annotate: annotate_path,
            offline,
            refresh,
            concurrency,
            deadline,
            timeout,
            no_cache,
        }) => {
            if let Some(concurrency) = concurrency {
                config.verification.max_concurrent = concurrency.max(1);
            }
            if let Some(deadline) = deadline {
                config.verification.run_deadline_secs = Some(deadline);
            }
            if let Some(timeout) = timeout {
                config.verification.timeout_secs = timeout;
            }
            if no_cache {
                config.cache.enabled = false;
            }

            let text = match read_input(&document) {
                Ok(text) => text,
                Err(code) => return Ok(ExitCode::from(code)),
            };
            let mut options = CheckOptions::new(document.display().to_string())
                .convention(style.convention())
                .strict(strict);
            if let Some(path) = &references {
                match read_input(path) {
                    Ok(list) => options = options.reference_list(list),
                    Err(code) => return Ok(ExitCode::from(code)),
                }
            }

            let registry = if offline {
                tracing::info!("Offline mode: skipping online verification");
                SourceRegistry::new()
            } else {
                let client = HttpClient::with_user_agent(
                    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
                    config.verification.requests_per_second,
                    config.verification.timeout(),
                )
                .context("Failed to create HTTP client")?;
                SourceRegistry::from_config(&config, client)
            };

            let document_key = VerificationCache::document_key(&document.display().to_string());
            let cache = VerificationCache::from_config(&config.cache);
            if cache.is_enabled() {
                tracing::debug!("Using cache key {}", document_key);
            }

            let progress = (!cli.quiet && !offline).then(|| VerificationProgress::new(0));
            let mut orchestrator = VerificationOrchestrator::new(registry, &config)
                .with_cache(cache, document_key)
                .refresh(refresh);
            if let Some(progress) = &progress {
                orchestrator = orchestrator.on_progress(progress.callback());
            }

            let outcome = match check_document(&text, &orchestrator, &config, &options).await {
                Ok(outcome) => outcome,
                Err(err) => return Ok(report_extraction_error(&err)),
            };
            let report = &outcome.report;

            if let Some(progress) = &progress {
                progress.finish(report.summary.verified, report.summary.total_references);
            }

            let rendered = match format {
                OutputFormat::Json => to_json(report).context("Failed to serialize report")?,
                OutputFormat::Text => render_text(report, output.is_none() && is_terminal()),
            };
            write_or_print(output.as_deref(), &rendered)?;

            if let Some(path) = &annotate_path {
                let annotated = annotate(&text, &outcome.extraction.citations, report);
                std::fs::write(path, annotated)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    print_status(
                        Status::Info,
                        &format!("Annotated copy written to {}", path.display()),
                    );
                }
            }

            let code = exit_code(&outcome, offline);
            match code {
                exit::UNAVAILABLE => print_status(
                    Status::Error,
                    "No reference could be checked; the lookup services appear to be unavailable",
                ),
                exit::FINDINGS if !cli.quiet => print_status(
                    Status::Warning,
                    &format!("Assessment: {}", report.assessment),
                ),
                exit::CLEAN if !cli.quiet => print_status(Status::Success, "No problems found"),
                _ => {}
            }
            Ok(ExitCode::from(code))
        }

        Some(Commands::Extract {
            document,
            references,
        }) => {
            let text = match read_input(&document) {
                Ok(text) => text,
                Err(code) => return Ok(ExitCode::from(code)),
            };
            let extraction = match &references {
                Some(path) => match read_input(path) {
                    Ok(list) => extract_with_reference_list(&text, &list, &config.extraction),
                    Err(code) => return Ok(ExitCode::from(code)),
                },
                None => extract_entities(&text, &config.extraction),
            };

            match extraction {
                Ok(extraction) => {
                    let json = serde_json::to_string_pretty(&extraction)
                        .context("Failed to serialize extraction")?;
                    println!("{}", json);
                    Ok(ExitCode::from(exit::CLEAN))
                }
                Err(err) => Ok(report_extraction_error(&err)),
            }
        }

        Some(Commands::InitConfig { path, force }) => {
            let path = path.unwrap_or_else(|| PathBuf::from("reference-checker.toml"));
            init_config(&path, force)
                .with_context(|| format!("Failed to write config file {}", path.display()))?;
            if !cli.quiet {
                print_status(
                    Status::Success,
                    &format!("Configuration written to {}", path.display()),
                );
            }
            Ok(ExitCode::from(exit::CLEAN))
        }

        None => {
            print_status(
                Status::Info,
                "No command given. Run with --help to see available commands.",
            );
            Ok(ExitCode::from(exit::CLEAN))
        }
    }
}
