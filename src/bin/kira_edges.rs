use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_edges::app::{App, FetchOptions, RunReport};
use kira_edges::config::{ConfigLoader, ResolvedConfig};
use kira_edges::error::EdgeError;
use kira_edges::http::ReqwestTransport;
use kira_edges::jobs;
use kira_edges::merge::MergeEngine;
use kira_edges::output::{JsonOutput, LogSink, OutputMode, print_run_summary};
use kira_edges::store::Store;

const EXIT_PARTIAL_FAILURE: u8 = 5;

#[derive(Parser)]
#[command(name = "kira-edges")]
#[command(about = "Fetch, normalize and merge biological interaction sources")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of a text summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Probe every configured alias, refetch stale ones and merge")]
    Run(RunArgs),
    #[command(about = "Report which aliases are stale without fetching")]
    Status(ConfigArgs),
    #[command(about = "Probe one source and print its versions")]
    Clean(CleanArgs),
    #[command(about = "List locally recorded source versions")]
    List(ConfigArgs),
    #[command(about = "Merge pre-sorted record files into one deduplicated file")]
    Merge(MergeArgs),
    #[command(about = "Classify scheduler jobs into a status report")]
    Jobs(JobsArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    no_merge: bool,

    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct CleanArgs {
    source: String,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
struct MergeArgs {
    #[arg(required = true)]
    inputs: Vec<Utf8PathBuf>,

    #[arg(long, short)]
    output: Utf8PathBuf,

    /// Fail on the first input line that breaks sort order.
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct JobsArgs {
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    file: Option<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<EdgeError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &EdgeError) -> u8 {
    match error {
        EdgeError::MissingConfig
        | EdgeError::ConfigRead(_)
        | EdgeError::ConfigParse(_)
        | EdgeError::UnknownSource(_)
        | EdgeError::UnknownAlias { .. } => 2,
        EdgeError::Probe { .. } | EdgeError::Http(_) | EdgeError::HttpStatus { .. } => 3,
        EdgeError::MergeIo(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Run(args) => {
            let mut config = load_config(&args.config)?;
            if let Some(workers) = args.workers.filter(|workers| *workers > 0) {
                config.workers = workers;
            }
            let options = FetchOptions {
                force: args.force,
                dry_run: args.dry_run,
                skip_merge: args.no_merge,
            };
            let app = build_app(&config)?;
            let report = app.run(&options, &LogSink)?;
            finish_run(&report, output_mode)
        }
        Commands::Status(args) => {
            let config = load_config(&args)?;
            let app = build_app(&config)?;
            let options = FetchOptions {
                dry_run: true,
                ..FetchOptions::default()
            };
            let report = app.run(&options, &LogSink)?;
            finish_run(&report, output_mode)
        }
        Commands::Clean(args) => {
            let config = load_config(&args.config)?;
            let app = build_app(&config)?;
            let report = app.clean(&args.source)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&report).into_diagnostic()?,
                OutputMode::Human => {
                    println!("{} ({})", report.source, report.base_url);
                    for alias in &report.aliases {
                        let version = alias.version.as_deref().unwrap_or("-");
                        let date = alias
                            .version_date
                            .map(|date| date.to_rfc3339())
                            .unwrap_or_else(|| "unsupported".to_string());
                        println!("  {} [{}] version={version} date={date}", alias.alias, alias.label);
                        if let Some(error) = &alias.error {
                            println!("      {error}");
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List(args) => {
            let config = load_config(&args)?;
            let store = Store::from_config(config.data_dir.as_deref(), config.cache_dir.as_deref())?;
            let states = store.list_local_states()?;
            match output_mode {
                OutputMode::Json => {
                    let entries: Vec<_> = states
                        .iter()
                        .map(|(key, state)| serde_json::json!({ "key": key.to_string(), "state": state }))
                        .collect();
                    JsonOutput::print(&entries).into_diagnostic()?;
                }
                OutputMode::Human => {
                    for (key, state) in &states {
                        println!(
                            "{key}\tversion={}\trecords={}\tfetched_at={}",
                            state.version,
                            state
                                .records
                                .map(|records| records.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                            state.fetched_at.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Merge(args) => {
            let stats = MergeEngine::new()
                .verify_sorted(args.verify)
                .merge(&args.inputs, &args.output)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&stats).into_diagnostic()?,
                OutputMode::Human => println!(
                    "merged {} lines ({} read) from {} files into {}",
                    stats.lines_written, stats.lines_read, stats.inputs, args.output
                ),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Jobs(args) => {
            let job_list = match (args.url, args.file) {
                (Some(url), _) => {
                    let transport = ReqwestTransport::new()?;
                    jobs::fetch_job_list(&transport, &url)?
                }
                (None, Some(file)) => {
                    let content = std::fs::read_to_string(&file)
                        .map_err(|err| EdgeError::JobList(format!("read {file}: {err}")))?;
                    jobs::parse_job_list(&content)?
                }
                (None, None) => return Err(miette::Report::msg("either --url or --file is required")),
            };
            print!("{}", jobs::render_report(&job_list));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(args: &ConfigArgs) -> miette::Result<ResolvedConfig> {
    Ok(ConfigLoader::resolve(args.config.as_deref())?)
}

fn build_app(config: &ResolvedConfig) -> miette::Result<App<ReqwestTransport>> {
    let store = Store::from_config(config.data_dir.as_deref(), config.cache_dir.as_deref())?;
    let transport = ReqwestTransport::new()?;
    Ok(App::from_config(store, transport, config)?)
}

fn finish_run(report: &RunReport, output_mode: OutputMode) -> miette::Result<ExitCode> {
    match output_mode {
        OutputMode::Json => JsonOutput::print(report).into_diagnostic()?,
        OutputMode::Human => print_run_summary(report),
    }
    if report.failed.is_empty() && !report.cancelled {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    }
}
