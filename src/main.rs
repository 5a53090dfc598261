//! SiMidge CLI
//!
//! Surveys a Sims 2 download library for conflicting overrides, duplicate
//! meshes and string tables worth cleaning, and compares resources between
//! packages.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

use simidge::config::Settings;
use simidge::filter::{parse_content, parse_group, parse_instance, parse_type, GroupFilter, NameFilter, SearchFilter};
use simidge::registry::{Report, ScanSummary};
use simidge::simpe::compare_with_package;
use simidge::survey::{Survey, DEFAULT_SEARCH_TYPES};

/// SiMidge - conflict and string-table survey tool for Sims 2 packages
#[derive(Parser)]
#[command(name = "simidge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for reports
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Search packages for resources matching filters
    Search(SearchArgs),

    /// Find global overrides carried by more than one package
    Conflicts(ConflictsArgs),

    /// Find meshes overriding the shared Maxis mesh group
    Meshes(LibraryArgs),

    /// Find string tables with translations, empty strings or irregular records
    Strings(LibraryArgs),

    /// Compare resources between packages
    Compare(CompareArgs),

    /// Compare an extracted resource with its copy in objects.package
    Diff(DiffArgs),

    /// Show or change settings
    Config(ConfigArgs),
}

#[derive(Args)]
struct LibraryArgs {
    /// Directory to scan (defaults to the configured downloads folder)
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    /// Packages to search (defaults to the configured objects.package)
    files: Vec<PathBuf>,

    /// Search every package under this directory instead
    #[arg(short, long, conflicts_with = "files")]
    dir: Option<PathBuf>,

    /// Search the configured downloads folder instead
    #[arg(long, conflicts_with_all = ["files", "dir"])]
    downloads: bool,

    /// Resource type, e.g. BHAV or STR# (defaults to the common editable types)
    #[arg(short = 't', long = "type")]
    rtype: Option<String>,

    /// Group as 8 hex digits
    #[arg(short, long)]
    group: Option<String>,

    /// Instance as 4 or 8 hex digits
    #[arg(short, long)]
    instance: Option<String>,

    /// Text the resource name must contain
    #[arg(short, long)]
    name: Option<String>,

    /// Text (string types) or hex bytes the contents must contain
    #[arg(short, long)]
    content: Option<String>,
}

#[derive(Args)]
struct ConflictsArgs {
    /// Directory to scan instead of the downloads folder (property sets are skipped)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Only report conflicts with this package
    #[arg(short, long)]
    with: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CompareMode {
    /// Resources whose contents differ
    Changed,
    /// Resources present unchanged in several packages
    Unchanged,
    /// Resources present in only one package
    AddedRemoved,
}

#[derive(Args)]
struct CompareArgs {
    /// Packages to compare (at least two)
    #[arg(required = true, num_args = 2..)]
    files: Vec<PathBuf>,

    /// What to report
    #[arg(short, long, value_enum, default_value_t = CompareMode::Changed)]
    mode: CompareMode,
}

#[derive(Args)]
struct DiffArgs {
    /// The `.simpe.xml` descriptor of the extracted resource
    descriptor: PathBuf,

    /// Package holding the original (defaults to the configured objects.package)
    #[arg(short, long)]
    objects: Option<PathBuf>,
}

#[derive(Args)]
struct ConfigArgs {
    /// New downloads directory
    #[arg(long)]
    downloads: Option<PathBuf>,

    /// New objects.package path
    #[arg(long)]
    objects: Option<PathBuf>,
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };

    let filter = match level {
        Some(level) => EnvFilter::new(format!("warn,simidge={}", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,simidge=info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .with_file(verbosity >= 2)
        .with_line_number(verbosity >= 2)
        .init();
}

fn settings_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    match cli_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Settings::default_path().context("Cannot determine a settings directory; pass --config"),
    }
}

fn load_settings(cli_path: Option<&Path>) -> Result<Settings> {
    let path = settings_path(cli_path)?;
    Settings::load_or_create(&path).with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn print_report(report: &Report, summary: &ScanSummary, format: OutputFormat) -> Result<()> {
    debug!(
        scanned = summary.files_scanned,
        skipped = summary.files_skipped,
        matched = summary.stats.matched,
        "Scan finished"
    );
    match format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn library_dir(dir: Option<PathBuf>, config: Option<&Path>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(load_settings(config)?.paths.downloads),
    }
}

fn build_filter(args: &SearchArgs) -> Result<SearchFilter> {
    let rtype = args.rtype.as_deref().map(parse_type).transpose()?;
    let mut filter = match rtype {
        Some(rtype) => SearchFilter::new([rtype]),
        None => SearchFilter::new(DEFAULT_SEARCH_TYPES),
    };
    if let Some(group) = &args.group {
        filter = filter.with_group(GroupFilter::Exact(parse_group(group)?));
    }
    if let Some(instance) = &args.instance {
        filter = filter.with_instance(parse_instance(instance)?);
    }
    if let Some(name) = &args.name {
        filter = filter.with_name(NameFilter::contains(name));
    }
    if let Some(content) = &args.content {
        filter = filter.with_content(parse_content(rtype, content)?);
    }
    Ok(filter)
}

fn cmd_search(args: SearchArgs, format: OutputFormat, config: Option<&Path>) -> Result<()> {
    let survey = Survey::custom(build_filter(&args)?);

    let (report, summary) = if let Some(dir) = &args.dir {
        survey.run_directory(dir)?
    } else if args.downloads {
        survey.run_directory(&load_settings(config)?.paths.downloads)?
    } else if !args.files.is_empty() {
        survey.run_files(&args.files)
    } else {
        let objects = load_settings(config)?.paths.objects;
        survey.run_files(&[objects])
    };
    print_report(&report, &summary, format)
}

fn cmd_conflicts(args: ConflictsArgs, format: OutputFormat, config: Option<&Path>) -> Result<()> {
    let survey = match (&args.with, &args.dir) {
        (Some(_), _) => Survey::conflicts_with_file(),
        (None, Some(_)) => Survey::conflicts_in_folder(),
        (None, None) => Survey::conflicts(),
    };
    let dir = library_dir(args.dir, config)?;
    let (report, summary) = match &args.with {
        Some(package) => survey
            .run_seeded(package, &dir)
            .with_context(|| format!("Failed to scan {}", package.display()))?,
        None => survey.run_directory(&dir)?,
    };
    print_report(&report, &summary, format)
}

fn cmd_library(survey: Survey, args: LibraryArgs, format: OutputFormat, config: Option<&Path>) -> Result<()> {
    let dir = library_dir(args.dir, config)?;
    let (report, summary) = survey.run_directory(&dir)?;
    print_report(&report, &summary, format)
}

fn cmd_compare(args: CompareArgs, format: OutputFormat) -> Result<()> {
    let survey = match args.mode {
        CompareMode::Changed => Survey::compare_changed(),
        CompareMode::Unchanged => Survey::compare_unchanged(),
        CompareMode::AddedRemoved => Survey::compare_added_removed(),
    };
    let (report, summary) = survey.run_files(&args.files);
    print_report(&report, &summary, format)
}

fn cmd_diff(args: DiffArgs, format: OutputFormat, config: Option<&Path>) -> Result<()> {
    let objects = match args.objects {
        Some(objects) => objects,
        None => load_settings(config)?.paths.objects,
    };
    let diff = compare_with_package(&args.descriptor, &objects)
        .with_context(|| format!("Failed to compare {}", args.descriptor.display()))?;
    match format {
        OutputFormat::Text => println!("{}", diff),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, config: Option<&Path>) -> Result<()> {
    let path = settings_path(config)?;
    let mut settings = Settings::load_or_create(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if args.downloads.is_none() && args.objects.is_none() {
        println!("# {}", path.display());
        print!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    if let Some(downloads) = args.downloads {
        settings.paths.downloads = downloads;
    }
    if let Some(objects) = args.objects {
        settings.paths.objects = objects;
    }
    settings.validate().context("Invalid settings")?;
    settings
        .save(&path)
        .with_context(|| format!("Failed to save settings to {}", path.display()))?;
    println!("Saved settings to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Search(args) => cmd_search(args, cli.format, config),
        Commands::Conflicts(args) => cmd_conflicts(args, cli.format, config),
        Commands::Meshes(args) => cmd_library(Survey::duplicate_meshes(), args, cli.format, config),
        Commands::Strings(args) => cmd_library(Survey::translations(), args, cli.format, config),
        Commands::Compare(args) => cmd_compare(args, cli.format),
        Commands::Diff(args) => cmd_diff(args, cli.format, config),
        Commands::Config(args) => cmd_config(args, config),
    }
}
