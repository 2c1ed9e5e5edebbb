//! Command-line interface for lpm.
//!
//! Scans a directory tree for projects, prints them as a table or JSON, and
//! deletes project directories on explicit request.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lpm_core::{
    delete_project_directory, CancellationToken, Classification, Config, DefaultScanner,
    Project, ProjectFilter, ScanEvent, ScanReport, ScanSummary,
};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Local project manager - find, classify, and prune your projects
#[derive(Parser, Debug)]
#[command(name = "lpm", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: <config dir>/lpm/config.toml)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a directory tree and list the projects found
    #[command(alias = "s")]
    Scan(ScanArgs),
    /// Delete a project directory
    Prune(PruneArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Root directory to scan (default: configured path or current directory)
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON instead of a table
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Sorting profile for results
    #[arg(short = 's', long = "sort", value_enum, default_value_t = SortProfile::Path)]
    sort: SortProfile,

    /// Only show projects in this category
    #[arg(short = 'f', long = "filter", value_enum, default_value_t = FilterArg::All)]
    filter: FilterArg,

    /// Skip recursive size computation
    #[arg(long = "no-size")]
    no_size: bool,

    /// Don't descend into directories that contain .git
    #[arg(long = "exclude-nested")]
    exclude_nested: bool,

    /// Additional ignore pattern (can be specified multiple times)
    #[arg(short = 'i', long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Match ignore patterns case-insensitively
    #[arg(long = "ignore-case")]
    ignore_case: bool,

    /// Number of worker threads
    #[arg(long = "jobs", value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    jobs: Option<u16>,
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Project directory to delete
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Actually delete; without this flag nothing is removed
    #[arg(long = "yes")]
    yes: bool,
}

/// Sorting profiles for organizing results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortProfile {
    /// Sort alphabetically by project name
    Name,
    /// Sort alphabetically by full path
    Path,
    /// Sort by last modification (newest first)
    Recent,
    /// Sort by size (largest first)
    Size,
    /// Group by classification, then by path
    Classification,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Active,
    Wip,
    Dormant,
    Stale,
    Prunable,
}

impl From<FilterArg> for ProjectFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => ProjectFilter::All,
            FilterArg::Active => ProjectFilter::Active,
            FilterArg::Wip => ProjectFilter::Wip,
            FilterArg::Dormant => ProjectFilter::Dormant,
            FilterArg::Stale => ProjectFilter::Stale,
            FilterArg::Prunable => ProjectFilter::Prunable,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    debug!("Parsed CLI arguments: {:?}", cli);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan(args) => run_scan(&config, args),
        Commands::Prune(args) => run_prune(args),
    }
}

fn run_scan(config: &Config, args: ScanArgs) -> Result<()> {
    let mut scan_config = config
        .scan_config(args.root)
        .context("Failed to build scan configuration")?;
    scan_config.ignore_patterns.extend(args.ignore);
    if args.no_size {
        scan_config.compute_size = false;
    }
    if args.exclude_nested {
        scan_config.exclude_nested_git_repos = true;
    }
    if args.ignore_case {
        scan_config.case_insensitive_ignore = true;
    }
    if let Some(jobs) = args.jobs {
        scan_config.jobs = Some(usize::from(jobs));
    }

    info!(root = %scan_config.root_path.display(), "Scanning");

    let handle = DefaultScanner::new().scan_streaming(scan_config, CancellationToken::new());
    let mut found = 0usize;
    let mut result = None;
    for event in handle.events().iter() {
        match event {
            ScanEvent::Batch(batch) => {
                found += batch.len();
                info!(found, "Projects found so far");
            }
            ScanEvent::Finished(r) => {
                result = Some(r);
                break;
            }
        }
    }
    let report = result
        .context("Scan ended without a result")?
        .context("Failed to scan for projects")?;

    let now = Utc::now();
    let mut projects: Vec<Project> = report.filter(args.filter.into()).cloned().collect();
    sort_projects(&mut projects, args.sort);

    if args.json {
        output_json(&projects)
    } else {
        output_table(&projects, &report, now);
        Ok(())
    }
}

fn run_prune(args: PruneArgs) -> Result<()> {
    if !args.yes {
        println!(
            "Would delete {} (re-run with --yes to delete)",
            args.path.display()
        );
        return Ok(());
    }

    delete_project_directory(&args.path)
        .with_context(|| format!("Failed to delete {}", args.path.display()))?;
    println!("Deleted {}", args.path.display());
    Ok(())
}

/// Sorts projects according to the specified profile
fn sort_projects(projects: &mut [Project], profile: SortProfile) {
    match profile {
        SortProfile::Name => {
            projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        }
        SortProfile::Path => {
            projects.sort_by(|a, b| a.path.cmp(&b.path));
        }
        SortProfile::Recent => {
            projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        }
        SortProfile::Size => {
            // Unknown sizes sort last.
            projects.sort_by(|a, b| {
                let a_size = a.size_mb.unwrap_or(-1.0);
                let b_size = b.size_mb.unwrap_or(-1.0);
                b_size.total_cmp(&a_size)
            });
        }
        SortProfile::Classification => {
            projects.sort_by(|a, b| {
                a.classification
                    .cmp(&b.classification)
                    .then_with(|| a.path.cmp(&b.path))
            });
        }
    }
}

/// Outputs projects as JSON to stdout
fn output_json(projects: &[Project]) -> Result<()> {
    let json =
        serde_json::to_string_pretty(projects).context("Failed to serialize projects to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Outputs projects as a formatted table to stdout
fn output_table(projects: &[Project], report: &ScanReport, now: DateTime<Utc>) {
    if projects.is_empty() {
        println!("No projects found.");
        print_summary(report);
        return;
    }

    let name_width = projects
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(10)
        .clamp(4, 30);
    let class_width = 16;
    let type_width = 8;
    let age_width = 9;
    let size_width = 10;
    let status_width = 6;

    println!(
        "{:<name_width$}  {:<class_width$}  {:<type_width$}  {:<age_width$}  {:>size_width$}  {:<status_width$}  PATH",
        "NAME", "CLASS", "TYPE", "MODIFIED", "SIZE", "STATUS",
    );
    println!(
        "{}",
        "=".repeat(name_width + class_width + type_width + age_width + size_width + status_width + 16)
    );

    for project in projects {
        let class = if project.is_prunable {
            format!("{} *", project.classification)
        } else {
            project.classification.to_string()
        };
        let size = project
            .size_mb
            .map(|s| format!("{:.1} MB", s))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<name_width$}  {:<class_width$}  {:<type_width$}  {:<age_width$}  {:>size_width$}  {:<status_width$}  {}",
            truncate(&project.name, name_width),
            class,
            truncate(&project.project_type.to_string(), type_width),
            project.age_display(now),
            size,
            project.status_icons(now),
            project.path.display(),
        );
    }

    println!();
    print_summary(report);
}

fn print_summary(report: &ScanReport) {
    let counts = report.counts();
    let count = |c: Classification| counts.get(&c).copied().unwrap_or(0);
    let prunable = report.projects.iter().filter(|p| p.is_prunable).count();

    println!(
        "{} projects: {} active, {} work-in-progress, {} dormant, {} stale ({} prunable, marked *)",
        report.projects.len(),
        count(Classification::Active),
        count(Classification::Wip),
        count(Classification::Dormant),
        count(Classification::Stale),
        prunable,
    );

    if let Some(line) = skip_line(&report.summary) {
        println!("{}", line);
    }
    if report.summary.cancelled {
        println!("Scan was cancelled; results are partial.");
    }
}

/// The skip report line, if anything was skipped.
fn skip_line(summary: &ScanSummary) -> Option<String> {
    (summary.total_skipped() > 0).then(|| {
        format!(
            "Skipped {} unreadable and {} vanished entries; {} git repositories could not be read",
            summary.skipped_permission, summary.vanished, summary.git_read_errors,
        )
    })
}

/// Truncates a string to a maximum width, adding "..." if truncated
/// Unicode-safe version that respects character boundaries
fn truncate(s: &str, max_width: usize) -> String {
    let char_count = s.chars().count();

    if char_count <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        "...".to_string()
    } else {
        s.chars().take(max_width - 3).collect::<String>() + "..."
    }
}
