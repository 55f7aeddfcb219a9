use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bqrun_core::{Config, DependencyFact, ExtractorKind, Report, Severity};
use bqrun_dag::{analyze, render, OwnerIndex, Resolver};
use bqrun_make::{MakeInvocation, RuleSynthesizer, RESET_TARGET};
use bqrun_sql::{AlphadagExtractor, FactExtractor, SqlExtractor};

const CONFIG_FILE: &str = "bqrun.toml";

/// bqrun - Run a directory of BigQuery scripts in dependency order
#[derive(Parser)]
#[command(name = "bqrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: <dir>/bqrun.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory containing the .sql scripts
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Fact extractor: builtin, alphadag or alphadag-docker
    #[arg(long, global = true)]
    extractor: Option<ExtractorKind>,

    /// Defaults to `run`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the makefile and run every stale script
    Run {
        /// Maximum number of scripts run in parallel
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Print what would run without running it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Reject circular dependencies before calling make
        #[arg(long)]
        check_cycles: bool,
    },

    /// Remove every completion marker
    Clean,

    /// Render the table graph without running anything
    Graph {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = GraphFormat::Dot)]
        format: GraphFormat,

        /// Also write the analysis report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum GraphFormat {
    Dot,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(&cli)?;
    if let Some(kind) = cli.extractor {
        config.extractor = kind;
    }

    if cli.verbose {
        eprintln!("{} extractor: {:?}", "Using".cyan(), config.extractor);
    }

    let code = match cli.command {
        None => run_command(&config, &cli.dir, None, false, false).await?,
        Some(Commands::Run { parallel, dry_run, check_cycles }) => {
            run_command(&config, &cli.dir, parallel, dry_run, check_cycles).await?
        }
        Some(Commands::Clean) => clean_command(&config, &cli.dir).await?,
        Some(Commands::Graph { output, format, report }) => {
            graph_command(&config, &cli.dir, output.as_deref(), format, report.as_deref())?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let default_path = cli.dir.join(CONFIG_FILE);
    if default_path.exists() {
        Config::from_file(&default_path)
            .with_context(|| format!("failed to load config {}", default_path.display()))
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Ok(Config::default())
    }
}

fn extract_facts(config: &Config, dir: &Path) -> Result<Vec<DependencyFact>> {
    let facts = match config.extractor {
        ExtractorKind::Builtin => SqlExtractor::new().extract(dir),
        ExtractorKind::Alphadag => AlphadagExtractor::binary().extract(dir),
        ExtractorKind::AlphadagDocker => {
            AlphadagExtractor::docker(config.alphadag_image.as_str()).extract(dir)
        }
    };

    let facts = facts.context("dependency extraction failed")?;
    info!(extractor = ?config.extractor, facts = facts.len(), "extracted dependencies");
    Ok(facts)
}

/// Run command - extract, resolve, write the makefile and hand off to make
async fn run_command(
    config: &Config,
    dir: &Path,
    parallel: Option<usize>,
    dry_run: bool,
    check_cycles: bool,
) -> Result<i32> {
    let facts = extract_facts(config, dir)?;
    let resolver = Resolver::new(facts).context("dependency resolution failed")?;
    let graph = resolver.graph().context("dependency resolution failed")?;

    info!(origins = graph.len(), "resolved dependencies");

    if check_cycles || config.check_cycles {
        graph.check_acyclic()?;
        info!("no circular dependencies");
    }

    let makefile = dir.join(&config.makefile);
    RuleSynthesizer::from_config(config)
        .merge_into_file(&graph, &makefile, &config.sentinel)
        .with_context(|| format!("failed to write {}", makefile.display()))?;

    eprintln!(
        "{} {} rules to {}",
        "Wrote".green(),
        graph.len(),
        makefile.display()
    );

    let code = MakeInvocation::new(config.make_command.as_str(), config.makefile.as_str())
        .jobs(parallel.unwrap_or(config.parallel))
        .dry_run(dry_run)
        .run(dir)
        .await?;

    info!(code, "make finished");
    Ok(code)
}

/// Clean command - reset completion state
async fn clean_command(config: &Config, dir: &Path) -> Result<i32> {
    let makefile = dir.join(&config.makefile);
    if !makefile.exists() {
        anyhow::bail!("{} not found, nothing to clean", makefile.display());
    }

    let code = MakeInvocation::new(config.make_command.as_str(), config.makefile.as_str())
        .target(RESET_TARGET)
        .run(dir)
        .await?;

    Ok(code)
}

/// Graph command - render and analyze without running anything
fn graph_command(
    config: &Config,
    dir: &Path,
    output: Option<&Path>,
    format: GraphFormat,
    report_path: Option<&Path>,
) -> Result<i32> {
    let facts = extract_facts(config, dir)?;

    // rendering tolerates duplicate owners; the report flags them instead
    let owners = OwnerIndex::from_facts(&facts);
    let rendered = render(&facts, &owners);
    info!(nodes = rendered.nodes.len(), edges = rendered.edges.len(), "rendered graph");

    let text = match format {
        GraphFormat::Dot => rendered.to_dot(),
        GraphFormat::Json => rendered.to_json()?,
    };

    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", text),
    }

    let report = Report::from_diagnostics(analyze(&facts))
        .with_counts(facts.len(), rendered.nodes.len());

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    // keep stdout clean for the graph itself
    if output.is_some() || report_path.is_some() {
        print_report_summary(&report);
    }

    Ok(if report.has_errors() { 1 } else { 0 })
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Dependency Graph Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Scripts: {}", report.summary.origins);
    println!("Tables:  {}", report.summary.tables);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total diagnostics: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    if report.diagnostics.iter().all(|d| d.severity == Severity::Info) {
        println!("{}", "✓ Graph is ready to run".green().bold());
    }

    for diag in &report.diagnostics {
        let severity_str = match diag.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warn => "WARN".yellow().bold(),
            Severity::Info => "INFO".cyan(),
        };
        println!("  [{}] {}: {}", severity_str, diag.code, diag.message);
    }

    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["bqrun"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.dir, PathBuf::from("."));
    }

    #[test]
    fn run_flags() {
        let cli = Cli::try_parse_from(["bqrun", "-C", "sql", "run", "-p", "4", "-n"]).unwrap();
        match cli.command {
            Some(Commands::Run { parallel, dry_run, check_cycles }) => {
                assert_eq!(parallel, Some(4));
                assert!(dry_run);
                assert!(!check_cycles);
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.dir, PathBuf::from("sql"));
    }

    #[test]
    fn extractor_override() {
        let cli = Cli::try_parse_from(["bqrun", "--extractor", "alphadag-docker", "graph"]).unwrap();
        assert_eq!(cli.extractor, Some(ExtractorKind::AlphadagDocker));
        assert!(Cli::try_parse_from(["bqrun", "--extractor", "nope"]).is_err());
    }

    #[test]
    fn graph_format() {
        let cli = Cli::try_parse_from(["bqrun", "graph", "--format", "json", "-o", "g.json"]).unwrap();
        match cli.command {
            Some(Commands::Graph { format, output, report }) => {
                assert_eq!(format, GraphFormat::Json);
                assert_eq!(output, Some(PathBuf::from("g.json")));
                assert!(report.is_none());
            }
            _ => panic!("expected graph"),
        }
    }
}
