use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use livedoc_core::{Livedoc, LivedocConfig};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("livedoc")
        .version(livedoc_core::VERSION)
        .about("Keeps generated documentation in step with source changes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("scan")
                .about("Analyze a project tree and print cache statistics")
                .arg(
                    Arg::new("root")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Project root"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("health")
                .about("Scan a project and print a cache health report")
                .arg(
                    Arg::new("root")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Project root"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("json")
                        .value_parser(["json", "csv"])
                        .help("Report format"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<LivedocConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => LivedocConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(LivedocConfig::default()),
    }
}

async fn open(args: &ArgMatches, config: LivedocConfig) -> Result<Livedoc> {
    let root = args
        .get_one::<PathBuf>("root")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let root = tokio::fs::canonicalize(&root)
        .await
        .with_context(|| format!("project root {} not found", root.display()))?;
    Livedoc::builder(root)
        .config(config)
        .background(false)
        .build()
        .context("starting livedoc engine")
}

async fn scan(args: &ArgMatches, config: LivedocConfig) -> Result<()> {
    let livedoc = open(args, config).await?;
    let summary = livedoc.scan().await.context("scanning project")?;
    let stats = livedoc.get_stats();

    if args.get_flag("json") {
        let output = serde_json::json!({ "scan": summary, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Project: {}", summary.root.display());
        println!("  Files analyzed: {}", summary.files);
        println!("  Elapsed: {}ms", summary.elapsed_ms);
        println!("  Cached analyses: {}", stats.artifacts.analyses.entry_count);
        println!("  Analysis cache size: {} bytes", stats.artifacts.analyses.total_size);
        println!("  Dependency edges: {}", stats.artifacts.dependency_edges);
        println!("  Snapshots: {}", stats.snapshots.entry_count);
    }

    livedoc.shutdown().await?;
    Ok(())
}

async fn health(args: &ArgMatches, config: LivedocConfig) -> Result<()> {
    let livedoc = open(args, config).await?;
    livedoc.scan().await.context("scanning project")?;
    // rescan file by file so the report reflects warm-cache hit rates
    livedoc.snapshots().invalidate_snapshot(livedoc.root());
    livedoc.scan().await.context("rescanning project")?;
    let report = livedoc.get_health_report();

    match args.get_one::<String>("format").map(String::as_str) {
        Some("csv") => print!("{}", livedoc.monitor().export_csv()?),
        _ => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    livedoc.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    // global flags are propagated into the subcommand's matches
    let Some((name, args)) = matches.subcommand() else {
        return Ok(());
    };
    init_tracing(args.get_flag("log-json"));
    let config = load_config(args)?;

    match name {
        "scan" => scan(args, config).await,
        "health" => health(args, config).await,
        _ => Ok(()),
    }
}
