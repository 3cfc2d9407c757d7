use clap::Parser;
use gauntlet::{learning, EokaDriver, Orchestrator, RunConfig};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gauntlet")]
#[command(about = "Automated solver for the 30-stage code challenge")]
#[command(version)]
struct Cli {
    /// Challenge URL
    url: String,

    /// Output directory (results.json, learned.json, failure snapshots)
    #[arg(short, long, default_value = "out")]
    out: PathBuf,

    /// Shared cross-run learned-store directory
    #[arg(long, value_name = "DIR")]
    shared_learned: Option<PathBuf>,

    /// Config file with run overrides (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Keep going after a stage fails instead of aborting
    #[arg(long)]
    continue_on_error: bool,

    /// Full resolve+submit attempts per stage
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> gauntlet::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if cli.continue_on_error {
        config.continue_on_error = true;
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries_per_stage = retries;
    }
    config.validate()?;

    std::fs::create_dir_all(&cli.out)?;
    let learned = learning::load(
        &cli.out,
        cli.shared_learned.as_deref(),
        config.learned_precedence,
    );

    println!("Running: {}", cli.url);

    let driver = EokaDriver::launch(!cli.headed).await?;
    let mut orchestrator = Orchestrator::new(&driver, config)
        .with_learned(learned)
        .with_dirs(cli.out.clone(), cli.shared_learned.clone());
    let report = orchestrator.run(&cli.url).await?;
    drop(orchestrator);
    driver.close().await?;

    report.write(&cli.out)?;

    // Print result
    println!();
    if report.solved_count == report.attempted_count && report.attempted_count > 0 {
        println!("✓ Solved {}/{}", report.solved_count, report.attempted_count);
    } else {
        println!("✗ Solved {}/{}", report.solved_count, report.attempted_count);
        for step in report.steps.iter().filter(|s| !s.success) {
            println!("  Stage {}: {}", step.stage, step.note);
        }
    }
    println!("  Duration: {:.1}s", report.total_seconds);

    if report.solved_count < gauntlet::site::STAGE_COUNT {
        std::process::exit(1);
    }
    Ok(())
}
