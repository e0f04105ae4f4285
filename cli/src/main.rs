//! Infravest operator CLI

mod scenario;

use anyhow::Context;
use clap::{Parser, Subcommand};
use infravest_claims::ClaimTopic;
use infravest_governance::GovernanceConfig;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

use crate::scenario::{Scenario, Simulator, StepReport};

#[derive(Parser)]
#[command(name = "infravest")]
#[command(about = "Compliance-gated governance for tokenized infrastructure", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the claim topic catalog
    Topics,

    /// Load and validate a governance config file
    CheckConfig {
        /// Path to governance TOML
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Replay a JSON scenario against a fresh engine
    Simulate {
        /// Path to governance TOML
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Path to scenario JSON
        #[arg(short, long, value_name = "FILE")]
        scenario: PathBuf,

        /// Directory to write claims and governance snapshots to
        #[arg(long, value_name = "DIR")]
        state_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Topics => print_topics(),
        Commands::CheckConfig { config } => {
            let config = load_config(&config)?;
            print_config(&config);
        }
        Commands::Simulate {
            config,
            scenario,
            state_dir,
        } => {
            let config = load_config(&config)?;
            let scenario = Scenario::load(&scenario)?;
            simulate(config, scenario, state_dir.as_deref()).await?;
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<GovernanceConfig> {
    GovernanceConfig::load(path).with_context(|| format!("invalid config {}", path.display()))
}

fn print_topics() {
    println!("\n{}", "📜 Claim Topics".cyan().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_black());
    for topic in ClaimTopic::ALL {
        println!("  {:>2}  {}", topic.code().to_string().yellow(), topic.name());
    }
    println!();
}

fn print_config(config: &GovernanceConfig) {
    let topics = |set: &infravest_claims::TopicSet| {
        if set.is_empty() {
            "none".to_string()
        } else {
            set.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        }
    };

    println!("\n{}", "✓ Configuration valid".green().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_black());
    println!("  {}: {}s", "Voting delay".bright_black(), config.voting_delay);
    println!("  {}: {}s", "Voting period".bright_black(), config.voting_period);
    println!("  {}: {}s", "Max voting period".bright_black(), config.max_voting_period);
    println!(
        "  {}: {}/{}",
        "Quorum".bright_black(),
        config.quorum_numerator,
        config.quorum_denominator
    );
    println!("  {}: {:?}", "Weight source".bright_black(), config.weight_source);
    println!(
        "  {}: {}",
        "Claim gating".bright_black(),
        if config.claim_gating_enabled { "enabled".green().to_string() } else { "disabled".yellow().to_string() }
    );
    println!("  {}: {}", "Proposal claims".bright_black(), topics(&config.required_proposal_claims));
    println!("  {}: {}", "Vote claims".bright_black(), topics(&config.required_vote_claims));
    println!();
}

async fn simulate(
    config: GovernanceConfig,
    scenario: Scenario,
    state_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let mut simulator = Simulator::new(config, scenario.admins.clone())?;

    let title = if scenario.name.is_empty() { "scenario" } else { scenario.name.as_str() };
    println!("\n{} {}", "🚀 Replaying".green().bold(), title.bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_black());

    let reports = simulator.run(&scenario)?;
    for report in &reports {
        print_report(report);
    }

    let unmet = reports.iter().filter(|r| !r.met_expectation()).count();
    println!();
    println!(
        "  {}: {}  {}: {}",
        "Proposals".bright_black(),
        simulator.engine().proposal_count(),
        "Claims".bright_black(),
        simulator.store().claim_count()
    );
    if unmet == 0 {
        println!("{} {} steps", "✓".green(), reports.len());
    } else {
        println!("{} {} of {} steps did not match expectations", "✗".red(), unmet, reports.len());
    }

    if let Some(dir) = state_dir {
        simulator.save(dir).await?;
        println!("{} state written to {}", "💾".bright_black(), dir.display());
    }

    if unmet > 0 {
        anyhow::bail!("{} scenario expectations failed", unmet);
    }
    Ok(())
}

fn print_report(report: &StepReport) {
    let prefix = format!("[t={:>6}] #{:<3} {:<18}", report.at, report.index, report.action);
    match &report.outcome {
        Ok(message) => println!("{} {} {}", prefix.bright_black(), "ok".green(), message),
        Err(failure) => println!(
            "{} {} {}",
            prefix.bright_black(),
            failure.code.red(),
            failure.message
        ),
    }
    if !report.met_expectation() {
        println!(
            "      {} expected {}",
            "⚠".yellow(),
            report.expected.as_deref().unwrap_or_default().yellow()
        );
    }
}
