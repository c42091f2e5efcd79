//! Phase Builder CLI — inspect and edit a campaign's phase workflow against
//! the campaign API, or offline against seeded demo data.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use campaign_core::config::AppConfig;
use campaign_phase_builder::render::outline;
use campaign_phase_builder::types::{PaletteItem, PhaseFields};
use campaign_phase_builder::{
    BlockId, DropOutcome, HttpPersistenceClient, MemoryBackend, PersistenceClient, PhaseBuilder, RenumberReport,
    UserPrompt,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "phase-builder")]
#[command(about = "Campaign phase workflow builder")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, env = "PHASE_BUILDER_CONFIG")]
    config: Option<String>,

    /// Campaign to edit (overrides config)
    #[arg(long, env = "PHASE_BUILDER__CAMPAIGN_ID")]
    campaign: Option<i64>,

    /// API base URL (overrides config)
    #[arg(long, env = "PHASE_BUILDER__API__BASE_URL")]
    base_url: Option<String>,

    /// Work against in-memory demo data instead of the API
    #[arg(long, default_value_t = false)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the campaign's phases and activities
    Show {
        /// Print the full view model as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Append a phase and save it
    AddPhase {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value_t = false)]
        requires_approval: bool,
    },

    /// Move the phase at one 1-based position to another
    MovePhase {
        #[arg(long)]
        from: usize,

        #[arg(long)]
        to: usize,
    },

    /// Drop an activity onto the end of a phase's activity list
    AddActivity {
        /// 1-based phase position
        #[arg(long)]
        phase: usize,

        #[arg(long = "type")]
        activity_type: String,

        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,
    },

    /// Delete the phase at a 1-based position
    DeletePhase {
        #[arg(long)]
        position: usize,

        /// Skip the confirmation prompt
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Re-save every phase with its current position as order
    Renumber,
}

/// Confirmation and alerts on the controlling terminal.
struct TerminalPrompt {
    assume_yes: bool,
}

impl UserPrompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", message);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    fn alert(&self, message: &str) {
        eprintln!("{}", message);
    }
}

fn phase_at(builder: &PhaseBuilder, position: usize) -> anyhow::Result<BlockId> {
    let keys = builder.store().phase_keys();
    match position.checked_sub(1).and_then(|i| keys.get(i)) {
        Some(key) => Ok(*key),
        None => bail!("no phase at position {} (campaign has {})", position, keys.len()),
    }
}

fn report_failures(report: &RenumberReport) {
    for (block, message) in &report.failed {
        warn!(%block, %message, "Block was not renumbered");
        eprintln!("{}: {}", block, message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phase_builder=info,campaign_phase_builder=info".into()),
        )
        .json()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(campaign) = cli.campaign {
        config.campaign_id = Some(campaign);
    }
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }

    let client: Arc<dyn PersistenceClient> = if cli.offline {
        info!("Using in-memory demo campaign");
        Arc::new(MemoryBackend::with_demo_data())
    } else {
        let campaign_id = config
            .campaign_id
            .context("no campaign selected (pass --campaign or set PHASE_BUILDER__CAMPAIGN_ID)")?;
        if !config.auth.is_complete() {
            warn!("Auth headers are incomplete; the API may reject requests");
        }
        info!(campaign_id, base_url = %config.api.base_url, "Using campaign API");
        Arc::new(HttpPersistenceClient::new(&config, campaign_id)?)
    };

    let assume_yes = matches!(cli.command, Commands::DeletePhase { yes: true, .. });
    let mut builder = PhaseBuilder::new(client, Arc::new(TerminalPrompt { assume_yes }));
    builder.load().await?;

    match cli.command {
        Commands::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&builder.view())?);
                return Ok(());
            }
        }
        Commands::AddPhase {
            name,
            description,
            requires_approval,
        } => {
            let key = builder.add_phase();
            builder.edit_phase(
                key,
                PhaseFields {
                    name,
                    description,
                    requires_approval,
                    ..PhaseFields::default()
                },
            )?;
            let id = builder.save(key).await?;
            info!(phase_id = id, "Phase created");
        }
        Commands::MovePhase { from, to } => {
            let key = phase_at(&builder, from)?;
            let report = builder.move_phase(key, to.saturating_sub(1)).await?;
            report_failures(&report);
        }
        Commands::AddActivity {
            phase,
            activity_type,
            id,
            name,
        } => {
            let key = phase_at(&builder, phase)?;
            let item = PaletteItem::new(activity_type, id, name);
            let outcome = builder.drop_on_empty_zone(key, &item).await?;
            if let DropOutcome::Accepted { report, .. } = &outcome {
                report_failures(report);
            }
        }
        Commands::DeletePhase { position, .. } => {
            let key = phase_at(&builder, position)?;
            match builder.delete(key).await? {
                Some(report) => report_failures(&report),
                None => {
                    println!("Aborted.");
                    return Ok(());
                }
            }
        }
        Commands::Renumber => {
            let report = builder.renumber_phases().await;
            report_failures(&report);
        }
    }

    print!("{}", outline(&builder.view()));
    Ok(())
}
