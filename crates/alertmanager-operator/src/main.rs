//! alertmanager-operator - syncs AlertmanagerRule manifests into an Alertmanager config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alertmanager_config::ConfigStore;
use alertmanager_operator::{
    AlertmanagerRule, InMemoryRuleClient, OperatorSettings, ReconcileOutcome, Reconciler,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "alertmanager-operator")]
#[command(about = "Keeps an Alertmanager configuration in sync with AlertmanagerRule resources")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: OperatorSettings,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a rule and merge it into the config
    Apply {
        /// Path to the rule manifest
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete a rule and remove it from the config
    Delete {
        /// Path to the rule manifest
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the config that applying a rule would produce, without writing it
    Render {
        /// Path to the rule manifest
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("alertmanager_operator=info".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.log_json.then(|| fmt::layer().json()))
        .with((!cli.log_json).then(fmt::layer))
        .init();

    let settings = cli.settings;
    settings.validate().context("invalid settings")?;

    let client = Arc::new(InMemoryRuleClient::new());
    let store = ConfigStore::new(settings.document_file(), settings.reload_notifier()?);
    let reconciler = Reconciler::new(Arc::clone(&client), store, settings.merge_settings()?);

    info!(
        config = %reconciler.store().location().display(),
        host = %settings.alertmanager_host,
        "starting"
    );

    match cli.command {
        Commands::Apply { file } => {
            let rule = read_manifest(&file)?;
            let name = rule.name().to_string();
            client.apply(rule);

            let outcome = reconciler.reconcile(&name).await?;
            report(&client, &name, outcome)?;
        }

        Commands::Delete { file } => {
            let mut rule = read_manifest(&file)?;
            let name = rule.name().to_string();
            // The rule was applied earlier, so it carries our finalizer.
            rule.add_finalizer();
            client.apply(rule);
            client.delete(&name);

            let outcome = reconciler.reconcile(&name).await?;
            report(&client, &name, outcome)?;
        }

        Commands::Render { file } => {
            let rule = read_manifest(&file)?;
            let doc = reconciler.render(&rule).await?;
            print!("{doc}");
        }
    }

    Ok(())
}

fn read_manifest(path: &Path) -> anyhow::Result<AlertmanagerRule> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest '{}'", path.display()))?;
    let rule = AlertmanagerRule::from_yaml(&text)
        .with_context(|| format!("failed to decode manifest '{}'", path.display()))?;
    Ok(rule)
}

fn report(client: &InMemoryRuleClient, name: &str, outcome: ReconcileOutcome) -> anyhow::Result<()> {
    println!("{name}: {outcome:?}");
    if let Some(status) = client.snapshot(name).and_then(|r| r.status) {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    if matches!(outcome, ReconcileOutcome::Failed { .. }) {
        anyhow::bail!("reconciliation of {name} failed");
    }
    Ok(())
}
