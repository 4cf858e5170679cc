use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use crate::config::Config;
use crate::engine::{fleet_status, spawn_refresh, CanonicalStatus, Engine, Job};
use crate::output;

#[derive(Parser)]
#[command(name = "forgewatch")]
#[command(author, version, about = "Forgejo Pipeline Monitor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the aggregated job report as JSON to this path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

/// Connection and filter settings; anything given here overrides the
/// configuration file.
#[derive(Args)]
struct WatchArgs {
    #[arg(short, long)]
    url: Option<String>,

    #[arg(short, long, env = "FORGEJO_TOKEN")]
    token: Option<String>,

    /// Organization to scan (repeatable)
    #[arg(short = 'O', long = "org")]
    organizations: Vec<String>,

    #[arg(long)]
    repo_pattern: Option<String>,

    #[arg(long)]
    workflow_pattern: Option<String>,

    #[arg(long)]
    branch_pattern: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full discovery cycle and print the job board
    Discover {
        #[command(flatten)]
        args: WatchArgs,
    },

    /// Discover, then keep refreshing on an interval until interrupted
    Watch {
        #[command(flatten)]
        args: WatchArgs,

        /// Seconds between refreshes; 0 disables periodic refresh
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Edit the organization list in the configuration file
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },
}

#[derive(Subcommand)]
enum OrgAction {
    /// Add an organization to the scan list
    Add { name: String },
    /// Remove an organization from the scan list
    Remove { name: String },
}

/// Aggregated job report written by `--output`.
#[derive(Serialize)]
struct JobReport<'a> {
    collected_at: DateTime<Utc>,
    fleet_status: CanonicalStatus,
    jobs: &'a [Job],
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Discover { args } => self.execute_discover(args).await,
            Commands::Watch { args, interval } => self.execute_watch(args, *interval).await,
            Commands::Org { action } => self.execute_org(action),
        }
    }

    async fn execute_discover(&self, args: &WatchArgs) -> Result<()> {
        let config = self.load_config(args)?;
        let engine = Engine::new(&config)?;

        info!("Starting discovery across {} organizations", config.organizations.len());
        let spinner = output::cycle_spinner("Discovering repositories and runs");
        engine.discover().await?;
        spinner.finish_and_clear();

        output::print_discovery_log(&engine.snapshot().log);
        self.render(&engine)?;
        Ok(())
    }

    async fn execute_watch(&self, args: &WatchArgs, interval: Option<u64>) -> Result<()> {
        let config = self.load_config(args)?;
        let interval = interval.unwrap_or(config.refresh_interval);
        let engine = Arc::new(Engine::new(&config)?);

        let spinner = output::cycle_spinner("Discovering repositories and runs");
        engine.discover().await?;
        spinner.finish_and_clear();
        self.render(&engine)?;

        let mut updates = engine.subscribe();
        // Dropping the handle on exit tears the refresh timer down with us.
        let _refresh = spawn_refresh(Arc::clone(&engine), interval);
        if interval == 0 {
            info!("Periodic refresh disabled; press Ctrl-C to exit");
        } else {
            info!("Refreshing every {interval}s; press Ctrl-C to exit");
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.render(&engine)?;
                }
            }
        }

        Ok(())
    }

    fn execute_org(&self, action: &OrgAction) -> Result<()> {
        let mut config = Config::load(self.config.as_deref())?;
        match action {
            OrgAction::Add { name } => {
                if !config.organizations.iter().any(|o| o == name) {
                    config.organizations.push(name.clone());
                }
                println!("Organizations: {}", config.organizations.join(", "));
            }
            OrgAction::Remove { name } => {
                config.organizations.retain(|o| o != name);
                println!("Organizations: {}", config.organizations.join(", "));
            }
        }

        let path = match &self.config {
            Some(path) => path.clone(),
            None => match Config::user_config_path() {
                Some(path) => path,
                None => bail!("No config path given and no user config directory available"),
            },
        };
        config.save(&path)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    fn load_config(&self, args: &WatchArgs) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(url) = &args.url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(token) = &args.token {
            config.token = Some(token.clone());
        }
        if !args.organizations.is_empty() {
            config.organizations = args.organizations.clone();
        }
        if let Some(pattern) = &args.repo_pattern {
            config.repo_pattern = pattern.clone();
        }
        if let Some(pattern) = &args.workflow_pattern {
            config.workflow_pattern = pattern.clone();
        }
        if let Some(pattern) = &args.branch_pattern {
            config.branch_pattern = pattern.clone();
        }

        if config.base_url.is_empty() {
            bail!("No Forgejo URL configured; pass --url or set base-url in the config file");
        }
        Ok(config)
    }

    fn render(&self, engine: &Engine) -> Result<()> {
        let jobs = engine.jobs();
        let fleet = fleet_status(&jobs);
        output::print_jobs(&jobs, fleet, engine.snapshot().last_update, engine.is_busy());

        if let Some(path) = &self.output {
            let report = JobReport {
                collected_at: Utc::now(),
                fleet_status: fleet,
                jobs: &jobs,
            };
            let json = if self.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            std::fs::write(path, json)?;
            info!("Job report written to: {}", path.display());
        }

        Ok(())
    }
}
