use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::auth::Credentials;
use crate::config::Config;
use crate::output::{print_summary, GraphView};
use crate::providers::GoCdClient;
use crate::refresh::Refresher;
use crate::server::{self, AppState, Hub};
use crate::store::GraphStore;

const HUB_CAPACITY: usize = 16;

#[derive(Parser)]
#[command(name = "pipegraph")]
#[command(author, version, about = "CI pipeline dependency graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./pipegraph.{toml,json,yaml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct GoCdArgs {
    /// GoCD base URL
    #[arg(short, long, env = "GOCD_URL")]
    url: Option<String>,

    #[arg(short, long, env = "GOCD_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "GOCD_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "GOCD_PASSWORD")]
    password: Option<String>,

    /// Suffix of the pipeline that stands in for package dependencies
    #[arg(long, allow_hyphen_values = true)]
    promotion_suffix: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Tree,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve live pipeline graphs to viewers
    Serve {
        #[command(flatten)]
        gocd: GoCdArgs,

        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,

        /// Seconds between refreshes
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Build the graphs once and print them
    Show {
        #[command(flatten)]
        gocd: GoCdArgs,

        #[arg(short, long, value_enum, default_value_t = Format::Tree)]
        format: Format,
    },
    /// Write a configuration file with the default settings
    Init {
        #[arg(default_value = "pipegraph.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

impl GoCdArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.gocd.base_url.clone_from(url);
        }
        if self.token.is_some() {
            config.gocd.token.clone_from(&self.token);
        }
        if self.username.is_some() {
            config.gocd.username.clone_from(&self.username);
        }
        if self.password.is_some() {
            config.gocd.password.clone_from(&self.password);
        }
        if let Some(suffix) = &self.promotion_suffix {
            config.topology.promotion_suffix.clone_from(suffix);
        }
    }
}

fn gocd_client(config: &Config) -> Result<GoCdClient> {
    let credentials = Credentials::resolve(
        config.gocd.token.as_deref(),
        config.gocd.username.as_deref(),
        config.gocd.password.as_deref(),
    );

    GoCdClient::new(
        &config.gocd.base_url,
        credentials,
        config.gocd.timeout(),
        config.gocd.max_concurrent_requests,
    )
    .context("Failed to create GoCD client")
}

fn execute_init(config: &Config, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }

    config.save(path)?;
    info!("Configuration written to: {}", path.display());

    Ok(())
}

impl Cli {
    async fn execute_serve(&self, config: Config) -> Result<()> {
        let client = Arc::new(gocd_client(&config)?);
        let store = Arc::new(GraphStore::new());
        let hub = Hub::new(HUB_CAPACITY);
        let last_refresh = Arc::new(RwLock::new(None));

        let refresher = Refresher::new(
            client,
            Arc::clone(&store),
            hub.clone(),
            config.server.refresh_interval(),
            config.topology.promotion_suffix.clone(),
            Arc::clone(&last_refresh),
        );

        info!("Building initial graphs from {}", config.gocd.base_url);
        refresher.rebuild().await;
        if store.is_empty().await {
            warn!("No graphs built yet, viewers get an empty snapshot until a refresh succeeds");
        }

        let listener = TcpListener::bind(&config.server.bind)
            .await
            .with_context(|| format!("Failed to bind {}", config.server.bind))?;
        info!("Serving viewers on {}", config.server.bind);

        tokio::spawn(refresher.run());

        server::serve(listener, AppState::new(store, hub, last_refresh)).await?;

        Ok(())
    }

    async fn execute_show(&self, config: Config, format: Format) -> Result<()> {
        let client = Arc::new(gocd_client(&config)?);
        let store = Arc::new(GraphStore::new());

        let refresher = Refresher::new(
            client,
            Arc::clone(&store),
            Hub::new(1),
            config.server.refresh_interval(),
            config.topology.promotion_suffix.clone(),
            Arc::new(RwLock::new(None)),
        );
        refresher.rebuild().await;

        match format {
            Format::Json => {
                let snapshot = store.snapshot().await;
                let json_output = if self.pretty {
                    serde_json::to_string_pretty(&snapshot)?
                } else {
                    serde_json::to_string(&snapshot)?
                };

                if let Some(output_path) = &self.output {
                    std::fs::write(output_path, json_output)?;
                    info!("Graphs written to: {}", output_path.display());
                } else {
                    println!("{json_output}");
                }
            }
            Format::Tree => {
                let mut views = Vec::new();
                for (group, repository, graph) in store.graphs().await {
                    let graph = graph.lock().await.clone();
                    views.push(GraphView {
                        group,
                        repository,
                        graph,
                    });
                }
                print_summary(&views);
            }
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let mut config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Serve {
                gocd,
                bind,
                interval,
            } => {
                gocd.apply(&mut config);
                if let Some(bind) = bind {
                    config.server.bind.clone_from(bind);
                }
                if let Some(interval) = interval {
                    config.server.refresh_interval_secs = *interval;
                }
                self.execute_serve(config).await
            }
            Commands::Show { gocd, format } => {
                gocd.apply(&mut config);
                self.execute_show(config, *format).await
            }
            Commands::Init { path, force } => execute_init(&config, path, *force),
        }
    }
}
