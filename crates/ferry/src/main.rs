//! Ferry: time-tracking data migration
//!
//! Main binary with subcommands:
//! - `workspaces`: List both tools' workspaces and how they link
//! - `plan`: Fetch selected workspaces and show what would transfer
//! - `transfer`: Fetch, link and transfer selected workspaces
//! - `delete`: Delete included entities from the source tool

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use ferry_api::{AuthContext, EntityGroup, HttpToolApi, RetryConfig, ToolConfig};
use ferry_sync::Orchestrator;
use miette::Result;
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Migrate time-tracking data between two tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// How to reach both tools.
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Source tool API base URL
    #[arg(long, env = "FERRY_SOURCE_URL")]
    source_url: String,

    /// Source tool API token (sent as basic auth)
    #[arg(long, env = "FERRY_SOURCE_TOKEN", hide_env_values = true)]
    source_token: Option<String>,

    /// Target tool API base URL
    #[arg(long, env = "FERRY_TARGET_URL")]
    target_url: String,

    /// Target tool API key
    #[arg(long, env = "FERRY_TARGET_API_KEY", hide_env_values = true)]
    target_api_key: Option<String>,

    /// Maximum concurrent requests to the source tool
    #[arg(long, env = "FERRY_SOURCE_CONCURRENCY", default_value = "1")]
    source_concurrency: usize,

    /// Maximum concurrent requests to the target tool
    #[arg(long, env = "FERRY_TARGET_CONCURRENCY", default_value = "4")]
    target_concurrency: usize,

    /// Minimum milliseconds between source request starts
    #[arg(long, env = "FERRY_SOURCE_SPACING_MS", default_value = "1000")]
    source_spacing_ms: u64,

    /// Minimum milliseconds between target request starts
    #[arg(long, env = "FERRY_TARGET_SPACING_MS", default_value = "250")]
    target_spacing_ms: u64,

    /// Items per page for paginated collections (tool default if unset)
    #[arg(long, env = "FERRY_PAGE_SIZE")]
    page_size: Option<u32>,

    /// Attempts per request before a transient failure is reported
    #[arg(long, env = "FERRY_RETRY_ATTEMPTS", default_value = "4")]
    retry_attempts: u32,
}

impl ConnectionArgs {
    fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts.max(1),
            ..RetryConfig::default()
        }
    }

    fn finish(&self, config: ToolConfig) -> ToolConfig {
        let config = config.with_retry(self.retry());
        match self.page_size {
            Some(size) => config.with_page_size(size),
            None => config,
        }
    }

    fn source_config(&self) -> ToolConfig {
        let auth = match &self.source_token {
            Some(token) => AuthContext::BasicToken(token.clone()),
            None => AuthContext::Anonymous,
        };
        self.finish(
            ToolConfig::source(&self.source_url, auth)
                .with_max_in_flight(self.source_concurrency)
                .with_min_spacing(Duration::from_millis(self.source_spacing_ms)),
        )
    }

    fn target_config(&self) -> ToolConfig {
        let auth = match &self.target_api_key {
            Some(key) => AuthContext::ApiKey(key.clone()),
            None => AuthContext::Anonymous,
        };
        self.finish(
            ToolConfig::target(&self.target_url, auth)
                .with_max_in_flight(self.target_concurrency)
                .with_min_spacing(Duration::from_millis(self.target_spacing_ms)),
        )
    }

    fn orchestrator(&self, cancel: watch::Receiver<bool>) -> Orchestrator {
        let source = HttpToolApi::new(self.source_config());
        let target = HttpToolApi::new(self.target_config());
        Orchestrator::builder(Arc::new(source), Arc::new(target))
            .cancellation(cancel)
            .build()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List both tools' workspaces and how they link
    Workspaces {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Fetch selected workspaces and show what would transfer
    Plan {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Source workspace name or id (repeatable)
        #[arg(long = "workspace", required = true)]
        workspaces: Vec<String>,

        /// Only consider time entries started in this year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Fetch, link and transfer selected workspaces
    Transfer {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Source workspace name or id (repeatable)
        #[arg(long = "workspace", required = true)]
        workspaces: Vec<String>,

        /// Only transfer time entries started in this year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Delete included entities from the source tool
    Delete {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Source workspace name or id (repeatable)
        #[arg(long = "workspace", required = true)]
        workspaces: Vec<String>,

        /// Entity group to delete (repeatable, default all)
        #[arg(long = "group")]
        groups: Vec<EntityGroup>,

        /// Only delete time entries started in this year
        #[arg(long)]
        year: Option<i32>,

        /// Actually delete; without this only the plan is shown
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ferry=info,ferry_sync=info,ferry_api=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current group");
            let _ = cancel_tx.send(true);
        }
    });

    match cli.command {
        Commands::Workspaces { connection } => {
            commands::workspaces(connection.orchestrator(cancel_rx)).await
        }

        Commands::Plan {
            connection,
            workspaces,
            year,
        } => commands::plan(connection.orchestrator(cancel_rx), &workspaces, year).await,

        Commands::Transfer {
            connection,
            workspaces,
            year,
        } => commands::transfer(connection.orchestrator(cancel_rx), &workspaces, year).await,

        Commands::Delete {
            connection,
            workspaces,
            groups,
            year,
            yes,
        } => {
            commands::delete(
                connection.orchestrator(cancel_rx),
                &workspaces,
                &groups,
                year,
                yes,
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ferry"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    const URLS: [&str; 4] = [
        "--source-url",
        "http://source.test",
        "--target-url",
        "http://target.test",
    ];

    #[test]
    fn test_delete_parses_groups() {
        let mut args = vec!["delete"];
        args.extend(URLS);
        args.extend(["--workspace", "Acme", "--group", "time-entries", "--group", "tags"]);

        let Commands::Delete { groups, yes, .. } = parse(&args).command else {
            panic!("expected delete");
        };
        assert_eq!(groups, vec![EntityGroup::TimeEntries, EntityGroup::Tags]);
        assert!(!yes);
    }

    #[test]
    fn test_connection_defaults_follow_tool_limits() {
        let mut args = vec!["workspaces"];
        args.extend(URLS);
        args.extend(["--page-size", "20"]);

        let Commands::Workspaces { connection } = parse(&args).command else {
            panic!("expected workspaces");
        };
        let source = connection.source_config();
        assert_eq!(source.max_in_flight, 1);
        assert_eq!(source.min_spacing, Duration::from_millis(1000));
        assert_eq!(source.page_size, 20);
        assert!(matches!(source.auth, AuthContext::Anonymous));

        let target = connection.target_config();
        assert_eq!(target.max_in_flight, 4);
        assert_eq!(target.retry.max_attempts, 4);
    }

    #[test]
    fn test_transfer_requires_workspace() {
        let mut args = vec!["ferry", "transfer"];
        args.extend(URLS);
        assert!(Cli::try_parse_from(args).is_err());
    }
}
