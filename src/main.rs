//! CLI entry point for squad matching.
//!
//! Every command except `init`, `config` and `generate` operates on a JSON
//! state snapshot holding guilds, squads, memberships and embeddings.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use squadmatch::display::{THEME, match_table, pool_table, report_table, squad_table};
use squadmatch::fixture::{self, FixtureConfig};
use squadmatch::io::{ExitCode, JsonResponse, OutputFormat};
use squadmatch::matching::{MatchingService, PoolScanner};
use squadmatch::notify::LogDispatcher;
use squadmatch::storage::{MemoryStore, StoreSnapshot};
use squadmatch::types::{GuildId, UserId};
use squadmatch::vector::MemoryEmbeddingIndex;
use squadmatch::{MatchError, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Squad formation and compatibility matching
#[derive(Parser)]
#[command(
    name = "squadmatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Squad formation and compatibility matching",
    long_about = "Match guild members into squads of mutually compatible learners.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ squadmatch init\n  $ squadmatch generate --users 40 --out state.json\n  $ squadmatch pool --state state.json --guild 1\n  $ squadmatch form --state state.json --guild 1 --save"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at DEBUG level
    #[arg(long, global = true)]
    debug: bool,

    /// Output JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up .squadmatch directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Write a synthetic state file with clustered users
    Generate {
        #[arg(long, default_value_t = 2)]
        guilds: usize,

        /// Users per guild
        #[arg(long, default_value_t = 40)]
        users: usize,

        /// Compatible clusters per guild
        #[arg(long, default_value_t = 2)]
        clusters: usize,

        /// Noise added around each cluster centroid
        #[arg(long, default_value_t = 0.4)]
        spread: f32,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(short, long, default_value = "state.json")]
        out: PathBuf,
    },

    /// Show a guild's waiting pool
    Pool {
        #[arg(short, long)]
        state: PathBuf,

        #[arg(short, long)]
        guild: u32,
    },

    /// Rank open squads for a user
    Matches {
        #[arg(short, long)]
        state: PathBuf,

        #[arg(short, long)]
        guild: u32,

        #[arg(short, long)]
        user: u32,
    },

    /// Join a guild and place the user in a squad if one fits
    Join {
        #[arg(short, long)]
        state: PathBuf,

        #[arg(short, long)]
        guild: u32,

        #[arg(short, long)]
        user: u32,

        /// Write the updated state back
        #[arg(long)]
        save: bool,
    },

    /// Form squads from a guild's waiting pool
    Form {
        #[arg(short, long)]
        state: PathBuf,

        #[arg(short, long)]
        guild: u32,

        /// Write the updated state back
        #[arg(long)]
        save: bool,
    },

    /// List a guild's squads
    Squads {
        #[arg(short, long)]
        state: PathBuf,

        #[arg(short, long)]
        guild: u32,
    },

    /// Periodically form squads in every guild
    Scan {
        #[arg(short, long)]
        state: PathBuf,

        /// Seconds between rounds, defaults to formation.scan_interval_secs
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many rounds
        #[arg(long, default_value_t = 1)]
        rounds: usize,

        /// Write the updated state back
        #[arg(long)]
        save: bool,
    },
}

/// A loaded state file with a service over it.
struct Session {
    path: PathBuf,
    store: MemoryStore,
    index: MemoryEmbeddingIndex,
    service: Arc<MatchingService>,
}

impl Session {
    fn open(path: &Path, settings: &Settings) -> anyhow::Result<Self> {
        let snapshot = StoreSnapshot::load(path).map_err(MatchError::from)?;
        let (store, index) = snapshot
            .restore_with_sizes(
                settings.matching.min_squad_size,
                settings.matching.max_squad_size,
            )
            .map_err(MatchError::from)?;
        let service = MatchingService::new(
            settings,
            Arc::new(store.clone()),
            Arc::new(index.clone()),
            Arc::new(LogDispatcher),
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            store,
            index,
            service: Arc::new(service),
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        StoreSnapshot::capture(&self.store, &self.index)
            .save(&self.path)
            .map_err(MatchError::from)?;
        tracing::info!(path = %self.path.display(), "Saved state");
        Ok(())
    }
}

fn guild_id(raw: u32) -> anyhow::Result<GuildId> {
    GuildId::new(raw).context("guild id must be positive")
}

fn user_id(raw: u32) -> anyhow::Result<UserId> {
    UserId::new(raw).context("user id must be positive")
}

fn print_json<T: Serialize>(data: T, message: impl Into<String>) -> anyhow::Result<()> {
    let response = JsonResponse::success(data).with_message(message);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<figment::Error>> {
    match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("Configuration error: {e}")));
            std::process::exit(ExitCode::ConfigError.into());
        }
    };
    init_tracing(cli.debug || settings.debug);

    let code = match run(cli.command, settings, format).await {
        Ok(code) => code,
        Err(err) => report_error(&err, format),
    };
    std::process::exit(code.into());
}

fn report_error(err: &anyhow::Error, format: OutputFormat) -> ExitCode {
    match err.downcast_ref::<MatchError>() {
        Some(match_error) => {
            if format.is_json() {
                let response = JsonResponse::from_error(match_error);
                match serde_json::to_string_pretty(&response) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("{e}"),
                }
            } else {
                eprintln!("{}", THEME.error_with_icon(&match_error.to_string()));
                for suggestion in match_error.recovery_suggestions() {
                    eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
                }
            }
            ExitCode::from_error(match_error)
        }
        None => {
            eprintln!("{}", THEME.error_with_icon(&format!("{err:#}")));
            ExitCode::GeneralError
        }
    }
}

async fn run(
    command: Commands,
    settings: Settings,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Init { force } => {
            let path =
                Settings::init_config_file(force).map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Edit {} to customize your settings.", path.display());
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            settings.validate()?;
            if format.is_json() {
                print_json(&settings, "Effective settings")?;
            } else {
                println!("{}", toml::to_string_pretty(&settings)?);
            }
            Ok(ExitCode::Success)
        }

        Commands::Generate {
            guilds,
            users,
            clusters,
            spread,
            seed,
            out,
        } => {
            let config = FixtureConfig {
                guilds,
                users_per_guild: users,
                clusters,
                spread,
                seed,
                dimension: settings.index.vector_dimension()?,
            };
            let snapshot = fixture::generate(&config)?;
            snapshot.save(&out).map_err(MatchError::from)?;

            let message = format!(
                "Wrote {} guilds and {} users to {}",
                snapshot.guilds.len(),
                snapshot.embeddings.len(),
                out.display()
            );
            if format.is_json() {
                print_json(&snapshot.guilds, message)?;
            } else {
                println!("{}", THEME.success_with_icon(&message));
            }
            Ok(ExitCode::Success)
        }

        Commands::Pool { state, guild } => {
            let session = Session::open(&state, &settings)?;
            let entries = session.service.get_waiting_pool(guild_id(guild)?)?;
            let message = format!("{} users waiting", entries.len());
            if format.is_json() {
                print_json(&entries, message)?;
            } else if entries.is_empty() {
                println!("{}", THEME.warning_with_icon("Waiting pool is empty"));
            } else {
                println!("{}", pool_table(&entries));
                println!("{}", THEME.apply(&THEME.dim, message));
            }
            Ok(ExitCode::from_listing(&entries))
        }

        Commands::Matches { state, guild, user } => {
            let session = Session::open(&state, &settings)?;
            let matches = session
                .service
                .find_squad_matches(user_id(user)?, guild_id(guild)?)?;
            let message = format!("{} compatible squads", matches.len());
            if format.is_json() {
                print_json(&matches, message)?;
            } else if matches.is_empty() {
                println!("{}", THEME.warning_with_icon("No compatible open squads"));
            } else {
                println!("{}", match_table(&matches));
            }
            Ok(ExitCode::from_listing(&matches))
        }

        Commands::Join {
            state,
            guild,
            user,
            save,
        } => {
            let session = Session::open(&state, &settings)?;
            let outcome = session
                .service
                .join_guild_and_match(user_id(user)?, guild_id(guild)?)?;
            if save {
                session.save()?;
            }

            let message = match &outcome.assigned_squad {
                Some(squad) => format!(
                    "Joined {} ({} members, {})",
                    squad.name, squad.member_count, squad.status
                ),
                None => "Added to the waiting pool".to_string(),
            };
            if format.is_json() {
                print_json(&outcome, message)?;
            } else if outcome.assigned_squad.is_some() {
                println!("{}", THEME.success_with_icon(&message));
            } else {
                println!("{}", THEME.warning_with_icon(&message));
            }
            Ok(ExitCode::Success)
        }

        Commands::Form { state, guild, save } => {
            let session = Session::open(&state, &settings)?;
            let report = session
                .service
                .notify_waiting_pool_matches(guild_id(guild)?)?;
            if save && !report.is_empty() {
                session.save()?;
            }

            let message = format!(
                "Formed {} squads with {} users",
                report.formed_squads.len(),
                report.notified_user_ids.len()
            );
            if format.is_json() {
                print_json(&report, message)?;
            } else if report.is_empty() {
                println!("{}", THEME.warning_with_icon("No compatible group found"));
            } else {
                println!("{}", report_table(&report));
                println!("{}", THEME.success_with_icon(&message));
            }
            Ok(ExitCode::Success)
        }

        Commands::Squads { state, guild } => {
            let session = Session::open(&state, &settings)?;
            let squads = session.service.registry().squads(guild_id(guild)?)?;
            let message = format!("{} squads", squads.len());
            if format.is_json() {
                print_json(&squads, message)?;
            } else if squads.is_empty() {
                println!("{}", THEME.warning_with_icon("Guild has no squads"));
            } else {
                println!(
                    "{}",
                    squad_table(&squads, settings.matching.max_squad_size)
                );
            }
            Ok(ExitCode::from_listing(&squads))
        }

        Commands::Scan {
            state,
            interval,
            rounds,
            save,
        } => {
            let session = Session::open(&state, &settings)?;
            let period = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.formation.scan_interval());
            let scanner = PoolScanner::new(session.service.clone(), period);
            let summary = tokio::spawn(scanner.run(Some(rounds.max(1))))
                .await
                .map_err(|e| MatchError::TaskFailed {
                    reason: e.to_string(),
                })?;
            if save && summary.squads_formed > 0 {
                session.save()?;
            }

            let message = format!(
                "{} rounds, {} squads formed, {} users placed",
                summary.rounds, summary.squads_formed, summary.users_placed
            );
            if format.is_json() {
                print_json(summary, message)?;
            } else {
                println!("{}", THEME.success_with_icon(&message));
                if summary.guilds_busy > 0 || summary.guilds_failed > 0 {
                    println!(
                        "{}",
                        THEME.warning_with_icon(&format!(
                            "{} guild passes skipped, {} failed",
                            summary.guilds_busy, summary.guilds_failed
                        ))
                    );
                }
            }
            Ok(ExitCode::Success)
        }
    }
}
