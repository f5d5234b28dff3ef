mod config;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    join_as_spectator, join_match,
    lobby::{DEFAULT_SLOTS_PER_TEAM, DEFAULT_TEAM_A_NAME, DEFAULT_TEAM_B_NAME},
    CaptainAuthStore, CreateMatchRequest, HttpMatchApi, LoggingNavigator, MatchRoute,
    MissingCaptainAuthStore, SessionEvent, VetoClient, WsPushConnector,
};
use config::{load_settings, normalize_database_url, Settings};
use shared::{
    domain::{MapId, MatchId, Phase, TeamIndex},
    protocol::MatchSnapshot,
    view::MapStatus,
};
use storage::{CaptainAuthRecord, Storage};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "veto", about = "Map veto client")]
struct Args {
    /// Match server base URL.
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// Local credential database.
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a match and print its id.
    Create {
        #[arg(long, default_value = DEFAULT_TEAM_A_NAME)]
        team_a: String,
        #[arg(long, default_value = DEFAULT_TEAM_B_NAME)]
        team_b: String,
        #[arg(long, default_value_t = DEFAULT_SLOTS_PER_TEAM)]
        slots: u32,
    },
    /// Follow a match until it completes. Accepts a match id or a `/match/...` path.
    Watch {
        target: String,
        #[arg(long)]
        team: Option<i64>,
    },
    /// Ban or pick a map, depending on the current phase.
    Act {
        target: String,
        #[arg(long)]
        team: Option<i64>,
        #[arg(long)]
        map: u32,
    },
    /// Save a captain token for a match and team.
    StoreCredential {
        match_id: String,
        team: i64,
        token: String,
    },
    /// Remove saved captain tokens for a match, or for one team of it.
    ForgetCredential {
        match_id: String,
        #[arg(long)]
        team: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    settings.database_url = normalize_database_url(&settings.database_url);

    match args.command {
        Command::Create {
            team_a,
            team_b,
            slots,
        } => {
            let client = build_client(&settings, Arc::new(MissingCaptainAuthStore))?;
            let request = CreateMatchRequest {
                team_a,
                team_b,
                slots_per_team: slots,
            };
            let match_id = client.create_match(&request).await?;
            println!("{match_id}");
            println!("spectate: {}", MatchRoute::spectator(match_id).path());
        }
        Command::Watch { target, team } => {
            let route = parse_target(&target, team)?;
            let client = build_client(&settings, open_auth_store(&settings).await)?;
            watch(&client, route).await?;
        }
        Command::Act { target, team, map } => {
            let route = parse_target(&target, team)?;
            let client = build_client(&settings, open_auth_store(&settings).await)?;
            act(&client, route, MapId(map)).await?;
        }
        Command::StoreCredential {
            match_id,
            team,
            token,
        } => {
            let team = TeamIndex::new(team)?;
            let match_id = MatchId::new(match_id.trim());
            let storage = open_storage(&settings).await?;
            storage
                .store_captain_auth(
                    &match_id,
                    &team.to_string(),
                    &CaptainAuthRecord::captain(team, token),
                )
                .await?;
            println!("stored captain credential for {}", MatchRoute::captain(match_id, team).path());
        }
        Command::ForgetCredential { match_id, team } => {
            let match_id = MatchId::new(match_id.trim());
            let storage = open_storage(&settings).await?;
            let removed = match team {
                Some(team) => u64::from(storage.forget_captain_auth(&match_id, &team).await?),
                None => storage.forget_match(&match_id).await?,
            };
            println!("removed {removed} credential(s)");
        }
    }

    Ok(())
}

fn parse_target(target: &str, team: Option<i64>) -> Result<MatchRoute> {
    if target.trim_start().starts_with("/match/") {
        return MatchRoute::parse(target).ok_or_else(|| anyhow!("invalid match path: {target}"));
    }
    let route = match team {
        Some(_) => join_match(target, team)?,
        None => join_as_spectator(target)?,
    };
    Ok(route)
}

fn build_client(settings: &Settings, auth_store: Arc<dyn CaptainAuthStore>) -> Result<Arc<VetoClient>> {
    let api = HttpMatchApi::new(settings.server_url.as_str(), settings.request_timeout())
        .context("invalid server url")?;
    let push = WsPushConnector::new(&settings.server_url).context("invalid server url")?;
    Ok(VetoClient::new(
        Arc::new(api),
        Arc::new(push),
        auth_store,
        Arc::new(LoggingNavigator),
        settings.session_options(),
    ))
}

async fn open_storage(settings: &Settings) -> Result<Storage> {
    Storage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open credential database {}", settings.database_url))
}

/// Viewing still works without the credential database; identity resolves as unknown.
async fn open_auth_store(settings: &Settings) -> Arc<dyn CaptainAuthStore> {
    match open_storage(settings).await {
        Ok(storage) => Arc::new(storage),
        Err(error) => {
            warn!(database_url = %settings.database_url, "credential store unavailable: {error:#}");
            Arc::new(MissingCaptainAuthStore)
        }
    }
}

async fn watch(client: &Arc<VetoClient>, route: MatchRoute) -> Result<()> {
    let mut events = client.subscribe_events();
    let session = client.enter(route).await?;
    let identity = session.identity().await;
    println!("watching {} as {:?}", identity.match_id, identity.role);

    // The bootstrap snapshot is already queued as the first update event.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SnapshotUpdated { snapshot, .. }) => {
                    print_board(&snapshot);
                    if snapshot.phase == Phase::Completed {
                        break;
                    }
                }
                Ok(SessionEvent::Error(message)) => eprintln!("{message}"),
                Ok(SessionEvent::PushChannelChanged { live, .. }) => {
                    info!(live, "live updates changed");
                }
                Ok(SessionEvent::Closed { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped session events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.leave().await;
    Ok(())
}

async fn act(client: &Arc<VetoClient>, route: MatchRoute, map_id: MapId) -> Result<()> {
    let session = client.enter(route).await?;
    let result = session.select_map(map_id).await;
    client.leave().await;

    let snapshot = result?;
    print_board(&snapshot);
    Ok(())
}

fn print_board(snapshot: &MatchSnapshot) {
    let series = if snapshot.is_bo1() { "Bo1" } else { "Bo3" };
    println!();
    println!(
        "{} vs {} ({series}) - {}",
        snapshot.team_name(TeamIndex::A),
        snapshot.team_name(TeamIndex::B),
        snapshot.phase_label()
    );
    if snapshot.phase != Phase::Completed {
        println!("turn: {}", snapshot.current_team_name());
    }
    for map in &snapshot.available_maps {
        let status = match snapshot.map_status(map.id) {
            MapStatus::Available => "",
            MapStatus::Banned => "banned",
            MapStatus::Picked => "picked",
            MapStatus::Decider => "decider",
        };
        println!("  [{:>3}] {:<16} {status}", map.id.0, map.name);
    }
    for team in [TeamIndex::A, TeamIndex::B] {
        let picks = snapshot.team_picked_map_names(team);
        if !picks.is_empty() {
            println!("{} picks: {}", snapshot.team_name(team), picks.join(", "));
        }
    }
    if snapshot.phase == Phase::Completed {
        println!("decider: {}", snapshot.decider_map_name());
    }
}
