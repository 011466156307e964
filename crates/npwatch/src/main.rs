use std::path::PathBuf;
use std::time::Duration;

use npapi::{ApiConfig, ApiError, GameEvent, NeptunesApi};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USERNAME_ENV_VAR: &str = "NP_USERNAME";
const PASSWORD_ENV_VAR: &str = "NP_PASSWORD";
const BASE_URL_ENV_VAR: &str = "NP_BASE_URL";
const CACHE_DIR_ENV_VAR: &str = "NP_CACHE_DIR";
const REFRESH_SECS_ENV_VAR: &str = "NP_REFRESH_SECS";
const DEFAULT_REFRESH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        error!(%error, "npwatch_failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

async fn run() -> Result<(), ApiError> {
    let username = require_env(USERNAME_ENV_VAR)?;
    let password = require_env(PASSWORD_ENV_VAR)?;

    let mut config = ApiConfig::default();
    if let Ok(base_url) = std::env::var(BASE_URL_ENV_VAR) {
        config.base_url = base_url;
    }
    if let Ok(cache_dir) = std::env::var(CACHE_DIR_ENV_VAR) {
        config.cache_dir = PathBuf::from(cache_dir);
    }
    let refresh_period = Duration::from_secs(refresh_secs_from_env());

    let api = NeptunesApi::new(config);
    api.authenticate(&username, &password).await?;
    let player = api.init_player().await?;
    info!(alias = %player.alias, games_in = player.games_in, "signed_in");

    let mut watchers: Vec<JoinHandle<()>> = Vec::new();
    for listing in player.active_games() {
        let game = api.add_game(&listing.number, &listing.name);
        let universe = game.load_or_refresh().await?;
        info!(
            game_id = game.game_id(),
            name = game.name(),
            tick = universe.tick,
            stars = universe.stars.len(),
            "game_watched"
        );
        watchers.push(tokio::spawn(log_events(game.clone())));
        game.start_refresh(refresh_period);
    }

    if watchers.is_empty() {
        warn!("no_active_games");
        return Ok(());
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "signal_wait_failed");
    }
    info!("shutting_down");
    for game in api.games() {
        game.stop_refresh();
    }
    for watcher in watchers {
        watcher.abort();
    }
    Ok(())
}

fn require_env(name: &'static str) -> Result<String, ApiError> {
    std::env::var(name).map_err(|_| ApiError::Authentication {
        reason: format!("{name} is not set"),
    })
}

fn refresh_secs_from_env() -> u64 {
    match std::env::var(REFRESH_SECS_ENV_VAR) {
        Ok(value) => match value.parse() {
            Ok(secs) => secs,
            Err(_) => {
                warn!(
                    value = %value,
                    default = DEFAULT_REFRESH_SECS,
                    "invalid_refresh_secs"
                );
                DEFAULT_REFRESH_SECS
            }
        },
        Err(_) => DEFAULT_REFRESH_SECS,
    }
}

async fn log_events(game: npapi::Game) {
    let mut events = game.subscribe();
    loop {
        match events.recv().await {
            Ok(GameEvent::StateUpdated) => {
                let universe = game.universe();
                info!(
                    game_id = game.game_id(),
                    tick = universe.tick,
                    fleets = universe.fleets.len(),
                    "state_updated"
                );
            }
            Ok(GameEvent::TickChanged { tick }) => {
                info!(game_id = game.game_id(), tick, "tick_changed");
            }
            Ok(GameEvent::TurnChanged { tick }) => {
                info!(game_id = game.game_id(), tick, "turn_changed");
            }
            Ok(GameEvent::RefreshStarting) => {}
            Ok(GameEvent::RefreshComplete) => {}
            Ok(GameEvent::RefreshError(error)) => {
                warn!(game_id = game.game_id(), %error, "refresh_failed");
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(game_id = game.game_id(), missed, "events_lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
