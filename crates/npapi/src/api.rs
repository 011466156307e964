use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

use crate::error::ApiError;
use crate::game::{DiagnosticSink, Game, GameOptions};
use crate::player::PlayerInfo;
use crate::queue::DEFAULT_ORDER_DELAY;
use crate::session::{GameService, SessionClient, DEFAULT_BASE_URL};
use crate::store::UniverseStore;

#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Directory holding one persisted universe blob per game.
    pub cache_dir: PathBuf,
    pub order_delay: Duration,
    pub diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: PathBuf::from("cache/games"),
            order_delay: DEFAULT_ORDER_DELAY,
            diagnostics: None,
        }
    }
}

/// Aggregate root tying one authenticated session to the games the
/// account participates in. The session is shared read-only across all
/// games; each game serializes its own orders independently.
pub struct NeptunesApi {
    session: Arc<SessionClient>,
    store: UniverseStore,
    order_delay: Duration,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    games: Mutex<HashMap<String, Game>>,
}

impl NeptunesApi {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            session: Arc::new(SessionClient::with_base_url(config.base_url)),
            store: UniverseStore::new(config.cache_dir),
            order_delay: config.order_delay,
            diagnostics: config.diagnostics,
            games: Mutex::new(HashMap::new()),
        }
    }

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        self.session.authenticate(username, password).await
    }

    pub async fn init_player(&self) -> Result<PlayerInfo, ApiError> {
        self.session.init_player().await
    }

    /// Registers a game the account participates in, replacing any
    /// previous handle under the same id.
    pub fn add_game(&self, game_id: &str, name: &str) -> Game {
        let game = Game::with_options(
            game_id,
            name,
            Arc::clone(&self.session) as Arc<dyn GameService>,
            self.store.clone(),
            GameOptions {
                order_delay: self.order_delay,
                diagnostics: self.diagnostics.clone(),
            },
        );
        info!(game_id, name, "game_added");
        self.lock_games().insert(game_id.to_string(), game.clone());
        game
    }

    pub fn game(&self, game_id: &str) -> Option<Game> {
        self.lock_games().get(game_id).cloned()
    }

    pub fn games(&self) -> Vec<Game> {
        self.lock_games().values().cloned().collect()
    }

    /// Unregisters a game and stops its background refresh.
    pub fn remove_game(&self, game_id: &str) -> Option<Game> {
        let game = self.lock_games().remove(game_id);
        if let Some(game) = &game {
            game.stop_refresh();
            info!(game_id, "game_removed");
        }
        game
    }

    fn lock_games(&self) -> std::sync::MutexGuard<'_, HashMap<String, Game>> {
        self.games.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
