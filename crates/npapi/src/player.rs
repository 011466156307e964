use serde::Deserialize;

/// Account summary returned by the init-player call.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerInfo {
    #[serde(default)]
    pub games_in: u32,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub open_games: Vec<GameListing>,
}

impl PlayerInfo {
    pub fn active_games(&self) -> impl Iterator<Item = &GameListing> {
        self.open_games
            .iter()
            .filter(|listing| listing.is_active())
    }
}

/// One game the account participates in.
#[derive(Debug, Clone, Deserialize)]
pub struct GameListing {
    /// The game id used on every subsequent order call.
    pub number: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub turn_based: i64,
    #[serde(default)]
    pub players: u32,
    #[serde(default, rename = "maxPlayers")]
    pub max_players: u32,
    #[serde(default)]
    pub config: GameListingConfig,
}

impl GameListing {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameListingConfig {
    #[serde(default)]
    pub description: String,
}
