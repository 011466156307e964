mod api;
mod error;
mod events;
mod game;
mod player;
mod queue;
mod scheduler;
mod session;
mod store;
mod universe;
mod util;

pub use api::{ApiConfig, NeptunesApi};
pub use error::ApiError;
pub use events::GameEvent;
pub use game::{DiagnosticSink, Game, GameOptions, DEFAULT_BUILD_FLEET_SHIPS};
pub use player::{GameListing, GameListingConfig, PlayerInfo};
pub use queue::{OrderQueue, DEFAULT_ORDER_DELAY};
pub use session::{
    GameService, OrderReply, SessionClient, DEFAULT_BASE_URL, FULL_UNIVERSE_ORDER,
};
pub use store::{StoreError, UniverseStore};
pub use universe::{
    EntityId, Fleet, PlayerId, Star, Universe, NOT_ORBITING, PLACEHOLDER_GAME_ID, UNOWNED,
};
