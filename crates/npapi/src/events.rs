use std::sync::Arc;

use crate::error::ApiError;

/// Change notifications a game broadcasts to its subscribers.
///
/// `StateUpdated` fires on every real-to-real universe replacement, even
/// when the tick is unchanged, so side-channel observers never miss an
/// update. `TickChanged` fires only on a same-game tick advance, and
/// `TurnChanged` accompanies it when the game is turn-based. Nothing is
/// emitted for the very first real universe.
#[derive(Debug, Clone)]
pub enum GameEvent {
    StateUpdated,
    TickChanged { tick: u64 },
    TurnChanged { tick: u64 },
    RefreshStarting,
    RefreshComplete,
    RefreshError(Arc<ApiError>),
}
