use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::events::GameEvent;
use crate::queue::{OrderQueue, DEFAULT_ORDER_DELAY};
use crate::scheduler::RefreshScheduler;
use crate::session::{GameService, OrderReply, FULL_UNIVERSE_ORDER};
use crate::store::UniverseStore;
use crate::universe::{EntityId, Universe};

/// Ship count used when building a fleet without a caller preference.
pub const DEFAULT_BUILD_FLEET_SHIPS: i64 = 1;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Optional observer for every raw universe the game receives, injected
/// at construction. Replaces ad-hoc debug dumps; the default is no sink.
pub trait DiagnosticSink: Send + Sync {
    fn universe_received(&self, game_id: &str, tick: u64, raw: &Value);
}

#[derive(Clone)]
pub struct GameOptions {
    pub order_delay: Duration,
    pub diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            order_delay: DEFAULT_ORDER_DELAY,
            diagnostics: None,
        }
    }
}

/// Per-game state engine: holds the current universe, serializes every
/// order and refresh through one queue, detects meaningful transitions,
/// and persists each full universe it receives.
///
/// Cheap to clone; all clones share the same underlying game.
#[derive(Clone)]
pub struct Game {
    inner: Arc<GameInner>,
}

pub(crate) struct GameInner {
    game_id: String,
    name: String,
    service: Arc<dyn GameService>,
    store: UniverseStore,
    order_delay: Duration,
    current: RwLock<Arc<Universe>>,
    queue: OnceLock<OrderQueue>,
    events: broadcast::Sender<GameEvent>,
    scheduler: RefreshScheduler,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl Game {
    pub fn new(
        game_id: impl Into<String>,
        name: impl Into<String>,
        service: Arc<dyn GameService>,
        store: UniverseStore,
    ) -> Self {
        Self::with_options(game_id, name, service, store, GameOptions::default())
    }

    pub fn with_options(
        game_id: impl Into<String>,
        name: impl Into<String>,
        service: Arc<dyn GameService>,
        store: UniverseStore,
        options: GameOptions,
    ) -> Self {
        Self {
            inner: Arc::new(GameInner {
                game_id: game_id.into(),
                name: name.into(),
                service,
                store,
                order_delay: options.order_delay,
                current: RwLock::new(Arc::new(Universe::placeholder())),
                queue: OnceLock::new(),
                events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
                scheduler: RefreshScheduler::new(),
                diagnostics: options.diagnostics,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<GameInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner_weak(&self) -> std::sync::Weak<GameInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn game_id(&self) -> &str {
        &self.inner.game_id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The current universe. Starts as the placeholder until the first
    /// load or refresh completes.
    pub fn universe(&self) -> Arc<Universe> {
        self.inner.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: GameEvent) {
        self.inner.emit(event);
    }

    /// Fetches a full universe through the order queue, so refreshes obey
    /// the same serialization discipline as commands.
    pub async fn refresh(&self) -> Result<Arc<Universe>, ApiError> {
        self.send_order(FULL_UNIVERSE_ORDER.to_string()).await
    }

    /// Submits one raw order string. A full-universe reply replaces the
    /// current universe (with change detection and persistence); a bare
    /// ack leaves it untouched.
    pub async fn send_order(&self, order: impl Into<String>) -> Result<Arc<Universe>, ApiError> {
        self.enqueue_order(order.into()).await
    }

    /// Adopts the persisted universe when one exists and parses, silently
    /// (a cold load is not a change); otherwise falls through to a live
    /// refresh.
    pub async fn load_or_refresh(&self) -> Result<Arc<Universe>, ApiError> {
        match self.inner.store.load(&self.inner.game_id).await {
            Ok(Some(raw)) => match Universe::parse(self.inner.game_id.clone(), raw) {
                Ok(universe) => {
                    info!(game_id = %self.inner.game_id, tick = universe.tick, "universe_loaded_from_cache");
                    let universe = Arc::new(universe);
                    self.inner.set_current(Arc::clone(&universe));
                    return Ok(universe);
                }
                Err(error) => {
                    warn!(game_id = %self.inner.game_id, %error, "cached_universe_unparseable");
                }
            },
            Ok(None) => {
                debug!(game_id = %self.inner.game_id, "no_cached_universe");
            }
            Err(error) => {
                warn!(game_id = %self.inner.game_id, %error, "cached_universe_unreadable");
            }
        }
        self.refresh().await
    }

    pub async fn build_fleet(
        &self,
        star_id: EntityId,
        ships: i64,
    ) -> Result<Arc<Universe>, ApiError> {
        self.send_order(format!("new_fleet,{star_id},{ships}")).await
    }

    /// Transfers ships into or out of a fleet until it holds
    /// `total_ships`.
    pub async fn move_ships_to_fleet(
        &self,
        fleet_id: EntityId,
        total_ships: i64,
    ) -> Result<Arc<Universe>, ApiError> {
        self.send_order(format!("ship_transfer,{fleet_id},{total_ships}"))
            .await
    }

    pub async fn move_all_ships_to_star(
        &self,
        star_id: EntityId,
    ) -> Result<Arc<Universe>, ApiError> {
        self.send_order(format!("gather_all_ships,{star_id}")).await
    }

    /// Splits every ship present at the star evenly across the fleets
    /// orbiting it: each fleet gets `floor(total / fleets)`, with the
    /// remainder spread one ship each over the lowest-id fleets, so the
    /// distributed sum always equals the ships present. The transfers are
    /// all enqueued up front; ordering among them does not matter since
    /// they target distinct fleets.
    pub async fn split_ships_to_fleets(
        &self,
        star_id: EntityId,
    ) -> Result<Arc<Universe>, ApiError> {
        let universe = self.universe();
        let Some(star) = universe.star(star_id) else {
            warn!(game_id = %self.inner.game_id, star_id, "split_unknown_star");
            return Ok(universe);
        };
        let fleets = universe.fleets_at_star(star, None);
        if fleets.is_empty() {
            return Ok(universe);
        }

        let total = universe.total_ships_at(star, universe.player_id);
        let fleet_count = fleets.len() as i64;
        let base = total / fleet_count;
        let remainder = (total % fleet_count) as usize;

        let mut pending = Vec::new();
        for (index, fleet) in fleets.iter().enumerate() {
            let ships = base + i64::from(index < remainder);
            if ships == 0 {
                continue;
            }
            pending.push(self.enqueue_order(format!("ship_transfer,{},{ships}", fleet.id)));
        }
        for transfer in pending {
            transfer.await?;
        }
        Ok(self.universe())
    }

    /// Starts (or restarts) the repeating background refresh.
    pub fn start_refresh(&self, period: Duration) {
        self.inner.scheduler.start(self, period);
    }

    /// No-op unless a refresh timer is currently running.
    pub fn reset_refresh(&self) {
        self.inner.scheduler.reset(self);
    }

    pub fn stop_refresh(&self) {
        self.inner.scheduler.stop();
    }

    pub fn is_refresh_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    fn enqueue_order(
        &self,
        order: String,
    ) -> impl Future<Output = Result<Arc<Universe>, ApiError>> {
        let queue = self.inner.queue.get_or_init(|| {
            OrderQueue::new(self.inner.game_id.clone(), self.inner.order_delay)
        });
        let inner = Arc::clone(&self.inner);
        queue.enqueue(move || async move {
            debug!(game_id = %inner.game_id, order = %order, "order_submitting");
            let reply = inner.service.submit_order(&inner.game_id, &order).await?;
            inner.apply_order_reply(reply).await
        })
    }
}

impl GameInner {
    fn current(&self) -> Arc<Universe> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_current(&self, universe: Arc<Universe>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = universe;
    }

    fn emit(&self, event: GameEvent) {
        // Nobody subscribed is fine.
        let _ = self.events.send(event);
    }

    /// Runs only inside the order queue, so replacements are serialized.
    async fn apply_order_reply(&self, reply: OrderReply) -> Result<Arc<Universe>, ApiError> {
        match reply {
            OrderReply::Ack => Ok(self.current()),
            OrderReply::Universe(universe) => {
                if let Some(sink) = &self.diagnostics {
                    sink.universe_received(&self.game_id, universe.tick, universe.raw());
                }

                let previous = self.current();
                self.set_current(Arc::clone(&universe));
                self.notify_replaced(&previous, &universe);

                if let Err(source) = self.store.save(&self.game_id, universe.raw()).await {
                    let error = ApiError::Store {
                        game_id: self.game_id.clone(),
                        source,
                    };
                    warn!(game_id = %self.game_id, %error, "universe_save_failed");
                }
                Ok(universe)
            }
        }
    }

    /// Change-detection protocol. No events for the very first real
    /// universe: there is nothing to compare against.
    fn notify_replaced(&self, previous: &Universe, next: &Universe) {
        if !previous.is_real() {
            return;
        }
        self.emit(GameEvent::StateUpdated);
        if previous.is_same_game(next) && previous.tick != next.tick {
            debug!(game_id = %self.game_id, tick = next.tick, "tick_changed");
            self.emit(GameEvent::TickChanged { tick: next.tick });
            if next.turn_based != 0 {
                self.emit(GameEvent::TurnChanged { tick: next.tick });
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::test_support::*;
    use super::*;
    use crate::universe::test_support::sample_raw;
    use crate::universe::PLACEHOLDER_GAME_ID;

    fn count(events: &[GameEvent], probe: impl Fn(&GameEvent) -> bool) -> usize {
        events.iter().filter(|event| probe(event)).count()
    }

    #[tokio::test]
    async fn first_real_universe_emits_no_events() {
        let (game, _service, _temp) = test_game(vec![universe_reply(5, 0)]);
        let mut events = game.subscribe();

        assert_eq!(game.universe().game_id(), PLACEHOLDER_GAME_ID);
        let universe = game.refresh().await.expect("refresh");
        assert_eq!(universe.tick, 5);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn tick_sequence_emits_expected_events() {
        let replies = [5u64, 5, 6, 6, 7]
            .into_iter()
            .map(|tick| universe_reply(tick, 0))
            .collect();
        let (game, _service, _temp) = test_game(replies);
        let mut events = game.subscribe();

        for _ in 0..5 {
            game.refresh().await.expect("refresh");
        }

        let seen = drain(&mut events);
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::StateUpdated)),
            4
        );
        let ticks: Vec<u64> = seen
            .iter()
            .filter_map(|event| match event {
                GameEvent::TickChanged { tick } => Some(*tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, [6, 7]);
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::TurnChanged { .. })),
            0
        );
    }

    #[tokio::test]
    async fn turn_based_games_pair_turn_with_tick() {
        let (game, _service, _temp) =
            test_game(vec![universe_reply(5, 1), universe_reply(6, 1)]);
        let mut events = game.subscribe();

        game.refresh().await.expect("refresh");
        game.refresh().await.expect("refresh");

        let seen = drain(&mut events);
        assert!(matches!(seen[0], GameEvent::StateUpdated));
        assert!(matches!(seen[1], GameEvent::TickChanged { tick: 6 }));
        assert!(matches!(seen[2], GameEvent::TurnChanged { tick: 6 }));
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn unexpected_response_rejects_and_preserves_state() {
        let (game, _service, _temp) =
            test_game(vec![universe_reply(5, 0), denied_reply()]);
        let mut events = game.subscribe();

        game.refresh().await.expect("refresh");
        drain(&mut events);

        let error = game
            .build_fleet(1, DEFAULT_BUILD_FLEET_SHIPS)
            .await
            .expect_err("must fail");
        assert!(matches!(error, ApiError::UnexpectedResponse { .. }));
        assert_eq!(game.universe().tick, 5);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn ack_reply_leaves_the_universe_untouched() {
        let (game, _service, _temp) =
            test_game(vec![universe_reply(5, 0), Ok(OrderReply::Ack)]);

        let before = game.refresh().await.expect("refresh");
        let after = game.move_all_ships_to_star(1).await.expect("order");
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn command_order_strings_follow_the_grammar() {
        let (game, service, _temp) = test_game(vec![
            Ok(OrderReply::Ack),
            Ok(OrderReply::Ack),
            Ok(OrderReply::Ack),
        ]);

        game.build_fleet(42, 3).await.expect("build");
        game.move_ships_to_fleet(7, 12).await.expect("transfer");
        game.move_all_ships_to_star(42).await.expect("gather");

        assert_eq!(
            service.orders(),
            ["new_fleet,42,3", "ship_transfer,7,12", "gather_all_ships,42"]
        );
    }

    #[tokio::test]
    async fn split_distributes_every_ship_exactly_once() {
        // Star 1: garrison 2 (owned), fleets 10/11/12 with 3 ships each.
        // 11 ships over 3 fleets: 4, 4, 3.
        let (game, service, _temp) = test_game(vec![
            universe_reply(5, 0),
            Ok(OrderReply::Ack),
            Ok(OrderReply::Ack),
            Ok(OrderReply::Ack),
        ]);

        game.refresh().await.expect("refresh");
        game.split_ships_to_fleets(1).await.expect("split");

        let orders = service.orders();
        assert_eq!(
            &orders[1..],
            ["ship_transfer,10,4", "ship_transfer,11,4", "ship_transfer,12,3"]
        );
    }

    #[tokio::test]
    async fn split_skips_zero_ship_transfers() {
        let raw = serde_json::json!({
            "name": "n", "player_uid": 1,
            "stars": { "1": { "uid": 1, "puid": 1, "n": "Sol", "st": 1 } },
            "fleets": {
                "10": { "uid": 10, "puid": 1, "n": "A", "st": 0, "ouid": 1 },
                "11": { "uid": 11, "puid": 1, "n": "B", "st": 0, "ouid": 1 },
            },
            "started": true, "paused": false, "turn_based": 0, "tick": 5,
        });
        let universe = Universe::parse(GAME_ID, raw).expect("parse");
        let (game, service, _temp) = test_game(vec![
            Ok(OrderReply::Universe(Arc::new(universe))),
            Ok(OrderReply::Ack),
        ]);

        game.refresh().await.expect("refresh");
        game.split_ships_to_fleets(1).await.expect("split");

        // One ship total: only the first fleet receives a transfer.
        assert_eq!(service.orders()[1..], ["ship_transfer,10,1"]);
    }

    #[tokio::test]
    async fn split_without_fleets_or_star_is_a_no_op() {
        let (game, service, _temp) = test_game(vec![universe_reply(5, 0)]);
        game.refresh().await.expect("refresh");

        // Star 2 has no orbiting fleets; star 99 does not exist.
        game.split_ships_to_fleets(2).await.expect("split");
        game.split_ships_to_fleets(99).await.expect("split");
        assert_eq!(service.orders().len(), 1);
    }

    #[tokio::test]
    async fn load_or_refresh_prefers_the_cache() {
        let (game, service, temp) = test_game(Vec::new());
        let store = UniverseStore::new(temp.path());
        store.save(GAME_ID, &sample_raw(7, 0)).await.expect("seed");
        let mut events = game.subscribe();

        let universe = game.load_or_refresh().await.expect("load");
        assert_eq!(universe.tick, 7);
        assert!(service.orders().is_empty());
        // A cold load is not a change.
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn load_or_refresh_falls_back_to_the_network() {
        let (game, service, temp) = test_game(vec![universe_reply(5, 0)]);

        let universe = game.load_or_refresh().await.expect("load");
        assert_eq!(universe.tick, 5);
        assert_eq!(service.orders(), [FULL_UNIVERSE_ORDER]);

        // ...and the fetched universe is persisted for next time.
        let store = UniverseStore::new(temp.path());
        let cached = store.load(GAME_ID).await.expect("load").expect("present");
        assert_eq!(cached["tick"], 5);
    }

    #[tokio::test]
    async fn corrupt_cache_falls_back_to_the_network() {
        let (game, _service, temp) = test_game(vec![universe_reply(5, 0)]);
        let store = UniverseStore::new(temp.path());
        tokio::fs::write(store.path_for(GAME_ID), "{not json")
            .await
            .expect("write");

        let universe = game.load_or_refresh().await.expect("load");
        assert_eq!(universe.tick, 5);
    }

    #[tokio::test]
    async fn diagnostic_sink_sees_every_universe() {
        struct CountingSink(AtomicUsize);
        impl DiagnosticSink for CountingSink {
            fn universe_received(&self, _game_id: &str, _tick: u64, _raw: &Value) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let temp = tempfile::TempDir::new().expect("temp");
        let service = MockService::new(vec![universe_reply(5, 0), universe_reply(6, 0)]);
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let game = Game::with_options(
            GAME_ID,
            "Test Galaxy",
            Arc::clone(&service) as Arc<dyn GameService>,
            UniverseStore::new(temp.path()),
            GameOptions {
                order_delay: Duration::from_millis(1),
                diagnostics: Some(Arc::clone(&sink) as Arc<dyn DiagnosticSink>),
            },
        );

        game.refresh().await.expect("refresh");
        game.refresh().await.expect("refresh");
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn operations_on_different_games_are_independent() {
        let (first, _s1, _t1) = test_game(vec![universe_reply(5, 0)]);
        let (second, _s2, _t2) = test_game(vec![universe_reply(9, 0)]);

        let (a, b) = tokio::join!(first.refresh(), second.refresh());
        assert_eq!(a.expect("first").tick, 5);
        assert_eq!(b.expect("second").tick, 9);
    }
}
