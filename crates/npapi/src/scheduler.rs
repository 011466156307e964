use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::GameEvent;
use crate::game::{Game, GameInner};

/// Per-game repeating refresh timer.
///
/// Each cycle emits `RefreshStarting`, runs a full refresh, and reports
/// `RefreshComplete` or `RefreshError`; a failed cycle never cancels the
/// timer. The background task holds the game only weakly, so dropping the
/// last game handle ends the timer instead of leaking it.
pub(crate) struct RefreshScheduler {
    state: Mutex<Option<ScheduleState>>,
}

struct ScheduleState {
    handle: JoinHandle<()>,
    period: Duration,
}

impl RefreshScheduler {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Idempotent: any already-running timer is stopped first.
    pub(crate) fn start(&self, game: &Game, period: Duration) {
        let weak = game.inner_weak();
        let game_id = game.game_id().to_string();

        let mut state = self.lock();
        if let Some(previous) = state.take() {
            previous.handle.abort();
        }
        debug!(game_id = %game_id, period_secs = period.as_secs_f64(), "refresh_timer_started");
        let handle = tokio::spawn(run_cycles(weak, game_id, period));
        *state = Some(ScheduleState { handle, period });
    }

    /// Restarts the timer with its current period; no-op when stopped.
    pub(crate) fn reset(&self, game: &Game) {
        let period = self.lock().as_ref().map(|state| state.period);
        if let Some(period) = period {
            self.start(game, period);
        }
    }

    pub(crate) fn stop(&self) {
        if let Some(state) = self.lock().take() {
            state.handle.abort();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ScheduleState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_cycles(weak: Weak<GameInner>, game_id: String, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        let game = Game::from_inner(inner);

        game.emit(GameEvent::RefreshStarting);
        debug!(game_id = %game_id, "refresh_cycle_start");
        match game.refresh().await {
            Ok(universe) => {
                debug!(game_id = %game_id, tick = universe.tick, "refresh_cycle_complete");
                game.emit(GameEvent::RefreshComplete);
            }
            Err(error) => {
                warn!(game_id = %game_id, %error, "refresh_cycle_failed");
                game.emit(GameEvent::RefreshError(Arc::new(error)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::{denied_reply, drain, test_game, universe_reply};

    fn count(events: &[GameEvent], probe: impl Fn(&GameEvent) -> bool) -> usize {
        events.iter().filter(|event| probe(event)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_emit_start_and_completion_events() {
        let (game, _service, _temp) =
            test_game(vec![universe_reply(5, 0), universe_reply(6, 0)]);
        let mut events = game.subscribe();

        game.start_refresh(Duration::from_secs(10));
        assert!(game.is_refresh_running());
        tokio::time::sleep(Duration::from_secs(25)).await;

        let seen = drain(&mut events);
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::RefreshStarting)),
            2
        );
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::RefreshComplete)),
            2
        );
        // Second cycle advanced the tick.
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::TickChanged { tick: 6 })),
            1
        );
        game.stop_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_cycle_does_not_cancel_the_timer() {
        let (game, _service, _temp) =
            test_game(vec![denied_reply(), universe_reply(5, 0)]);
        let mut events = game.subscribe();

        game.start_refresh(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(25)).await;

        let seen = drain(&mut events);
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::RefreshError(_))),
            1
        );
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::RefreshComplete)),
            1
        );
        assert!(game.is_refresh_running());
        game.stop_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_cycles() {
        let (game, service, _temp) = test_game(Vec::new());

        game.start_refresh(Duration::from_secs(10));
        game.stop_refresh();
        assert!(!game.is_refresh_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(service.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let (game, _service, _temp) = test_game(vec![universe_reply(5, 0)]);
        let mut events = game.subscribe();

        game.start_refresh(Duration::from_secs(10));
        game.start_refresh(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(15)).await;

        let seen = drain(&mut events);
        assert_eq!(
            count(&seen, |event| matches!(event, GameEvent::RefreshStarting)),
            1
        );
        game.stop_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_a_no_op_unless_running() {
        let (game, service, _temp) = test_game(vec![universe_reply(5, 0)]);

        game.reset_refresh();
        assert!(!game.is_refresh_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(service.orders().is_empty());

        game.start_refresh(Duration::from_secs(10));
        game.reset_refresh();
        assert!(game.is_refresh_running());
        game.stop_refresh();
    }
}
