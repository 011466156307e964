use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::ApiError;
use crate::universe::Universe;

/// Settling delay imposed before each order, to respect the remote
/// service's rate expectations.
pub const DEFAULT_ORDER_DELAY: Duration = Duration::from_millis(100);

type OrderResult = Result<Arc<Universe>, ApiError>;
type OrderFuture = Pin<Box<dyn Future<Output = OrderResult> + Send>>;
type OrderTask = Box<dyn FnOnce() -> OrderFuture + Send>;

struct QueuedOrder {
    task: OrderTask,
    reply: oneshot::Sender<OrderResult>,
}

/// Per-game serialization primitive for order submission.
///
/// Tasks run strictly one at a time in enqueue order, never overlapping,
/// with the settling delay before each one. A failing task is reported
/// only to its own awaiter; the chain keeps going. The worker lives until
/// the queue is dropped.
pub struct OrderQueue {
    game_id: String,
    sender: mpsc::UnboundedSender<QueuedOrder>,
}

impl OrderQueue {
    pub fn new(game_id: impl Into<String>, settle_delay: Duration) -> Self {
        let game_id = game_id.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedOrder>();

        let worker_game_id = game_id.clone();
        tokio::spawn(async move {
            while let Some(next) = receiver.recv().await {
                tokio::time::sleep(settle_delay).await;
                let result = (next.task)().await;
                if let Err(error) = &result {
                    debug!(game_id = %worker_game_id, %error, "queued_order_failed");
                }
                // The awaiter may have gone away; the order still ran.
                let _ = next.reply.send(result);
            }
        });

        Self { game_id, sender }
    }

    /// Appends `task` to the chain. The task's position is fixed at this
    /// call, not when the returned future is first polled; the future
    /// resolves with the task's own result once its turn completes.
    pub fn enqueue<F, Fut>(&self, task: F) -> impl Future<Output = OrderResult>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = OrderResult> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let boxed: OrderTask = Box::new(move || Box::pin(task()) as OrderFuture);
        let enqueued = self
            .sender
            .send(QueuedOrder { task: boxed, reply })
            .is_ok();
        let game_id = self.game_id.clone();

        async move {
            if !enqueued {
                return Err(ApiError::OrderQueueClosed { game_id });
            }
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(ApiError::OrderQueueClosed { game_id }),
            }
        }
    }
}
