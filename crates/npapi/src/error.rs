use thiserror::Error;

use crate::store::StoreError;

/// Error taxonomy for the whole client.
///
/// `Authentication` is fatal to the process; everything else is fatal only
/// to the refresh or order attempt that raised it. Transport failures are
/// never retried here, retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("transport failure talking to {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {endpoint}: {body}")]
    UnexpectedResponse {
        endpoint: &'static str,
        body: String,
    },

    #[error("malformed universe for game {game_id} at {path}: {source}")]
    MalformedUniverse {
        game_id: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("universe store failure for game {game_id}: {source}")]
    Store {
        game_id: String,
        #[source]
        source: StoreError,
    },

    #[error("order queue for game {game_id} is closed")]
    OrderQueueClosed { game_id: String },
}
