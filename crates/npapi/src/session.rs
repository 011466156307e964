use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::player::PlayerInfo;
use crate::universe::Universe;

pub const DEFAULT_BASE_URL: &str = "https://np.ironhelmet.com";

/// The order string that requests a full universe report.
pub const FULL_UNIVERSE_ORDER: &str = "full_universe_report";

const LOGIN_ENDPOINT: &str = "/arequest/login";
const INIT_PLAYER_ENDPOINT: &str = "/mrequest/init_player";
const ORDER_ENDPOINT: &str = "/trequest/order";

const AUTH_COOKIE_NAME: &str = "auth";
const INIT_PLAYER_TAG: &str = "meta_init_player";
const EVENT_FULL_UNIVERSE: &str = "order:full_universe";
const EVENT_ORDER_OK: &str = "order:ok";

/// Result of one order submission: the remote either resyncs us with a
/// full replacement universe or acknowledges without a state change.
#[derive(Debug, Clone)]
pub enum OrderReply {
    Universe(Arc<Universe>),
    Ack,
}

/// The capability a game needs from its owning session: submit orders and
/// fetch snapshots, nothing else. Keeps the game ↔ session relationship a
/// one-way handle instead of a bidirectional object graph.
#[async_trait]
pub trait GameService: Send + Sync {
    async fn submit_order(&self, game_id: &str, order: &str) -> Result<OrderReply, ApiError>;

    async fn fetch_universe(&self, game_id: &str) -> Result<Arc<Universe>, ApiError>;
}

/// Owns the authenticated session. One-way state machine: a client starts
/// unauthenticated and `authenticate` moves it to authenticated for the
/// rest of the process lifetime; re-authentication is out of scope. The
/// token is write-once and safely shared read-only across all games.
pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
    token: OnceLock<String>,
}

impl SessionClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: OnceLock::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.get().is_some()
    }

    /// Performs the login exchange and stores the session token. Fails
    /// with `ApiError::Authentication` when no auth cookie comes back.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.url(LOGIN_ENDPOINT))
            .form(&[
                ("type", "login"),
                ("alias", username),
                ("password", password),
            ])
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: LOGIN_ENDPOINT,
                source,
            })?;

        let token = extract_auth_cookie(response.headers()).ok_or_else(|| {
            ApiError::Authentication {
                reason: "no auth cookie in login response".to_string(),
            }
        })?;
        info!("session_authenticated");

        // First write wins; the session stays pinned to its first login.
        let _ = self.token.set(token.clone());
        Ok(token)
    }

    /// Fetches the account summary and the list of games it is in.
    pub async fn init_player(&self) -> Result<PlayerInfo, ApiError> {
        let cookie = self.auth_cookie()?;
        let response = self
            .http
            .post(self.url(INIT_PLAYER_ENDPOINT))
            .header(header::COOKIE, cookie)
            .form(&[("type", "init_player")])
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: INIT_PLAYER_ENDPOINT,
                source,
            })?;
        let body: Value = response.json().await.map_err(|source| ApiError::Transport {
            endpoint: INIT_PLAYER_ENDPOINT,
            source,
        })?;
        parse_init_player(&body)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn auth_cookie(&self) -> Result<String, ApiError> {
        self.token
            .get()
            .map(|token| format!("{AUTH_COOKIE_NAME}={token}"))
            .ok_or_else(|| ApiError::Authentication {
                reason: "auth token required, call authenticate first".to_string(),
            })
    }
}

impl Default for SessionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameService for SessionClient {
    async fn submit_order(&self, game_id: &str, order: &str) -> Result<OrderReply, ApiError> {
        let cookie = self.auth_cookie()?;
        debug!(game_id, order, "submit_order");
        let response = self
            .http
            .post(self.url(ORDER_ENDPOINT))
            .header(header::COOKIE, cookie)
            .form(&[
                ("type", "order"),
                ("order", order),
                ("version", ""),
                ("game_number", game_id),
            ])
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: ORDER_ENDPOINT,
                source,
            })?;
        let body: Value = response.json().await.map_err(|source| ApiError::Transport {
            endpoint: ORDER_ENDPOINT,
            source,
        })?;
        parse_order_reply(game_id, body)
    }

    async fn fetch_universe(&self, game_id: &str) -> Result<Arc<Universe>, ApiError> {
        match self.submit_order(game_id, FULL_UNIVERSE_ORDER).await? {
            OrderReply::Universe(universe) => Ok(universe),
            OrderReply::Ack => Err(ApiError::UnexpectedResponse {
                endpoint: ORDER_ENDPOINT,
                body: "order:ok (expected a full universe report)".to_string(),
            }),
        }
    }
}

fn extract_auth_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            (name.trim() == AUTH_COOKIE_NAME).then(|| value.trim().to_string())
        })
}

fn parse_init_player(body: &Value) -> Result<PlayerInfo, ApiError> {
    let tag = body.get(0).and_then(Value::as_str);
    if tag != Some(INIT_PLAYER_TAG) {
        return Err(unexpected(INIT_PLAYER_ENDPOINT, body));
    }
    let payload = body.get(1).ok_or_else(|| unexpected(INIT_PLAYER_ENDPOINT, body))?;
    serde_path_to_error::deserialize(payload)
        .map_err(|_| unexpected(INIT_PLAYER_ENDPOINT, body))
}

pub(crate) fn parse_order_reply(game_id: &str, body: Value) -> Result<OrderReply, ApiError> {
    let event = body.get("event").and_then(Value::as_str).unwrap_or_default();
    if event == EVENT_FULL_UNIVERSE {
        let report = match body.get("report") {
            Some(report) => report.clone(),
            None => return Err(unexpected(ORDER_ENDPOINT, &body)),
        };
        let universe = Universe::parse(game_id, report)?;
        Ok(OrderReply::Universe(Arc::new(universe)))
    } else if event == EVENT_ORDER_OK {
        Ok(OrderReply::Ack)
    } else {
        Err(unexpected(ORDER_ENDPOINT, &body))
    }
}

fn unexpected(endpoint: &'static str, body: &Value) -> ApiError {
    ApiError::UnexpectedResponse {
        endpoint,
        body: body.to_string(),
    }
}
