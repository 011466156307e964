mod entity;
mod wire;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ApiError;
use crate::util::decode_html_entities;

pub use entity::{EntityId, Fleet, PlayerId, Star, NOT_ORBITING, UNOWNED};
use wire::RawUniverse;

/// Game id of the placeholder universe. Never reported by the service.
pub const PLACEHOLDER_GAME_ID: &str = "x";

const PLACEHOLDER_NAME: &str = "Empty universe";

/// One full point-in-time snapshot of a game.
///
/// Immutable once constructed; a game replaces its universe reference on
/// every successful refresh, it never mutates one in place. All views
/// (owned stars, fleets at a star) are pure queries over the snapshot.
#[derive(Debug, Clone)]
pub struct Universe {
    game_id: String,
    is_real: bool,
    raw: Value,

    pub name: String,
    pub player_id: PlayerId,
    pub started: bool,
    pub start_time: i64,
    pub paused: bool,
    pub game_over: bool,
    pub now: i64,
    pub turn_based: i64,
    pub turn_based_time_out: i64,
    pub production_rate: i64,
    pub production_counter: i64,
    pub tick: u64,
    pub tick_rate: i64,

    pub stars: BTreeMap<EntityId, Star>,
    pub fleets: BTreeMap<EntityId, Fleet>,
}

impl Universe {
    /// Parses a raw full-universe payload. Pure; the payload is retained
    /// verbatim so persistence round-trips through this same parser.
    pub fn parse(game_id: impl Into<String>, raw: Value) -> Result<Self, ApiError> {
        let game_id = game_id.into();
        let data: RawUniverse =
            serde_path_to_error::deserialize(&raw).map_err(|error| {
                let path = error.path().to_string();
                ApiError::MalformedUniverse {
                    game_id: game_id.clone(),
                    path,
                    source: error.into_inner(),
                }
            })?;

        let stars = data
            .stars
            .into_values()
            .map(|star| {
                (
                    star.uid,
                    Star {
                        id: star.uid,
                        owner_id: star.puid,
                        name: decode_html_entities(&star.n),
                        ships: star.st,
                    },
                )
            })
            .collect();
        let fleets = data
            .fleets
            .into_values()
            .map(|fleet| {
                (
                    fleet.uid,
                    Fleet {
                        id: fleet.uid,
                        owner_id: fleet.puid,
                        name: decode_html_entities(&fleet.n),
                        ships: fleet.st,
                        orbiting_star_id: fleet.ouid,
                    },
                )
            })
            .collect();

        Ok(Self {
            game_id,
            is_real: true,
            name: decode_html_entities(&data.name),
            player_id: data.player_uid,
            started: data.started,
            start_time: data.start_time,
            paused: data.paused,
            game_over: data.game_over != 0,
            now: data.now,
            turn_based: data.turn_based,
            turn_based_time_out: data.turn_based_time_out,
            production_rate: data.production_rate,
            production_counter: data.production_counter,
            tick: data.tick,
            tick_rate: data.tick_rate,
            stars,
            fleets,
            raw,
        })
    }

    /// The "no data yet" sentinel a game starts with. Never treated as
    /// real: no diffing, no events, no persistence.
    pub fn placeholder() -> Self {
        Self {
            game_id: PLACEHOLDER_GAME_ID.to_string(),
            is_real: false,
            raw: Value::Null,
            name: PLACEHOLDER_NAME.to_string(),
            player_id: UNOWNED,
            started: false,
            start_time: -1,
            paused: false,
            game_over: false,
            now: 0,
            turn_based: 0,
            turn_based_time_out: 0,
            production_rate: 0,
            production_counter: 0,
            tick: 0,
            tick_rate: 0,
            stars: BTreeMap::new(),
            fleets: BTreeMap::new(),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// True iff this universe was parsed from an actual service response.
    pub fn is_real(&self) -> bool {
        self.is_real
    }

    /// The payload exactly as received, for persistence and diagnostics.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Same game identity; tick is deliberately not compared.
    pub fn is_same_game(&self, other: &Universe) -> bool {
        self.game_id == other.game_id
    }

    pub fn star(&self, id: EntityId) -> Option<&Star> {
        self.stars.get(&id)
    }

    pub fn star_by_name(&self, name: &str) -> Option<&Star> {
        self.stars
            .values()
            .find(|star| star.name.eq_ignore_ascii_case(name))
    }

    pub fn fleet(&self, id: EntityId) -> Option<&Fleet> {
        self.fleets.get(&id)
    }

    pub fn player_stars(&self, player_id: PlayerId) -> Vec<&Star> {
        self.stars
            .values()
            .filter(|star| star.owner_id == player_id)
            .collect()
    }

    pub fn own_stars(&self) -> Vec<&Star> {
        self.player_stars(self.player_id)
    }

    /// Fleets currently orbiting `star`, in fleet-id order, optionally
    /// restricted to one owner.
    pub fn fleets_at_star(&self, star: &Star, owner: Option<PlayerId>) -> Vec<&Fleet> {
        self.fleets
            .values()
            .filter(|fleet| fleet.orbiting_star_id == star.id)
            .filter(|fleet| owner.is_none_or(|owner| fleet.owner_id == owner))
            .collect()
    }

    /// Ships present at `star` from `player_id`'s point of view: the
    /// garrison when the star is theirs, plus every orbiting fleet's ships.
    pub fn total_ships_at(&self, star: &Star, player_id: PlayerId) -> i64 {
        let garrison = if star.owner_id == player_id {
            star.ships
        } else {
            0
        };
        let fleet_ships: i64 = self
            .fleets_at_star(star, None)
            .iter()
            .map(|fleet| fleet.ships)
            .sum();
        garrison + fleet_ships
    }
}
