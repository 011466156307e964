//! Raw wire shape of a full universe report. This mirrors the remote
//! service's field names exactly and is a fixed external contract.

use std::collections::HashMap;

use serde::Deserialize;

use super::entity::{EntityId, PlayerId, NOT_ORBITING};

#[derive(Debug, Deserialize)]
pub(crate) struct RawUniverse {
    pub name: String,
    pub player_uid: PlayerId,
    pub stars: HashMap<String, RawStar>,
    pub fleets: HashMap<String, RawFleet>,
    pub started: bool,
    #[serde(default = "default_start_time")]
    pub start_time: i64,
    pub paused: bool,
    #[serde(default)]
    pub game_over: i64,
    #[serde(default)]
    pub now: i64,
    pub turn_based: i64,
    #[serde(default)]
    pub turn_based_time_out: i64,
    #[serde(default)]
    pub production_rate: i64,
    #[serde(default)]
    pub production_counter: i64,
    pub tick: u64,
    #[serde(default)]
    pub tick_rate: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStar {
    pub uid: EntityId,
    pub puid: PlayerId,
    pub n: String,
    /// Absent for stars outside scanner range.
    #[serde(default)]
    pub st: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFleet {
    pub uid: EntityId,
    pub puid: PlayerId,
    pub n: String,
    #[serde(default)]
    pub st: i64,
    /// Absent while the fleet is in transit between stars.
    #[serde(default = "default_orbit")]
    pub ouid: EntityId,
}

fn default_start_time() -> i64 {
    -1
}

fn default_orbit() -> EntityId {
    NOT_ORBITING
}
