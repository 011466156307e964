/// Identifier of a star or fleet, globally unique within one universe.
pub type EntityId = i64;

/// Identifier of a player within one game.
pub type PlayerId = i64;

/// Owner sentinel for stars and fleets nobody holds.
pub const UNOWNED: PlayerId = -1;

/// Orbit sentinel for fleets that are in transit between stars.
pub const NOT_ORBITING: EntityId = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Star {
    pub id: EntityId,
    pub owner_id: PlayerId,
    pub name: String,
    /// Garrison present at the star at snapshot time.
    pub ships: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fleet {
    pub id: EntityId,
    pub owner_id: PlayerId,
    pub name: String,
    pub ships: i64,
    pub orbiting_star_id: EntityId,
}
