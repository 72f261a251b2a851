use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

use crate::domain::{DataAccessError, Entity, Id};

use super::{Interval, UserId};

/// Resource occupancy cache repository
#[async_trait::async_trait]
pub trait ResourceStateRepository {
    /// Look a resource's cached state up by id
    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<ResourceState>, DataAccessError>;
    /// Persist the cached state
    async fn save(&mut self, entity: &mut ResourceState) -> Result<bool, DataAccessError>;
}

/// Stable external key of the bookable unit, e.g. a plate number.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct ResourceId(String);

impl Id for ResourceId {
    type Inner = String;
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Denormalized "is this vehicle currently booked" cache kept for display.
///
/// The archive is authoritative; the orchestrator rewrites this cache on
/// approval and completion and it must never be consulted for conflict
/// decisions.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    resource_id: ResourceId,
    occupied: bool,
    current_requester: Option<UserId>,
    time: Option<Interval>,
}

impl ResourceState {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            ..ResourceState::default()
        }
    }

    pub fn occupy(&mut self, requester: UserId, time: Interval) {
        self.occupied = true;
        self.current_requester = Some(requester);
        self.time = Some(time);
    }

    pub fn release(&mut self) {
        self.occupied = false;
        self.current_requester = None;
        self.time = None;
    }

    pub fn occupied(&self) -> bool {
        self.occupied
    }

    pub fn current_requester(&self) -> Option<&UserId> {
        self.current_requester.as_ref()
    }

    pub fn time(&self) -> Option<&Interval> {
        self.time.as_ref()
    }
}

impl Entity for ResourceState {
    type Id = ResourceId;

    const ENTITY_NAME: &'static str = "resource_state";

    fn id(&self) -> Self::Id {
        self.resource_id.clone()
    }
}
