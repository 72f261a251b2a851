use chrono::{DateTime, Utc};
use derive_more::{Display, Error, IntoIterator};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue};

use super::{BookingId, BookingRequest, Interval, Money, ResourceId, UserId};

/// Archived booking repository. Append-mostly: records are flagged, never
/// deleted, so the trait has no delete.
#[async_trait::async_trait]
pub trait ArchiveRepository {
    /// Look an archived booking up by id
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<ArchivedBooking>, DataAccessError>;
    /// All archived bookings for a resource, oldest first
    async fn list_by_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<ArchivedBooking>, DataAccessError>;
    /// Persist an archived booking
    async fn save(&mut self, entity: &mut ArchivedBooking) -> Result<bool, DataAccessError>;
}

/// Closed status enumeration shared by every component. Replaces the
/// free-text statuses of the source system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Completed,
}

impl BookingStatus {
    /// Confirmed and completed bookings occupy their interval on the
    /// resource's timeline.
    pub fn is_committed(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Completed)
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Pending
    }
}

/// Guest rating, 1 to 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating(u8);

impl Rating {
    pub fn new(score: u8) -> Result<Self, ArchivedBookingError> {
        match (1..=5).contains(&score) {
            true => Ok(Self(score)),
            false => Err(ArchivedBookingError::InvalidRating),
        }
    }

    pub fn score(&self) -> u8 {
        self.0
    }
}

/// Archived booking event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchivedBookingEvent {
    /// A request left the pending store and entered the archive
    Archived {
        id: BookingId,
        resource_id: ResourceId,
        requester_id: UserId,
        requester_name: String,
        owner_id: UserId,
        time: Interval,
        tags: Vec<String>,
        total_fee: Money,
        requested_at: DateTime<Utc>,
        status: BookingStatus,
        archived_at: DateTime<Utc>,
    },
    /// The rental ran its course
    Completed { id: BookingId },
    /// The guest rated the completed booking
    Rated { id: BookingId, rate: Rating },
    /// The record was hidden from history views
    Hidden { id: BookingId },
}

impl Event for ArchivedBookingEvent {
    type Id = BookingId;
}

/// Terminal booking record. Created only by the orchestrator while a request
/// transitions out of pending.
#[derive(Debug, Default, Clone, IntoIterator, Serialize, Deserialize)]
pub struct ArchivedBooking {
    id: BookingId,
    resource_id: ResourceId,
    requester_id: UserId,
    requester_name: String,
    owner_id: UserId,
    time: Interval,
    tags: Vec<String>,
    total_fee: Money,
    requested_at: DateTime<Utc>,
    status: BookingStatus,
    rate: Option<Rating>,
    show: bool,
    archived_at: DateTime<Utc>,
    #[serde(skip)]
    #[into_iterator]
    events: EventQueue<ArchivedBookingEvent>,
}

impl ArchivedBooking {
    pub fn archive(
        request: &BookingRequest,
        status: BookingStatus,
        archived_at: DateTime<Utc>,
    ) -> Result<Self, ArchivedBookingError> {
        Self::validate_archived(&status)?;
        let mut entity = ArchivedBooking {
            id: request.id(),
            resource_id: request.resource_id().clone(),
            requester_id: request.requester_id().clone(),
            requester_name: request.requester_name().to_owned(),
            owner_id: request.owner_id().clone(),
            time: request.time().clone(),
            tags: request.tags().to_vec(),
            total_fee: request.total_fee(),
            requested_at: request.requested_at(),
            status,
            rate: None,
            show: true,
            archived_at,
            events: EventQueue::new(),
        };
        entity.events.push(ArchivedBookingEvent::Archived {
            id: entity.id.clone(),
            resource_id: entity.resource_id.clone(),
            requester_id: entity.requester_id.clone(),
            requester_name: entity.requester_name.clone(),
            owner_id: entity.owner_id.clone(),
            time: entity.time.clone(),
            tags: entity.tags.clone(),
            total_fee: entity.total_fee,
            requested_at: entity.requested_at,
            status,
            archived_at,
        });
        Ok(entity)
    }

    /// Confirmed rental ran its course (time passage or an explicit action,
    /// signalled from outside the engine).
    pub fn complete(&mut self) -> Result<(), ArchivedBookingError> {
        self.validate_completed()?;
        self.status = BookingStatus::Completed;
        self.events
            .push(ArchivedBookingEvent::Completed { id: self.id.clone() });
        Ok(())
    }

    /// The rating guard: completion-only, write-once, 1..=5.
    pub fn rate(&mut self, score: u8) -> Result<(), ArchivedBookingError> {
        self.validate_rated()?;
        let rate = Rating::new(score)?;
        self.rate = Some(rate);
        self.events.push(ArchivedBookingEvent::Rated {
            id: self.id.clone(),
            rate,
        });
        Ok(())
    }

    /// Soft delete. Idempotent and monotonic: once hidden the engine never
    /// shows the record again, and the row itself stays in the archive.
    pub fn hide(&mut self) -> bool {
        if !self.show {
            return false;
        }
        self.show = false;
        self.events
            .push(ArchivedBookingEvent::Hidden { id: self.id.clone() });
        true
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn requester_id(&self) -> &UserId {
        &self.requester_id
    }

    pub fn requester_name(&self) -> &str {
        &self.requester_name
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn time(&self) -> &Interval {
        &self.time
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn total_fee(&self) -> Money {
        self.total_fee
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn rate_score(&self) -> Option<Rating> {
        self.rate
    }

    pub fn show(&self) -> bool {
        self.show
    }

    pub fn archived_at(&self) -> DateTime<Utc> {
        self.archived_at
    }

    fn validate_id(&self, id: &BookingId) -> Result<(), ArchivedBookingError> {
        match self.id == *id {
            true => Ok(()),
            false => Err(ArchivedBookingError::MismatchedId),
        }
    }

    fn validate_archived(status: &BookingStatus) -> Result<(), ArchivedBookingError> {
        match status {
            BookingStatus::Pending => Err(ArchivedBookingError::InvalidStatus),
            _ => Ok(()),
        }
    }

    fn validate_completed(&self) -> Result<(), ArchivedBookingError> {
        match self.status {
            BookingStatus::Confirmed => Ok(()),
            _ => Err(ArchivedBookingError::InvalidState),
        }
    }

    fn validate_rated(&self) -> Result<(), ArchivedBookingError> {
        if self.status != BookingStatus::Completed {
            return Err(ArchivedBookingError::InvalidState);
        }
        if self.rate.is_some() {
            return Err(ArchivedBookingError::AlreadyRated);
        }
        Ok(())
    }
}

impl Entity for ArchivedBooking {
    type Id = BookingId;

    const ENTITY_NAME: &'static str = "archived_booking";

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}

impl Aggregation for ArchivedBooking {
    type Event = ArchivedBookingEvent;
    type Error = ArchivedBookingError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            ArchivedBookingEvent::Archived { status, .. } => Self::validate_archived(status),
            ArchivedBookingEvent::Completed { id } => {
                self.validate_id(id)?;
                self.validate_completed()
            }
            ArchivedBookingEvent::Rated { id, .. } => {
                self.validate_id(id)?;
                self.validate_rated()
            }
            ArchivedBookingEvent::Hidden { id } => self.validate_id(id),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ArchivedBookingEvent::Archived {
                id,
                resource_id,
                requester_id,
                requester_name,
                owner_id,
                time,
                tags,
                total_fee,
                requested_at,
                status,
                archived_at,
            } => {
                if self.id != id {
                    *self = ArchivedBooking {
                        id,
                        resource_id,
                        requester_id,
                        requester_name,
                        owner_id,
                        time,
                        tags,
                        total_fee,
                        requested_at,
                        status,
                        rate: None,
                        show: true,
                        archived_at,
                        events: EventQueue::new(),
                    };
                }
            }
            ArchivedBookingEvent::Completed { id } => {
                if self.id == id {
                    if let Err(_e) = self.complete() {}
                }
            }
            ArchivedBookingEvent::Rated { id, rate } => {
                if self.id == id {
                    if let Err(_e) = self.rate(rate.score()) {}
                }
            }
            ArchivedBookingEvent::Hidden { id } => {
                if self.id == id {
                    self.hide();
                }
            }
        }
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

impl PartialEq for ArchivedBooking {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.resource_id == other.resource_id
            && self.requester_id == other.requester_id
            && self.requester_name == other.requester_name
            && self.owner_id == other.owner_id
            && self.time == other.time
            && self.tags == other.tags
            && self.total_fee == other.total_fee
            && self.requested_at == other.requested_at
            && self.status == other.status
            && self.rate == other.rate
            && self.show == other.show
            && self.archived_at == other.archived_at
    }
}

impl Eq for ArchivedBooking {}

/// Archived booking error
#[derive(Error, Display, Debug, PartialEq, Eq)]
pub enum ArchivedBookingError {
    /// Event id does not match the entity
    #[display(fmt = "ID does not match")]
    MismatchedId,
    /// Only resolved requests enter the archive
    #[display(fmt = "Pending requests cannot be archived")]
    InvalidStatus,
    /// Transition not allowed from the current status
    #[display(fmt = "Invalid state for this transition")]
    InvalidState,
    /// Ratings are write-once
    #[display(fmt = "Booking is already rated")]
    AlreadyRated,
    /// Ratings are 1 to 5
    #[display(fmt = "Rating must be between 1 and 5")]
    InvalidRating,
}
