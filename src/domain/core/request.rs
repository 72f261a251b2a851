use std::{fmt, str::FromStr};

use chrono::{DateTime, TimeZone, Utc};
use derive_more::{Deref, Display, Error, From, IntoIterator};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue, Id};

use super::{BookingStatus, Interval, Money, ResourceId};

/// Pending booking request repository
#[async_trait::async_trait]
pub trait BookingRequestRepository {
    /// Look a pending request up by id
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<BookingRequest>, DataAccessError>;
    /// All pending requests for a resource, in insertion order
    async fn list_by_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<BookingRequest>, DataAccessError>;
    /// Persist a pending request
    async fn save(&mut self, entity: &mut BookingRequest) -> Result<bool, DataAccessError>;
    /// Remove a resolved request from the pending store
    async fn delete(&mut self, entity: &mut BookingRequest) -> Result<bool, DataAccessError>;
}

/// Opaque identity-provider key, used for requesters and owners alike.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct UserId(String);

impl Id for UserId {
    type Inner = String;
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Composite natural key `{requester}.{resource}.{requested_at_millis}`.
///
/// Reproduces the source's collision-resistant id scheme: resubmitting the
/// same candidate derives the same key, which is what dedup hangs off.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct NaturalKey {
    requester: UserId,
    resource: ResourceId,
    requested_at: DateTime<Utc>,
}

impl NaturalKey {
    pub fn new(requester: UserId, resource: ResourceId, requested_at: DateTime<Utc>) -> Self {
        Self {
            requester,
            resource,
            requested_at,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.requester,
            self.resource,
            self.requested_at.timestamp_millis()
        )
    }
}

impl FromStr for NaturalKey {
    type Err = NaturalKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let (requester, resource, millis) = match parts.as_slice() {
            [requester, resource, millis] => (*requester, *resource, *millis),
            _ => return Err(NaturalKeyError::Malformed),
        };
        if requester.is_empty() || resource.is_empty() {
            return Err(NaturalKeyError::Malformed);
        }
        let millis: i64 = millis.parse().map_err(|_| NaturalKeyError::Malformed)?;
        let requested_at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or(NaturalKeyError::Malformed)?;
        Ok(Self {
            requester: requester.into(),
            resource: ResourceId::from(resource.to_owned()),
            requested_at,
        })
    }
}

#[derive(Error, Display, Debug, PartialEq, Eq)]
pub enum NaturalKeyError {
    #[display(fmt = "Expected requester.resource.timestamp")]
    Malformed,
}

/// Booking id, persisted as its composite string form.
#[serde_as]
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct BookingId(#[serde_as(as = "DisplayFromStr")] NaturalKey);

impl BookingId {
    pub fn requester(&self) -> &UserId {
        &self.0.requester
    }

    pub fn resource(&self) -> &ResourceId {
        &self.0.resource
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.0.requested_at
    }
}

impl Id for BookingId {
    type Inner = NaturalKey;
}

/// Booking request event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingRequestEvent {
    /// A guest submitted a reservation candidate
    Submitted {
        id: BookingId,
        resource_id: ResourceId,
        requester_id: UserId,
        requester_name: String,
        owner_id: UserId,
        time: Interval,
        tags: Vec<String>,
        total_fee: Money,
        requested_at: DateTime<Utc>,
    },
    /// The request left the pending store (approved or cascade-rejected)
    Resolved { id: BookingId, status: BookingStatus },
}

impl Event for BookingRequestEvent {
    type Id = BookingId;
}

/// Pending reservation candidate. Lives in the pending store from `submit`
/// until the orchestrator resolves it; resolution moves it, never copies it.
#[derive(Debug, Default, Clone, IntoIterator, Serialize, Deserialize)]
pub struct BookingRequest {
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
    #[serde(skip)]
    #[into_iterator]
    events: EventQueue<BookingRequestEvent>,
}

impl BookingRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        resource_id: ResourceId,
        requester_id: UserId,
        requester_name: String,
        owner_id: UserId,
        time: Interval,
        daily_rate: Money,
        tags: Vec<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<Self, BookingRequestError> {
        Self::validate_submitted(&requester_name)?;
        let id = BookingId::from(NaturalKey::new(
            requester_id.clone(),
            resource_id.clone(),
            requested_at,
        ));
        let total_fee = daily_rate.times(time.billable_days());
        let mut entity = BookingRequest {
            id: id.clone(),
            resource_id: resource_id.clone(),
            requester_id: requester_id.clone(),
            requester_name: requester_name.clone(),
            owner_id: owner_id.clone(),
            time: time.clone(),
            tags: tags.clone(),
            total_fee,
            requested_at,
            ..BookingRequest::default()
        };
        entity.events.push(BookingRequestEvent::Submitted {
            id,
            resource_id,
            requester_id,
            requester_name,
            owner_id,
            time,
            tags,
            total_fee,
            requested_at,
        });
        Ok(entity)
    }

    /// Terminal transition out of pending; the orchestrator follows this with
    /// a delete from the pending store.
    pub fn resolve(&mut self, status: BookingStatus) -> Result<(), BookingRequestError> {
        self.validate_resolved(&status)?;
        self.status = status;
        self.events.push(BookingRequestEvent::Resolved {
            id: self.id.clone(),
            status,
        });
        Ok(())
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

    fn validate_id(&self, id: &BookingId) -> Result<(), BookingRequestError> {
        match self.id == *id {
            true => Ok(()),
            false => Err(BookingRequestError::MismatchedId),
        }
    }

    fn validate_submitted(requester_name: &str) -> Result<(), BookingRequestError> {
        match requester_name.trim().is_empty() {
            true => Err(BookingRequestError::RequesterNameRequired),
            false => Ok(()),
        }
    }

    fn validate_resolved(&self, status: &BookingStatus) -> Result<(), BookingRequestError> {
        if self.status != BookingStatus::Pending {
            return Err(BookingRequestError::AlreadyResolved);
        }
        match status {
            BookingStatus::Confirmed | BookingStatus::Rejected => Ok(()),
            BookingStatus::Pending | BookingStatus::Completed => {
                Err(BookingRequestError::NotTerminal)
            }
        }
    }
}

impl Entity for BookingRequest {
    type Id = BookingId;

    const ENTITY_NAME: &'static str = "booking_request";

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}

impl Aggregation for BookingRequest {
    type Event = BookingRequestEvent;
    type Error = BookingRequestError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            BookingRequestEvent::Submitted { requester_name, .. } => {
                Self::validate_submitted(requester_name)
            }
            BookingRequestEvent::Resolved { id, status } => {
                self.validate_id(id)?;
                self.validate_resolved(status)
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            BookingRequestEvent::Submitted {
                id,
                resource_id,
                requester_id,
                requester_name,
                owner_id,
                time,
                tags,
                total_fee,
                requested_at,
            } => {
                if self.id != id {
                    *self = BookingRequest {
                        id,
                        resource_id,
                        requester_id,
                        requester_name,
                        owner_id,
                        time,
                        tags,
                        total_fee,
                        requested_at,
                        ..BookingRequest::default()
                    };
                }
            }
            BookingRequestEvent::Resolved { id, status } => {
                if self.id == id {
                    if let Err(_e) = self.resolve(status) {}
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

impl PartialEq for BookingRequest {
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
    }
}

impl Eq for BookingRequest {}

/// Booking request error
#[derive(Error, Display, Debug, PartialEq, Eq)]
pub enum BookingRequestError {
    /// Event id does not match the entity
    #[display(fmt = "ID does not match")]
    MismatchedId,
    /// Requester display name is blank
    #[display(fmt = "Requester name cannot be blank")]
    RequesterNameRequired,
    /// The request already left the pending store
    #[display(fmt = "Request is already resolved")]
    AlreadyResolved,
    /// Pending requests only resolve to confirmed or rejected
    #[display(fmt = "Resolution status must be terminal")]
    NotTerminal,
}

#[cfg(test)]
mod tests {
    use super::super::Currency;
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest::submit(
            ResourceId::from("CAR1".to_owned()),
            UserId::from("guest-7"),
            "Hanako".to_owned(),
            UserId::from("host-1"),
            Interval::new(
                "2024-03-01T00:00:00Z".parse().unwrap(),
                "2024-03-03T00:00:00Z".parse().unwrap(),
            )
            .unwrap(),
            Money::new(8000, Currency::JPY),
            vec!["suv".to_owned()],
            Utc.timestamp_millis_opt(1_709_200_000_000).single().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_submit_derives_key_and_fee() {
        let req = request();
        assert_eq!(
            req.id().to_string(),
            "guest-7.CAR1.1709200000000".to_owned()
        );
        // three calendar days at 8,000
        assert_eq!(req.total_fee(), Money::new(24000, Currency::JPY));
        assert_eq!(req.status(), BookingStatus::Pending);
        assert!(matches!(
            req.peek(),
            Some(BookingRequestEvent::Submitted { .. })
        ));
    }

    #[test]
    fn test_submit_requires_requester_name() {
        let result = BookingRequest::submit(
            ResourceId::from("CAR1".to_owned()),
            UserId::from("guest-7"),
            "  ".to_owned(),
            UserId::from("host-1"),
            Interval::new(
                "2024-03-01T00:00:00Z".parse().unwrap(),
                "2024-03-03T00:00:00Z".parse().unwrap(),
            )
            .unwrap(),
            Money::new(8000, Currency::JPY),
            vec![],
            Utc::now(),
        );
        assert_eq!(
            result.unwrap_err(),
            BookingRequestError::RequesterNameRequired
        );
    }

    #[test]
    fn test_resolve_is_terminal_and_single_shot() {
        let mut req = request();
        assert_eq!(
            req.resolve(BookingStatus::Completed),
            Err(BookingRequestError::NotTerminal)
        );
        req.resolve(BookingStatus::Confirmed).unwrap();
        assert_eq!(req.status(), BookingStatus::Confirmed);
        assert_eq!(
            req.resolve(BookingStatus::Rejected),
            Err(BookingRequestError::AlreadyResolved)
        );
    }

    #[test]
    fn test_natural_key_round_trip() {
        let req = request();
        let text = req.id().to_string();
        let parsed: NaturalKey = text.parse().unwrap();
        assert_eq!(BookingId::from(parsed), req.id());

        assert_eq!(
            "no-timestamp".parse::<NaturalKey>(),
            Err(NaturalKeyError::Malformed)
        );
        assert_eq!(
            "a.b.notmillis".parse::<NaturalKey>(),
            Err(NaturalKeyError::Malformed)
        );
    }

    #[test]
    fn test_booking_id_serializes_as_string() {
        let req = request();
        let json = serde_json::to_value(req.id()).unwrap();
        assert_eq!(json, serde_json::json!("guest-7.CAR1.1709200000000"));
        let back: BookingId = serde_json::from_value(json).unwrap();
        assert_eq!(back, req.id());
    }
}
