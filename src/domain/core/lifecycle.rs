use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use derive_more::{Display, Error, From};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::domain::{DataAccessError, Entity};

use super::conflict;
use super::{
    ArchiveRepository, ArchivedBooking, ArchivedBookingError, BookingId, BookingRequest,
    BookingRequestError, BookingRequestRepository, BookingStatus, Interval, Money, NaturalKey,
    ResourceId, ResourceState, ResourceStateRepository, UserId,
};

/// Reservation candidate as it arrives from a guest session. The engine
/// derives the id and the total fee; everything else is taken as-is.
#[derive(Clone, Debug)]
pub struct BookingCandidate {
    pub resource_id: ResourceId,
    pub requester_id: UserId,
    pub requester_name: String,
    pub owner_id: UserId,
    pub time: Interval,
    pub daily_rate: Money,
    pub tags: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

/// Lazily grown registry of per-resource mutexes.
///
/// Every mutating operation holds its resource's lock across the whole
/// check-then-act sequence; two writers on the same vehicle serialize, writers
/// on different vehicles do not contend.
#[derive(Default)]
struct ResourceLocks {
    inner: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

impl ResourceLocks {
    async fn acquire(&self, resource_id: &ResourceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().await;
            // a lock with no guard or waiter is only referenced by the table
            table.retain(|id, lock| id == resource_id || Arc::strong_count(lock) > 1);
            table.entry(resource_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The booking state machine: `pending -> {confirmed, rejected}`, then
/// `confirmed -> completed -> rated` and, independently, `-> hidden`.
///
/// Approval, the one multi-step transition, runs as a single serialized unit
/// per resource; a failure after the confirming archive write is surfaced as
/// [`PartialCascadeFailure`] and repaired by [`BookingLifecycle::reconcile`].
pub struct BookingLifecycle<R, A, S> {
    requests: Mutex<R>,
    archive: Mutex<A>,
    resources: Mutex<S>,
    locks: ResourceLocks,
}

impl<R, A, S> BookingLifecycle<R, A, S>
where
    R: BookingRequestRepository + Send,
    A: ArchiveRepository + Send,
    S: ResourceStateRepository + Send,
{
    pub fn new(requests: R, archive: A, resources: S) -> Self {
        Self {
            requests: Mutex::new(requests),
            archive: Mutex::new(archive),
            resources: Mutex::new(resources),
            locks: ResourceLocks::default(),
        }
    }

    /// Accept a candidate into the pending store, unless its interval is
    /// already taken by a pending request or a committed booking.
    ///
    /// Resubmitting an identical candidate is a no-op returning the stored
    /// request: the natural key makes submission idempotent.
    pub async fn submit(
        &self,
        candidate: BookingCandidate,
    ) -> Result<BookingRequest, LifecycleError> {
        let BookingCandidate {
            resource_id,
            requester_id,
            requester_name,
            owner_id,
            time,
            daily_rate,
            tags,
            requested_at,
        } = candidate;
        let _guard = self.locks.acquire(&resource_id).await;

        let id = BookingId::from(NaturalKey::new(
            requester_id.clone(),
            resource_id.clone(),
            requested_at,
        ));
        if let Some(existing) = self.requests.lock().await.find_by_id(&id).await? {
            info!(id = %id, "duplicate submission, returning the stored request");
            return Ok(existing);
        }

        let pending = self
            .requests
            .lock()
            .await
            .list_by_resource(&resource_id)
            .await?;
        if let Some(conflicting) = conflict::find_overlapping(&pending, &time, &id).first() {
            return Err(LifecycleError::OverlapConflict {
                conflicting: conflicting.time().clone(),
            });
        }
        let archived = self
            .archive
            .lock()
            .await
            .list_by_resource(&resource_id)
            .await?;
        if let Some(existing) = conflict::committed_conflict(&archived, &time) {
            return Err(LifecycleError::OverlapConflict {
                conflicting: existing.time().clone(),
            });
        }

        let mut request = BookingRequest::submit(
            resource_id,
            requester_id,
            requester_name,
            owner_id,
            time,
            daily_rate,
            tags,
            requested_at,
        )?;
        self.requests.lock().await.save(&mut request).await?;
        info!(id = %request.id(), "booking request submitted");
        Ok(request)
    }

    /// Approve a pending request: occupy the resource cache, archive the
    /// request as confirmed, then reject-and-archive every other pending
    /// request whose interval overlaps the approved one.
    ///
    /// Side-effect failures after the confirming archive write are collected
    /// and returned as [`LifecycleError::PartialCascade`] instead of being
    /// dropped; `reconcile` finishes the job.
    pub async fn approve(&self, id: &BookingId) -> Result<ArchivedBooking, LifecycleError> {
        let probe = self
            .requests
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let _guard = self.locks.acquire(probe.resource_id()).await;
        // reload under the lock; a concurrent approval may have resolved it
        let mut request = self
            .requests
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let resource_id = request.resource_id().clone();

        let archived = self
            .archive
            .lock()
            .await
            .list_by_resource(&resource_id)
            .await?;
        if let Some(existing) = conflict::committed_conflict(&archived, request.time()) {
            return Err(LifecycleError::OverlapConflict {
                conflicting: existing.time().clone(),
            });
        }
        let pending = self
            .requests
            .lock()
            .await
            .list_by_resource(&resource_id)
            .await?;

        // cache write runs before the archive commit so its failure aborts
        // the approval without partial state
        let mut state = self
            .resources
            .lock()
            .await
            .find_by_id(&resource_id)
            .await?
            .unwrap_or_else(|| ResourceState::new(resource_id.clone()));
        state.occupy(request.requester_id().clone(), request.time().clone());
        self.resources.lock().await.save(&mut state).await?;

        // the primary commit; on failure the cache write above is undone so
        // an aborted approval leaves no trace
        let mut confirmed =
            ArchivedBooking::archive(&request, BookingStatus::Confirmed, Utc::now())?;
        if let Err(e) = self.archive.lock().await.save(&mut confirmed).await {
            state.release();
            if let Err(rollback) = self.resources.lock().await.save(&mut state).await {
                error!(
                    resource = %resource_id,
                    error = %rollback,
                    "cache rollback failed after an aborted approval"
                );
            }
            return Err(e.into());
        }
        info!(id = %id, resource = %resource_id, "booking approved");

        let mut unresolved = Vec::new();
        request.resolve(BookingStatus::Confirmed)?;
        if let Err(e) = self.requests.lock().await.delete(&mut request).await {
            error!(id = %id, error = %e, "approved request left in the pending store");
            unresolved.push(request.id());
        }

        let siblings: Vec<BookingRequest> =
            conflict::find_overlapping(&pending, confirmed.time(), id)
                .into_iter()
                .cloned()
                .collect();
        for mut sibling in siblings {
            match self.archive_rejected(&mut sibling).await {
                Ok(_) => warn!(id = %sibling.id(), "overlapping request rejected by cascade"),
                Err(e) => {
                    error!(id = %sibling.id(), error = %e, "cascade rejection failed");
                    unresolved.push(sibling.id());
                }
            }
        }

        if unresolved.is_empty() {
            Ok(confirmed)
        } else {
            Err(LifecycleError::PartialCascade(PartialCascadeFailure {
                resource_id,
                confirmed: confirmed.id(),
                unresolved,
            }))
        }
    }

    /// Reject a pending request. No cascading effect.
    pub async fn reject(&self, id: &BookingId) -> Result<ArchivedBooking, LifecycleError> {
        let probe = self
            .requests
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let _guard = self.locks.acquire(probe.resource_id()).await;
        let mut request = self
            .requests
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let rejected = self.archive_rejected(&mut request).await?;
        info!(id = %id, "booking request rejected");
        Ok(rejected)
    }

    /// Transition a confirmed archive record to completed and release the
    /// resource cache when that record is the one occupying it.
    pub async fn mark_completed(&self, id: &BookingId) -> Result<ArchivedBooking, LifecycleError> {
        let probe = self
            .archive
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let _guard = self.locks.acquire(probe.resource_id()).await;
        let mut record = self
            .archive
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        record.complete()?;
        self.archive.lock().await.save(&mut record).await?;

        // the lookup guard must drop before the save below re-locks the
        // repository
        let state = self
            .resources
            .lock()
            .await
            .find_by_id(record.resource_id())
            .await?;
        if let Some(mut state) = state {
            if state.occupied()
                && state.current_requester() == Some(record.requester_id())
                && state.time() == Some(record.time())
            {
                state.release();
                self.resources.lock().await.save(&mut state).await?;
            }
        }
        info!(id = %id, "booking completed");
        Ok(record)
    }

    /// Rate a completed booking. The write-once and completion-only guards
    /// live in the archive aggregate.
    pub async fn rate(&self, id: &BookingId, score: u8) -> Result<ArchivedBooking, LifecycleError> {
        let probe = self
            .archive
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let _guard = self.locks.acquire(probe.resource_id()).await;
        let mut record = self
            .archive
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        record.rate(score)?;
        self.archive.lock().await.save(&mut record).await?;
        info!(id = %id, score = score, "booking rated");
        Ok(record)
    }

    /// Hide an archived record from history views. Idempotent; the record
    /// itself always stays in the archive.
    pub async fn soft_delete(&self, id: &BookingId) -> Result<ArchivedBooking, LifecycleError> {
        let probe = self
            .archive
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let _guard = self.locks.acquire(probe.resource_id()).await;
        let mut record = self
            .archive
            .lock()
            .await
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        if record.hide() {
            self.archive.lock().await.save(&mut record).await?;
            info!(id = %id, "booking hidden from history");
        }
        Ok(record)
    }

    /// Finish the work of a partially failed approval: every pending request
    /// overlapping a committed interval is rejected, and a pending row whose
    /// id is already archived is deleted. Idempotent; returns the repaired ids.
    pub async fn reconcile(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<BookingId>, LifecycleError> {
        let _guard = self.locks.acquire(resource_id).await;
        let archived = self
            .archive
            .lock()
            .await
            .list_by_resource(resource_id)
            .await?;
        let pending = self
            .requests
            .lock()
            .await
            .list_by_resource(resource_id)
            .await?;

        let mut repaired = Vec::new();
        for mut request in pending {
            if let Some(row) = archived.iter().find(|a| a.id() == request.id()) {
                // already archived, only the pending-side delete went missing
                if let Err(_e) = request.resolve(row.status()) {}
                self.requests.lock().await.delete(&mut request).await?;
                warn!(id = %request.id(), "dangling pending row removed during reconciliation");
                repaired.push(request.id());
            } else if conflict::committed_conflict(&archived, request.time()).is_some() {
                self.archive_rejected(&mut request).await?;
                warn!(id = %request.id(), "stale overlapping request rejected during reconciliation");
                repaired.push(request.id());
            }
        }

        // occupancy must be backed by a confirmed row; release the cache a
        // crashed or aborted approval left behind
        let state = self
            .resources
            .lock()
            .await
            .find_by_id(resource_id)
            .await?;
        if let Some(mut state) = state {
            let backed = archived.iter().any(|a| {
                a.status() == BookingStatus::Confirmed
                    && Some(a.time()) == state.time()
                    && Some(a.requester_id()) == state.current_requester()
            });
            if state.occupied() && !backed {
                state.release();
                self.resources.lock().await.save(&mut state).await?;
                warn!(resource = %resource_id, "stranded occupancy cache released during reconciliation");
            }
        }
        Ok(repaired)
    }

    /// Re-run `reconcile` through transient storage outages, up to
    /// `max_attempts` tries. The `reconciler.max_attempts` config knob feeds
    /// this from an embedding operator.
    pub async fn reconcile_with_retry(
        &self,
        resource_id: &ResourceId,
        max_attempts: u32,
    ) -> Result<Vec<BookingId>, LifecycleError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.reconcile(resource_id).await {
                Err(LifecycleError::DataAccess(e)) if attempt < max_attempts => {
                    warn!(
                        resource = %resource_id,
                        attempt,
                        error = %e,
                        "reconciliation failed, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    /// Pending requests for a resource, in submission order. Unserialized
    /// read: callers must treat it as eventually consistent.
    pub async fn pending(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<BookingRequest>, LifecycleError> {
        Ok(self
            .requests
            .lock()
            .await
            .list_by_resource(resource_id)
            .await?)
    }

    /// Archived bookings for a resource with soft-deleted records filtered
    /// out. Unserialized read.
    pub async fn history(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<ArchivedBooking>, LifecycleError> {
        let rows = self
            .archive
            .lock()
            .await
            .list_by_resource(resource_id)
            .await?;
        Ok(rows.into_iter().filter(|r| r.show()).collect())
    }

    /// The denormalized occupancy cache, for display only.
    pub async fn resource_state(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Option<ResourceState>, LifecycleError> {
        Ok(self.resources.lock().await.find_by_id(resource_id).await?)
    }

    async fn archive_rejected(
        &self,
        request: &mut BookingRequest,
    ) -> Result<ArchivedBooking, LifecycleError> {
        let mut rejected = ArchivedBooking::archive(request, BookingStatus::Rejected, Utc::now())?;
        self.archive.lock().await.save(&mut rejected).await?;
        request.resolve(BookingStatus::Rejected)?;
        self.requests.lock().await.delete(request).await?;
        Ok(rejected)
    }
}

/// Lifecycle error
#[derive(Error, Display, Debug, From)]
pub enum LifecycleError {
    /// The requested interval is already taken
    #[display(fmt = "Requested time overlaps an existing booking: {}", conflicting)]
    #[from(ignore)]
    OverlapConflict { conflicting: Interval },
    /// Unknown request or archive id
    #[display(fmt = "Unknown request or booking")]
    NotFound,
    /// Request-side validation failure
    #[display(fmt = "Booking request error: {}", _0)]
    Request(#[error(source)] BookingRequestError),
    /// Archive-side validation failure (invalid state, already rated, ...)
    #[display(fmt = "Archived booking error: {}", _0)]
    Archive(#[error(source)] ArchivedBookingError),
    /// The approval committed but some side effects did not
    #[display(fmt = "{}", _0)]
    PartialCascade(#[error(source)] PartialCascadeFailure),
    /// Storage adapter failure
    #[display(fmt = "Storage unavailable: {}", _0)]
    DataAccess(#[error(source)] DataAccessError),
}

/// One or more approve-cascade side effects failed after the confirming
/// archive write. The booking is confirmed; the listed pending requests are
/// still visible and must be repaired via `reconcile`.
#[derive(Error, Display, Debug)]
#[display(
    fmt = "Approval of {} committed but left unresolved overlapping requests on {}",
    confirmed,
    resource_id
)]
pub struct PartialCascadeFailure {
    pub resource_id: ResourceId,
    pub confirmed: BookingId,
    pub unresolved: Vec<BookingId>,
}
