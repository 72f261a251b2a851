//! Pure overlap queries, kept free of storage and side effects so the
//! cascading-rejection policy is testable on plain slices.

use crate::domain::Entity;

use super::{ArchivedBooking, BookingId, BookingRequest, Interval};

/// Every pending request other than `exclude` whose interval overlaps `time`.
pub fn find_overlapping<'a>(
    pending: &'a [BookingRequest],
    time: &Interval,
    exclude: &BookingId,
) -> Vec<&'a BookingRequest> {
    pending
        .iter()
        .filter(|r| r.id() != *exclude && r.time().overlaps(time))
        .collect()
}

/// First confirmed or completed archive entry occupying `time`, if any.
/// Soft-deleted rows still count: hiding is display-only.
pub fn committed_conflict<'a>(
    archived: &'a [ArchivedBooking],
    time: &Interval,
) -> Option<&'a ArchivedBooking> {
    archived
        .iter()
        .find(|r| r.status().is_committed() && r.time().overlaps(time))
}
