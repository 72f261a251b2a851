//! Reference storage adapters.
//!
//! The engine only speaks to the repository traits in `domain::core`; these
//! in-memory implementations back the tests and small deployments, and show
//! the contract a database-backed adapter has to honor: `save` drains the
//! aggregate's event queue into a journal before the snapshot is written, and
//! returns `Ok(false)` when there is nothing to persist.

pub mod core;
