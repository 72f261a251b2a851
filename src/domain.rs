pub mod core;

use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    error::Error,
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
};
use thiserror::Error;

/// Identifier newtype contract shared by every entity in the engine.
///
/// Identity-provider keys and plate numbers are opaque strings supplied from
/// outside, so inner values only need to round-trip through `FromStr`.
pub trait Id:
    Clone
    + Eq
    + Deref<Target = Self::Inner>
    + From<Self::Inner>
    + Display
    + Debug
    + Serialize
    + for<'de> Deserialize<'de>
{
    type Inner: FromStr;
}

pub trait Event: Clone + Eq + Debug + Serialize + for<'de> Deserialize<'de> {
    type Id;
}

pub trait Entity: Debug + Default + Clone {
    type Id: Id;

    const ENTITY_NAME: &'static str;

    fn id(&self) -> Self::Id;
}

/// An entity that mutates by recording domain events.
///
/// Command methods validate, mutate state and push the event; repositories
/// drain the queue on `save`.
pub trait Aggregation: Entity + IntoIterator<Item = <Self as Aggregation>::Event> {
    type Event: Event<Id = <Self as Entity>::Id>;
    type Error: Error;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error>;
    fn apply(&mut self, event: Self::Event);
    fn events(&self) -> &EventQueue<Self::Event>;
    fn events_mut(&mut self) -> &mut EventQueue<Self::Event>;

    fn pop(&mut self) -> Option<Self::Event> {
        self.events_mut().pop()
    }
    fn pop_all(&mut self) -> Vec<Self::Event> {
        let mut events = Vec::new();
        while let Some(e) = self.pop() {
            events.push(e);
        }
        events
    }
    fn clear(&mut self) {
        self.events_mut().clear()
    }
    fn peek(&self) -> Option<&Self::Event> {
        self.events().peek()
    }
    fn iter(&self) -> EventQueueIter<'_, Self::Event> {
        self.events().iter()
    }
}

/// Storage adapter failure surface. Adapter errors propagate unchanged and
/// abort the current operation.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Database connection error: {0}")]
    ConnectionError(Box<dyn Error + Send + Sync>),
    #[error("Database query error: {0}")]
    QueryError(Box<dyn Error + Send + Sync>),
    #[error("Data read error: {0}")]
    ReadError(Box<dyn Error + Send + Sync>),
    #[error("Data write error: {0}")]
    WriteError(Box<dyn Error + Send + Sync>),
    #[error("Client side error: {0}")]
    ClientSideError(Box<dyn Error + Send + Sync>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventQueue<T> {
    queue: VecDeque<T>,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
    pub fn peek(&self) -> Option<&T> {
        self.queue.front()
    }
    pub fn push(&mut self, value: T) {
        self.queue.push_back(value)
    }
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }
    pub fn clear(&mut self) {
        self.queue.clear()
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    pub fn iter(&self) -> EventQueueIter<'_, T> {
        self.queue.iter()
    }
}

impl<T> IntoIterator for EventQueue<T> {
    type Item = T;
    type IntoIter = EventQueueIntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        self.queue.into_iter()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type EventQueueIntoIter<T> = std::collections::vec_deque::IntoIter<T>;
pub type EventQueueIter<'a, T> = std::collections::vec_deque::Iter<'a, T>;
