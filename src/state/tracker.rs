use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Last known actor per tool.
///
/// Every read and write goes through one mutex, so both bus drivers can
/// share a tracker and a read-modify-write on an entity is atomic. Entries
/// live for the process lifetime; the tool count is fixed by deployment.
#[derive(Debug, Default)]
pub struct LastActorTracker {
    actors: Mutex<HashMap<String, String>>,
}

impl LastActorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded actor for `entity`
    pub fn get(&self, entity: &str) -> Option<String> {
        self.lock().get(entity).cloned()
    }

    /// Record `actor` as the last actor of `entity`
    pub fn set(&self, entity: &str, actor: &str) {
        self.lock().insert(entity.to_string(), actor.to_string());
        debug!(entity = %entity, actor = %actor, "Last actor recorded");
    }

    /// Run `f` against the current record while holding the lock.
    ///
    /// `f` returns its result plus an optional new actor to store.
    pub fn update<R, F>(&self, entity: &str, f: F) -> R
    where
        F: FnOnce(Option<&str>) -> (R, Option<String>),
    {
        let mut actors = self.lock();
        let (result, record) = f(actors.get(entity).map(String::as_str));
        if let Some(actor) = record {
            debug!(entity = %entity, actor = %actor, "Last actor recorded");
            actors.insert(entity.to_string(), actor);
        }
        result
    }

    /// Number of tools with a recorded actor
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic mid-insert cannot leave the map inconsistent
        self.actors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
