//! Read-only registry of shared entity state, plus per-pair correlation cells.
//!
//! The registry is built once before any monitor starts and never mutated
//! afterwards, so lookups need no lock. Entities are never removed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use market::{EntityId, Pair, SharedEntityState};

use crate::error::MonitorError;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Arc<SharedEntityState>>,
}

impl EntityRegistry {
    /// One entity per distinct id; repeated ids are ignored.
    pub(crate) fn build<'a>(ids: impl IntoIterator<Item = &'a EntityId>, backoff: Duration) -> Self {
        let mut entities = HashMap::new();
        for id in ids {
            entities
                .entry(id.clone())
                .or_insert_with(|| Arc::new(SharedEntityState::with_backoff(id.clone(), backoff)));
        }
        Self { entities }
    }

    pub fn get(&self, id: &EntityId) -> Option<&Arc<SharedEntityState>> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Both legs of `pair`, or the first id missing from the registry.
    pub fn legs(
        &self,
        pair: &Pair,
    ) -> Result<(Arc<SharedEntityState>, Arc<SharedEntityState>), MonitorError> {
        let lookup = |id: &EntityId| {
            self.get(id).cloned().ok_or_else(|| MonitorError::UnknownEntity {
                pair: pair.id(),
                entity: id.clone(),
            })
        };
        Ok((lookup(pair.first())?, lookup(pair.second())?))
    }
}

/// Price correlation of one pair, refreshed by the statistics collaborator.
///
/// Stored as raw f64 bits so readers and the refreshing writer never lock.
#[derive(Debug)]
pub struct PairCorrelation(AtomicU64);

impl PairCorrelation {
    pub fn new(rho: f64) -> Self {
        Self(AtomicU64::new(rho.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, rho: f64) {
        self.0.store(rho.to_bits(), Ordering::Release);
    }
}

pub(crate) fn validate_correlation(pair: &Pair, rho: f64) -> Result<f64, MonitorError> {
    if rho.is_finite() && (-1.0..=1.0).contains(&rho) {
        Ok(rho)
    } else {
        Err(MonitorError::InvalidCorrelation {
            pair: pair.id(),
            value: rho,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    #[test]
    fn build_creates_one_entity_per_symbol() {
        let ids = [id("KO"), id("PEP"), id("KO"), id("XOM")];
        let reg = EntityRegistry::build(ids.iter(), Duration::from_millis(5));

        assert_eq!(reg.len(), 3);
        assert!(reg.contains(&id("XOM")));
        assert_eq!(reg.get(&id("KO")).unwrap().backoff(), Duration::from_millis(5));
    }

    #[test]
    fn legs_resolve_or_name_missing_entity() {
        let reg = EntityRegistry::build([id("KO"), id("PEP")].iter(), Duration::from_millis(5));

        let ok = Pair::new(id("KO"), id("PEP")).unwrap();
        let (a, b) = reg.legs(&ok).unwrap();
        assert_eq!(a.id(), &id("KO"));
        assert_eq!(b.id(), &id("PEP"));

        let missing = Pair::new(id("KO"), id("XOM")).unwrap();
        match reg.legs(&missing) {
            Err(MonitorError::UnknownEntity { entity, .. }) => assert_eq!(entity, id("XOM")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn correlation_cell_round_trips_and_validates() {
        let cell = PairCorrelation::new(0.25);
        assert_eq!(cell.get(), 0.25);
        cell.set(-0.8);
        assert_eq!(cell.get(), -0.8);

        let p = Pair::new(id("KO"), id("PEP")).unwrap();
        assert!(validate_correlation(&p, 1.0).is_ok());
        assert!(validate_correlation(&p, -1.0).is_ok());
        assert!(validate_correlation(&p, 1.01).is_err());
        assert!(validate_correlation(&p, f64::NAN).is_err());
    }
}
