use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::RwLock;

use super::Probe;

#[derive(Default)]
struct Indexes {
    by_id: FnvHashMap<String, Arc<Probe>>,
    // unit name -> (probe id -> probe), for "all probes in this unit"
    by_unit: FnvHashMap<String, FnvHashMap<String, Arc<Probe>>>,
}

/// Registry of live probe definitions. Records are immutable `Arc`s
/// swapped whole under one write lock, so hit-path readers always see a
/// fully-old or fully-new probe and never block each other.
pub struct ProbeStore {
    inner: RwLock<Indexes>,
}

impl Default for ProbeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indexes::default()),
        }
    }

    /// Insert or fully replace the record with this id.
    pub fn upsert(&self, probe: Probe) -> Arc<Probe> {
        let probe = Arc::new(probe);
        let mut ix = self.inner.write();

        if let Some(old) = ix.by_id.insert(probe.id.clone(), Arc::clone(&probe)) {
            Self::unindex_unit(&mut ix, &old);
        }
        if let Some(unit) = &probe.location.unit_name {
            ix.by_unit
                .entry(unit.clone())
                .or_default()
                .insert(probe.id.clone(), Arc::clone(&probe));
        }

        probe
    }

    /// Delete from both indexes. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<Probe>> {
        let mut ix = self.inner.write();
        let removed = ix.by_id.remove(id)?;
        Self::unindex_unit(&mut ix, &removed);
        Some(removed)
    }

    fn unindex_unit(ix: &mut Indexes, probe: &Arc<Probe>) {
        if let Some(unit) = &probe.location.unit_name {
            if let Some(unit_probes) = ix.by_unit.get_mut(unit) {
                unit_probes.remove(&probe.id);
                if unit_probes.is_empty() {
                    ix.by_unit.remove(unit);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Probe>> {
        self.inner.read().by_id.get(id).cloned()
    }

    pub fn get_by_unit(&self, unit_name: &str) -> Vec<Arc<Probe>> {
        match self.inner.read().by_unit.get(unit_name) {
            Some(unit_probes) => unit_probes.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn has_any_for_unit(&self, unit_name: &str) -> bool {
        self.inner
            .read()
            .by_unit
            .get(unit_name)
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }

    pub fn all(&self) -> Vec<Arc<Probe>> {
        self.inner.read().by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flip the enabled flag by swapping in a fresh record; both indexes
    /// are updated under the same write lock.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Option<Arc<Probe>> {
        let mut ix = self.inner.write();
        let current = ix.by_id.get(id)?;
        let mut updated = (**current).clone();
        updated.enabled = enabled;
        let updated = Arc::new(updated);

        ix.by_id.insert(id.to_owned(), Arc::clone(&updated));
        if let Some(unit) = &updated.location.unit_name {
            if let Some(unit_probes) = ix.by_unit.get_mut(unit) {
                unit_probes.insert(id.to_owned(), Arc::clone(&updated));
            }
        }
        Some(updated)
    }
}
