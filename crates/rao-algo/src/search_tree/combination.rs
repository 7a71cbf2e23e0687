use crate::hashing::sha256_prefix;
use rao_core::{Network, NetworkAction};
use std::collections::BTreeSet;
use std::fmt;

/// Network actions activated together in one search step.
#[derive(Debug, Clone)]
pub struct NetworkActionCombination {
    actions: Vec<NetworkAction>,
    detected_during_optimization: bool,
}

impl NetworkActionCombination {
    pub fn new(mut actions: Vec<NetworkAction>, detected_during_optimization: bool) -> Self {
        actions.sort_by(|a, b| a.id.cmp(&b.id));
        actions.dedup_by(|a, b| a.id == b.id);
        Self {
            actions,
            detected_during_optimization,
        }
    }

    pub fn single(action: NetworkAction) -> Self {
        Self::new(vec![action], true)
    }

    /// Canonical id: sorted action ids joined by `+`.
    pub fn id(&self) -> String {
        canonical_id(self.actions.iter().map(|na| na.id.as_str()))
    }

    /// Deterministic tie-break rank, lower wins.
    pub fn rank(&self) -> u64 {
        sha256_prefix(&[&self.id()])
    }

    pub fn actions(&self) -> &[NetworkAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_detected_during_optimization(&self) -> bool {
        self.detected_during_optimization
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.iter().any(|na| na.id == id)
    }

    pub fn operators(&self) -> BTreeSet<&str> {
        self.actions.iter().filter_map(|na| na.operator.as_deref()).collect()
    }

    pub fn areas(&self, network: &Network) -> BTreeSet<String> {
        self.actions.iter().flat_map(|na| na.areas(network)).collect()
    }
}

impl fmt::Display for NetworkActionCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Sorted, deduplicated ids joined by `+`.
pub fn canonical_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let ids: BTreeSet<&str> = ids.into_iter().collect();
    ids.into_iter().collect::<Vec<_>>().join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn na(id: &str) -> NetworkAction {
        NetworkAction::new(id, Vec::new())
    }

    #[test]
    fn test_id_and_rank_ignore_order() {
        let ab = NetworkActionCombination::new(vec![na("b"), na("a")], false);
        let ba = NetworkActionCombination::new(vec![na("a"), na("b"), na("a")], false);
        assert_eq!(ab.id(), "a+b");
        assert_eq!(ab.rank(), ba.rank());
        assert_eq!(ba.len(), 2);
        assert_ne!(ab.rank(), NetworkActionCombination::single(na("a")).rank());
    }
}
