//! Current no-fly zones and permit areas.
//!
//! Both sets are replaced wholesale; readers take a cheap snapshot and never
//! observe a half-applied refresh.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use fleet_core::geojson::PolygonSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    NoFly,
    Permit,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::NoFly => "no_fly",
            GeometryKind::Permit => "permit",
        }
    }
}

#[derive(Default)]
pub struct Airspace {
    no_fly: RwLock<Arc<PolygonSet>>,
    permit: RwLock<Arc<PolygonSet>>,
}

impl Airspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: GeometryKind) -> &RwLock<Arc<PolygonSet>> {
        match kind {
            GeometryKind::NoFly => &self.no_fly,
            GeometryKind::Permit => &self.permit,
        }
    }

    pub fn get(&self, kind: GeometryKind) -> Arc<PolygonSet> {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn no_fly(&self) -> Arc<PolygonSet> {
        self.get(GeometryKind::NoFly)
    }

    pub fn permit(&self) -> Arc<PolygonSet> {
        self.get(GeometryKind::Permit)
    }

    /// Swap in a new set, returning how many polygons it holds.
    pub fn replace(&self, kind: GeometryKind, polygons: PolygonSet) -> usize {
        let count = polygons.len();
        *self.slot(kind).write().unwrap_or_else(PoisonError::into_inner) = Arc::new(polygons);
        tracing::info!("Replaced {} geometry: {} polygons", kind.as_str(), count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_swaps_snapshot() {
        let airspace = Airspace::new();
        assert!(airspace.permit().is_empty());

        let before = airspace.no_fly();
        let set = PolygonSet::from_rings(vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]);
        assert_eq!(airspace.replace(GeometryKind::NoFly, set), 1);

        assert!(before.is_empty());
        assert_eq!(airspace.no_fly().len(), 1);
        assert!(airspace.permit().is_empty());
    }
}
