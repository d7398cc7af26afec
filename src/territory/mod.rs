//! Territory: the map of build sites, construction and relinquishment.

mod abandon;
mod service;
mod site;

pub use abandon::{spawn_abandon_worker, AbandonReport, AbandonWorker};
pub use service::TerritoryService;
pub use site::{BuildSite, SiteState};

use crate::config::WorldConfig;
use crate::types::Position;

/// Longest side accepted for a single block scan.
pub const MAX_SCAN_LENGTH: i32 = 32;

/// A square block of the map anchored at its lowest corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub length: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, length: i32) -> Self {
        Self { x, y, length }
    }

    /// Cells of the region that lie on the map, x-major.
    pub fn positions(&self, world: &WorldConfig) -> impl Iterator<Item = Position> {
        let length = self.length.clamp(0, MAX_SCAN_LENGTH);
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.x.saturating_add(length).min(world.width);
        let y1 = self.y.saturating_add(length).min(world.height);
        (x0..x1).flat_map(move |x| (y0..y1).map(move |y| Position::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_clipped_to_the_map() {
        let world = WorldConfig {
            width: 10,
            height: 10,
        };
        assert_eq!(Region::new(-2, -2, 4).positions(&world).count(), 4);
        assert_eq!(Region::new(9, 0, 3).positions(&world).count(), 3);
        assert_eq!(Region::new(20, 20, 3).positions(&world).count(), 0);
        assert_eq!(Region::new(0, 0, 0).positions(&world).count(), 0);
        assert_eq!(Region::new(0, 0, 1000).positions(&world).count(), 100);
    }
}
