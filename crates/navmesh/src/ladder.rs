// Ladders: vertical connections between areas.

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::area::AreaId;
use crate::math::NavDirType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LadderId(pub u32);

impl fmt::Display for LadderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A climbable ladder and the areas at each of its ends
#[derive(Debug, Clone, PartialEq)]
pub struct NavLadder {
    pub id: LadderId,
    /// Center of the top of the ladder
    pub top: Vec3,
    /// Center of the bottom of the ladder
    pub bottom: Vec3,
    pub width: f32,
    pub length: f32,
    /// Direction a climber faces while on the ladder
    pub dir: NavDirType,

    /// Area reached by stepping forward off the top
    pub top_forward_area: Option<AreaId>,
    pub top_left_area: Option<AreaId>,
    pub top_right_area: Option<AreaId>,
    /// Area behind the climber at the top; never used for pathing
    pub top_behind_area: Option<AreaId>,
    pub bottom_area: Option<AreaId>,

    /// The bottom area is too far below the ladder to reach it
    pub is_dangling: bool,
}

impl NavLadder {
    pub fn new(id: LadderId, top: Vec3, bottom: Vec3, width: f32, dir: NavDirType) -> Self {
        NavLadder {
            id,
            top,
            bottom,
            width,
            length: (top - bottom).length(),
            dir,
            top_forward_area: None,
            top_left_area: None,
            top_right_area: None,
            top_behind_area: None,
            bottom_area: None,
            is_dangling: false,
        }
    }

    /// Areas reachable by climbing up, in preference order
    pub fn up_areas(&self) -> impl Iterator<Item = AreaId> + '_ {
        [self.top_forward_area, self.top_left_area, self.top_right_area]
            .into_iter()
            .flatten()
    }

    /// Every area this ladder references
    pub fn referenced_areas(&self) -> impl Iterator<Item = AreaId> + '_ {
        [
            self.top_forward_area,
            self.top_left_area,
            self.top_right_area,
            self.top_behind_area,
            self.bottom_area,
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_connected_to(&self, area: AreaId) -> bool {
        self.referenced_areas().any(|a| a == area)
    }

    /// Drop every reference to `area`
    pub fn disconnect_area(&mut self, area: AreaId) {
        for slot in [
            &mut self.top_forward_area,
            &mut self.top_left_area,
            &mut self.top_right_area,
            &mut self.top_behind_area,
            &mut self.bottom_area,
        ] {
            if *slot == Some(area) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_areas_exclude_behind() {
        let mut ladder = NavLadder::new(
            LadderId(1),
            Vec3::new(0.0, 0.0, 200.0),
            Vec3::new(0.0, 0.0, 0.0),
            32.0,
            NavDirType::North,
        );
        assert_eq!(ladder.length, 200.0);
        ladder.top_behind_area = Some(AreaId(9));
        ladder.top_left_area = Some(AreaId(3));
        ladder.top_forward_area = Some(AreaId(2));
        let up: Vec<_> = ladder.up_areas().collect();
        assert_eq!(up, vec![AreaId(2), AreaId(3)]);

        ladder.disconnect_area(AreaId(9));
        assert!(!ladder.is_connected_to(AreaId(9)));
        assert!(ladder.is_connected_to(AreaId(2)));
    }
}
