// Navigation constants, compass directions and small geometry helpers.
//
// World space is Z-up. NORTH is -Y, SOUTH is +Y, EAST is +X, WEST is -X, so
// an area's north-west corner holds its minimum X and Y.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Distance between two sampled nodes
pub const GENERATION_STEP_SIZE: f32 = 25.0;
/// Height a walker steps up without jumping
pub const STEP_HEIGHT: f32 = 18.0;
/// Height of a standing jump
pub const JUMP_HEIGHT: f32 = 41.8;
/// Height reachable with a crouch jump
pub const JUMP_CROUCH_HEIGHT: f32 = 58.0;
/// Highest ledge the sampler tries to climb onto
pub const CLIMB_UP_HEIGHT: f32 = JUMP_CROUCH_HEIGHT;
/// Falls deeper than this are fatal
pub const DEATH_DROP: f32 = 200.0;
/// Drops past this depth tag the node as a cliff edge
pub const CLIFF_HEIGHT: f32 = 300.0;

pub const HALF_HUMAN_WIDTH: f32 = 16.0;
pub const HALF_HUMAN_HEIGHT: f32 = 35.5;
pub const HUMAN_HEIGHT: f32 = 71.0;
pub const HUMAN_EYE_HEIGHT: f32 = 62.0;
pub const HUMAN_CROUCH_HEIGHT: f32 = 55.0;
pub const HUMAN_CROUCH_EYE_HEIGHT: f32 = 37.0;

/// Narrowest obstacle-top area the generator will create
pub const MIN_OBSTACLE_AREA_WIDTH: f32 = 10.0;
/// Nodes farther than this off an area's plane keep it from growing
pub const OFF_PLANE_TOLERANCE: f32 = 5.0;
/// Number of teams tracked for occupy times and blocking
pub const MAX_NAV_TEAMS: usize = 2;
/// Run speed used to estimate earliest occupy times (units/sec)
pub const RUN_SPEED: f32 = 250.0;

/// Compass direction of a connection or an area edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NavDirType {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

pub const NUM_DIRECTIONS: usize = 4;

impl NavDirType {
    pub const ALL: [NavDirType; NUM_DIRECTIONS] = [
        NavDirType::North,
        NavDirType::East,
        NavDirType::South,
        NavDirType::West,
    ];

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(NavDirType::North),
            1 => Some(NavDirType::East),
            2 => Some(NavDirType::South),
            3 => Some(NavDirType::West),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Self {
        match self {
            NavDirType::North => NavDirType::South,
            NavDirType::East => NavDirType::West,
            NavDirType::South => NavDirType::North,
            NavDirType::West => NavDirType::East,
        }
    }

    /// Direction 90 degrees counter-clockwise (looking down)
    pub fn left(self) -> Self {
        match self {
            NavDirType::North => NavDirType::West,
            NavDirType::East => NavDirType::North,
            NavDirType::South => NavDirType::East,
            NavDirType::West => NavDirType::South,
        }
    }

    pub fn right(self) -> Self {
        self.left().opposite()
    }

    /// True for EAST/WEST, whose edges run along Y
    pub fn is_x_axis(self) -> bool {
        matches!(self, NavDirType::East | NavDirType::West)
    }

    /// Unit vector in the map plane
    pub fn unit(self) -> Vec3 {
        match self {
            NavDirType::North => Vec3::new(0.0, -1.0, 0.0),
            NavDirType::East => Vec3::new(1.0, 0.0, 0.0),
            NavDirType::South => Vec3::new(0.0, 1.0, 0.0),
            NavDirType::West => Vec3::new(-1.0, 0.0, 0.0),
        }
    }
}

/// Corner of an area or a node quadrant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NavCornerType {
    NorthWest = 0,
    NorthEast = 1,
    SouthEast = 2,
    SouthWest = 3,
}

pub const NUM_CORNERS: usize = 4;

impl NavCornerType {
    pub const ALL: [NavCornerType; NUM_CORNERS] = [
        NavCornerType::NorthWest,
        NavCornerType::NorthEast,
        NavCornerType::SouthEast,
        NavCornerType::SouthWest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Signed (x, y) unit offset of the corner from a center point
    pub fn offset(self) -> (f32, f32) {
        match self {
            NavCornerType::NorthWest => (-1.0, -1.0),
            NavCornerType::NorthEast => (1.0, -1.0),
            NavCornerType::SouthEast => (1.0, 1.0),
            NavCornerType::SouthWest => (-1.0, 1.0),
        }
    }
}

/// Ladder traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LadderDirType {
    Up = 0,
    Down = 1,
}

pub const NUM_LADDER_DIRECTIONS: usize = 2;

/// Offset `v` by `amount` toward `dir` in the map plane
pub fn add_direction_to_vector(v: Vec3, dir: NavDirType, amount: f32) -> Vec3 {
    v + dir.unit() * amount
}

/// Snap a coordinate to the generation grid
pub fn snap_to_grid(value: f32) -> f32 {
    (value / GENERATION_STEP_SIZE).round() * GENERATION_STEP_SIZE
}

/// Snap the X/Y of a position to the generation grid, keeping Z
pub fn snap_xy(pos: Vec3) -> Vec3 {
    Vec3::new(snap_to_grid(pos.x), snap_to_grid(pos.y), pos.z)
}

/// Direction that points most closely along `delta`
pub fn direction_of(delta: Vec3) -> NavDirType {
    if delta.x.abs() > delta.y.abs() {
        if delta.x > 0.0 { NavDirType::East } else { NavDirType::West }
    } else if delta.y > 0.0 {
        NavDirType::South
    } else {
        NavDirType::North
    }
}

/// Axis-aligned extent in the map plane with a Z range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub lo: Vec3,
    pub hi: Vec3,
}

impl Extent {
    pub fn new(lo: Vec3, hi: Vec3) -> Self {
        Extent { lo, hi }
    }

    pub fn size_x(&self) -> f32 {
        self.hi.x - self.lo.x
    }

    pub fn size_y(&self) -> f32 {
        self.hi.y - self.lo.y
    }

    pub fn overlaps_xy(&self, other: &Extent) -> bool {
        self.lo.x < other.hi.x
            && self.hi.x > other.lo.x
            && self.lo.y < other.hi.y
            && self.hi.y > other.lo.y
    }

    /// Grow the extent to include `pos`
    pub fn encompass(&mut self, pos: Vec3) {
        self.lo = self.lo.min(pos);
        self.hi = self.hi.max(pos);
    }
}

/// Normal of the triangle (a, b, c), oriented to point up
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let n = (b - a).cross(c - a).normalize_or_zero();
    if n.z < 0.0 { -n } else { n }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_consistent() {
        for dir in NavDirType::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_eq!(dir.left().right(), dir);
            assert_eq!(NavDirType::from_u8(dir as u8), Some(dir));
            assert_eq!(direction_of(dir.unit()), dir);
        }
        assert_eq!(NavDirType::North.left(), NavDirType::West);
        assert_eq!(NavDirType::North.right(), NavDirType::East);
        assert_eq!(NavDirType::from_u8(4), None);
    }

    #[test]
    fn north_is_negative_y() {
        let v = add_direction_to_vector(Vec3::ZERO, NavDirType::North, 10.0);
        assert_eq!(v, Vec3::new(0.0, -10.0, 0.0));
    }

    #[test]
    fn snap_rounds_to_step() {
        assert_eq!(snap_to_grid(37.0), 25.0);
        assert_eq!(snap_to_grid(38.0), 50.0);
        assert_eq!(snap_to_grid(-12.0), 0.0);
    }

    #[test]
    fn triangle_normal_points_up() {
        let n = triangle_normal(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert!((n.z - 1.0).abs() < 1e-6);
        let n = triangle_normal(Vec3::ZERO, Vec3::Y, Vec3::X);
        assert!((n.z - 1.0).abs() < 1e-6);
    }
}
