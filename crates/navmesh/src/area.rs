// Navigation areas: the nodes of the navigation graph.
//
// An area is a rectangle in the map plane whose four corners carry their own
// heights, so sloped floors fit in one area. Areas reference each other, their
// ladders and their hiding spots by stable ID; the owning `NavMesh` resolves
// IDs. IDs are never reused inside a session.

use std::fmt;

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{NavError, NavResult};
use crate::ladder::LadderId;
use crate::math::{
    Extent, LadderDirType, MAX_NAV_TEAMS, NUM_CORNERS, NUM_DIRECTIONS, NUM_LADDER_DIRECTIONS,
    NavCornerType, NavDirType, STEP_HEIGHT, HUMAN_HEIGHT, triangle_normal,
};
use crate::node::NodeId;
use crate::place::Place;

/// Stable identifier of an area inside one mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AreaId(pub u32);

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a hiding spot inside one mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HidingSpotId(pub u32);

bitflags! {
    /// Area attribute bits, persisted as-is
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NavAttributes: u32 {
        const CROUCH       = 0x0000_0001;
        const JUMP         = 0x0000_0002;
        const PRECISE      = 0x0000_0004;
        const NO_JUMP      = 0x0000_0008;
        const STOP         = 0x0000_0010;
        const RUN          = 0x0000_0020;
        const WALK         = 0x0000_0040;
        const AVOID        = 0x0000_0080;
        const TRANSIENT    = 0x0000_0100;
        const DONT_HIDE    = 0x0000_0200;
        const STAND        = 0x0000_0400;
        const NO_HOSTAGES  = 0x0000_0800;
        const STAIRS       = 0x0000_1000;
        const NO_MERGE     = 0x0000_2000;
        const OBSTACLE_TOP = 0x0000_4000;
        const CLIFF        = 0x0000_8000;
        const PLAYERCLIP   = 0x1000_0000;
        const FUNC_COST    = 0x2000_0000;
        const HAS_ELEVATOR = 0x4000_0000;
        const NAV_BLOCKER  = 0x8000_0000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HidingSpotFlags: u8 {
        const IN_COVER          = 0x01;
        const GOOD_SNIPER_SPOT  = 0x02;
        const IDEAL_SNIPER_SPOT = 0x04;
        const EXPOSED           = 0x08;
    }
}

/// Visibility of one area from another
pub const NOT_VISIBLE: u8 = 0x00;
pub const POTENTIALLY_VISIBLE: u8 = 0x01;
pub const COMPLETELY_VISIBLE: u8 = 0x02;

/// Directed connection to a neighboring area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavConnect {
    pub id: AreaId,
    /// Center-to-center travel length
    pub length: f32,
}

/// A position where a bot can hide
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HidingSpot {
    pub id: HidingSpotId,
    pub pos: Vec3,
    pub flags: HidingSpotFlags,
    pub area: AreaId,
}

impl HidingSpot {
    pub fn has_good_cover(&self) -> bool {
        self.flags.contains(HidingSpotFlags::IN_COVER)
    }

    pub fn is_good_sniper_spot(&self) -> bool {
        self.flags.contains(HidingSpotFlags::GOOD_SNIPER_SPOT)
    }

    pub fn is_ideal_sniper_spot(&self) -> bool {
        self.flags.contains(HidingSpotFlags::IDEAL_SNIPER_SPOT)
    }

    pub fn is_exposed(&self) -> bool {
        self.flags.contains(HidingSpotFlags::EXPOSED)
    }
}

/// A hiding spot and how far along an encounter path it becomes visible
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotOrder {
    pub spot: HidingSpotId,
    /// Parametric position along the path, 0..=1
    pub t: f32,
}

/// Spots that come into view while crossing an area from one neighbor to another
#[derive(Debug, Clone, PartialEq)]
pub struct SpotEncounter {
    pub from: AreaId,
    pub from_dir: NavDirType,
    pub to: AreaId,
    pub to_dir: NavDirType,
    pub path_from: Vec3,
    pub path_to: Vec3,
    pub spots: Vec<SpotOrder>,
}

/// Reference to another area plus a small attribute payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaBindInfo {
    pub id: AreaId,
    pub attributes: u8,
}

/// Obstacle crossing the interior of a 1x1 generated area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaObstacle {
    /// Travel direction that crosses the obstacle
    pub dir: NavDirType,
    /// Distance from the area's west (or north) edge where the obstacle begins
    pub start: f32,
    pub end: f32,
    /// Height of the obstacle top above the floor
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct NavArea {
    id: AreaId,
    nw_corner: Vec3,
    se_corner: Vec3,
    ne_z: f32,
    sw_z: f32,
    center: Vec3,

    pub attributes: NavAttributes,
    pub(crate) connect: [Vec<NavConnect>; NUM_DIRECTIONS],
    pub(crate) incoming_connect: [Vec<NavConnect>; NUM_DIRECTIONS],
    pub(crate) ladder: [Vec<LadderId>; NUM_LADDER_DIRECTIONS],
    pub(crate) elevator_areas: Vec<AreaId>,
    pub(crate) hiding_spots: Vec<HidingSpot>,
    pub(crate) spot_encounters: Vec<SpotEncounter>,
    pub place: Place,
    pub earliest_occupy_time: [f32; MAX_NAV_TEAMS],
    pub light_intensity: [f32; NUM_CORNERS],
    pub(crate) potentially_visible: Vec<AreaBindInfo>,
    pub(crate) inherit_visibility_from: Option<AreaId>,
    pub(crate) blocked: [bool; MAX_NAV_TEAMS],

    // Generation bookkeeping, empty for loaded areas
    pub(crate) node: [Option<NodeId>; NUM_CORNERS],
    pub(crate) obstacle: Option<AreaObstacle>,
}

impl NavArea {
    /// Build an area from its four corners. The rectangle must have a
    /// positive size in both X and Y.
    pub fn from_corners(id: AreaId, nw: Vec3, ne: Vec3, se: Vec3, sw: Vec3) -> NavResult<Self> {
        if !(nw.x < se.x) || !(nw.y < se.y) {
            return Err(NavError::DegenerateArea(format!(
                "area #{} corners ({}, {}) - ({}, {})",
                id, nw.x, nw.y, se.x, se.y
            )));
        }
        let mut area = NavArea {
            id,
            nw_corner: nw,
            se_corner: se,
            ne_z: ne.z,
            sw_z: sw.z,
            center: Vec3::ZERO,
            attributes: NavAttributes::empty(),
            connect: Default::default(),
            incoming_connect: Default::default(),
            ladder: Default::default(),
            elevator_areas: Vec::new(),
            hiding_spots: Vec::new(),
            spot_encounters: Vec::new(),
            place: Place::UNDEFINED,
            earliest_occupy_time: [0.0; MAX_NAV_TEAMS],
            light_intensity: [1.0; NUM_CORNERS],
            potentially_visible: Vec::new(),
            inherit_visibility_from: None,
            blocked: [false; MAX_NAV_TEAMS],
            node: [None; NUM_CORNERS],
            obstacle: None,
        };
        area.update_center();
        Ok(area)
    }

    /// Build a flat or sloped area from its north-west and south-east corners
    pub fn from_extent(id: AreaId, nw: Vec3, se: Vec3, ne_z: f32, sw_z: f32) -> NavResult<Self> {
        Self::from_corners(
            id,
            nw,
            Vec3::new(se.x, nw.y, ne_z),
            se,
            Vec3::new(nw.x, se.y, sw_z),
        )
    }

    fn update_center(&mut self) {
        self.center = Vec3::new(
            (self.nw_corner.x + self.se_corner.x) / 2.0,
            (self.nw_corner.y + self.se_corner.y) / 2.0,
            (self.nw_corner.z + self.ne_z + self.se_corner.z + self.sw_z) / 4.0,
        );
    }

    pub fn id(&self) -> AreaId {
        self.id
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn corner(&self, corner: NavCornerType) -> Vec3 {
        match corner {
            NavCornerType::NorthWest => self.nw_corner,
            NavCornerType::NorthEast => Vec3::new(self.se_corner.x, self.nw_corner.y, self.ne_z),
            NavCornerType::SouthEast => self.se_corner,
            NavCornerType::SouthWest => Vec3::new(self.nw_corner.x, self.se_corner.y, self.sw_z),
        }
    }

    pub fn corners(&self) -> [Vec3; NUM_CORNERS] {
        NavCornerType::ALL.map(|c| self.corner(c))
    }

    /// Move all four corners at once
    pub(crate) fn set_corners(&mut self, nw: Vec3, ne_z: f32, se: Vec3, sw_z: f32) -> NavResult<()> {
        if !(nw.x < se.x) || !(nw.y < se.y) {
            return Err(NavError::DegenerateArea(format!("area #{} resized to zero", self.id)));
        }
        self.nw_corner = nw;
        self.se_corner = se;
        self.ne_z = ne_z;
        self.sw_z = sw_z;
        self.update_center();
        Ok(())
    }

    /// Raise or lower every corner by `dz`
    pub(crate) fn offset_z(&mut self, dz: f32) {
        self.nw_corner.z += dz;
        self.se_corner.z += dz;
        self.ne_z += dz;
        self.sw_z += dz;
        self.update_center();
    }

    pub fn extent(&self) -> Extent {
        let corners = self.corners();
        let mut extent = Extent::new(corners[0], corners[0]);
        for c in &corners[1..] {
            extent.encompass(*c);
        }
        extent
    }

    pub fn size_x(&self) -> f32 {
        self.se_corner.x - self.nw_corner.x
    }

    pub fn size_y(&self) -> f32 {
        self.se_corner.y - self.nw_corner.y
    }

    pub fn has_attributes(&self, bits: NavAttributes) -> bool {
        self.attributes.intersects(bits)
    }

    pub fn place(&self) -> Place {
        self.place
    }

    /// Interpolated floor height at (x, y), clamped to the rectangle
    pub fn z_at(&self, x: f32, y: f32) -> f32 {
        let u = ((x - self.nw_corner.x) / self.size_x()).clamp(0.0, 1.0);
        let v = ((y - self.nw_corner.y) / self.size_y()).clamp(0.0, 1.0);
        let north_z = self.nw_corner.z + u * (self.ne_z - self.nw_corner.z);
        let south_z = self.sw_z + u * (self.se_corner.z - self.sw_z);
        north_z + v * (south_z - north_z)
    }

    pub fn z(&self, pos: Vec3) -> f32 {
        self.z_at(pos.x, pos.y)
    }

    pub fn is_overlapping_xy(&self, pos: Vec3, tolerance: f32) -> bool {
        pos.x + tolerance >= self.nw_corner.x
            && pos.x - tolerance <= self.se_corner.x
            && pos.y + tolerance >= self.nw_corner.y
            && pos.y - tolerance <= self.se_corner.y
    }

    /// True if the rectangles of both areas overlap in the map plane
    pub fn is_overlapping_area(&self, other: &NavArea) -> bool {
        self.nw_corner.x < other.se_corner.x
            && self.se_corner.x > other.nw_corner.x
            && self.nw_corner.y < other.se_corner.y
            && self.se_corner.y > other.nw_corner.y
    }

    /// True if `pos` is inside the rectangle and the floor is within reach
    /// of it vertically
    pub fn contains(&self, pos: Vec3) -> bool {
        if !self.is_overlapping_xy(pos, 0.0) {
            return false;
        }
        let z = self.z(pos);
        z <= pos.z + STEP_HEIGHT && z >= pos.z - HUMAN_HEIGHT
    }

    /// Closest point on the area's surface to `pos`
    pub fn closest_point(&self, pos: Vec3) -> Vec3 {
        let x = pos.x.clamp(self.nw_corner.x, self.se_corner.x);
        let y = pos.y.clamp(self.nw_corner.y, self.se_corner.y);
        Vec3::new(x, y, self.z_at(x, y))
    }

    /// Surface normals of the NW and SE triangles
    pub fn triangle_normals(&self) -> (Vec3, Vec3) {
        let [nw, ne, se, sw] = self.corners();
        (triangle_normal(nw, ne, sw), triangle_normal(se, sw, ne))
    }

    pub fn normal(&self) -> Vec3 {
        let (a, b) = self.triangle_normals();
        (a + b).normalize_or_zero()
    }

    /// Both triangles share one plane
    pub fn is_flat(&self) -> bool {
        let (a, b) = self.triangle_normals();
        a.dot(b) > 0.999
    }

    /// Distance of `pos` off this area's plane
    pub fn plane_distance(&self, pos: Vec3) -> f32 {
        let n = self.normal();
        (pos - self.nw_corner).dot(n).abs()
    }

    /// Every corner of `other` lies on this area's plane, and vice versa
    pub fn is_coplanar(&self, other: &NavArea, tolerance: f32) -> bool {
        if !self.is_flat() || !other.is_flat() {
            return false;
        }
        other.corners().iter().all(|&c| self.plane_distance(c) <= tolerance)
            && self.corners().iter().all(|&c| other.plane_distance(c) <= tolerance)
    }

    /// Signed overlap of this area's `dir` side with the facing side of
    /// `other`, if both sides lie on the same line. Zero or less means the
    /// areas only touch at a corner or not at all.
    pub fn edge_contact(&self, other: &NavArea, dir: NavDirType, tolerance: f32) -> Option<f32> {
        let (line_a, line_b) = match dir {
            NavDirType::North => (self.nw_corner.y, other.se_corner.y),
            NavDirType::South => (self.se_corner.y, other.nw_corner.y),
            NavDirType::West => (self.nw_corner.x, other.se_corner.x),
            NavDirType::East => (self.se_corner.x, other.nw_corner.x),
        };
        if (line_a - line_b).abs() > tolerance {
            return None;
        }
        let overlap = if dir.is_x_axis() {
            self.se_corner.y.min(other.se_corner.y) - self.nw_corner.y.max(other.nw_corner.y)
        } else {
            self.se_corner.x.min(other.se_corner.x) - self.nw_corner.x.max(other.nw_corner.x)
        };
        Some(overlap)
    }

    /// Length of the edge `other` shares with this area's `dir` side
    pub fn edge_overlap(&self, other: &NavArea, dir: NavDirType, tolerance: f32) -> Option<f32> {
        self.edge_contact(other, dir, tolerance).filter(|o| *o > 0.0)
    }

    /// Center and half-width of the portal from this area into `other` through `dir`
    pub fn compute_portal(&self, other: &NavArea, dir: NavDirType) -> (Vec3, f32) {
        let mut center = Vec3::ZERO;
        let half_width;
        if dir.is_x_axis() {
            center.x = if dir == NavDirType::West { self.nw_corner.x } else { self.se_corner.x };
            let top = self.nw_corner.y.max(other.nw_corner.y);
            let bottom = self.se_corner.y.min(other.se_corner.y);
            let (top, bottom) = if top > bottom { (bottom, top) } else { (top, bottom) };
            center.y = (top + bottom) / 2.0;
            half_width = (bottom - top) / 2.0;
        } else {
            center.y = if dir == NavDirType::North { self.nw_corner.y } else { self.se_corner.y };
            let left = self.nw_corner.x.max(other.nw_corner.x);
            let right = self.se_corner.x.min(other.se_corner.x);
            let (left, right) = if left > right { (right, left) } else { (left, right) };
            center.x = (left + right) / 2.0;
            half_width = (right - left) / 2.0;
        }
        center.z = self.z_at(center.x, center.y);
        (center, half_width)
    }

    // ---- Connections ----

    pub fn connections(&self, dir: NavDirType) -> &[NavConnect] {
        &self.connect[dir.index()]
    }

    pub fn incoming_connections(&self, dir: NavDirType) -> &[NavConnect] {
        &self.incoming_connect[dir.index()]
    }

    /// All outgoing connections with their direction, in direction order
    pub fn all_connections(&self) -> impl Iterator<Item = (NavDirType, NavConnect)> + '_ {
        NavDirType::ALL
            .into_iter()
            .flat_map(move |d| self.connect[d.index()].iter().map(move |c| (d, *c)))
    }

    pub fn connection_count(&self) -> usize {
        self.connect.iter().map(Vec::len).sum()
    }

    /// Is there a connection to `id`, in `dir` or in any direction
    pub fn is_connected(&self, id: AreaId, dir: Option<NavDirType>) -> bool {
        match dir {
            Some(d) => self.connect[d.index()].iter().any(|c| c.id == id),
            None => self.connect.iter().flatten().any(|c| c.id == id),
        }
    }

    /// Add a connection, ignoring duplicates and self-connections
    pub(crate) fn connect_to(&mut self, id: AreaId, dir: NavDirType, length: f32) -> bool {
        if id == self.id || self.is_connected(id, Some(dir)) {
            return false;
        }
        self.connect[dir.index()].push(NavConnect { id, length });
        true
    }

    /// Remove every outgoing and incoming connection to `id`
    pub(crate) fn disconnect(&mut self, id: AreaId) {
        for list in self.connect.iter_mut().chain(self.incoming_connect.iter_mut()) {
            list.retain(|c| c.id != id);
        }
    }

    pub(crate) fn disconnect_dir(&mut self, id: AreaId, dir: NavDirType) {
        self.connect[dir.index()].retain(|c| c.id != id);
    }

    pub fn ladders(&self, dir: LadderDirType) -> &[LadderId] {
        &self.ladder[dir as usize]
    }

    pub fn elevator_areas(&self) -> &[AreaId] {
        &self.elevator_areas
    }

    pub fn hiding_spots(&self) -> &[HidingSpot] {
        &self.hiding_spots
    }

    pub fn spot_encounters(&self) -> &[SpotEncounter] {
        &self.spot_encounters
    }

    pub fn potentially_visible(&self) -> &[AreaBindInfo] {
        &self.potentially_visible
    }

    pub fn inherit_visibility_from(&self) -> Option<AreaId> {
        self.inherit_visibility_from
    }

    // ---- Blocking ----

    /// Team `None` asks whether any team is blocked
    pub fn is_blocked(&self, team: Option<usize>, ignore_nav_blockers: bool) -> bool {
        if ignore_nav_blockers && self.attributes.contains(NavAttributes::NAV_BLOCKER) {
            return false;
        }
        match team {
            Some(t) if t < MAX_NAV_TEAMS => self.blocked[t],
            Some(_) => false,
            None => self.blocked.iter().any(|&b| b),
        }
    }

    /// Mark the area blocked for one team or, with `None`, for all teams
    pub fn set_blocked(&mut self, team: Option<usize>, blocked: bool) {
        match team {
            Some(t) if t < MAX_NAV_TEAMS => self.blocked[t] = blocked,
            Some(_) => {}
            None => self.blocked = [blocked; MAX_NAV_TEAMS],
        }
    }

    pub fn earliest_occupy_time(&self, team: usize) -> f32 {
        self.earliest_occupy_time.get(team).copied().unwrap_or(0.0)
    }

    /// Average of the corner light levels
    pub fn light_intensity_avg(&self) -> f32 {
        self.light_intensity.iter().sum::<f32>() / NUM_CORNERS as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(id: u32, x0: f32, y0: f32, x1: f32, y1: f32) -> NavArea {
        NavArea::from_extent(AreaId(id), Vec3::new(x0, y0, 0.0), Vec3::new(x1, y1, 0.0), 0.0, 0.0)
            .unwrap()
    }

    #[test]
    fn degenerate_rectangles_are_rejected() {
        let r = NavArea::from_extent(AreaId(1), Vec3::new(10.0, 0.0, 0.0), Vec3::new(10.0, 50.0, 0.0), 0.0, 0.0);
        assert!(r.is_err());
        let r = NavArea::from_extent(AreaId(1), Vec3::new(0.0, 60.0, 0.0), Vec3::new(10.0, 50.0, 0.0), 0.0, 0.0);
        assert!(r.is_err());
    }

    #[test]
    fn z_interpolates_across_slope() {
        let area = NavArea::from_extent(
            AreaId(1),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(100.0, 100.0, 20.0),
            10.0,
            10.0,
        )
        .unwrap();
        assert_eq!(area.z_at(0.0, 0.0), 0.0);
        assert_eq!(area.z_at(100.0, 0.0), 10.0);
        assert_eq!(area.z_at(100.0, 100.0), 20.0);
        assert_eq!(area.z_at(50.0, 50.0), 10.0);
        assert_eq!(area.center().z, 10.0);
        // Clamped outside the rectangle
        assert_eq!(area.z_at(-50.0, -50.0), 0.0);
    }

    #[test]
    fn edge_overlap_and_portal() {
        let a = flat(1, 0.0, 0.0, 100.0, 100.0);
        let b = flat(2, 50.0, 100.0, 200.0, 150.0);
        assert_eq!(a.edge_overlap(&b, NavDirType::South, 0.5), Some(50.0));
        assert_eq!(a.edge_overlap(&b, NavDirType::North, 0.5), None);
        assert_eq!(b.edge_overlap(&a, NavDirType::North, 0.5), Some(50.0));

        let (center, half) = a.compute_portal(&b, NavDirType::South);
        assert_eq!(center, Vec3::new(75.0, 100.0, 0.0));
        assert_eq!(half, 25.0);

        // Touching only at a corner is no shared edge
        let c = flat(3, 100.0, 100.0, 150.0, 150.0);
        assert_eq!(a.edge_overlap(&c, NavDirType::South, 0.5), None);
        assert_eq!(a.edge_overlap(&c, NavDirType::East, 0.5), None);
    }

    #[test]
    fn connections_ignore_duplicates_and_self() {
        let mut a = flat(1, 0.0, 0.0, 10.0, 10.0);
        assert!(a.connect_to(AreaId(2), NavDirType::East, 10.0));
        assert!(!a.connect_to(AreaId(2), NavDirType::East, 10.0));
        assert!(!a.connect_to(AreaId(1), NavDirType::East, 0.0));
        assert!(a.connect_to(AreaId(2), NavDirType::North, 10.0));
        assert_eq!(a.connection_count(), 2);
        a.disconnect(AreaId(2));
        assert_eq!(a.connection_count(), 0);
    }

    #[test]
    fn nav_blockers_can_be_ignored() {
        let mut a = flat(1, 0.0, 0.0, 10.0, 10.0);
        a.set_blocked(Some(1), true);
        assert!(a.is_blocked(Some(1), false));
        assert!(!a.is_blocked(Some(0), false));
        assert!(a.is_blocked(None, false));
        a.attributes |= NavAttributes::NAV_BLOCKER;
        assert!(!a.is_blocked(Some(1), true));
    }

    #[test]
    fn coplanar_flat_neighbors() {
        let a = flat(1, 0.0, 0.0, 100.0, 100.0);
        let b = flat(2, 100.0, 0.0, 200.0, 100.0);
        assert!(a.is_coplanar(&b, 5.0));
        let mut c = flat(3, 100.0, 0.0, 200.0, 100.0);
        c.offset_z(20.0);
        assert!(!a.is_coplanar(&c, 5.0));
    }
}
