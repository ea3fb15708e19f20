// The navigation mesh: owner of every area, ladder and hiding spot.
//
// Areas and ladders live in ID-keyed maps so that merges, splits and removals
// never invalidate a reference held elsewhere. Iteration is always in ID
// order, which keeps generation, analysis and saved files deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use glam::Vec3;
use tracing::{debug, trace};

use crate::area::{
    AreaBindInfo, AreaId, HidingSpot, HidingSpotFlags, HidingSpotId, NavArea, NavAttributes,
    NavConnect,
};
use crate::error::{NavError, NavResult};
use crate::grid::NavAreaGrid;
use crate::ladder::{LadderId, NavLadder};
use crate::math::{
    Extent, GENERATION_STEP_SIZE, HUMAN_HEIGHT, LadderDirType, NavDirType, STEP_HEIGHT,
    add_direction_to_vector,
};
use crate::place::{Place, PlaceNames};
use crate::trace::{MASK_NAV_SOLID, TraceOracle};

/// Height above a query position still accepted as "the floor under it"
const AREA_QUERY_SLACK: f32 = 5.0;
/// How far from a ladder top to look for the areas it leads to
const LADDER_TOP_SEARCH_RANGE: f32 = 4.0 * GENERATION_STEP_SIZE;
/// Two edges closer than this are considered the same line
const EDGE_TOLERANCE: f32 = 0.5;

/// A broken invariant found by `NavMesh::validate_connections`
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionIssue {
    DegenerateArea(AreaId),
    DanglingConnection { from: AreaId, to: AreaId },
    /// One-way connection not listed as incoming on its target
    MissingIncoming { from: AreaId, to: AreaId, dir: NavDirType },
    /// Incoming entry for a link that is two-way or does not exist
    SpuriousIncoming { area: AreaId, from: AreaId, dir: NavDirType },
}

impl fmt::Display for ConnectionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionIssue::DegenerateArea(id) => write!(f, "area #{} has a degenerate rectangle", id),
            ConnectionIssue::DanglingConnection { from, to } => {
                write!(f, "area #{} connects to missing area #{}", from, to)
            }
            ConnectionIssue::MissingIncoming { from, to, dir } => write!(
                f,
                "one-way connection #{} -> #{} ({:?}) is not on the incoming list",
                from, to, dir
            ),
            ConnectionIssue::SpuriousIncoming { area, from, dir } => write!(
                f,
                "area #{} lists #{} as incoming ({:?}) without a one-way connection",
                area, from, dir
            ),
        }
    }
}

#[derive(Debug)]
pub struct NavMesh {
    areas: BTreeMap<AreaId, NavArea>,
    ladders: BTreeMap<LadderId, NavLadder>,
    grid: NavAreaGrid,
    spots: BTreeMap<HidingSpotId, AreaId>,
    next_area_id: u32,
    next_ladder_id: u32,
    next_spot_id: u32,
    pub places: PlaceNames,
    pub(crate) is_analyzed: bool,
    pub(crate) sub_version: u32,
    pub(crate) bsp_size: u32,
}

impl Default for NavMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl NavMesh {
    pub fn new() -> Self {
        NavMesh {
            areas: BTreeMap::new(),
            ladders: BTreeMap::new(),
            grid: NavAreaGrid::new(),
            spots: BTreeMap::new(),
            next_area_id: 1,
            next_ladder_id: 1,
            next_spot_id: 1,
            places: PlaceNames::new(),
            is_analyzed: false,
            sub_version: 0,
            bsp_size: 0,
        }
    }

    /// Drop every area, ladder and place. ID counters restart.
    pub fn clear(&mut self) {
        *self = NavMesh::new();
    }

    // ---- Accessors ----

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn ladder_count(&self) -> usize {
        self.ladders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn area(&self, id: AreaId) -> Option<&NavArea> {
        self.areas.get(&id)
    }

    /// Mutable access for attributes, places and similar data. Geometry
    /// changes go through the mesh so the spatial grid stays in sync.
    pub fn area_mut(&mut self, id: AreaId) -> Option<&mut NavArea> {
        self.areas.get_mut(&id)
    }

    pub(crate) fn try_area(&self, id: AreaId) -> NavResult<&NavArea> {
        self.areas.get(&id).ok_or(NavError::UnknownArea(id))
    }

    pub fn areas(&self) -> impl Iterator<Item = &NavArea> {
        self.areas.values()
    }

    pub fn area_ids(&self) -> Vec<AreaId> {
        self.areas.keys().copied().collect()
    }

    pub fn ladder(&self, id: LadderId) -> Option<&NavLadder> {
        self.ladders.get(&id)
    }

    pub fn ladders(&self) -> impl Iterator<Item = &NavLadder> {
        self.ladders.values()
    }

    pub fn hiding_spot(&self, id: HidingSpotId) -> Option<&HidingSpot> {
        let area = self.spots.get(&id)?;
        self.areas.get(area)?.hiding_spots.iter().find(|s| s.id == id)
    }

    pub fn hiding_spot_count(&self) -> usize {
        self.spots.len()
    }

    pub fn is_analyzed(&self) -> bool {
        self.is_analyzed
    }

    pub fn set_analyzed(&mut self, analyzed: bool) {
        self.is_analyzed = analyzed;
    }

    pub fn sub_version(&self) -> u32 {
        self.sub_version
    }

    pub fn set_bsp_size(&mut self, size: u32) {
        self.bsp_size = size;
    }

    pub fn bsp_size(&self) -> u32 {
        self.bsp_size
    }

    pub fn set_place(&mut self, id: AreaId, place: Place) -> NavResult<()> {
        self.areas.get_mut(&id).ok_or(NavError::UnknownArea(id))?.place = place;
        Ok(())
    }

    pub fn place_name(&self, id: AreaId) -> Option<&str> {
        self.places.name(self.areas.get(&id)?.place)
    }

    // ---- Area lifecycle ----

    /// Create an area from its four corners
    pub fn create_area(&mut self, nw: Vec3, ne: Vec3, se: Vec3, sw: Vec3) -> NavResult<AreaId> {
        let id = AreaId(self.next_area_id);
        let area = NavArea::from_corners(id, nw, ne, se, sw)?;
        self.next_area_id += 1;
        self.insert_area(area);
        Ok(id)
    }

    /// Insert a fully built area under its own ID
    pub(crate) fn insert_area(&mut self, area: NavArea) {
        let id = area.id();
        self.next_area_id = self.next_area_id.max(id.0 + 1);
        self.grid.insert(id, &area.extent());
        for spot in &area.hiding_spots {
            self.spots.insert(spot.id, id);
            self.next_spot_id = self.next_spot_id.max(spot.id.0 + 1);
        }
        self.areas.insert(id, area);
    }

    /// Remove an area and every reference other mesh objects hold to it
    pub fn destroy_area(&mut self, id: AreaId) -> NavResult<NavArea> {
        let area = self.areas.remove(&id).ok_or(NavError::UnknownArea(id))?;
        self.grid.remove(id, &area.extent());
        for other in self.areas.values_mut() {
            other.disconnect(id);
            other.elevator_areas.retain(|a| *a != id);
            other.potentially_visible.retain(|v| v.id != id);
            if other.inherit_visibility_from == Some(id) {
                let own = other.id();
                other.inherit_visibility_from = None;
                other.potentially_visible =
                    area.potentially_visible.iter().copied().filter(|v| v.id != own).collect();
            }
            other.spot_encounters.retain(|e| e.from != id && e.to != id);
        }
        for ladder in self.ladders.values_mut() {
            ladder.disconnect_area(id);
        }
        for spot in &area.hiding_spots {
            self.spots.remove(&spot.id);
        }
        trace!("Destroyed area #{}", id);
        Ok(area)
    }

    /// Move an area's corners, keeping the spatial grid current
    pub fn set_area_corners(
        &mut self,
        id: AreaId,
        nw: Vec3,
        ne_z: f32,
        se: Vec3,
        sw_z: f32,
    ) -> NavResult<()> {
        let area = self.areas.get_mut(&id).ok_or(NavError::UnknownArea(id))?;
        let old = area.extent();
        area.set_corners(nw, ne_z, se, sw_z)?;
        let new = area.extent();
        self.grid.remove(id, &old);
        self.grid.insert(id, &new);
        self.update_connection_lengths(id);
        Ok(())
    }

    /// Raise or lower a whole area
    pub fn offset_area_z(&mut self, id: AreaId, dz: f32) -> NavResult<()> {
        let area = self.areas.get_mut(&id).ok_or(NavError::UnknownArea(id))?;
        area.offset_z(dz);
        self.update_connection_lengths(id);
        Ok(())
    }

    // ---- Connections ----

    fn center_distance(&self, a: AreaId, b: AreaId) -> f32 {
        match (self.areas.get(&a), self.areas.get(&b)) {
            (Some(a), Some(b)) => a.center().distance(b.center()),
            _ => 0.0,
        }
    }

    /// Add a directed connection `from -> to` through `from`'s `dir` side
    pub fn connect_areas(&mut self, from: AreaId, to: AreaId, dir: NavDirType) -> NavResult<()> {
        self.try_area(to)?;
        let length = self.center_distance(from, to);
        let area = self.areas.get_mut(&from).ok_or(NavError::UnknownArea(from))?;
        if area.connect_to(to, dir, length) {
            self.refresh_incoming_pair(from, to);
        }
        Ok(())
    }

    /// Remove every connection `from -> to`
    pub fn disconnect_areas(&mut self, from: AreaId, to: AreaId) -> NavResult<()> {
        let area = self.areas.get_mut(&from).ok_or(NavError::UnknownArea(from))?;
        for dir in NavDirType::ALL {
            area.disconnect_dir(to, dir);
        }
        self.refresh_incoming_pair(from, to);
        Ok(())
    }

    /// Directions (with lengths) in which `from` connects to `to`
    fn links(&self, from: AreaId, to: AreaId) -> Vec<(NavDirType, f32)> {
        self.areas
            .get(&from)
            .map(|a| {
                a.all_connections()
                    .filter(|(_, c)| c.id == to)
                    .map(|(d, c)| (d, c.length))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recompute the incoming entries between one pair of areas
    fn refresh_incoming_pair(&mut self, a: AreaId, b: AreaId) {
        let a_to_b = self.links(a, b);
        let b_to_a = self.links(b, a);
        for (this, other, outgoing, back) in [(b, a, &a_to_b, &b_to_a), (a, b, &b_to_a, &a_to_b)] {
            if let Some(area) = self.areas.get_mut(&this) {
                for list in area.incoming_connect.iter_mut() {
                    list.retain(|c| c.id != other);
                }
                if back.is_empty() {
                    for &(dir, length) in outgoing {
                        area.incoming_connect[dir.opposite().index()].push(NavConnect { id: other, length });
                    }
                }
            }
        }
    }

    /// Rebuild every incoming list from the outgoing connections
    pub fn rebuild_incoming_connections(&mut self) {
        let mut incoming: BTreeMap<AreaId, Vec<(NavDirType, NavConnect)>> = BTreeMap::new();
        for area in self.areas.values() {
            for (dir, c) in area.all_connections() {
                let Some(target) = self.areas.get(&c.id) else { continue };
                if !target.is_connected(area.id(), None) {
                    incoming.entry(c.id).or_default().push((
                        dir.opposite(),
                        NavConnect { id: area.id(), length: c.length },
                    ));
                }
            }
        }
        for area in self.areas.values_mut() {
            for list in area.incoming_connect.iter_mut() {
                list.clear();
            }
            if let Some(list) = incoming.remove(&area.id()) {
                for (dir, c) in list {
                    let slot = &mut area.incoming_connect[dir.index()];
                    if !slot.iter().any(|x| x.id == c.id) {
                        slot.push(c);
                    }
                }
            }
        }
    }

    /// Refresh cached lengths of connections into and out of `id`
    fn update_connection_lengths(&mut self, id: AreaId) {
        let Some(center) = self.areas.get(&id).map(NavArea::center) else { return };
        let neighbors: Vec<(AreaId, f32)> = self
            .neighbors_of(id)
            .into_iter()
            .filter_map(|n| self.areas.get(&n).map(|a| (n, a.center().distance(center))))
            .collect();
        for (other, length) in neighbors {
            for (area, to) in [(id, other), (other, id)] {
                let Some(area) = self.areas.get_mut(&area) else { continue };
                for list in area.connect.iter_mut().chain(area.incoming_connect.iter_mut()) {
                    list.iter_mut().filter(|c| c.id == to).for_each(|c| c.length = length);
                }
            }
        }
    }

    /// Areas linked with `id` by a connection in either direction
    fn neighbors_of(&self, id: AreaId) -> BTreeSet<AreaId> {
        let mut out = BTreeSet::new();
        if let Some(area) = self.areas.get(&id) {
            for list in area.connect.iter().chain(area.incoming_connect.iter()) {
                out.extend(list.iter().map(|c| c.id));
            }
        }
        out.remove(&id);
        out
    }

    /// Check the connection invariants over the whole mesh
    pub fn validate_connections(&self) -> Vec<ConnectionIssue> {
        let mut issues = Vec::new();
        for area in self.areas.values() {
            if !(area.size_x() > 0.0 && area.size_y() > 0.0) {
                issues.push(ConnectionIssue::DegenerateArea(area.id()));
            }
            for (dir, c) in area.all_connections() {
                let Some(target) = self.areas.get(&c.id) else {
                    issues.push(ConnectionIssue::DanglingConnection { from: area.id(), to: c.id });
                    continue;
                };
                let two_way = target.is_connected(area.id(), None);
                let listed = target
                    .incoming_connections(dir.opposite())
                    .iter()
                    .any(|x| x.id == area.id());
                if !two_way && !listed {
                    issues.push(ConnectionIssue::MissingIncoming { from: area.id(), to: c.id, dir });
                }
            }
            for dir in NavDirType::ALL {
                for c in area.incoming_connections(dir) {
                    let one_way = self.areas.get(&c.id).is_some_and(|src| {
                        src.is_connected(area.id(), Some(dir.opposite()))
                            && !area.is_connected(c.id, None)
                    });
                    if !one_way {
                        issues.push(ConnectionIssue::SpuriousIncoming { area: area.id(), from: c.id, dir });
                    }
                }
            }
        }
        issues
    }

    // ---- Merge / split ----

    /// Grow `keep` over `other`, which must share one full edge with it.
    /// `other` is removed and every reference to it now points at `keep`.
    pub fn merge_areas(&mut self, keep: AreaId, other: AreaId) -> NavResult<()> {
        let a = self.try_area(keep)?;
        let b = self.try_area(other)?;
        if keep == other {
            return Err(NavError::InvalidMerge(keep, other, "an area cannot merge with itself"));
        }
        let dir = NavDirType::ALL
            .into_iter()
            .find(|&d| {
                let (a_side, b_side) = if d.is_x_axis() {
                    (a.size_y(), b.size_y())
                } else {
                    (a.size_x(), b.size_x())
                };
                a.edge_overlap(b, d, EDGE_TOLERANCE).is_some_and(|len| {
                    (len - a_side).abs() < EDGE_TOLERANCE && (len - b_side).abs() < EDGE_TOLERANCE
                })
            })
            .ok_or(NavError::InvalidMerge(keep, other, "areas do not share a full edge"))?;

        use crate::math::NavCornerType::*;
        let (nw_src, ne_src, se_src, sw_src) = match dir {
            NavDirType::North => (b, b, a, a),
            NavDirType::South => (a, a, b, b),
            NavDirType::West => (b, a, a, b),
            NavDirType::East => (a, b, b, a),
        };
        let nw = nw_src.corner(NorthWest);
        let ne_z = ne_src.corner(NorthEast).z;
        let se = se_src.corner(SouthEast);
        let sw_z = sw_src.corner(SouthWest).z;
        let nodes = [
            nw_src.node[NorthWest.index()],
            ne_src.node[NorthEast.index()],
            se_src.node[SouthEast.index()],
            sw_src.node[SouthWest.index()],
        ];

        let mut neighbors = self.neighbors_of(keep);
        neighbors.extend(self.neighbors_of(other));
        neighbors.remove(&keep);
        neighbors.remove(&other);

        let Some(b) = self.areas.remove(&other) else {
            return Err(NavError::UnknownArea(other));
        };
        self.grid.remove(other, &b.extent());
        for spot in &b.hiding_spots {
            self.spots.insert(spot.id, keep);
        }

        let a = self.areas.get_mut(&keep).ok_or(NavError::UnknownArea(keep))?;
        let old_extent = a.extent();
        a.set_corners(nw, ne_z, se, sw_z)?;
        a.node = nodes;
        a.disconnect(other);
        for (d, c) in b.all_connections() {
            if c.id != keep {
                a.connect_to(c.id, d, c.length);
            }
        }
        for d in [LadderDirType::Up, LadderDirType::Down] {
            for l in &b.ladder[d as usize] {
                if !a.ladder[d as usize].contains(l) {
                    a.ladder[d as usize].push(*l);
                }
            }
        }
        for e in &b.elevator_areas {
            if *e != keep && !a.elevator_areas.contains(e) {
                a.elevator_areas.push(*e);
            }
        }
        a.hiding_spots.extend(b.hiding_spots.iter().map(|s| HidingSpot { area: keep, ..*s }));
        let new_extent = a.extent();
        self.grid.remove(keep, &old_extent);
        self.grid.insert(keep, &new_extent);

        for n in &neighbors {
            if let Some(area) = self.areas.get_mut(n) {
                for list in area.incoming_connect.iter_mut() {
                    list.retain(|c| c.id != other);
                }
                for dir in NavDirType::ALL {
                    let list = &mut area.connect[dir.index()];
                    if list.iter().any(|c| c.id == other) {
                        list.retain(|c| c.id != other);
                        if !list.iter().any(|c| c.id == keep) {
                            list.push(NavConnect { id: keep, length: 0.0 });
                        }
                    }
                }
            }
        }
        for area in self.areas.values_mut() {
            area.elevator_areas.retain(|e| *e != other);
            redirect_visibility(area, other, keep);
            area.spot_encounters.retain(|e| e.from != other && e.to != other);
        }
        for ladder in self.ladders.values_mut() {
            for slot in [
                &mut ladder.top_forward_area,
                &mut ladder.top_left_area,
                &mut ladder.top_right_area,
                &mut ladder.top_behind_area,
                &mut ladder.bottom_area,
            ] {
                if *slot == Some(other) {
                    *slot = Some(keep);
                }
            }
        }

        self.update_connection_lengths(keep);
        for n in neighbors {
            self.refresh_incoming_pair(keep, n);
        }
        trace!("Merged area #{} into #{}", other, keep);
        Ok(())
    }

    /// Split an area in two. With `along_x` the cut is the line `y = edge`
    /// and the pieces are (north, south); otherwise the cut is `x = edge` and
    /// the pieces are (west, east). The original area is destroyed.
    pub fn split_area(&mut self, id: AreaId, along_x: bool, edge: f32) -> NavResult<(AreaId, AreaId)> {
        let orig = self.try_area(id)?.clone();
        let nw = orig.corner(crate::math::NavCornerType::NorthWest);
        let ne = orig.corner(crate::math::NavCornerType::NorthEast);
        let se = orig.corner(crate::math::NavCornerType::SouthEast);
        let sw = orig.corner(crate::math::NavCornerType::SouthWest);

        let ((a_nw, a_ne, a_se, a_sw), (b_nw, b_ne, b_se, b_sw)) = if along_x {
            if !(edge > nw.y && edge < se.y) {
                return Err(NavError::InvalidSplit(id, "split edge outside area"));
            }
            let w = Vec3::new(nw.x, edge, orig.z_at(nw.x, edge));
            let e = Vec3::new(se.x, edge, orig.z_at(se.x, edge));
            ((nw, ne, e, w), (w, e, se, sw))
        } else {
            if !(edge > nw.x && edge < se.x) {
                return Err(NavError::InvalidSplit(id, "split edge outside area"));
            }
            let n = Vec3::new(edge, nw.y, orig.z_at(edge, nw.y));
            let s = Vec3::new(edge, se.y, orig.z_at(edge, se.y));
            ((nw, n, s, sw), (n, ne, se, s))
        };

        let alpha = self.create_area(a_nw, a_ne, a_se, a_sw)?;
        let beta = self.create_area(b_nw, b_ne, b_se, b_sw)?;
        let pieces = [alpha, beta];

        for piece in pieces {
            if let Some(area) = self.areas.get_mut(&piece) {
                area.attributes = orig.attributes;
                area.place = orig.place;
                area.blocked = orig.blocked;
                area.earliest_occupy_time = orig.earliest_occupy_time;
                area.light_intensity = orig.light_intensity;
                area.elevator_areas = orig.elevator_areas.clone();
                area.potentially_visible = orig.potentially_visible.clone();
                area.inherit_visibility_from = orig.inherit_visibility_from;
            }
        }

        // Outgoing links go to the pieces that still face the same way
        for (dir, c) in orig.all_connections() {
            if c.id == id {
                continue;
            }
            let Some(target) = self.areas.get(&c.id) else { continue };
            let adjacent = orig.edge_overlap(target, dir, EDGE_TOLERANCE).is_some();
            let mut sources = Vec::new();
            for piece in pieces {
                let Some(p) = self.areas.get(&piece) else { continue };
                if faces_same_side(p, &orig, dir)
                    && (!adjacent || p.edge_overlap(target, dir, EDGE_TOLERANCE).is_some())
                {
                    sources.push(piece);
                }
            }
            for piece in sources {
                self.connect_areas(piece, c.id, dir)?;
            }
        }

        // Links into the original are rewired to the pieces they touch
        for n in self.neighbors_of(id) {
            let incoming = self.links(n, id);
            for (dir, _) in incoming {
                let Some(source) = self.areas.get(&n) else { continue };
                let adjacent = source.edge_overlap(&orig, dir, EDGE_TOLERANCE).is_some();
                let mut targets = Vec::new();
                for piece in pieces {
                    let Some(p) = self.areas.get(&piece) else { continue };
                    if faces_same_side(p, &orig, dir.opposite())
                        && (!adjacent || source.edge_overlap(p, dir, EDGE_TOLERANCE).is_some())
                    {
                        targets.push(piece);
                    }
                }
                for piece in targets {
                    self.connect_areas(n, piece, dir)?;
                }
            }
        }

        let split_dir = if along_x { NavDirType::South } else { NavDirType::East };
        self.connect_areas(alpha, beta, split_dir)?;
        self.connect_areas(beta, alpha, split_dir.opposite())?;

        // Ladders, hiding spots and visibility follow the geometry
        let ladder_ids: Vec<LadderId> = self
            .ladders
            .values()
            .filter(|l| l.is_connected_to(id))
            .map(|l| l.id)
            .collect();
        for lid in ladder_ids {
            let Some(ladder) = self.ladders.get(&lid).cloned() else { continue };
            let bottom_piece = self.closest_piece(&pieces, ladder.bottom);
            let top_piece = self.closest_piece(&pieces, ladder.top);
            if let Some(l) = self.ladders.get_mut(&lid) {
                for (slot, piece) in [
                    (&mut l.top_forward_area, top_piece),
                    (&mut l.top_left_area, top_piece),
                    (&mut l.top_right_area, top_piece),
                    (&mut l.top_behind_area, top_piece),
                    (&mut l.bottom_area, bottom_piece),
                ] {
                    if *slot == Some(id) {
                        *slot = Some(piece);
                    }
                }
            }
            if ladder.bottom_area == Some(id) {
                self.add_ladder_to_area(bottom_piece, lid, LadderDirType::Up);
            }
            let tops = [
                ladder.top_forward_area,
                ladder.top_left_area,
                ladder.top_right_area,
                ladder.top_behind_area,
            ];
            if tops.contains(&Some(id)) {
                self.add_ladder_to_area(top_piece, lid, LadderDirType::Down);
            }
        }
        if let Some(area) = self.areas.get_mut(&id) {
            area.hiding_spots.clear();
        }
        for spot in &orig.hiding_spots {
            let piece = self.closest_piece(&pieces, spot.pos);
            self.spots.insert(spot.id, piece);
            if let Some(area) = self.areas.get_mut(&piece) {
                area.hiding_spots.push(HidingSpot { area: piece, ..*spot });
            }
        }
        for area in self.areas.values_mut() {
            if area.id() == alpha || area.id() == beta {
                continue;
            }
            if let Some(bind) = area.potentially_visible.iter().find(|v| v.id == id).copied() {
                area.potentially_visible.retain(|v| v.id != id);
                area.potentially_visible.push(AreaBindInfo { id: alpha, ..bind });
                area.potentially_visible.push(AreaBindInfo { id: beta, ..bind });
            }
            for e in area.elevator_areas.iter_mut() {
                if *e == id {
                    *e = alpha;
                }
            }
        }

        self.destroy_area(id)?;
        debug!("Split area #{} into #{} and #{}", id, alpha, beta);
        Ok((alpha, beta))
    }

    fn closest_piece(&self, pieces: &[AreaId; 2], pos: Vec3) -> AreaId {
        let dist = |id: &AreaId| {
            self.areas
                .get(id)
                .map(|a| a.closest_point(pos).distance_squared(pos))
                .unwrap_or(f32::MAX)
        };
        if dist(&pieces[1]) < dist(&pieces[0]) { pieces[1] } else { pieces[0] }
    }

    // ---- Spatial queries ----

    /// Highest area under `pos` whose floor is no more than `beneath_limit` below it
    pub fn get_nav_area(&self, pos: Vec3, beneath_limit: f32) -> Option<AreaId> {
        let test_z = pos.z + AREA_QUERY_SLACK;
        let mut best: Option<(AreaId, f32)> = None;
        for &id in self.grid.candidates(pos) {
            let Some(area) = self.areas.get(&id) else { continue };
            if !area.is_overlapping_xy(pos, 0.0) {
                continue;
            }
            let z = area.z(pos);
            if z > test_z || z < pos.z - beneath_limit {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_id, best_z)) => z > best_z || (z == best_z && id < best_id),
            };
            if better {
                best = Some((id, z));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Area closest to `pos`. Unless `any_z` is set, areas whose nearest
    /// point is higher than a step above `pos` are ignored.
    pub fn get_nearest_nav_area(&self, pos: Vec3, any_z: bool, max_dist: Option<f32>) -> Option<AreaId> {
        if let Some(id) = self.get_nav_area(pos, HUMAN_HEIGHT) {
            return Some(id);
        }
        let limit = max_dist.map(|d| d * d).unwrap_or(f32::INFINITY);
        let mut best: Option<(AreaId, f32)> = None;
        for (id, area) in &self.areas {
            let p = area.closest_point(pos);
            if !any_z && p.z > pos.z + STEP_HEIGHT {
                continue;
            }
            let d = p.distance_squared(pos);
            if d <= limit && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((*id, d));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Walk from `start` toward `dir` one step at a time until an area is found
    /// under the walker, or a wall or `range` stops the walk. Returns the area
    /// and the closest point on it.
    pub fn find_first_area_in_direction(
        &self,
        oracle: &dyn TraceOracle,
        start: Vec3,
        dir: NavDirType,
        range: f32,
        beneath_limit: f32,
        ignore: Option<AreaId>,
    ) -> Option<(AreaId, Vec3)> {
        let steps = (range / GENERATION_STEP_SIZE).ceil().max(1.0) as usize;
        let mut pos = start;
        for _ in 0..steps {
            let next = add_direction_to_vector(pos, dir, GENERATION_STEP_SIZE);
            if oracle.trace_line(pos, next, MASK_NAV_SOLID).did_hit() {
                break;
            }
            pos = next;
            if let Some(id) = self.get_nav_area(pos, beneath_limit) {
                if Some(id) != ignore {
                    let point = self.areas.get(&id)?.closest_point(pos);
                    return Some((id, point));
                }
            }
        }
        None
    }

    /// True if any area covers the map-plane position within `tolerance`
    pub fn is_overlapping_any_area(&self, pos: Vec3, tolerance: f32) -> bool {
        self.grid
            .candidates(pos)
            .iter()
            .filter_map(|id| self.areas.get(id))
            .any(|a| a.is_overlapping_xy(pos, tolerance))
    }

    /// Areas whose rectangle overlaps `extent` in the map plane
    pub(crate) fn areas_overlapping(&self, extent: &Extent) -> Vec<AreaId> {
        self.grid
            .candidates_in(extent)
            .into_iter()
            .filter(|id| self.areas.get(id).is_some_and(|a| a.extent().overlaps_xy(extent)))
            .collect()
    }

    // ---- Ladders ----

    pub fn create_ladder(&mut self, top: Vec3, bottom: Vec3, width: f32, dir: NavDirType) -> LadderId {
        let id = LadderId(self.next_ladder_id);
        self.next_ladder_id += 1;
        self.ladders.insert(id, NavLadder::new(id, top, bottom, width, dir));
        id
    }

    pub(crate) fn insert_ladder(&mut self, ladder: NavLadder) {
        self.next_ladder_id = self.next_ladder_id.max(ladder.id.0 + 1);
        self.ladders.insert(ladder.id, ladder);
    }

    pub fn destroy_ladder(&mut self, id: LadderId) -> NavResult<NavLadder> {
        let ladder = self.ladders.remove(&id).ok_or(NavError::UnknownLadder(id))?;
        self.detach_ladder(id);
        Ok(ladder)
    }

    fn detach_ladder(&mut self, id: LadderId) {
        for area in self.areas.values_mut() {
            for list in area.ladder.iter_mut() {
                list.retain(|l| *l != id);
            }
        }
    }

    fn add_ladder_to_area(&mut self, area: AreaId, ladder: LadderId, dir: LadderDirType) {
        if let Some(area) = self.areas.get_mut(&area) {
            let list = &mut area.ladder[dir as usize];
            if !list.contains(&ladder) {
                list.push(ladder);
            }
        }
    }

    /// Attach a ladder to the areas at its ends. The bottom area is the
    /// nearest area to the ladder's foot; the top areas are the first areas
    /// found stepping off the top forward, left, right and behind.
    pub fn connect_generated_ladder(&mut self, id: LadderId, oracle: &dyn TraceOracle) -> NavResult<()> {
        let mut ladder = self.ladders.get(&id).cloned().ok_or(NavError::UnknownLadder(id))?;
        self.detach_ladder(id);

        ladder.bottom_area = self.get_nearest_nav_area(ladder.bottom, false, None);
        ladder.is_dangling = false;
        if let Some(bottom) = ladder.bottom_area {
            let floor_z = self.try_area(bottom)?.z(ladder.bottom);
            if floor_z < ladder.bottom.z - HUMAN_HEIGHT {
                debug!(
                    "Ladder #{} is dangling {:.1} units above area #{}",
                    id,
                    ladder.bottom.z - floor_z,
                    bottom
                );
                ladder.is_dangling = true;
                ladder.bottom_area = None;
            }
        }

        let above = ladder.top + Vec3::Z * STEP_HEIGHT;
        let find = |dir: NavDirType, taken: &[Option<AreaId>]| {
            self.find_first_area_in_direction(
                oracle,
                above,
                dir,
                LADDER_TOP_SEARCH_RANGE,
                HUMAN_HEIGHT,
                ladder.bottom_area,
            )
            .map(|(a, _)| a)
            .filter(|a| !taken.contains(&Some(*a)))
        };
        let forward = find(ladder.dir, &[]);
        let left = find(ladder.dir.left(), &[forward]);
        let right = find(ladder.dir.right(), &[forward, left]);
        let behind = find(ladder.dir.opposite(), &[forward, left, right]);
        ladder.top_forward_area = forward;
        ladder.top_left_area = left;
        ladder.top_right_area = right;
        ladder.top_behind_area = behind;

        if let Some(bottom) = ladder.bottom_area {
            self.add_ladder_to_area(bottom, id, LadderDirType::Up);
        }
        for top in [forward, left, right, behind].into_iter().flatten() {
            self.add_ladder_to_area(top, id, LadderDirType::Down);
        }
        self.ladders.insert(id, ladder);
        Ok(())
    }

    /// Connect every generated ladder
    pub fn connect_generated_ladders(&mut self, oracle: &dyn TraceOracle) -> NavResult<()> {
        let ids: Vec<LadderId> = self.ladders.keys().copied().collect();
        for id in ids {
            self.connect_generated_ladder(id, oracle)?;
        }
        Ok(())
    }

    // ---- Elevators, blocking, visibility ----

    /// Link the given areas as stops of one elevator. The links are
    /// transient and not saved.
    pub fn link_elevator(&mut self, stops: &[AreaId]) -> NavResult<()> {
        for id in stops {
            self.try_area(*id)?;
        }
        for id in stops {
            if let Some(area) = self.areas.get_mut(id) {
                area.attributes |= NavAttributes::HAS_ELEVATOR;
                for other in stops {
                    if other != id && !area.elevator_areas.contains(other) {
                        area.elevator_areas.push(*other);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn set_area_blocked(&mut self, id: AreaId, team: Option<usize>, blocked: bool) -> NavResult<()> {
        self.areas
            .get_mut(&id)
            .ok_or(NavError::UnknownArea(id))?
            .set_blocked(team, blocked);
        Ok(())
    }

    /// Visibility set of an area, following its inherit link once
    pub fn visible_set(&self, id: AreaId) -> &[AreaBindInfo] {
        let Some(area) = self.areas.get(&id) else { return &[] };
        if let Some(from) = area.inherit_visibility_from {
            if let Some(src) = self.areas.get(&from) {
                return &src.potentially_visible;
            }
        }
        &area.potentially_visible
    }

    /// An area that inherits its set sees the area it inherits from, which
    /// is not in that area's own list.
    pub fn is_potentially_visible(&self, from: AreaId, to: AreaId) -> bool {
        if from == to {
            return true;
        }
        let inherited = self.areas.get(&from).and_then(|a| a.inherit_visibility_from);
        if inherited == Some(to) {
            return true;
        }
        self.visible_set(from)
            .iter()
            .any(|v| v.id == to && v.attributes != 0)
    }

    // ---- Hiding spots ----

    pub fn add_hiding_spot(&mut self, area: AreaId, pos: Vec3, flags: HidingSpotFlags) -> NavResult<HidingSpotId> {
        let id = HidingSpotId(self.next_spot_id);
        let target = self.areas.get_mut(&area).ok_or(NavError::UnknownArea(area))?;
        self.next_spot_id += 1;
        target.hiding_spots.push(HidingSpot { id, pos, flags, area });
        self.spots.insert(id, area);
        Ok(id)
    }

    pub(crate) fn hiding_spot_mut(&mut self, id: HidingSpotId) -> Option<&mut HidingSpot> {
        let area = *self.spots.get(&id)?;
        self.areas.get_mut(&area)?.hiding_spots.iter_mut().find(|s| s.id == id)
    }

    pub(crate) fn clear_hiding_spots(&mut self) {
        for area in self.areas.values_mut() {
            area.hiding_spots.clear();
        }
        self.spots.clear();
    }
}

fn faces_same_side(piece: &NavArea, orig: &NavArea, dir: NavDirType) -> bool {
    use crate::math::NavCornerType::*;
    let (p_nw, p_se) = (piece.corner(NorthWest), piece.corner(SouthEast));
    let (o_nw, o_se) = (orig.corner(NorthWest), orig.corner(SouthEast));
    match dir {
        NavDirType::North => p_nw.y == o_nw.y,
        NavDirType::South => p_se.y == o_se.y,
        NavDirType::West => p_nw.x == o_nw.x,
        NavDirType::East => p_se.x == o_se.x,
    }
}

fn redirect_visibility(area: &mut NavArea, from: AreaId, to: AreaId) {
    if let Some(pos) = area.potentially_visible.iter().position(|v| v.id == from) {
        let bind = area.potentially_visible.remove(pos);
        if area.id() != to && !area.potentially_visible.iter().any(|v| v.id == to) {
            area.potentially_visible.push(AreaBindInfo { id: to, ..bind });
        }
    }
    if area.inherit_visibility_from == Some(from) {
        area.inherit_visibility_from = if area.id() == to { None } else { Some(to) };
    }
}
