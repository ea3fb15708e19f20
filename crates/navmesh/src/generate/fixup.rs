// Post-build passes over freshly generated areas: attribute marking,
// merging, splitting, stair detection, jump-area removal, obstacle tops and
// connection cleanup.
//
// Every pass only touches areas created by the current run; `existing` is the
// sorted list of IDs that were in the mesh before it started.

use std::collections::VecDeque;

use glam::Vec3;
use tracing::{debug, trace};

use crate::area::{AreaId, NavArea, NavAttributes};
use crate::config::NavConfig;
use crate::error::NavResult;
use crate::math::{
    GENERATION_STEP_SIZE, HALF_HUMAN_WIDTH, HUMAN_HEIGHT, MIN_OBSTACLE_AREA_WIDTH, NavDirType,
    OFF_PLANE_TOLERANCE, STEP_HEIGHT, snap_to_grid,
};
use crate::mesh::NavMesh;
use crate::trace::{MASK_NAV_SOLID, TraceMask, TraceOracle};

/// Longest side over shortest side before an area is cut in half
const MAX_ASPECT_RATIO: f32 = 3.0;

/// Spacing of ground samples when looking for stairs
const STAIR_SAMPLE_STEP: f32 = 5.0;
/// Smallest height change that counts as a stair step
const MIN_STAIR_STEP: f32 = 2.0;
/// Stair treads are level
const STAIR_TREAD_NORMAL_Z: f32 = 0.97;

/// Edge contact shorter than this is a corner touch
const MIN_PORTAL_WIDTH: f32 = 1.0;
const EDGE_TOLERANCE: f32 = 0.5;

fn is_generated(existing: &[AreaId], id: AreaId) -> bool {
    existing.binary_search(&id).is_err()
}

fn generated_ids(mesh: &NavMesh, existing: &[AreaId]) -> Vec<AreaId> {
    mesh.area_ids().into_iter().filter(|id| is_generated(existing, *id)).collect()
}

// ============================================================================
// Attributes
// ============================================================================

/// Flag areas whose center is inside a player clip brush
pub(super) fn mark_player_clip_areas(mesh: &mut NavMesh, oracle: &dyn TraceOracle, existing: &[AreaId]) {
    let mins = Vec3::new(-HALF_HUMAN_WIDTH, -HALF_HUMAN_WIDTH, STEP_HEIGHT);
    let maxs = Vec3::new(HALF_HUMAN_WIDTH, HALF_HUMAN_WIDTH, HUMAN_HEIGHT);
    for id in generated_ids(mesh, existing) {
        let Some(area) = mesh.area_mut(id) else { continue };
        let center = area.center();
        if oracle.trace_hull(center, center, mins, maxs, TraceMask::PLAYER_CLIP).start_solid {
            area.attributes |= NavAttributes::PLAYERCLIP;
            trace!("Area #{} is inside player clip", id);
        }
    }
}

/// Flag areas too steep or too twisted to walk
pub(super) fn mark_jump_areas(mesh: &mut NavMesh, config: &NavConfig, existing: &[AreaId]) {
    for id in generated_ids(mesh, existing) {
        let Some(area) = mesh.area_mut(id) else { continue };
        let (n1, n2) = area.triangle_normals();
        if n1.z.min(n2.z) < config.nav_slope_limit || (n1.z - n2.z).abs() > config.nav_slope_tolerance {
            area.attributes |= NavAttributes::JUMP;
        }
    }
}

// ============================================================================
// Merging
// ============================================================================

/// Can `a` absorb its neighbor `b` on side `dir`
fn can_merge(a: &NavArea, b: &NavArea, dir: NavDirType, max_size: f32) -> bool {
    if a.attributes != b.attributes || a.has_attributes(NavAttributes::NO_MERGE) {
        return false;
    }
    let [a_nw, a_ne, a_se, a_sw] = a.node;
    let [b_nw, b_ne, b_se, b_sw] = b.node;
    let shared = match dir {
        NavDirType::North => (a_nw, a_ne) == (b_sw, b_se),
        NavDirType::South => (a_sw, a_se) == (b_nw, b_ne),
        NavDirType::West => (a_nw, a_sw) == (b_ne, b_se),
        NavDirType::East => (a_ne, a_se) == (b_nw, b_sw),
    };
    if !shared || a.node.iter().chain(b.node.iter()).any(Option::is_none) {
        return false;
    }
    let combined = if dir.is_x_axis() {
        a.size_x() + b.size_x()
    } else {
        a.size_y() + b.size_y()
    };
    combined <= max_size && a.is_coplanar(b, OFF_PLANE_TOLERANCE)
}

/// Merge neighboring areas until nothing more can merge. Returns the number
/// of merges.
pub(super) fn merge_generated_areas(mesh: &mut NavMesh, config: &NavConfig, existing: &[AreaId]) -> NavResult<usize> {
    let max_size = config.nav_area_max_size as f32 * GENERATION_STEP_SIZE;
    let mut merged = 0;
    loop {
        let mut changed = false;
        for id in generated_ids(mesh, existing) {
            let Some(area) = mesh.area(id) else { continue };
            let target = area.all_connections().find_map(|(dir, c)| {
                let other = mesh.area(c.id)?;
                (is_generated(existing, c.id) && can_merge(area, other, dir, max_size)).then_some(c.id)
            });
            if let Some(other) = target {
                mesh.merge_areas(id, other)?;
                merged += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(merged)
}

// ============================================================================
// Splitting
// ============================================================================

/// A connected area that hangs over part of `area`: returns the split to make
fn overhang_split(mesh: &NavMesh, area: &NavArea) -> Option<(bool, f32)> {
    let ext = area.extent();
    for (_, c) in area.all_connections() {
        let Some(other) = mesh.area(c.id) else { continue };
        let o = other.extent();
        if !ext.overlaps_xy(&o) {
            continue;
        }
        let mid = Vec3::new(
            (ext.lo.x.max(o.lo.x) + ext.hi.x.min(o.hi.x)) / 2.0,
            (ext.lo.y.max(o.lo.y) + ext.hi.y.min(o.hi.y)) / 2.0,
            0.0,
        );
        if other.z(mid) <= area.z(mid) {
            continue;
        }
        for x in [o.lo.x, o.hi.x] {
            if x > ext.lo.x && x < ext.hi.x {
                return Some((false, x));
            }
        }
        for y in [o.lo.y, o.hi.y] {
            if y > ext.lo.y && y < ext.hi.y {
                return Some((true, y));
            }
        }
    }
    None
}

/// Cut areas along the edges of connected areas that overhang them
pub(super) fn split_areas_under_overhangs(mesh: &mut NavMesh, existing: &[AreaId]) -> NavResult<usize> {
    let mut work: VecDeque<AreaId> = generated_ids(mesh, existing).into();
    let mut splits = 0;
    while let Some(id) = work.pop_front() {
        let Some(area) = mesh.area(id) else { continue };
        if let Some((along_x, edge)) = overhang_split(mesh, area) {
            let (a, b) = mesh.split_area(id, along_x, edge)?;
            work.push_back(a);
            work.push_back(b);
            splits += 1;
        }
    }
    if splits > 0 {
        debug!("Split {} areas under overhangs", splits);
    }
    Ok(splits)
}

/// Cut long thin areas in half until they are roughly square
pub(super) fn square_up_areas(mesh: &mut NavMesh, existing: &[AreaId]) -> NavResult<usize> {
    let mut work: VecDeque<AreaId> = generated_ids(mesh, existing).into();
    let mut splits = 0;
    while let Some(id) = work.pop_front() {
        let Some(area) = mesh.area(id) else { continue };
        let ext = area.extent();
        let (sx, sy) = (area.size_x(), area.size_y());
        let split = if sx > sy * MAX_ASPECT_RATIO {
            let x = snap_to_grid((ext.lo.x + ext.hi.x) / 2.0);
            (x > ext.lo.x && x < ext.hi.x).then_some((false, x))
        } else if sy > sx * MAX_ASPECT_RATIO {
            let y = snap_to_grid((ext.lo.y + ext.hi.y) / 2.0);
            (y > ext.lo.y && y < ext.hi.y).then_some((true, y))
        } else {
            None
        };
        if let Some((along_x, edge)) = split {
            let (a, b) = mesh.split_area(id, along_x, edge)?;
            work.push_back(a);
            work.push_back(b);
            splits += 1;
        }
    }
    Ok(splits)
}

// ============================================================================
// Stairs
// ============================================================================

/// Count monotonic stair steps in a run of (height, normal z) ground samples
fn count_steps(samples: &[(f32, f32)]) -> usize {
    let mut steps = 0;
    let mut sign = 0.0_f32;
    for pair in samples.windows(2) {
        let ((h0, n0), (h1, n1)) = (pair[0], pair[1]);
        let dh = h1 - h0;
        if dh.abs() <= MIN_STAIR_STEP {
            continue;
        }
        if dh.abs() > STEP_HEIGHT || n0 < STAIR_TREAD_NORMAL_Z || n1 < STAIR_TREAD_NORMAL_Z {
            return 0;
        }
        if sign != 0.0 && dh.signum() != sign {
            return 0;
        }
        sign = dh.signum();
        steps += 1;
    }
    steps
}

fn is_stairway(area: &NavArea, oracle: &dyn TraceOracle) -> bool {
    let ext = area.extent();
    let center = area.center();
    let ground_at = |x: f32, y: f32| {
        let z = area.z_at(x, y);
        let tr = oracle.trace_line(
            Vec3::new(x, y, z + HUMAN_HEIGHT),
            Vec3::new(x, y, z - HUMAN_HEIGHT),
            MASK_NAV_SOLID,
        );
        (tr.did_hit() && !tr.start_solid).then_some((tr.end_pos.z, tr.normal.z))
    };

    let along_x: Vec<_> = sample_range(ext.lo.x, ext.hi.x).filter_map(|x| ground_at(x, center.y)).collect();
    let along_y: Vec<_> = sample_range(ext.lo.y, ext.hi.y).filter_map(|y| ground_at(center.x, y)).collect();
    count_steps(&along_x) >= 2 || count_steps(&along_y) >= 2
}

fn sample_range(lo: f32, hi: f32) -> impl Iterator<Item = f32> {
    let count = ((hi - lo) / STAIR_SAMPLE_STEP).floor() as usize;
    (0..=count).map(move |i| lo + i as f32 * STAIR_SAMPLE_STEP)
}

/// Flag areas whose floor is a flight of stairs
pub(super) fn mark_stair_areas(mesh: &mut NavMesh, oracle: &dyn TraceOracle, existing: &[AreaId]) {
    for id in generated_ids(mesh, existing) {
        let Some(area) = mesh.area(id) else { continue };
        if area.has_attributes(NavAttributes::JUMP) || !is_stairway(area, oracle) {
            continue;
        }
        if let Some(area) = mesh.area_mut(id) {
            area.attributes |= NavAttributes::STAIRS;
            trace!("Area #{} is a stairway", id);
        }
    }
}

// ============================================================================
// Jump areas
// ============================================================================

/// Replace each JUMP area by direct links from the areas that enter it to
/// the areas it leads to. Returns how many were removed.
pub(super) fn remove_jump_areas(mesh: &mut NavMesh, existing: &[AreaId]) -> NavResult<usize> {
    let mut removed = 0;
    for id in generated_ids(mesh, existing) {
        let Some(jump) = mesh.area(id) else { continue };
        if !jump.has_attributes(NavAttributes::JUMP) {
            continue;
        }

        let incoming: Vec<(AreaId, NavDirType)> = mesh
            .areas()
            .flat_map(|a| {
                a.all_connections()
                    .filter(|(_, c)| c.id == id)
                    .map(move |(d, _)| (a.id(), d))
            })
            .collect();
        let outgoing: Vec<(NavDirType, AreaId)> = jump.all_connections().map(|(d, c)| (d, c.id)).collect();

        let mut links = Vec::new();
        for &(from, d1) in &incoming {
            for &(d2, to) in &outgoing {
                if to != from && d2 != d1.opposite() {
                    links.push((from, to, d1));
                }
            }
        }
        for (from, to, dir) in links {
            mesh.connect_areas(from, to, dir)?;
        }
        mesh.destroy_area(id)?;
        removed += 1;
    }
    Ok(removed)
}

// ============================================================================
// Obstacle tops
// ============================================================================

/// Widen the obstacle span `[start, end]` inside a cell of width `max` so the
/// walkable top is at least `MIN_OBSTACLE_AREA_WIDTH` wide and no side piece
/// is thinner than one unit.
pub fn adjust_obstacle_distances(start: f32, end: f32, max: f32) -> (f32, f32) {
    let min_width = MIN_OBSTACLE_AREA_WIDTH.min(max);
    let (mut start, mut end) = (start.clamp(0.0, max), end.clamp(0.0, max));
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }

    let width = end - start;
    if width < min_width {
        let grow = (min_width - width) / 2.0;
        start -= grow;
        end += grow;
    }
    if start < 0.0 {
        end -= start;
        start = 0.0;
    }
    if end > max {
        start -= end - max;
        end = max;
    }
    let mut start = start.max(0.0);
    let mut end = end;

    if start < 1.0 {
        start = 0.0;
    }
    if max - end < 1.0 {
        end = max;
    }
    (start, end)
}

/// Lift areas that straddle a fence onto the fence top, splitting off the
/// floor on either side when the fence is thin
pub(super) fn handle_obstacle_top_areas(mesh: &mut NavMesh, existing: &[AreaId]) -> NavResult<usize> {
    let mut tops = Vec::new();
    for id in generated_ids(mesh, existing) {
        let Some(area) = mesh.area(id) else { continue };
        let Some(obstacle) = area.obstacle else { continue };

        let along_x = obstacle.dir.is_x_axis();
        let (origin, size) = if along_x {
            (area.extent().lo.x, area.size_x())
        } else {
            (area.extent().lo.y, area.size_y())
        };

        if obstacle.end - obstacle.start >= GENERATION_STEP_SIZE - MIN_OBSTACLE_AREA_WIDTH {
            mesh.offset_area_z(id, obstacle.height)?;
            tops.push(id);
            continue;
        }

        let (start, end) = adjust_obstacle_distances(obstacle.start, obstacle.end, size);
        // A split along x cuts at `y = edge`, so an East crossing cuts with along_x false
        let mut top = id;
        if start > 0.0 {
            let (_, rest) = mesh.split_area(top, !along_x, origin + start)?;
            top = rest;
        }
        if end < size {
            let (piece, _) = mesh.split_area(top, !along_x, origin + end)?;
            top = piece;
        }
        mesh.offset_area_z(top, obstacle.height)?;
        tops.push(top);
    }

    for id in &tops {
        if let Some(area) = mesh.area_mut(*id) {
            area.attributes |= NavAttributes::OBSTACLE_TOP;
            area.attributes.remove(NavAttributes::NO_MERGE);
            area.obstacle = None;
        }
    }

    // Crossing fences produce overlapping tops; the oldest one wins
    tops.sort_unstable();
    let mut removed = Vec::new();
    for (i, a) in tops.iter().enumerate() {
        if removed.contains(a) {
            continue;
        }
        for b in &tops[i + 1..] {
            if removed.contains(b) {
                continue;
            }
            let (Some(area_a), Some(area_b)) = (mesh.area(*a), mesh.area(*b)) else { continue };
            if area_a.is_overlapping_area(area_b) {
                removed.push(*b);
            }
        }
    }
    for id in &removed {
        mesh.destroy_area(*id)?;
    }
    debug!("Created {} obstacle top areas", tops.len() - removed.len());
    Ok(tops.len() - removed.len())
}

// ============================================================================
// Connection cleanup
// ============================================================================

/// Drop links that cannot be walked: big height changes onto stairs,
/// corner-only contacts, and one-way shortcuts that an intermediate area
/// already covers.
pub(super) fn fixup_connections(mesh: &mut NavMesh, existing: &[AreaId]) -> NavResult<usize> {
    let mut doomed: Vec<(AreaId, AreaId)> = Vec::new();

    for id in generated_ids(mesh, existing) {
        let Some(area) = mesh.area(id) else { continue };
        for (dir, c) in area.all_connections() {
            let Some(other) = mesh.area(c.id) else { continue };

            if area.has_attributes(NavAttributes::STAIRS) || other.has_attributes(NavAttributes::STAIRS) {
                let (portal, _) = area.compute_portal(other, dir);
                if (area.z(portal) - other.z(portal)).abs() > STEP_HEIGHT {
                    doomed.push((id, c.id));
                    continue;
                }
            }

            let two_way = other.is_connected(id, None);
            if two_way
                && area
                    .edge_contact(other, dir, EDGE_TOLERANCE)
                    .is_some_and(|overlap| overlap < MIN_PORTAL_WIDTH)
            {
                doomed.push((id, c.id));
                doomed.push((c.id, id));
                continue;
            }

            if !two_way {
                let bypassed = area.connections(dir).iter().any(|mid| {
                    mid.id != c.id
                        && mesh.area(mid.id).is_some_and(|m| m.is_connected(c.id, Some(dir)))
                });
                if bypassed {
                    doomed.push((id, c.id));
                }
            }
        }
    }

    doomed.sort_unstable();
    doomed.dedup();
    for &(from, to) in &doomed {
        if mesh.area(from).is_some() {
            mesh.disconnect_areas(from, to)?;
        }
    }
    if !doomed.is_empty() {
        debug!("Removed {} unwalkable connections", doomed.len());
    }
    Ok(doomed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{BoxWorld, SolidKind};

    fn flat(mesh: &mut NavMesh, x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> AreaId {
        mesh.create_area(
            Vec3::new(x0, y0, z),
            Vec3::new(x1, y0, z),
            Vec3::new(x1, y1, z),
            Vec3::new(x0, y1, z),
        )
        .unwrap()
    }

    #[test]
    fn obstacle_distances_stay_inside_the_cell() {
        let max = GENERATION_STEP_SIZE;
        let mut start = 0.0;
        while start <= max {
            let mut end = start;
            while end <= max {
                let (s, e) = adjust_obstacle_distances(start, end, max);
                assert!(s >= 0.0 && e <= max, "({start}, {end}) -> ({s}, {e})");
                assert!(e - s >= MIN_OBSTACLE_AREA_WIDTH, "({start}, {end}) -> ({s}, {e})");
                assert!(s <= start && e >= end, "({start}, {end}) -> ({s}, {e})");
                assert!(s == 0.0 || s >= 1.0);
                assert!(e == max || max - e >= 1.0);
                end += 0.5;
            }
            start += 0.5;
        }
    }

    #[test]
    fn obstacle_distances_center_thin_fences() {
        assert_eq!(adjust_obstacle_distances(11.0, 13.0, 25.0), (7.0, 17.0));
        assert_eq!(adjust_obstacle_distances(0.5, 2.0, 25.0), (0.0, 10.0));
        assert_eq!(adjust_obstacle_distances(23.0, 24.5, 25.0), (15.0, 25.0));
    }

    #[test]
    fn merge_runs_to_a_fixed_point() {
        use crate::node::NodeId;
        let mut mesh = NavMesh::new();
        // 3x1 strip of generated cells sharing corner nodes
        let ids: Vec<AreaId> = (0..3)
            .map(|i| flat(&mut mesh, i as f32 * 25.0, 0.0, (i + 1) as f32 * 25.0, 25.0, 0.0))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            let n = i as u32;
            mesh.area_mut(*id).unwrap().node =
                [Some(NodeId(n)), Some(NodeId(n + 1)), Some(NodeId(n + 11)), Some(NodeId(n + 10))];
        }
        for pair in ids.windows(2) {
            mesh.connect_areas(pair[0], pair[1], NavDirType::East).unwrap();
            mesh.connect_areas(pair[1], pair[0], NavDirType::West).unwrap();
        }

        let config = NavConfig::default();
        assert_eq!(merge_generated_areas(&mut mesh, &config, &[]).unwrap(), 2);
        assert_eq!(mesh.area_count(), 1);
        assert_eq!(mesh.areas().next().unwrap().size_x(), 75.0);
        assert_eq!(merge_generated_areas(&mut mesh, &config, &[]).unwrap(), 0);
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn merge_respects_attributes_and_existing() {
        use crate::node::NodeId;
        let mut mesh = NavMesh::new();
        let a = flat(&mut mesh, 0.0, 0.0, 25.0, 25.0, 0.0);
        let b = flat(&mut mesh, 25.0, 0.0, 50.0, 25.0, 0.0);
        mesh.area_mut(a).unwrap().node = [Some(NodeId(0)), Some(NodeId(1)), Some(NodeId(3)), Some(NodeId(2))];
        mesh.area_mut(b).unwrap().node = [Some(NodeId(1)), Some(NodeId(4)), Some(NodeId(5)), Some(NodeId(3))];
        mesh.connect_areas(a, b, NavDirType::East).unwrap();
        mesh.area_mut(b).unwrap().attributes = NavAttributes::CROUCH;

        let config = NavConfig::default();
        assert_eq!(merge_generated_areas(&mut mesh, &config, &[]).unwrap(), 0);
        mesh.area_mut(b).unwrap().attributes = NavAttributes::empty();
        assert_eq!(merge_generated_areas(&mut mesh, &config, &[b]).unwrap(), 0);
        assert_eq!(merge_generated_areas(&mut mesh, &config, &[]).unwrap(), 1);
    }

    #[test]
    fn long_areas_are_squared_up() {
        let mut mesh = NavMesh::new();
        flat(&mut mesh, 0.0, 0.0, 400.0, 50.0, 0.0);
        square_up_areas(&mut mesh, &[]).unwrap();
        assert!(mesh.area_count() > 1);
        let mut total = 0.0;
        for area in mesh.areas() {
            assert!(area.size_x() <= area.size_y() * MAX_ASPECT_RATIO);
            total += area.size_x() * area.size_y();
        }
        assert_eq!(total, 400.0 * 50.0);
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn overhang_splits_lower_area() {
        let mut mesh = NavMesh::new();
        let low = flat(&mut mesh, 0.0, 0.0, 200.0, 100.0, 0.0);
        let high = flat(&mut mesh, 100.0, 0.0, 300.0, 100.0, 150.0);
        mesh.connect_areas(low, high, NavDirType::East).unwrap();
        assert_eq!(split_areas_under_overhangs(&mut mesh, &[]).unwrap(), 1);
        assert!(mesh.area(low).is_none());
        let lows: Vec<_> = mesh.areas().filter(|a| a.center().z == 0.0).collect();
        assert_eq!(lows.len(), 2);
        assert!(lows.iter().any(|a| a.extent().hi.x == 100.0));
    }

    #[test]
    fn jump_area_is_bridged() {
        let mut mesh = NavMesh::new();
        let high = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0, 100.0);
        let jump = mesh
            .create_area(
                Vec3::new(100.0, 0.0, 100.0),
                Vec3::new(125.0, 0.0, 0.0),
                Vec3::new(125.0, 100.0, 0.0),
                Vec3::new(100.0, 100.0, 100.0),
            )
            .unwrap();
        let low = flat(&mut mesh, 125.0, 0.0, 225.0, 100.0, 0.0);
        mesh.connect_areas(high, jump, NavDirType::East).unwrap();
        mesh.connect_areas(jump, high, NavDirType::West).unwrap();
        mesh.connect_areas(jump, low, NavDirType::East).unwrap();
        mark_jump_areas(&mut mesh, &NavConfig::default(), &[high, low]);
        assert!(mesh.area(jump).unwrap().has_attributes(NavAttributes::JUMP));

        assert_eq!(remove_jump_areas(&mut mesh, &[]).unwrap(), 1);
        assert!(mesh.area(jump).is_none());
        assert!(mesh.area(high).unwrap().is_connected(low, Some(NavDirType::East)));
        assert!(!mesh.area(low).unwrap().is_connected(high, None));
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn stairs_are_detected() {
        // Eight steps of 8 units, 12 deep
        let mut world = BoxWorld::new().with_box(Vec3::new(-50.0, -50.0, -8.0), Vec3::new(0.0, 50.0, 0.0));
        for i in 0..8 {
            let x = i as f32 * 12.0;
            world = world.with_box(Vec3::new(x, -50.0, -8.0), Vec3::new(x + 12.0, 50.0, (i + 1) as f32 * 8.0));
        }
        let mut mesh = NavMesh::new();
        let stairs = mesh
            .create_area(
                Vec3::new(0.0, -50.0, 4.0),
                Vec3::new(96.0, -50.0, 64.0),
                Vec3::new(96.0, 50.0, 64.0),
                Vec3::new(0.0, 50.0, 4.0),
            )
            .unwrap();
        let floor = flat(&mut mesh, -50.0, -50.0, 0.0, 50.0, 0.0);
        mark_stair_areas(&mut mesh, &world, &[]);
        assert!(mesh.area(stairs).unwrap().has_attributes(NavAttributes::STAIRS));
        assert!(!mesh.area(floor).unwrap().has_attributes(NavAttributes::STAIRS));
    }

    #[test]
    fn player_clip_is_flagged() {
        let world = BoxWorld::new().with_solid(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(100.0, 100.0, 200.0),
            SolidKind::PlayerClip,
        );
        let mut mesh = NavMesh::new();
        let inside = flat(&mut mesh, 25.0, 25.0, 75.0, 75.0, 0.0);
        let outside = flat(&mut mesh, 200.0, 200.0, 250.0, 250.0, 0.0);
        mark_player_clip_areas(&mut mesh, &world, &[]);
        assert!(mesh.area(inside).unwrap().has_attributes(NavAttributes::PLAYERCLIP));
        assert!(!mesh.area(outside).unwrap().has_attributes(NavAttributes::PLAYERCLIP));
    }

    #[test]
    fn corner_contacts_are_dropped() {
        let mut mesh = NavMesh::new();
        let a = flat(&mut mesh, 0.0, 0.0, 50.0, 50.0, 0.0);
        let b = flat(&mut mesh, 50.0, 50.0, 100.0, 100.0, 0.0);
        let c = flat(&mut mesh, 50.0, 0.0, 100.0, 50.0, 0.0);
        mesh.connect_areas(a, b, NavDirType::East).unwrap();
        mesh.connect_areas(b, a, NavDirType::West).unwrap();
        mesh.connect_areas(a, c, NavDirType::East).unwrap();
        mesh.connect_areas(c, a, NavDirType::West).unwrap();
        fixup_connections(&mut mesh, &[]).unwrap();
        assert!(!mesh.area(a).unwrap().is_connected(b, None));
        assert!(!mesh.area(b).unwrap().is_connected(a, None));
        assert!(mesh.area(a).unwrap().is_connected(c, None));
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn fence_cell_is_lifted() {
        use crate::area::AreaObstacle;
        let mut mesh = NavMesh::new();
        let west = flat(&mut mesh, -25.0, 0.0, 0.0, 25.0, 0.0);
        let cell = flat(&mut mesh, 0.0, 0.0, 25.0, 25.0, 0.0);
        let east = flat(&mut mesh, 25.0, 0.0, 50.0, 25.0, 0.0);
        for (a, b) in [(west, cell), (cell, east)] {
            mesh.connect_areas(a, b, NavDirType::East).unwrap();
            mesh.connect_areas(b, a, NavDirType::West).unwrap();
        }
        mesh.area_mut(cell).unwrap().obstacle =
            Some(AreaObstacle { dir: NavDirType::East, start: 11.0, end: 13.0, height: 30.0 });

        assert_eq!(handle_obstacle_top_areas(&mut mesh, &[west, east]).unwrap(), 1);
        let top = mesh.areas().find(|a| a.has_attributes(NavAttributes::OBSTACLE_TOP)).unwrap();
        assert_eq!(top.center().z, 30.0);
        assert_eq!((top.extent().lo.x, top.extent().hi.x), (7.0, 17.0));
        assert_eq!(mesh.area_count(), 5);
        assert!(mesh.validate_connections().is_empty());
    }
}
