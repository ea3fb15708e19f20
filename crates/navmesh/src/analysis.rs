// Tactical analysis run after the areas are built: hiding spots, encounter
// spots, sniper spots, potentially visible sets, earliest occupy times and
// light levels.
//
// Each per-area pass takes one area ID so the generator can spread the work
// over several time slices.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use glam::Vec3;
use tracing::{debug, trace};

use crate::area::{
    AreaBindInfo, AreaId, COMPLETELY_VISIBLE, HidingSpot, HidingSpotFlags, NavArea, NavAttributes,
    POTENTIALLY_VISIBLE, SpotEncounter, SpotOrder,
};
use crate::error::NavResult;
use crate::generate::WalkableSeed;
use crate::math::{
    GENERATION_STEP_SIZE, HALF_HUMAN_HEIGHT, HALF_HUMAN_WIDTH, HUMAN_CROUCH_EYE_HEIGHT, HUMAN_EYE_HEIGHT,
    MAX_NAV_TEAMS, NavCornerType, RUN_SPEED, STEP_HEIGHT,
};
use crate::mesh::NavMesh;
use crate::trace::{MASK_NAV_SOLID, TraceOracle};

/// How far a wall may be from a spot and still give cover
const COVER_CHECK_RANGE: f32 = 100.0;
/// Radial cover rays around a candidate spot
const COVER_RAYS: usize = 8;
/// Rays that must hit a wall for the spot to count as covered
const MIN_COVER_RAYS: usize = 4;
/// Candidate spots closer than this to an accepted one are dropped
const MIN_SPOT_SPACING: f32 = 2.0 * HALF_HUMAN_WIDTH;

/// Spot orders are persisted as one byte per entry
const MAX_ENCOUNTER_SPOTS: usize = u8::MAX as usize;

/// Sniper spots see at least this many multiples of the sniper range
const IDEAL_SNIPER_FACTOR: f32 = 2.0;

// ---- Hiding spots ----

/// Corners of `area` pulled toward its center by up to `inset`
fn inset_corners(area: &NavArea, inset: f32) -> [Vec3; 4] {
    let ext = area.extent();
    let dx = inset.min(area.size_x() / 2.0);
    let dy = inset.min(area.size_y() / 2.0);
    [
        (ext.lo.x + dx, ext.lo.y + dy),
        (ext.hi.x - dx, ext.lo.y + dy),
        (ext.hi.x - dx, ext.hi.y - dy),
        (ext.lo.x + dx, ext.hi.y - dy),
    ]
    .map(|(x, y)| Vec3::new(x, y, area.z_at(x, y)))
}

/// Number of radial rays from `pos` that hit a wall within cover range
fn cover_count(oracle: &dyn TraceOracle, pos: Vec3) -> Option<usize> {
    let eye = pos + Vec3::Z * HUMAN_CROUCH_EYE_HEIGHT;
    if oracle.trace_line(pos + Vec3::Z * STEP_HEIGHT, eye, MASK_NAV_SOLID).did_hit() {
        return None;
    }
    let hits = (0..COVER_RAYS)
        .filter(|i| {
            let angle = *i as f32 * std::f32::consts::TAU / COVER_RAYS as f32;
            let dir = Vec3::new(angle.cos(), angle.sin(), 0.0);
            oracle
                .trace_line(eye, eye + dir * COVER_CHECK_RANGE, MASK_NAV_SOLID)
                .did_hit()
        })
        .count();
    Some(hits)
}

/// Add a hiding spot at every well-covered inset corner of an area
pub fn find_hiding_spots(mesh: &mut NavMesh, oracle: &dyn TraceOracle, id: AreaId) -> NavResult<()> {
    let area = mesh.try_area(id)?;
    if area.has_attributes(NavAttributes::DONT_HIDE) {
        return Ok(());
    }

    let mut accepted: Vec<Vec3> = Vec::new();
    for pos in inset_corners(area, HALF_HUMAN_WIDTH) {
        if accepted.iter().any(|p| p.distance(pos) < MIN_SPOT_SPACING) {
            continue;
        }
        if cover_count(oracle, pos).is_some_and(|hits| hits >= MIN_COVER_RAYS) {
            accepted.push(pos);
        }
    }

    for pos in accepted {
        let spot = mesh.add_hiding_spot(id, pos, HidingSpotFlags::IN_COVER)?;
        trace!("Hiding spot {:?} in area #{} at {}", spot, id, pos);
    }
    Ok(())
}

// ---- Encounter spots ----

fn quantize_order(t: f32) -> f32 {
    (t.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

/// Hiding spots that come into view along `from -> to`, with the fraction of
/// the path where each is first seen
fn spots_seen_along(
    oracle: &dyn TraceOracle,
    spots: &[HidingSpot],
    from: Vec3,
    to: Vec3,
) -> Vec<SpotOrder> {
    let steps = ((to - from).length() / GENERATION_STEP_SIZE).ceil().max(1.0) as usize;
    let mut seen: Vec<SpotOrder> = Vec::new();
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let eye = from.lerp(to, t) + Vec3::Z * HUMAN_EYE_HEIGHT;
        for spot in spots {
            if seen.iter().any(|s| s.spot == spot.id) {
                continue;
            }
            let target = spot.pos + Vec3::Z * HUMAN_CROUCH_EYE_HEIGHT;
            if !oracle.trace_line(eye, target, MASK_NAV_SOLID).did_hit() {
                seen.push(SpotOrder { spot: spot.id, t: quantize_order(t) });
            }
        }
    }
    seen.sort_by(|a, b| a.t.total_cmp(&b.t).then(a.spot.cmp(&b.spot)));
    seen.truncate(MAX_ENCOUNTER_SPOTS);
    seen
}

/// For every pair of neighbors, record which hiding spots appear while
/// walking through `id` from one to the other
pub fn compute_encounter_spots(mesh: &mut NavMesh, oracle: &dyn TraceOracle, id: AreaId, range: f32) -> NavResult<()> {
    let area = mesh.try_area(id)?;
    let center = area.center();
    let spots: Vec<HidingSpot> = mesh
        .areas()
        .flat_map(|a| a.hiding_spots().iter().copied())
        .filter(|s| s.pos.distance(center) <= range)
        .collect();

    let neighbors: Vec<_> = area.all_connections().collect();
    let mut encounters = Vec::new();
    for &(from_dir, from) in &neighbors {
        let Some(from_area) = mesh.area(from.id) else { continue };
        for &(to_dir, to) in &neighbors {
            if to.id == from.id {
                continue;
            }
            let Some(to_area) = mesh.area(to.id) else { continue };
            let (path_from, _) = area.compute_portal(from_area, from_dir);
            let (path_to, _) = area.compute_portal(to_area, to_dir);
            let seen = spots_seen_along(oracle, &spots, path_from, path_to);
            if seen.is_empty() {
                continue;
            }
            encounters.push(SpotEncounter {
                from: from.id,
                from_dir,
                to: to.id,
                to_dir,
                path_from,
                path_to,
                spots: seen,
            });
        }
    }

    if let Some(area) = mesh.area_mut(id) {
        area.spot_encounters = encounters;
    }
    Ok(())
}

// ---- Sniper spots ----

/// Flag the hiding spots of an area that overlook long sight lines
pub fn classify_sniper_spots(mesh: &mut NavMesh, oracle: &dyn TraceOracle, id: AreaId, sniper_range: f32) -> NavResult<()> {
    let area = mesh.try_area(id)?;
    let mut updates = Vec::new();
    for spot in area.hiding_spots() {
        let eye = spot.pos + Vec3::Z * HUMAN_CROUCH_EYE_HEIGHT;
        let longest = mesh
            .areas()
            .filter(|other| other.id() != id)
            .map(|other| other.center() + Vec3::Z * HUMAN_EYE_HEIGHT)
            .filter(|target| target.distance(eye) >= sniper_range)
            .filter(|target| !oracle.trace_line(eye, *target, MASK_NAV_SOLID).did_hit())
            .map(|target| target.distance(eye))
            .fold(0.0_f32, f32::max);

        let mut flags = spot.flags - (HidingSpotFlags::GOOD_SNIPER_SPOT | HidingSpotFlags::IDEAL_SNIPER_SPOT);
        if longest >= sniper_range * IDEAL_SNIPER_FACTOR {
            flags |= HidingSpotFlags::IDEAL_SNIPER_SPOT;
        } else if longest >= sniper_range {
            flags |= HidingSpotFlags::GOOD_SNIPER_SPOT;
        }
        updates.push((spot.id, flags));
    }

    for (spot, flags) in updates {
        if let Some(s) = mesh.hiding_spot_mut(spot) {
            s.flags = flags;
        }
    }
    Ok(())
}

// ---- Visibility ----

/// Eye positions sampled over an area: center first, then the inset corners
fn eye_points(area: &NavArea) -> [Vec3; 5] {
    let [a, b, c, d] = inset_corners(area, HALF_HUMAN_WIDTH);
    [area.center(), a, b, c, d].map(|p| p + Vec3::Z * HUMAN_EYE_HEIGHT)
}

fn visibility(oracle: &dyn TraceOracle, from: &[Vec3; 5], to: &[Vec3; 5]) -> u8 {
    let clear = |a: Vec3, b: Vec3| !oracle.trace_line(a, b, MASK_NAV_SOLID).did_hit();
    let from_center: Vec<bool> = to.iter().map(|t| clear(from[0], *t)).collect();
    if from_center.iter().all(|v| *v) {
        return COMPLETELY_VISIBLE | POTENTIALLY_VISIBLE;
    }
    if from_center.iter().any(|v| *v) || from[1..].iter().any(|f| to.iter().any(|t| clear(*f, *t))) {
        return POTENTIALLY_VISIBLE;
    }
    0
}

/// Compute the set of areas potentially visible from `id`
pub fn compute_visibility(mesh: &mut NavMesh, oracle: &dyn TraceOracle, id: AreaId, range: f32) -> NavResult<()> {
    let area = mesh.try_area(id)?;
    let center = area.center();
    let from = eye_points(area);

    let visible: Vec<AreaBindInfo> = mesh
        .areas()
        .filter(|other| other.id() != id)
        .filter(|other| other.closest_point(center).distance(center) <= range)
        .filter_map(|other| {
            let attributes = visibility(oracle, &from, &eye_points(other));
            (attributes != 0).then_some(AreaBindInfo { id: other.id(), attributes })
        })
        .collect();

    trace!("Area #{} sees {} areas", id, visible.len());
    if let Some(area) = mesh.area_mut(id) {
        area.potentially_visible = visible;
        area.inherit_visibility_from = None;
    }
    Ok(())
}

/// Entries of `list` other than `skip`
fn without(list: &[AreaBindInfo], skip: AreaId) -> Vec<AreaBindInfo> {
    list.iter().copied().filter(|v| v.id != skip).collect()
}

/// Let areas share the visibility set of a neighbor that sees exactly what
/// they see. Returns how many areas now inherit.
pub fn compress_visibility(mesh: &mut NavMesh) -> usize {
    let mut sources: BTreeSet<AreaId> = BTreeSet::new();
    let mut inherits: BTreeMap<AreaId, AreaId> = BTreeMap::new();

    for area in mesh.areas() {
        let id = area.id();
        if sources.contains(&id) || area.potentially_visible().is_empty() {
            continue;
        }
        let mine = area.potentially_visible();
        let source = area.all_connections().map(|(_, c)| c.id).find(|n| {
            if inherits.contains_key(n) {
                return false;
            }
            let Some(other) = mesh.area(*n) else { return false };
            let theirs = other.potentially_visible();
            other.inherit_visibility_from().is_none()
                && mine.iter().any(|v| v.id == *n)
                && theirs.iter().any(|v| v.id == id)
                && without(mine, *n) == without(theirs, id)
        });
        if let Some(source) = source {
            sources.insert(source);
            inherits.insert(id, source);
        }
    }

    for (id, source) in &inherits {
        if let Some(area) = mesh.area_mut(*id) {
            area.potentially_visible.clear();
            area.inherit_visibility_from = Some(*source);
        }
    }
    inherits.len()
}

// ---- Earliest occupy times ----

#[derive(Debug, PartialEq)]
struct Reached {
    time: f32,
    area: AreaId,
}

impl Eq for Reached {}

impl Ord for Reached {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.area.cmp(&self.area))
    }
}

impl PartialOrd for Reached {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Seconds for each team to reach each area running from its spawns. Areas a
/// team cannot reach get `f32::MAX`; teams without spawns leave zero.
pub fn compute_earliest_occupy_times(mesh: &mut NavMesh, seeds: &[WalkableSeed]) {
    for team in 0..MAX_NAV_TEAMS {
        let starts: BTreeSet<AreaId> = seeds
            .iter()
            .filter(|s| s.team == Some(team))
            .filter_map(|s| mesh.get_nearest_nav_area(s.pos, false, None))
            .collect();

        if starts.is_empty() {
            for id in mesh.area_ids() {
                if let Some(area) = mesh.area_mut(id) {
                    area.earliest_occupy_time[team] = 0.0;
                }
            }
            continue;
        }

        let mut best: BTreeMap<AreaId, f32> = BTreeMap::new();
        let mut open = BinaryHeap::new();
        for &area in &starts {
            best.insert(area, 0.0);
            open.push(Reached { time: 0.0, area });
        }
        while let Some(Reached { time, area }) = open.pop() {
            if best.get(&area).is_some_and(|t| time > *t) {
                continue;
            }
            let Some(a) = mesh.area(area) else { continue };
            for (_, c) in a.all_connections() {
                let next = time + c.length / RUN_SPEED;
                if best.get(&c.id).is_none_or(|t| next < *t) {
                    best.insert(c.id, next);
                    open.push(Reached { time: next, area: c.id });
                }
            }
        }

        for id in mesh.area_ids() {
            let time = best.get(&id).copied().unwrap_or(f32::MAX);
            if let Some(area) = mesh.area_mut(id) {
                area.earliest_occupy_time[team] = time;
            }
        }
        debug!("Team {} reaches {} of {} areas", team, best.len(), mesh.area_count());
    }
}

// ---- Lighting ----

/// Sample the light level just above each corner of an area
pub fn compute_light_intensity(mesh: &mut NavMesh, oracle: &dyn TraceOracle, id: AreaId) -> NavResult<()> {
    let area = mesh.try_area(id)?;
    let levels = NavCornerType::ALL.map(|c| {
        let pos = area.corner(c) + Vec3::Z * HALF_HUMAN_HEIGHT;
        oracle.light_intensity(pos).clamp(0.0, 1.0)
    });
    if let Some(area) = mesh.area_mut(id) {
        area.light_intensity = levels;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::NavDirType;
    use crate::trace::BoxWorld;

    fn flat(mesh: &mut NavMesh, x0: f32, y0: f32, x1: f32, y1: f32) -> AreaId {
        mesh.create_area(
            Vec3::new(x0, y0, 0.0),
            Vec3::new(x1, y0, 0.0),
            Vec3::new(x1, y1, 0.0),
            Vec3::new(x0, y1, 0.0),
        )
        .unwrap()
    }

    fn link(mesh: &mut NavMesh, a: AreaId, b: AreaId, dir: NavDirType) {
        mesh.connect_areas(a, b, dir).unwrap();
        mesh.connect_areas(b, a, dir.opposite()).unwrap();
    }

    #[test]
    fn hiding_spot_in_walled_corner() {
        let world = BoxWorld::new()
            .with_box(Vec3::new(0.0, -10.0, 0.0), Vec3::new(50.0, 0.0, 100.0))
            .with_box(Vec3::new(-10.0, -10.0, 0.0), Vec3::new(0.0, 50.0, 100.0));
        let mut mesh = NavMesh::new();
        let id = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        find_hiding_spots(&mut mesh, &world, id).unwrap();

        let spots = mesh.area(id).unwrap().hiding_spots();
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].pos, Vec3::new(16.0, 16.0, 0.0));
        assert!(spots[0].has_good_cover());
        assert_eq!(mesh.hiding_spot(spots[0].id).map(|s| s.area), Some(id));
    }

    #[test]
    fn open_ground_has_no_hiding_spots() {
        let mut mesh = NavMesh::new();
        let id = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        find_hiding_spots(&mut mesh, &BoxWorld::new(), id).unwrap();
        assert_eq!(mesh.hiding_spot_count(), 0);
    }

    #[test]
    fn encounter_records_when_spot_appears() {
        // West - middle - east corridor; a wall south of the corridor hides the
        // spot until the walker is past the middle
        let world = BoxWorld::new().with_box(Vec3::new(90.0, 120.0, 0.0), Vec3::new(160.0, 125.0, 200.0));
        let mut mesh = NavMesh::new();
        let west = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        let middle = flat(&mut mesh, 100.0, 0.0, 200.0, 100.0);
        let east = flat(&mut mesh, 200.0, 0.0, 300.0, 100.0);
        let south = flat(&mut mesh, 100.0, 180.0, 200.0, 220.0);
        link(&mut mesh, west, middle, NavDirType::East);
        link(&mut mesh, middle, east, NavDirType::East);
        let spot = mesh.add_hiding_spot(south, Vec3::new(150.0, 200.0, 0.0), HidingSpotFlags::IN_COVER).unwrap();

        compute_encounter_spots(&mut mesh, &world, middle, 6000.0).unwrap();
        let encounters = mesh.area(middle).unwrap().spot_encounters();
        assert_eq!(encounters.len(), 2);

        let eastbound = encounters.iter().find(|e| e.from == west).unwrap();
        assert_eq!(eastbound.to, east);
        assert_eq!(eastbound.spots.len(), 1);
        assert_eq!(eastbound.spots[0].spot, spot);
        assert!(eastbound.spots[0].t > 0.5 && eastbound.spots[0].t < 0.9);

        let westbound = encounters.iter().find(|e| e.from == east).unwrap();
        assert_eq!(westbound.spots[0].t, 0.0);
    }

    #[test]
    fn sniper_spots_by_sight_distance() {
        let mut mesh = NavMesh::new();
        let perch = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        flat(&mut mesh, 1500.0, 0.0, 1600.0, 100.0);
        let spot = mesh.add_hiding_spot(perch, Vec3::new(50.0, 50.0, 0.0), HidingSpotFlags::IN_COVER).unwrap();

        classify_sniper_spots(&mut mesh, &BoxWorld::new(), perch, 1000.0).unwrap();
        let flags = mesh.hiding_spot(spot).unwrap().flags;
        assert!(flags.contains(HidingSpotFlags::GOOD_SNIPER_SPOT));
        assert!(!flags.contains(HidingSpotFlags::IDEAL_SNIPER_SPOT));

        classify_sniper_spots(&mut mesh, &BoxWorld::new(), perch, 500.0).unwrap();
        let flags = mesh.hiding_spot(spot).unwrap().flags;
        assert!(flags.contains(HidingSpotFlags::IDEAL_SNIPER_SPOT));
        assert!(!flags.contains(HidingSpotFlags::GOOD_SNIPER_SPOT));

        let world = BoxWorld::new().with_box(Vec3::new(700.0, -500.0, -100.0), Vec3::new(710.0, 500.0, 500.0));
        classify_sniper_spots(&mut mesh, &world, perch, 1000.0).unwrap();
        let flags = mesh.hiding_spot(spot).unwrap().flags;
        assert!(!flags.intersects(HidingSpotFlags::GOOD_SNIPER_SPOT | HidingSpotFlags::IDEAL_SNIPER_SPOT));
        assert!(flags.contains(HidingSpotFlags::IN_COVER));
    }

    #[test]
    fn walls_hide_areas() {
        let world = BoxWorld::new().with_box(Vec3::new(400.0, -500.0, -100.0), Vec3::new(410.0, 500.0, 500.0));
        let mut mesh = NavMesh::new();
        let a = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        let b = flat(&mut mesh, 200.0, 0.0, 300.0, 100.0);
        let c = flat(&mut mesh, 500.0, 0.0, 600.0, 100.0);
        compute_visibility(&mut mesh, &world, a, 6000.0).unwrap();

        assert!(mesh.is_potentially_visible(a, b));
        assert!(!mesh.is_potentially_visible(a, c));
        let seen = mesh.visible_set(a);
        assert_eq!(seen.len(), 1);
        assert_ne!(seen[0].attributes & COMPLETELY_VISIBLE, 0);

        compute_visibility(&mut mesh, &world, a, 100.0).unwrap();
        assert!(mesh.visible_set(a).is_empty());
    }

    #[test]
    fn identical_neighbors_share_visibility() {
        let world = BoxWorld::new();
        let mut mesh = NavMesh::new();
        let a = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        let b = flat(&mut mesh, 100.0, 0.0, 200.0, 100.0);
        let c = flat(&mut mesh, 400.0, 0.0, 500.0, 100.0);
        link(&mut mesh, a, b, NavDirType::East);
        for id in [a, b, c] {
            compute_visibility(&mut mesh, &world, id, 6000.0).unwrap();
        }

        assert_eq!(compress_visibility(&mut mesh), 1);
        assert_eq!(mesh.area(a).unwrap().inherit_visibility_from(), Some(b));
        assert!(mesh.area(a).unwrap().potentially_visible().is_empty());
        for (from, to) in [(a, b), (b, a), (a, c), (c, a), (b, c)] {
            assert!(mesh.is_potentially_visible(from, to), "{from} -> {to}");
        }

        // Losing the source gives the inheriting area its own set back
        mesh.destroy_area(b).unwrap();
        assert_eq!(mesh.area(a).unwrap().inherit_visibility_from(), None);
        assert!(mesh.is_potentially_visible(a, c));
    }

    #[test]
    fn occupy_times_follow_run_speed() {
        let mut mesh = NavMesh::new();
        let a = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        let b = flat(&mut mesh, 100.0, 0.0, 200.0, 100.0);
        let c = flat(&mut mesh, 200.0, 0.0, 300.0, 100.0);
        let island = flat(&mut mesh, 1000.0, 0.0, 1100.0, 100.0);
        link(&mut mesh, a, b, NavDirType::East);
        link(&mut mesh, b, c, NavDirType::East);

        let seeds = [WalkableSeed { pos: Vec3::new(50.0, 50.0, 0.0), normal: Vec3::Z, team: Some(0) }];
        compute_earliest_occupy_times(&mut mesh, &seeds);

        let time = |id| mesh.area(id).unwrap().earliest_occupy_time(0);
        assert_eq!(time(a), 0.0);
        assert!((time(b) - 100.0 / RUN_SPEED).abs() < 1e-4);
        assert!((time(c) - 200.0 / RUN_SPEED).abs() < 1e-4);
        assert_eq!(time(island), f32::MAX);
        assert_eq!(mesh.area(c).unwrap().earliest_occupy_time(1), 0.0);
    }

    #[test]
    fn light_comes_from_the_world() {
        let world = BoxWorld { ambient_light: 0.25, ..BoxWorld::new() };
        let mut mesh = NavMesh::new();
        let id = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0);
        compute_light_intensity(&mut mesh, &world, id).unwrap();
        assert_eq!(mesh.area(id).unwrap().light_intensity, [0.25; 4]);
        assert_eq!(mesh.area(id).unwrap().light_intensity_avg(), 0.25);
    }
}
