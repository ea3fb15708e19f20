// A* search over the area graph.
//
// The search explores floor connections first, then ladders (up, then down),
// then elevators. Edge costs come from a caller-supplied `PathCost`. Search
// state lives in a side table owned by the call, so concurrent searches over
// a shared mesh are independent.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use glam::Vec3;
use tracing::trace;

use crate::area::{AreaId, NavArea};
use crate::error::{NavError, NavResult};
use crate::ladder::{LadderId, NavLadder};
use crate::math::{LadderDirType, NavDirType};
use crate::mesh::NavMesh;

/// Cost given to edges whose cost function produced NaN
const NAN_COST: f32 = 1.0e30;
/// Every step must raise the cost so far by at least this factor...
const MIN_COST_FACTOR: f32 = 1.00001;
/// ...plus this amount
const MIN_COST_STEP: f32 = 1.0e-5;

/// How a path step enters its area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTraverse {
    /// Walking through the previous area's side
    Dir(NavDirType),
    LadderUp(LadderId),
    LadderDown(LadderId),
    Elevator,
}

/// One candidate edge offered to the cost function
#[derive(Debug, Clone, Copy)]
pub struct CostEdge<'a> {
    pub area: &'a NavArea,
    /// `None` for the start area
    pub from: Option<&'a NavArea>,
    pub ladder: Option<&'a NavLadder>,
    pub elevator: bool,
    /// Travel length of the edge
    pub length: f32,
}

/// Incremental cost of entering an area. A negative cost marks the area a
/// dead end for this search.
pub trait PathCost {
    fn cost(&mut self, edge: &CostEdge<'_>) -> f32;
}

impl<F> PathCost for F
where
    F: FnMut(&CostEdge<'_>) -> f32,
{
    fn cost(&mut self, edge: &CostEdge<'_>) -> f32 {
        self(edge)
    }
}

/// Plain travel distance
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestPathCost;

impl PathCost for ShortestPathCost {
    fn cost(&mut self, edge: &CostEdge<'_>) -> f32 {
        match edge.from {
            None => 0.0,
            Some(_) => edge.length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathGoal {
    Area(AreaId),
    /// The area nearest to a position; the heuristic aims at the position itself
    Position(Vec3),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathOptions {
    /// Prune paths longer than this
    pub max_path_length: Option<f32>,
    /// Team whose blocked flags apply; `None` avoids areas blocked for any team
    pub team: Option<usize>,
    pub ignore_nav_blockers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStep {
    pub area: AreaId,
    /// `None` on the first step
    pub how: Option<NavTraverse>,
    pub cost_so_far: f32,
    pub length_so_far: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// The goal was reached
    pub found: bool,
    /// Area nearest to the goal that the search reached
    pub closest: AreaId,
    /// Steps from the start to the goal, or to `closest` when not found
    pub steps: Vec<PathStep>,
}

impl PathResult {
    pub fn areas(&self) -> impl Iterator<Item = AreaId> + '_ {
        self.steps.iter().map(|s| s.area)
    }

    pub fn cost(&self) -> f32 {
        self.steps.last().map(|s| s.cost_so_far).unwrap_or(0.0)
    }

    pub fn length(&self) -> f32 {
        self.steps.last().map(|s| s.length_so_far).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    cost: f32,
    length: f32,
    parent: Option<(AreaId, NavTraverse)>,
    closed: bool,
}

#[derive(Debug, PartialEq)]
struct OpenEntry {
    total: f32,
    cost: f32,
    area: AreaId,
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on total cost, lower ID first on ties
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| other.area.cmp(&self.area))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Edge<'a> {
    to: AreaId,
    how: NavTraverse,
    ladder: Option<&'a NavLadder>,
    length: f32,
}

/// Floors, then ladders up, ladders down, elevators
fn edges_from<'a>(mesh: &'a NavMesh, area: &'a NavArea) -> Vec<Edge<'a>> {
    let mut out = Vec::new();
    for dir in NavDirType::ALL {
        for c in area.connections(dir) {
            out.push(Edge { to: c.id, how: NavTraverse::Dir(dir), ladder: None, length: c.length });
        }
    }
    for &lid in area.ladders(LadderDirType::Up) {
        let Some(ladder) = mesh.ladder(lid) else { continue };
        for to in ladder.up_areas() {
            out.push(Edge { to, how: NavTraverse::LadderUp(lid), ladder: Some(ladder), length: ladder.length });
        }
    }
    for &lid in area.ladders(LadderDirType::Down) {
        let Some(ladder) = mesh.ladder(lid) else { continue };
        if let Some(to) = ladder.bottom_area {
            out.push(Edge { to, how: NavTraverse::LadderDown(lid), ladder: Some(ladder), length: ladder.length });
        }
    }
    for &to in area.elevator_areas() {
        let length = mesh.area(to).map(|a| a.center().distance(area.center())).unwrap_or(0.0);
        out.push(Edge { to, how: NavTraverse::Elevator, ladder: None, length });
    }
    out
}

fn sanitize(cost: f32) -> f32 {
    if cost.is_nan() { NAN_COST } else { cost }
}

/// Find a path from `start` to `goal`. When the goal is unreachable the
/// result holds the path to the reachable area closest to it.
pub fn build_path(
    mesh: &NavMesh,
    start: AreaId,
    goal: PathGoal,
    cost_fn: &mut dyn PathCost,
    options: &PathOptions,
) -> NavResult<PathResult> {
    let start_area = mesh.area(start).ok_or(NavError::UnknownArea(start))?;
    let (goal_area, goal_pos) = match goal {
        PathGoal::Area(id) => (Some(id), mesh.area(id).ok_or(NavError::UnknownArea(id))?.center()),
        PathGoal::Position(pos) => (mesh.get_nearest_nav_area(pos, false, None), pos),
    };
    let heuristic = |area: &NavArea| area.center().distance(goal_pos);

    let first = PathStep { area: start, how: None, cost_so_far: 0.0, length_so_far: 0.0 };
    if goal_area == Some(start) {
        return Ok(PathResult { found: true, closest: start, steps: vec![first] });
    }

    let start_cost = sanitize(cost_fn.cost(&CostEdge {
        area: start_area,
        from: None,
        ladder: None,
        elevator: false,
        length: 0.0,
    }));
    if start_cost < 0.0 {
        return Ok(PathResult { found: false, closest: start, steps: vec![first] });
    }

    let mut records: HashMap<AreaId, Record> = HashMap::new();
    let mut open = BinaryHeap::new();
    records.insert(start, Record { cost: start_cost, length: 0.0, parent: None, closed: false });
    open.push(OpenEntry { total: start_cost + heuristic(start_area), cost: start_cost, area: start });

    let mut closest = (start, heuristic(start_area));
    let mut found = false;

    while let Some(entry) = open.pop() {
        let Some(record) = records.get(&entry.area).copied() else { continue };
        if record.closed || entry.cost > record.cost {
            continue;
        }
        if let Some(r) = records.get_mut(&entry.area) {
            r.closed = true;
        }
        let Some(area) = mesh.area(entry.area) else { continue };

        let h = heuristic(area);
        if h < closest.1 || (h == closest.1 && entry.area < closest.0) {
            closest = (entry.area, h);
        }
        if Some(entry.area) == goal_area {
            found = true;
            closest = (entry.area, h);
            break;
        }

        for edge in edges_from(mesh, area) {
            if edge.to == entry.area {
                continue;
            }
            let Some(next) = mesh.area(edge.to) else { continue };
            if next.is_blocked(options.team, options.ignore_nav_blockers) {
                continue;
            }
            let length = record.length + edge.length;
            if options.max_path_length.is_some_and(|max| length > max) {
                continue;
            }

            let increment = sanitize(cost_fn.cost(&CostEdge {
                area: next,
                from: Some(area),
                ladder: edge.ladder,
                elevator: edge.how == NavTraverse::Elevator,
                length: edge.length,
            }));
            if increment < 0.0 {
                continue;
            }
            let cost = (record.cost + increment).max(record.cost * MIN_COST_FACTOR + MIN_COST_STEP);

            if records.get(&edge.to).is_some_and(|r| cost >= r.cost) {
                continue;
            }
            records.insert(edge.to, Record {
                cost,
                length,
                parent: Some((entry.area, edge.how)),
                closed: false,
            });
            open.push(OpenEntry { total: cost + heuristic(next), cost, area: edge.to });
        }
    }

    let end = closest.0;
    let mut steps = Vec::new();
    let mut cur = Some(end);
    while let Some(id) = cur {
        let Some(r) = records.get(&id) else { break };
        let (parent, how) = match r.parent {
            Some((p, how)) => (Some(p), Some(how)),
            None => (None, None),
        };
        steps.push(PathStep { area: id, how, cost_so_far: r.cost, length_so_far: r.length });
        cur = parent;
    }
    steps.reverse();

    trace!(
        "Path #{} -> {:?}: {} ({} steps, {} areas searched)",
        start,
        goal,
        if found { "found" } else { "not found" },
        steps.len(),
        records.len()
    );
    Ok(PathResult { found, closest: end, steps })
}
