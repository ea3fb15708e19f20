// Walkable space sampling.
//
// A depth-first walk over the generation grid. Every call handles one
// direction of the current node: sweep a thin hull one step over, find the
// ground below, and link the two nodes. When a node has tried all four
// directions the walk backtracks to its parent; when the walk returns to a
// seed it moves on to the next seed.

use glam::Vec3;
use tracing::{debug, trace, warn};

use super::{GenerationMode, NavGenerator};
use crate::math::{
    CLIFF_HEIGHT, CLIMB_UP_HEIGHT, DEATH_DROP, GENERATION_STEP_SIZE, HALF_HUMAN_HEIGHT,
    HUMAN_CROUCH_HEIGHT, HUMAN_HEIGHT, NavCornerType, NavDirType, STEP_HEIGHT,
    add_direction_to_vector, snap_xy,
};
use crate::area::NavAttributes;
use crate::mesh::NavMesh;
use crate::node::NodeId;
use crate::trace::{MASK_NAV_SOLID, SurfaceFlags, TraceOracle};

/// Hull swept between neighboring nodes, relative to the floor
const NAV_TRACE_MINS: Vec3 = Vec3::new(-0.45, -0.45, STEP_HEIGHT);
const NAV_TRACE_MAXS: Vec3 = Vec3::new(0.45, 0.45, HUMAN_CROUCH_HEIGHT);

/// Nodes whose heights differ by less than this share their obstacle data
const MIRROR_HEIGHT_DELTA: f32 = 50.0;

/// Raise increment when the direct sweep is blocked
const CLIMB_INCREMENT: f32 = 10.0;

/// Spacing of ground traces when measuring an obstacle
const OBSTACLE_SAMPLE_STEP: f32 = 1.0;

/// Ground found one step away from a node
struct StepResult {
    ground: Vec3,
    normal: Vec3,
    /// How far the sweep had to rise to clear what was in the way
    raise: f32,
}

/// Outcome of looking for ground in one direction
enum StepOutcome {
    Ground(StepResult),
    Cliff,
    /// Something too tall to climb stands in the way; `raise` is the last
    /// height the sweep was stopped at
    Wall { raise: f32 },
    None,
}

impl NavGenerator {
    /// Advance the walk by one direction. Returns false once every seed is
    /// exhausted.
    pub(super) fn sample_step(&mut self, mesh: &NavMesh, oracle: &dyn TraceOracle) -> bool {
        let Some(current) = self.current_node else {
            return self.start_next_seed(mesh, oracle);
        };

        let node = self.nodes.get(current);
        let Some(dir) = NavDirType::ALL.into_iter().find(|d| !node.has_visited(*d)) else {
            self.current_node = node.parent;
            return true;
        };

        self.nodes.get_mut(current).mark_visited(dir);
        if let Some(next) = self.sample_direction(mesh, oracle, current, dir) {
            self.current_node = Some(next);
        }
        true
    }

    fn start_next_seed(&mut self, mesh: &NavMesh, oracle: &dyn TraceOracle) -> bool {
        while self.seed_index < self.seeds.len() {
            let seed = self.seeds[self.seed_index];
            self.seed_index += 1;

            let pos = snap_xy(seed.pos);
            let from = pos + Vec3::Z * HALF_HUMAN_HEIGHT;
            let to = pos - Vec3::Z * CLIFF_HEIGHT;
            let tr = oracle.trace_line(from, to, MASK_NAV_SOLID);
            if !tr.did_hit() || tr.start_solid {
                warn!(
                    "Walkable seed at ({:.1}, {:.1}, {:.1}) has no ground below it",
                    seed.pos.x, seed.pos.y, seed.pos.z
                );
                continue;
            }

            let ground = tr.end_pos;
            if self.nodes.find(ground).is_some() {
                trace!("Seed {} already sampled", self.seed_index - 1);
                continue;
            }
            self.current_seed = Some(seed);
            if !self.accepts_node(mesh, ground) {
                debug!("Seed {} lies on an existing area", self.seed_index - 1);
                continue;
            }

            let id = self.nodes.add(ground, tr.normal, None);
            self.classify_corners(oracle, id);
            self.current_node = Some(id);
            return true;
        }
        false
    }

    /// Incremental restrictions on where nodes may go
    fn accepts_node(&self, mesh: &NavMesh, pos: Vec3) -> bool {
        if self.mode == GenerationMode::Full {
            return true;
        }
        if self.mode == GenerationMode::Incremental {
            let covered = mesh
                .get_nav_area(pos, STEP_HEIGHT)
                .and_then(|id| mesh.area(id))
                .is_some_and(|a| a.is_overlapping_xy(pos, -1.0));
            if covered {
                return false;
            }
        }
        let Some(seed) = self.current_seed else { return true };
        if (pos - seed.pos).truncate().length() > self.config.nav_generate_incremental_range {
            return false;
        }
        let tolerance = self.config.nav_generate_incremental_tolerance;
        tolerance <= 0.0 || (pos.z - seed.pos.z).abs() <= tolerance
    }

    /// Try to step from `from` toward `dir`. Returns the node to continue the
    /// walk from if a new one was created.
    fn sample_direction(
        &mut self,
        mesh: &NavMesh,
        oracle: &dyn TraceOracle,
        from: NodeId,
        dir: NavDirType,
    ) -> Option<NodeId> {
        let from_pos = self.nodes.get(from).pos;
        let step = match self.find_ground(oracle, from_pos, dir) {
            StepOutcome::Ground(step) => step,
            StepOutcome::Cliff => {
                self.nodes.get_mut(from).attributes |= NavAttributes::CLIFF;
                return None;
            }
            StepOutcome::Wall { raise } => {
                let (height, start, end) = measure_wall(oracle, from_pos, dir, raise);
                let node = self.nodes.get_mut(from);
                node.obstacle_height[dir.index()] = height;
                node.obstacle_start[dir.index()] = start;
                node.obstacle_end[dir.index()] = end;
                return None;
            }
            StepOutcome::None => return None,
        };

        let (to, created) = match self.nodes.find(step.ground) {
            Some(existing) => (existing, false),
            None => {
                if !self.accepts_node(mesh, step.ground) {
                    return None;
                }
                let id = self.nodes.add(step.ground, step.normal, Some(from));
                self.classify_corners(oracle, id);
                (id, true)
            }
        };
        if to == from {
            return None;
        }

        let to_pos = self.nodes.get(to).pos;
        let (height, start, end) = if step.raise > 0.0 {
            measure_obstacle(oracle, from_pos, to_pos, step.raise)
        } else {
            (0.0, 0.0, 0.0)
        };

        self.nodes.connect(from, dir, to);
        {
            let node = self.nodes.get_mut(from);
            node.obstacle_height[dir.index()] = height;
            node.obstacle_start[dir.index()] = start;
            node.obstacle_end[dir.index()] = end;
        }

        let back = dir.opposite();
        if (to_pos.z - from_pos.z).abs() < MIRROR_HEIGHT_DELTA {
            self.nodes.connect(to, back, from);
            let node = self.nodes.get_mut(to);
            node.mark_visited(back);
            if height > 0.0 {
                node.obstacle_height[back.index()] = height + from_pos.z - to_pos.z;
                node.obstacle_start[back.index()] = GENERATION_STEP_SIZE - end;
                node.obstacle_end[back.index()] = GENERATION_STEP_SIZE - start;
            }
        }

        created.then_some(to)
    }

    /// Sweep one step toward `dir` and find the ground there
    fn find_ground(&self, oracle: &dyn TraceOracle, from: Vec3, dir: NavDirType) -> StepOutcome {
        let target = add_direction_to_vector(from, dir, GENERATION_STEP_SIZE);

        let mut raise = 0.0;
        loop {
            let lifted = from + Vec3::Z * raise;
            let ceiling_clear = raise == 0.0
                || !oracle
                    .trace_hull(from, lifted, NAV_TRACE_MINS, NAV_TRACE_MAXS, MASK_NAV_SOLID)
                    .did_hit();
            if !ceiling_clear {
                return StepOutcome::None;
            }
            let forward = Vec3::new(target.x, target.y, lifted.z);
            if !oracle
                .trace_hull(lifted, forward, NAV_TRACE_MINS, NAV_TRACE_MAXS, MASK_NAV_SOLID)
                .did_hit()
            {
                break;
            }
            if raise + CLIMB_INCREMENT > CLIMB_UP_HEIGHT - STEP_HEIGHT {
                return StepOutcome::Wall { raise };
            }
            raise += CLIMB_INCREMENT;
        }

        let top = Vec3::new(target.x, target.y, from.z + raise + STEP_HEIGHT);
        let bottom = Vec3::new(target.x, target.y, from.z - CLIFF_HEIGHT - 1.0);
        let tr = oracle.trace_line(top, bottom, MASK_NAV_SOLID);
        if tr.start_solid || tr.surface.contains(SurfaceFlags::SKY) {
            return StepOutcome::None;
        }
        if !tr.did_hit() || from.z - tr.end_pos.z > DEATH_DROP {
            return StepOutcome::Cliff;
        }
        if tr.normal.z < self.config.nav_slope_limit {
            return StepOutcome::None;
        }

        StepOutcome::Ground(StepResult {
            ground: tr.end_pos,
            normal: tr.normal,
            raise,
        })
    }

    /// Flag quadrants around a node that only fit a crouching walker, or no
    /// walker at all
    fn classify_corners(&mut self, oracle: &dyn TraceOracle, id: NodeId) {
        let pos = self.nodes.get(id).pos;
        let half = GENERATION_STEP_SIZE / 2.0;
        for corner in NavCornerType::ALL {
            let (ox, oy) = corner.offset();
            let center = pos + Vec3::new(ox * half / 2.0, oy * half / 2.0, 0.0);
            let extent = half / 2.0;

            let stand = oracle.trace_hull(
                center,
                center,
                Vec3::new(-extent, -extent, STEP_HEIGHT),
                Vec3::new(extent, extent, HUMAN_HEIGHT),
                MASK_NAV_SOLID,
            );
            if !stand.start_solid {
                continue;
            }
            let crouch = oracle.trace_hull(
                center,
                center,
                Vec3::new(-extent, -extent, STEP_HEIGHT),
                Vec3::new(extent, extent, HUMAN_CROUCH_HEIGHT),
                MASK_NAV_SOLID,
            );
            let node = self.nodes.get_mut(id);
            if crouch.start_solid {
                node.blocked[corner.index()] = true;
            } else {
                node.crouch[corner.index()] = true;
            }
        }
    }
}

/// Tallest ground between two nodes whose step needed a raise. Returns the
/// obstacle height above `from` and where it starts and ends, measured from
/// `from` along the step.
fn measure_obstacle(oracle: &dyn TraceOracle, from: Vec3, to: Vec3, raise: f32) -> (f32, f32, f32) {
    let top_z = from.z + raise + STEP_HEIGHT;
    let floor_z = from.z.min(to.z) - 1.0;
    let threshold = from.z.max(to.z) + STEP_HEIGHT;
    let dir = (to - from).truncate().normalize_or_zero();

    let mut height = 0.0_f32;
    let mut start = None;
    let mut end = 0.0;
    let mut d = 0.0;
    while d <= GENERATION_STEP_SIZE {
        let x = from.x + dir.x * d;
        let y = from.y + dir.y * d;
        let tr = oracle.trace_line(Vec3::new(x, y, top_z), Vec3::new(x, y, floor_z), MASK_NAV_SOLID);
        if tr.did_hit() && !tr.start_solid && tr.end_pos.z > threshold {
            height = height.max(tr.end_pos.z - from.z);
            start.get_or_insert(d);
            end = d;
        }
        d += OBSTACLE_SAMPLE_STEP;
    }

    match start {
        Some(start) => (height, start, end),
        None => (0.0, 0.0, 0.0),
    }
}

/// Extent of a wall that stopped every sweep toward `dir`. The height is at
/// least what the sweep tried to clear; the wall may be taller.
fn measure_wall(oracle: &dyn TraceOracle, from: Vec3, dir: NavDirType, raise: f32) -> (f32, f32, f32) {
    let blocked_z = from.z + raise + STEP_HEIGHT;
    let near = Vec3::new(from.x, from.y, blocked_z);
    let far = add_direction_to_vector(near, dir, GENERATION_STEP_SIZE);

    let forward = oracle.trace_line(near, far, MASK_NAV_SOLID);
    if forward.start_solid || !forward.did_hit() {
        // Only the hull touched it
        return (raise + STEP_HEIGHT, 0.0, GENERATION_STEP_SIZE);
    }
    let start = forward.fraction * GENERATION_STEP_SIZE;
    let back = oracle.trace_line(far, near, MASK_NAV_SOLID);
    let end = if back.start_solid || !back.did_hit() {
        GENERATION_STEP_SIZE
    } else {
        (1.0 - back.fraction) * GENERATION_STEP_SIZE
    };

    let mut height = raise + STEP_HEIGHT;
    let mid = add_direction_to_vector(from, dir, (start + end) / 2.0);
    let top = Vec3::new(mid.x, mid.y, from.z + raise + HUMAN_HEIGHT + CLIMB_UP_HEIGHT);
    let down = oracle.trace_line(top, Vec3::new(mid.x, mid.y, from.z), MASK_NAV_SOLID);
    if down.did_hit() && !down.start_solid {
        height = height.max(down.end_pos.z - from.z);
    }
    (height, start, end)
}
