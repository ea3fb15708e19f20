// Connecting freshly built areas.
//
// Each generated area remembers its corner nodes. Walking the nodes along an
// edge and following their links (or the areas they anchor) finds the
// neighbors on that side. Edges with no walkable link get one more chance:
// a short search for an area a safe jump below.

use glam::Vec3;
use tracing::{debug, trace};

use super::NavGenerator;
use crate::area::AreaId;
use crate::error::NavResult;
use crate::math::{
    CLIMB_UP_HEIGHT, DEATH_DROP, Extent, GENERATION_STEP_SIZE, JUMP_CROUCH_HEIGHT, NavDirType,
    STEP_HEIGHT, add_direction_to_vector,
};
use crate::mesh::NavMesh;
use crate::node::NodeId;
use crate::trace::{MASK_NAV_SOLID, TraceOracle};

/// Steps searched outward for a jump-down landing
const JUMP_DOWN_SEARCH_STEPS: usize = 4;

/// Edges closer than this count as touching when stitching
const STITCH_TOLERANCE: f32 = 0.5;

impl NavGenerator {
    /// Link every generated area to its neighbors
    pub(super) fn connect_generated_areas(&self, mesh: &mut NavMesh, oracle: &dyn TraceOracle) -> NavResult<()> {
        let ids: Vec<AreaId> = mesh
            .areas()
            .filter(|a| a.node.iter().all(Option::is_some))
            .map(|a| a.id())
            .collect();

        let mut links = Vec::new();
        for id in ids {
            let Some(area) = mesh.area(id) else { continue };
            let [Some(nw), Some(ne), Some(se), Some(sw)] = area.node else { continue };

            for (dir, start, end, walk) in [
                (NavDirType::North, nw, ne, NavDirType::East),
                (NavDirType::West, nw, sw, NavDirType::South),
                (NavDirType::South, sw, se, NavDirType::East),
                (NavDirType::East, ne, se, NavDirType::South),
            ] {
                let mut cur = start;
                while cur != end {
                    let target = self
                        .neighbor_area(cur, dir)
                        .filter(|t| shares_edge(mesh, id, *t, dir))
                        .or_else(|| find_jump_down_area(mesh, oracle, self.nodes.get(cur).pos, dir));
                    if let Some(target) = target.filter(|t| *t != id) {
                        links.push((id, target, dir));
                    }
                    let Some(next) = self.nodes.get(cur).neighbor(walk) else { break };
                    cur = next;
                }
            }
        }

        let count = links.len();
        for (from, to, dir) in links {
            mesh.connect_areas(from, to, dir)?;
        }
        debug!("Connected generated areas ({} edge links)", count);
        Ok(())
    }

    /// Area across the link leaving `node` toward `dir`
    fn neighbor_area(&self, node: NodeId, dir: NavDirType) -> Option<AreaId> {
        let n = self.nodes.get(node);
        match dir {
            // The border node anchors the cell on the far side
            NavDirType::South | NavDirType::East => n
                .area
                .or_else(|| n.neighbor(dir).and_then(|to| self.nodes.get(to).area)),
            NavDirType::North | NavDirType::West => n.neighbor(dir).and_then(|to| self.nodes.get(to).area),
        }
    }
}

/// `to` lies directly across `from`'s `dir` side
fn shares_edge(mesh: &NavMesh, from: AreaId, to: AreaId, dir: NavDirType) -> bool {
    match (mesh.area(from), mesh.area(to)) {
        (Some(a), Some(b)) => a.edge_overlap(b, dir, STITCH_TOLERANCE).is_some(),
        _ => false,
    }
}

/// Look a few steps out from `pos` toward `dir` for an area that can be
/// reached by dropping down
pub(crate) fn find_jump_down_area(
    mesh: &NavMesh,
    oracle: &dyn TraceOracle,
    pos: Vec3,
    dir: NavDirType,
) -> Option<AreaId> {
    let start = pos + Vec3::Z * STEP_HEIGHT;
    let mut ahead = pos + Vec3::Z * CLIMB_UP_HEIGHT;
    if oracle.trace_line(start, ahead, MASK_NAV_SOLID).did_hit() {
        return None;
    }

    for _ in 0..JUMP_DOWN_SEARCH_STEPS {
        let next = add_direction_to_vector(ahead, dir, GENERATION_STEP_SIZE);
        if oracle.trace_line(ahead, next, MASK_NAV_SOLID).did_hit() {
            return None;
        }
        ahead = next;

        let Some(id) = mesh.get_nav_area(ahead, CLIMB_UP_HEIGHT + DEATH_DROP) else { continue };
        let floor = mesh.area(id)?.z(ahead);
        let drop = pos.z - floor;
        if (JUMP_CROUCH_HEIGHT..=DEATH_DROP).contains(&drop) {
            trace!("Jump down {:.1} units toward {:?} onto area #{}", drop, dir, id);
            return Some(id);
        }
        return None;
    }
    None
}

/// Connect newly generated areas to the areas that existed before the run
pub(super) fn stitch_to_existing(mesh: &mut NavMesh, existing: &[AreaId]) -> NavResult<()> {
    let mut links = Vec::new();
    for area in mesh.areas().filter(|a| existing.binary_search(&a.id()).is_err()) {
        let ext = area.extent();
        let grown = Extent::new(
            ext.lo - Vec3::splat(STITCH_TOLERANCE),
            ext.hi + Vec3::splat(STITCH_TOLERANCE),
        );
        for other_id in mesh.areas_overlapping(&grown) {
            if existing.binary_search(&other_id).is_err() {
                continue;
            }
            let Some(other) = mesh.area(other_id) else { continue };
            for dir in NavDirType::ALL {
                if area.edge_overlap(other, dir, STITCH_TOLERANCE).is_none() {
                    continue;
                }
                let (portal, _) = area.compute_portal(other, dir);
                if (other.z(portal) - portal.z).abs() <= STEP_HEIGHT {
                    links.push((area.id(), other_id, dir));
                }
            }
        }
    }

    let count = links.len();
    for (new, old, dir) in links {
        mesh.connect_areas(new, old, dir)?;
        mesh.connect_areas(old, new, dir.opposite())?;
    }
    debug!("Stitched {} edges to pre-existing areas", count);
    Ok(())
}
