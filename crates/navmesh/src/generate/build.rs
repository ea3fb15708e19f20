// Greedy rectangle building over the sampled node grid.
//
// Start with the largest allowed rectangle and try to anchor it at every
// uncovered node. Shrink one side at a time and repeat until 1x1, so the
// biggest areas are placed first and the leftovers are filled with smaller
// ones.

use glam::Vec3;
use tracing::{debug, trace};

use super::{GenerationMode, NavGenerator};
use crate::area::{AreaId, AreaObstacle, NavAttributes};
use crate::error::NavResult;
use crate::math::{
    Extent, NavCornerType, NavDirType, OFF_PLANE_TOLERANCE, STEP_HEIGHT, triangle_normal,
};
use crate::mesh::NavMesh;
use crate::node::NodeId;

/// A rectangle of nodes that passed every build test
struct Candidate {
    /// Nodes by row (north to south), each row west to east
    rows: Vec<Vec<NodeId>>,
    crouch: bool,
    obstacle: Option<AreaObstacle>,
}

impl Candidate {
    fn width(&self) -> usize {
        self.rows[0].len() - 1
    }

    fn height(&self) -> usize {
        self.rows.len() - 1
    }

    /// NW, NE, SE, SW
    fn corners(&self) -> [NodeId; 4] {
        let (w, h) = (self.width(), self.height());
        [self.rows[0][0], self.rows[0][w], self.rows[h][w], self.rows[h][0]]
    }
}

/// Quadrants of the node at (i, j) that lie inside a w x h rectangle
fn inside_quadrants(i: usize, j: usize, w: usize, h: usize) -> impl Iterator<Item = NavCornerType> {
    [
        (NavCornerType::SouthEast, i < w && j < h),
        (NavCornerType::SouthWest, i > 0 && j < h),
        (NavCornerType::NorthEast, i < w && j > 0),
        (NavCornerType::NorthWest, i > 0 && j > 0),
    ]
    .into_iter()
    .filter(|(_, inside)| *inside)
    .map(|(c, _)| c)
}

/// Directions from the node at (i, j) that stay within the rectangle
fn internal_edges(i: usize, j: usize, w: usize, h: usize) -> impl Iterator<Item = NavDirType> {
    [
        (NavDirType::East, i < w),
        (NavDirType::West, i > 0),
        (NavDirType::South, j < h),
        (NavDirType::North, j > 0),
    ]
    .into_iter()
    .filter(|(_, internal)| *internal)
    .map(|(d, _)| d)
}

impl NavGenerator {
    /// Cover the node grid with areas. Returns how many were built.
    pub(super) fn build_areas(&mut self, mesh: &mut NavMesh) -> NavResult<usize> {
        let max = self.config.nav_area_max_size.max(1) as usize;
        let (mut w, mut h) = (max, max);
        let mut built = 0;

        loop {
            let ids: Vec<NodeId> = self.nodes.ids().collect();
            for id in ids {
                if self.nodes.get(id).covered {
                    continue;
                }
                if let Some(candidate) = self.test_area(mesh, id, w, h) {
                    self.build_area(mesh, candidate)?;
                    built += 1;
                }
            }
            if w == 1 && h == 1 {
                break;
            }
            if w >= h {
                w -= 1;
            } else {
                h -= 1;
            }
        }
        Ok(built)
    }

    /// Can a `w` x `h` area be anchored with `anchor` as its NW node
    fn test_area(&self, mesh: &NavMesh, anchor: NodeId, w: usize, h: usize) -> Option<Candidate> {
        let nodes = &self.nodes;

        let mut rows = Vec::with_capacity(h + 1);
        let mut row_start = anchor;
        for j in 0..=h {
            if j > 0 {
                row_start = nodes.get(row_start).neighbor(NavDirType::South)?;
            }
            let mut row = Vec::with_capacity(w + 1);
            row.push(row_start);
            let mut cur = row_start;
            for _ in 0..w {
                cur = nodes.get(cur).neighbor(NavDirType::East)?;
                row.push(cur);
            }
            rows.push(row);
        }

        let base = nodes.get(anchor);
        let mask = !(NavAttributes::CROUCH | NavAttributes::CLIFF);
        let attributes = base.attributes & mask;
        let crouch = base.is_crouch(NavCornerType::SouthEast);

        for (j, row) in rows.iter().enumerate() {
            for (i, &id) in row.iter().enumerate() {
                let node = nodes.get(id);
                if i < w && j < h && (node.covered || !nodes.is_closed_cell(id)) {
                    return None;
                }
                if node.attributes & mask != attributes {
                    return None;
                }
                for corner in inside_quadrants(i, j, w, h) {
                    if node.blocked[corner.index()] || node.is_crouch(corner) != crouch {
                        return None;
                    }
                }
            }
        }

        let candidate = Candidate { rows, crouch, obstacle: None };
        let [nw, ne, _, sw] = candidate.corners().map(|id| nodes.get(id).pos);

        if w > 1 || h > 1 {
            let normal = triangle_normal(nw, ne, sw);
            for row in &candidate.rows {
                for &id in row {
                    if (nodes.get(id).pos - nw).dot(normal).abs() > OFF_PLANE_TOLERANCE {
                        return None;
                    }
                }
            }
            for (j, row) in candidate.rows.iter().enumerate() {
                for (i, &id) in row.iter().enumerate() {
                    let node = nodes.get(id);
                    if internal_edges(i, j, w, h).any(|d| node.has_obstacle(d)) {
                        return None;
                    }
                }
            }
        }

        if self.mode != GenerationMode::Full && self.overlaps_existing(mesh, &candidate) {
            return None;
        }

        let obstacle = (w == 1 && h == 1).then(|| self.cell_obstacle(&candidate)).flatten();
        Some(Candidate { obstacle, ..candidate })
    }

    fn overlaps_existing(&self, mesh: &NavMesh, candidate: &Candidate) -> bool {
        let mut extent = {
            let p = self.nodes.get(candidate.rows[0][0]).pos;
            Extent::new(p, p)
        };
        for row in &candidate.rows {
            for &id in row {
                extent.encompass(self.nodes.get(id).pos);
            }
        }
        mesh.areas_overlapping(&extent).into_iter().any(|id| {
            mesh.area(id).is_some_and(|area| {
                let other = area.extent();
                other.lo.z - STEP_HEIGHT <= extent.hi.z && other.hi.z + STEP_HEIGHT >= extent.lo.z
            })
        })
    }

    /// Obstacle crossing a single cell, present on both of its parallel edges
    fn cell_obstacle(&self, candidate: &Candidate) -> Option<AreaObstacle> {
        let [nw, ne, _, sw] = candidate.corners().map(|id| self.nodes.get(id));
        for (dir, a, b) in [(NavDirType::East, nw, sw), (NavDirType::South, nw, ne)] {
            let d = dir.index();
            if a.has_obstacle(dir) && b.has_obstacle(dir) {
                return Some(AreaObstacle {
                    dir,
                    start: a.obstacle_start[d].min(b.obstacle_start[d]),
                    end: a.obstacle_end[d].max(b.obstacle_end[d]),
                    height: a.obstacle_height[d].max(b.obstacle_height[d]),
                });
            }
        }
        None
    }

    fn build_area(&mut self, mesh: &mut NavMesh, candidate: Candidate) -> NavResult<AreaId> {
        let corners = candidate.corners();
        let [nw, ne, se, sw]: [Vec3; 4] = corners.map(|id| self.nodes.get(id).pos);
        let id = mesh.create_area(nw, ne, se, sw)?;

        let attributes = self.nodes.get(corners[0]).attributes & !(NavAttributes::CROUCH | NavAttributes::CLIFF);
        if let Some(area) = mesh.area_mut(id) {
            area.attributes = attributes;
            if candidate.crouch {
                area.attributes |= NavAttributes::CROUCH;
            }
            if candidate.obstacle.is_some() {
                area.attributes |= NavAttributes::NO_MERGE;
            }
            area.obstacle = candidate.obstacle;
            area.node = corners.map(Some);
        }

        let (w, h) = (candidate.width(), candidate.height());
        for row in &candidate.rows[..h] {
            for &node in &row[..w] {
                let node = self.nodes.get_mut(node);
                node.covered = true;
                node.area = Some(id);
            }
        }
        trace!("Built {}x{} area #{}", w, h, id);
        if candidate.obstacle.is_some() {
            debug!("Area #{} crosses an obstacle", id);
        }
        Ok(id)
    }
}
