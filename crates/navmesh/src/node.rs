// Sampled walkable positions used while generating a mesh.
//
// Nodes sit on a regular XY grid of `GENERATION_STEP_SIZE` spacing. Several
// nodes may share one grid cell at different heights (a floor under a
// balcony). Nodes only live for the duration of a generation run.

use std::collections::HashMap;

use glam::Vec3;

use crate::area::{AreaId, NavAttributes};
use crate::math::{
    GENERATION_STEP_SIZE, HUMAN_HEIGHT, NUM_CORNERS, NUM_DIRECTIONS, NavCornerType, NavDirType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct NavNode {
    pub id: NodeId,
    pub pos: Vec3,
    pub normal: Vec3,
    /// Walkable neighbor in each direction
    pub to: [Option<NodeId>; NUM_DIRECTIONS],
    /// Height of an obstacle crossed on the way to each neighbor, 0 if none
    pub obstacle_height: [f32; NUM_DIRECTIONS],
    /// Distance from this node where that obstacle starts and ends
    pub obstacle_start: [f32; NUM_DIRECTIONS],
    pub obstacle_end: [f32; NUM_DIRECTIONS],
    visited: u8,
    /// Node we were sampled from, used to backtrack the walk
    pub parent: Option<NodeId>,
    /// Already part of an area
    pub covered: bool,
    pub area: Option<AreaId>,
    /// Quadrant around the node only fits a crouching walker
    pub crouch: [bool; NUM_CORNERS],
    /// Quadrant around the node doesn't fit a walker at all
    pub blocked: [bool; NUM_CORNERS],
    pub attributes: NavAttributes,
}

impl NavNode {
    fn new(id: NodeId, pos: Vec3, normal: Vec3, parent: Option<NodeId>) -> Self {
        NavNode {
            id,
            pos,
            normal,
            to: [None; NUM_DIRECTIONS],
            obstacle_height: [0.0; NUM_DIRECTIONS],
            obstacle_start: [0.0; NUM_DIRECTIONS],
            obstacle_end: [0.0; NUM_DIRECTIONS],
            visited: 0,
            parent,
            covered: false,
            area: None,
            crouch: [false; NUM_CORNERS],
            blocked: [false; NUM_CORNERS],
            attributes: NavAttributes::empty(),
        }
    }

    pub fn has_visited(&self, dir: NavDirType) -> bool {
        self.visited & (1 << dir.index()) != 0
    }

    pub fn mark_visited(&mut self, dir: NavDirType) {
        self.visited |= 1 << dir.index();
    }

    pub fn is_blocked_in_any_direction(&self) -> bool {
        self.blocked.iter().any(|&b| b)
    }

    pub fn is_crouch(&self, corner: NavCornerType) -> bool {
        self.crouch[corner.index()]
    }

    /// Crossing toward `dir` goes over something taller than a step
    pub fn has_obstacle(&self, dir: NavDirType) -> bool {
        self.obstacle_height[dir.index()] > 0.0
    }

    pub fn neighbor(&self, dir: NavDirType) -> Option<NodeId> {
        self.to[dir.index()]
    }
}

/// Grid cell of an XY position
fn cell_of(pos: Vec3) -> (i32, i32) {
    (
        (pos.x / GENERATION_STEP_SIZE).round() as i32,
        (pos.y / GENERATION_STEP_SIZE).round() as i32,
    )
}

/// All nodes of one generation run
#[derive(Debug, Default)]
pub struct NodeGrid {
    nodes: Vec<NavNode>,
    cells: HashMap<(i32, i32), Vec<NodeId>>,
}

impl NodeGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.cells.clear();
    }

    pub fn get(&self, id: NodeId) -> &NavNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut NavNode {
        &mut self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &NavNode> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn add(&mut self, pos: Vec3, normal: Vec3, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NavNode::new(id, pos, normal, parent));
        self.cells.entry(cell_of(pos)).or_default().push(id);
        id
    }

    /// Node at the grid cell of `pos` whose height is within reach of `pos.z`
    pub fn find(&self, pos: Vec3) -> Option<NodeId> {
        let ids = self.cells.get(&cell_of(pos))?;
        ids.iter()
            .copied()
            .filter(|id| (self.get(*id).pos.z - pos.z).abs() < HUMAN_HEIGHT)
            .min_by(|a, b| {
                let da = (self.get(*a).pos.z - pos.z).abs();
                let db = (self.get(*b).pos.z - pos.z).abs();
                da.total_cmp(&db)
            })
    }

    /// Link `from` to `to` in `dir`
    pub fn connect(&mut self, from: NodeId, dir: NavDirType, to: NodeId) {
        self.get_mut(from).to[dir.index()] = Some(to);
    }

    /// The cell whose north-west corner is `id` is bounded on all four sides
    /// by walkable links
    pub fn is_closed_cell(&self, id: NodeId) -> bool {
        let node = self.get(id);
        let (Some(east), Some(south)) = (node.neighbor(NavDirType::East), node.neighbor(NavDirType::South))
        else {
            return false;
        };
        let east_south = self.get(east).neighbor(NavDirType::South);
        let south_east = self.get(south).neighbor(NavDirType::East);
        east_south.is_some() && east_south == south_east
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> (NodeGrid, [NodeId; 4]) {
        let mut grid = NodeGrid::new();
        let nw = grid.add(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, None);
        let ne = grid.add(Vec3::new(25.0, 0.0, 0.0), Vec3::Z, Some(nw));
        let se = grid.add(Vec3::new(25.0, 25.0, 0.0), Vec3::Z, Some(ne));
        let sw = grid.add(Vec3::new(0.0, 25.0, 0.0), Vec3::Z, Some(se));
        grid.connect(nw, NavDirType::East, ne);
        grid.connect(nw, NavDirType::South, sw);
        grid.connect(ne, NavDirType::South, se);
        grid.connect(sw, NavDirType::East, se);
        (grid, [nw, ne, se, sw])
    }

    #[test]
    fn closed_cell_needs_all_four_links() {
        let (mut grid, [nw, ne, se, _]) = square();
        assert!(grid.is_closed_cell(nw));
        assert!(!grid.is_closed_cell(ne));
        grid.get_mut(ne).to[NavDirType::South.index()] = None;
        assert!(!grid.is_closed_cell(nw));
        grid.connect(ne, NavDirType::South, se);
        assert!(grid.is_closed_cell(nw));
    }

    #[test]
    fn find_separates_stacked_floors() {
        let mut grid = NodeGrid::new();
        let low = grid.add(Vec3::new(50.0, 50.0, 0.0), Vec3::Z, None);
        let high = grid.add(Vec3::new(50.0, 50.0, 200.0), Vec3::Z, None);
        assert_eq!(grid.find(Vec3::new(52.0, 49.0, 10.0)), Some(low));
        assert_eq!(grid.find(Vec3::new(50.0, 50.0, 190.0)), Some(high));
        assert_eq!(grid.find(Vec3::new(50.0, 50.0, 100.0)), None);
        assert_eq!(grid.find(Vec3::new(75.0, 50.0, 0.0)), None);
    }

    #[test]
    fn visited_bits() {
        let (mut grid, [nw, ..]) = square();
        let node = grid.get_mut(nw);
        assert!(!node.has_visited(NavDirType::West));
        node.mark_visited(NavDirType::West);
        assert!(node.has_visited(NavDirType::West));
        assert!(!node.has_visited(NavDirType::East));
    }
}
