// Spatial hash over area extents, used for position queries.

use std::collections::HashMap;

use glam::Vec3;

use crate::area::AreaId;
use crate::math::Extent;

/// Size of one grid cell in world units
pub const GRID_CELL_SIZE: f32 = 300.0;

#[derive(Debug, Default, Clone)]
pub struct NavAreaGrid {
    cells: HashMap<(i32, i32), Vec<AreaId>>,
}

fn cell_coord(v: f32) -> i32 {
    (v / GRID_CELL_SIZE).floor() as i32
}

fn cell_range(extent: &Extent) -> impl Iterator<Item = (i32, i32)> + use<> {
    let (x0, x1) = (cell_coord(extent.lo.x), cell_coord(extent.hi.x));
    let (y0, y1) = (cell_coord(extent.lo.y), cell_coord(extent.hi.y));
    (x0..=x1).flat_map(move |x| (y0..=y1).map(move |y| (x, y)))
}

impl NavAreaGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn insert(&mut self, id: AreaId, extent: &Extent) {
        for cell in cell_range(extent) {
            let list = self.cells.entry(cell).or_default();
            if !list.contains(&id) {
                list.push(id);
            }
        }
    }

    pub fn remove(&mut self, id: AreaId, extent: &Extent) {
        for cell in cell_range(extent) {
            if let Some(list) = self.cells.get_mut(&cell) {
                list.retain(|a| *a != id);
                if list.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Areas whose extent may cover the XY of `pos`
    pub fn candidates(&self, pos: Vec3) -> &[AreaId] {
        self.cells
            .get(&(cell_coord(pos.x), cell_coord(pos.y)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Areas whose extent may touch `extent`, sorted and deduplicated
    pub fn candidates_in(&self, extent: &Extent) -> Vec<AreaId> {
        let mut out: Vec<AreaId> = cell_range(extent)
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}
