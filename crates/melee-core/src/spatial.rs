// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Uniform fixed-cell spatial index over the world rectangle.
//!
//! O(1) insert, O(k) radius query. Cells and the query scratch vector are
//! pre-sized and reused; steady-state operation does not allocate.
//! Out-of-bounds positions clamp to the border cells, so there are no
//! failure modes. Within a tick all inserts precede all queries.

/// Minimum pre-sized capacity per cell.
const CELL_FLOOR_CAPACITY: usize = 4;

/// Fixed-cell grid mapping positions to entity indices.
#[derive(Debug)]
pub struct SpatialGrid {
    inv_cell: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<u32>>,
    scratch: Vec<u32>,
}

impl SpatialGrid {
    /// Builds a grid covering `width x height` with the given cell edge.
    ///
    /// `expected_entities` sizes each cell vector so steady-state inserts
    /// do not reallocate.
    pub fn new(width: f32, height: f32, cell_size: f32, expected_entities: usize) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        let cols = ((width / cell_size).ceil() as usize).max(1);
        let rows = ((height / cell_size).ceil() as usize).max(1);
        let per_cell = (expected_entities / (cols * rows)).max(CELL_FLOOR_CAPACITY);
        let cells = (0..cols * rows)
            .map(|_| Vec::with_capacity(per_cell))
            .collect();
        Self {
            inv_cell: 1.0 / cell_size,
            cols,
            rows,
            cells,
            scratch: Vec::with_capacity(expected_entities),
        }
    }

    /// Length-truncates every cell, preserving capacity.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    fn cell_coords(&self, x: f32, y: f32) -> (usize, usize) {
        let cx = ((x * self.inv_cell) as isize).clamp(0, self.cols as isize - 1) as usize;
        let cy = ((y * self.inv_cell) as isize).clamp(0, self.rows as isize - 1) as usize;
        (cx, cy)
    }

    /// Appends `id` to the cell containing `(x, y)`.
    pub fn insert(&mut self, id: u32, x: f32, y: f32) {
        let (cx, cy) = self.cell_coords(x, y);
        self.cells[cy * self.cols + cx].push(id);
    }

    /// Returns ids in every cell intersecting the disk at `(cx, cy)` with
    /// radius `r`.
    ///
    /// The returned view borrows the internal scratch vector and is valid
    /// until the next query. Candidates are a superset of the disk; callers
    /// apply the exact distance test.
    pub fn query_radius(&mut self, cx: f32, cy: f32, r: f32) -> &[u32] {
        self.scratch.clear();
        let (x0, y0) = self.cell_coords(cx - r, cy - r);
        let (x1, y1) = self.cell_coords(cx + r, cy + r);
        for gy in y0..=y1 {
            for gx in x0..=x1 {
                self.scratch.extend_from_slice(&self.cells[gy * self.cols + gx]);
            }
        }
        &self.scratch
    }
}
