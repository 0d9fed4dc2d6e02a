use crate::{floating_type_mod::FT, V2};

/// Upper bound on references held per cell. Pushes beyond the bound are
/// dropped for the tick, so local crowding degrades the simulation smoothly
/// instead of growing the hot-path allocations.
pub const CELL_MAX_PARTICLES: usize = 50;

struct Cell {
    particles: Vec<u32>,

    // Precomputed "top-right half" of the 8-neighborhood: the right neighbor
    // and the three cells in the row above, clipped to the grid. Iterating
    // every cell against this set visits each unordered cell pair once.
    half_neighbors: Vec<u32>,
}

/**
 * Uniform grid over `[0, width] x [0, height]` with `nx x ny` cells of
 * kernel-support size. Cell membership arrays are reused across ticks:
 * `reset` zeroes counts and never reallocates.
 */
pub struct SpatialGrid {
    nx: usize,
    ny: usize,
    width: FT,
    height: FT,
    cell_capacity: usize,
    cells: Vec<Cell>,
}

impl SpatialGrid {
    pub fn new(nx: usize, ny: usize, width: FT, height: FT, cell_capacity: usize) -> SpatialGrid {
        assert!(nx > 0 && ny > 0);
        assert!(width > 0. && height > 0.);

        let mut cells = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let mut half_neighbors = Vec::new();
                if i + 1 < nx {
                    half_neighbors.push((j * nx + i + 1) as u32);
                }
                if j + 1 < ny {
                    for di in -1i64..=1 {
                        let ni = i as i64 + di;
                        if ni >= 0 && (ni as usize) < nx {
                            half_neighbors.push(((j + 1) * nx + ni as usize) as u32);
                        }
                    }
                }
                cells.push(Cell {
                    particles: Vec::with_capacity(cell_capacity),
                    half_neighbors,
                });
            }
        }

        SpatialGrid {
            nx,
            ny,
            width,
            height,
            cell_capacity,
            cells,
        }
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    /** Zero all cell counts. Backing arrays keep their capacity. */
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.particles.clear();
        }
    }

    /** Index of the cell covering `(x, y)`, or `None` outside the grid. */
    pub fn cell_index(&self, x: FT, y: FT) -> Option<usize> {
        let cx = (self.nx as FT * x / self.width).floor();
        let cy = (self.ny as FT * y / self.height).floor();
        if cx < 0. || cy < 0. || cx >= self.nx as FT || cy >= self.ny as FT {
            return None;
        }
        Some(cx as usize + self.nx * cy as usize)
    }

    /**
     * Record a particle in the cell covering its position. Out-of-grid
     * positions are silently not bound (the boundary handling pulls the
     * particle back on the next integration); pushes beyond the cell
     * capacity are silently dropped.
     */
    pub fn bind(&mut self, particle_id: usize, position: V2) {
        if let Some(ci) = self.cell_index(position.x, position.y) {
            let cell = &mut self.cells[ci];
            if cell.particles.len() < self.cell_capacity {
                cell.particles.push(particle_id as u32);
            }
        }
    }

    pub fn cell_particles(&self, cell: usize) -> &[u32] {
        &self.cells[cell].particles
    }

    pub fn num_bound_particles(&self) -> usize {
        self.cells.iter().map(|c| c.particles.len()).sum()
    }

    /**
     * Enumerate every unordered pair of particles in the same or adjacent
     * cells exactly once: intra-cell pairs, then this cell against its
     * half-neighbors. `f` is a monomorphized callable, so the per-pass
     * closures of the density and force passes compile to direct calls.
     */
    pub fn for_each_pair(&self, mut f: impl FnMut(usize, usize)) {
        for cell in &self.cells {
            for (a, &p) in cell.particles.iter().enumerate() {
                for &q in &cell.particles[a + 1..] {
                    f(p as usize, q as usize);
                }
            }
            for &n in &cell.half_neighbors {
                let other = &self.cells[n as usize].particles;
                for &p in &cell.particles {
                    for &q in other {
                        f(p as usize, q as usize);
                    }
                }
            }
        }
    }
}
