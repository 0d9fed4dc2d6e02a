/*!
2D weakly-compressible SPH for interactive "crowd hydrodynamics": Lagrangian
particles advance under pressure, viscous, boundary and user-injected forces,
with a uniform grid for O(N) neighbor enumeration and configurable spawn and
drain regions. Rendering and UI live outside this crate; the sole surface is
the [`Simulation`] API.
*/

mod simulation;

pub use simulation::*;
