pub mod clock;
pub mod sdf;
pub mod simulation;
pub mod simulation_parameters;
pub mod sink;
pub mod source;
pub mod spatial_grid;
pub mod sph_kernels;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{FRAC_1_PI, PI, TAU};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{FRAC_1_PI, PI, TAU};
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<T, const D: usize> = SVector<T, D>;

pub type V2 = V<FT, 2>;
pub type V3 = V<FT, 3>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

/// Left-perpendicular of a 2D vector (rotation by +90 degrees).
pub fn perp(v: V2) -> V2 {
    vec2f(-v.y, v.x)
}

pub use clock::{ManualClock, SimClock, WallClock};
pub use sdf::{PlaneSide, SignedDistance, StaticCollider};
pub use simulation::*;
pub use simulation_parameters::{FluidParams, SimulationParams};
pub use sink::ParticleSink;
pub use source::{ParticleSource, SourceShape};
pub use spatial_grid::{SpatialGrid, CELL_MAX_PARTICLES};
