use crate::floating_type_mod::FT;
use serde::{Deserialize, Serialize};

/**
 * Tunable fluid state. The serialized field names are the keys recognized
 * by hosts (`ParticleMass`, `GasConstant`, `RestDensity`, `Viscosity`).
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FluidParams {
    /// Particle mass M: linear scale of pair forces and density contributions.
    pub particle_mass: FT,

    /// Stiffness K of the state equation `P = max(0, K * (rho - rho0))`.
    pub gas_constant: FT,

    /// Rest density rho0; pressure vanishes at or below it.
    pub rest_density: FT,

    /// Viscous pair damping magnitude mu.
    pub viscosity: FT,
}

impl Default for FluidParams {
    fn default() -> Self {
        FluidParams {
            particle_mass: 1.,
            gas_constant: 8.,
            rest_density: 2.5,
            viscosity: 3.,
        }
    }
}

/// Engine parameters that stay fixed across fluid property updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Fixed timestep in seconds for one `do_physics` tick.
    pub dt: FT,

    /// Screen pixels per simulation unit.
    pub scale: FT,

    /// Tangential velocity scale applied on obstacle contact, in `[0, 1]`.
    pub friction: FT,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            dt: 0.015,
            scale: 30.,
            friction: 0.5,
        }
    }
}
