use std::fmt::Display;

use log::{debug, info};
use nalgebra::zero;
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{SimClock, WallClock};
use crate::sdf::{PlaneSide, SignedDistance, StaticCollider, SDF_GRADIENT_EPS};
use crate::simulation_parameters::{FluidParams, SimulationParams};
use crate::sink::ParticleSink;
use crate::source::ParticleSource;
use crate::spatial_grid::{SpatialGrid, CELL_MAX_PARTICLES};
use crate::sph_kernels::{poly6, spiky_grad2, visc_lapl, DISTANCE_EPS, H, H_SQ};
use crate::{floating_type_mod::FT, vec2f, V2};

/// Global particle cap; sources stop attempting once it is reached.
pub const SIM_MAX_PARTICLES: usize = 6000;

/// Velocity magnitude bound enforced after every acceleration step.
pub const V_MAX: FT = 10.;

/// Margin added when projecting a penetrating particle back to a surface.
pub const COLLISION_MARGIN: FT = 0.01;

/// Inset used when clamping a particle back into the domain.
pub const BOUNDARY_MARGIN: FT = 0.01;

/// Scale on a velocity component reflected at the domain boundary.
pub const BOUNDARY_DAMPING: FT = 0.5;

/// Interior margin applied by `resize`, in screen units.
const RESIZE_MARGIN_PX: FT = 5.;

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            #[allow(dead_code)]
            pub fn swap(&mut self, i: usize, j: usize) {
                $(
                    self.$field_name.swap(i, j);
                )*
            }

            pub fn swap_remove(&mut self, i: usize) {
                $(
                    self.$field_name.swap_remove(i);
                )*
            }

            pub fn truncate(&mut self, len: usize) {
                $(
                    self.$field_name.truncate(len);
                )*
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub mass: Vec<FT> | 0.,
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),
        pub force: Vec<V2> | zero(),
        pub density: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,
    }
}

impl ParticleVec {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Append one particle. Density starts at the self-contribution floor.
    pub fn push(&mut self, position: V2, velocity: V2, mass: FT) {
        self.mass.push(mass);
        self.position.push(position);
        self.velocity.push(velocity);
        self.force.push(zero());
        self.density.push(mass * poly6(0.));
        self.pressure.push(0.);
    }
}

/// Domain bounds in simulation units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DomainBounds {
    pub xmin: FT,
    pub xmax: FT,
    pub ymin: FT,
    pub ymax: FT,
}

impl DomainBounds {
    pub fn contains(&self, p: V2) -> bool {
        p.x >= self.xmin && p.x <= self.xmax && p.y >= self.ymin && p.y <= self.ymax
    }
}

/// Pending one-shot velocity override for every particle in one grid cell.
struct ForcedVelocity {
    cell: Option<usize>,
    velocity: V2,
    armed: bool,
}

/**
 * The simulation engine: owns all mutable state (particles, grid,
 * colliders, sources, sinks, the pending forced-velocity record) and
 * advances it one synchronous tick per `do_physics` call. All per-frame
 * phases run exactly once per tick, in a fixed order:
 *
 * grid reset -> emit -> drain -> bind -> density -> pressure -> forces ->
 * forced velocity -> grid reset -> integrate/collide -> re-bind.
 *
 * Several simulations can live side by side; there is no shared state.
 */
pub struct Simulation {
    params: SimulationParams,
    fluid: FluidParams,
    bounds: DomainBounds,
    particles: ParticleVec,
    grid: Option<SpatialGrid>,
    colliders: Vec<StaticCollider>,
    sources: Vec<ParticleSource>,
    sinks: Vec<ParticleSink>,
    forced_velocity: ForcedVelocity,
    clock: Box<dyn SimClock>,
    rng: StdRng,
}

impl Simulation {
    pub fn new() -> Simulation {
        Simulation::with_parts(Box::new(WallClock::new()), StdRng::from_entropy())
    }

    /// Deterministic placement, jitter and emission sampling.
    pub fn with_seed(seed: u64) -> Simulation {
        Simulation::with_parts(Box::new(WallClock::new()), StdRng::seed_from_u64(seed))
    }

    /// Deterministic seeding plus an injected clock (tests, replay hosts).
    pub fn with_clock(clock: Box<dyn SimClock>, seed: u64) -> Simulation {
        Simulation::with_parts(clock, StdRng::seed_from_u64(seed))
    }

    fn with_parts(clock: Box<dyn SimClock>, rng: StdRng) -> Simulation {
        Simulation {
            params: SimulationParams::default(),
            fluid: FluidParams::default(),
            bounds: DomainBounds {
                xmin: 0.,
                xmax: 0.,
                ymin: 0.,
                ymax: 0.,
            },
            particles: ParticleVec::default(0),
            grid: None,
            colliders: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            forced_velocity: ForcedVelocity {
                cell: None,
                velocity: zero(),
                armed: false,
            },
            clock,
            rng,
        }
    }

    // ------------------------------------------------------------------
    // lifecycle

    /**
     * Establish the domain and the spatial grid from viewport dimensions
     * and domain edges, all in screen units. Idempotent when the grid
     * dimensions are unchanged: the cell table is only rebuilt when the
     * cell counts differ.
     */
    pub fn init(&mut self, width: FT, height: FT, left: FT, right: FT, bottom: FT, top: FT) {
        let scale = self.params.scale;
        self.bounds = DomainBounds {
            xmin: left / scale,
            xmax: right / scale,
            ymin: bottom / scale,
            ymax: top / scale,
        };

        let grid_w = (width / scale).max(H);
        let grid_h = (height / scale).max(H);
        let nx = (grid_w / H).ceil() as usize;
        let ny = (grid_h / H).ceil() as usize;

        let rebuild = match &self.grid {
            Some(grid) => grid.nx() != nx || grid.ny() != ny,
            None => true,
        };
        if rebuild {
            info!("building {}x{} spatial grid over {}x{} units", nx, ny, grid_w, grid_h);
            self.grid = Some(SpatialGrid::new(nx, ny, grid_w, grid_h, CELL_MAX_PARTICLES));
        } else {
            debug!("init: grid dimensions unchanged, keeping cell table");
        }
    }

    /// Update domain bounds, inset by a small interior margin. The grid
    /// keeps the extent it was built with.
    pub fn resize(&mut self, left: FT, right: FT, bottom: FT, top: FT) {
        let scale = self.params.scale;
        self.bounds = DomainBounds {
            xmin: (left + RESIZE_MARGIN_PX) / scale,
            xmax: (right - RESIZE_MARGIN_PX) / scale,
            ymin: (bottom + RESIZE_MARGIN_PX) / scale,
            ymax: (top - RESIZE_MARGIN_PX) / scale,
        };
        debug!("resize: domain now {:?}", self.bounds);
    }

    /// Drop particles, sources and sinks and disarm the pending velocity
    /// override. The grid is kept; only its counts are zeroed.
    pub fn cleanup(&mut self) {
        self.particles.truncate(0);
        self.sources.clear();
        self.sinks.clear();
        self.forced_velocity.armed = false;
        self.forced_velocity.cell = None;
        if let Some(grid) = &mut self.grid {
            grid.reset();
        }
        debug!("cleanup: particles, sources and sinks dropped");
    }

    /// Drop particles but keep sources, sinks and colliders.
    pub fn clear_particles_only(&mut self) {
        self.particles.truncate(0);
    }

    /**
     * Reallocate the particle population to exactly `n` randomly placed
     * particles (no-op when the count already matches).
     */
    pub fn set_num_particles(&mut self, n: usize) {
        let n = n.min(SIM_MAX_PARTICLES);
        if n == self.particles.len() {
            return;
        }
        debug!("reallocating particle population: {} -> {}", self.particles.len(), n);

        let mass = self.fluid.particle_mass;
        let bounds = self.bounds;
        self.particles = ParticleVec::default(0);
        for _ in 0..n {
            let position = vec2f(
                self.rng.gen_range(bounds.xmin..=bounds.xmax),
                self.rng.gen_range(bounds.ymin..=bounds.ymax),
            );
            self.particles.push(position, zero(), mass);
        }
    }

    pub fn set_fluid_properties(&mut self, fluid: FluidParams) {
        self.fluid = fluid;
    }

    pub fn fluid_properties(&self) -> FluidParams {
        self.fluid
    }

    /// Tangential velocity scale on obstacle contact, clamped to `[0, 1]`.
    pub fn set_friction(&mut self, friction: FT) {
        self.params.friction = friction.clamp(0., 1.);
    }

    // ------------------------------------------------------------------
    // scene

    pub fn add_static_object(&mut self, collider: StaticCollider) {
        self.colliders.push(collider);
    }

    /**
     * Remove the first collider comparing equal to `collider`. Sources and
     * sinks attached to it are dropped with it; attachments to later
     * colliders are re-pointed at their shifted indices.
     */
    pub fn remove_static_object(&mut self, collider: &StaticCollider) -> bool {
        let index = match self.colliders.iter().position(|c| c == collider) {
            Some(index) => index,
            None => return false,
        };
        self.colliders.remove(index);

        self.sources.retain(|s| s.attached_plane.map_or(true, |(i, _)| i != index));
        self.sinks.retain(|s| s.attached_plane.map_or(true, |(i, _)| i != index));
        for source in &mut self.sources {
            if let Some((i, _)) = &mut source.attached_plane {
                if *i > index {
                    *i -= 1;
                }
            }
        }
        for sink in &mut self.sinks {
            if let Some((i, _)) = &mut sink.attached_plane {
                if *i > index {
                    *i -= 1;
                }
            }
        }
        true
    }

    /// Remove all colliders together with their attached sources and sinks.
    pub fn clear_static_objects(&mut self) {
        self.colliders.clear();
        self.sources.retain(|s| s.attached_plane.is_none());
        self.sinks.retain(|s| s.attached_plane.is_none());
    }

    pub fn get_static_colliders(&self) -> &[StaticCollider] {
        &self.colliders
    }

    /// Append one particle at an explicit position (simulation units).
    /// Returns false once the global particle cap is reached.
    pub fn add_particle(&mut self, position: V2, velocity: V2) -> bool {
        if self.particles.len() >= SIM_MAX_PARTICLES {
            return false;
        }
        self.particles.push(position, velocity, self.fluid.particle_mass);
        true
    }

    /// Add a pre-built source (point or line).
    pub fn add_source(&mut self, source: ParticleSource) {
        self.sources.push(source);
    }

    /// Line source at `position` (simulation units) emitting along `direction`.
    pub fn add_particle_source(
        &mut self,
        position: V2,
        direction: V2,
        length: FT,
        rate: FT,
        velocity_magnitude: FT,
    ) {
        self.add_source(ParticleSource::line(position, direction, length, rate, velocity_magnitude));
    }

    /// Source attached to one side of the rectangle collider at `plane_index`.
    /// Ignored when the index does not name a rectangle.
    pub fn add_particle_source_from_plane(
        &mut self,
        plane_index: usize,
        side: PlaneSide,
        rate: FT,
        velocity_magnitude: FT,
    ) {
        let rect = match self.colliders.get(plane_index).and_then(|c| c.as_rectangle()) {
            Some(rect) => rect,
            None => return,
        };
        self.sources
            .push(ParticleSource::from_plane(rect, plane_index, side, rate, velocity_magnitude));
    }

    pub fn get_particle_sources(&self) -> &[ParticleSource] {
        &self.sources
    }

    /// Add a pre-built sink.
    pub fn add_sink(&mut self, sink: ParticleSink) {
        self.sinks.push(sink);
    }

    /// Point sink at `position` (simulation units).
    pub fn add_particle_sink(&mut self, position: V2, rate: FT, range: FT) {
        self.add_sink(ParticleSink::point(position, rate, range));
    }

    /// Sink attached to one side of the rectangle collider at `plane_index`.
    pub fn add_particle_sink_from_plane(
        &mut self,
        plane_index: usize,
        side: PlaneSide,
        rate: FT,
        range: FT,
    ) {
        let rect = match self.colliders.get(plane_index).and_then(|c| c.as_rectangle()) {
            Some(rect) => rect,
            None => return,
        };
        self.sinks
            .push(ParticleSink::from_plane(rect, plane_index, side, rate, range));
    }

    pub fn get_particle_sinks(&self) -> &[ParticleSink] {
        &self.sinks
    }

    // ------------------------------------------------------------------
    // queries (positions cross the boundary in screen units, Y flipped)

    pub fn get_particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn get_particle_position(&self, i: usize) -> V2 {
        match self.particles.position.get(i) {
            Some(p) => vec2f(p.x * self.params.scale, (self.bounds.ymax - p.y) * self.params.scale),
            None => zero(),
        }
    }

    pub fn get_particle_velocity(&self, i: usize) -> V2 {
        self.particles.velocity.get(i).copied().unwrap_or_else(zero)
    }

    pub fn get_particle_pressure(&self, i: usize) -> FT {
        self.particles.pressure.get(i).copied().unwrap_or(0.)
    }

    pub fn get_particle_density(&self, i: usize) -> FT {
        self.particles.density.get(i).copied().unwrap_or(0.)
    }

    pub fn domain_bounds(&self) -> DomainBounds {
        self.bounds
    }

    /**
     * Schedule a one-shot velocity override for the cell under the screen
     * point `(x, y)`. Screen Y grows downward, so both the point and the
     * dragged velocity flip their Y component on the way in.
     */
    pub fn force_velocity(&mut self, x: FT, y: FT, dx: FT, dy: FT) {
        let scale = self.params.scale;
        let sim_x = x / scale;
        let sim_y = self.bounds.ymax - y / scale;
        let cell = self.grid.as_ref().and_then(|g| g.cell_index(sim_x, sim_y));
        self.forced_velocity = ForcedVelocity {
            cell,
            velocity: vec2f(dx, -dy),
            armed: true,
        };
    }

    // ------------------------------------------------------------------
    // tick

    /// Advance one tick with the fixed timestep. No-op before `init`.
    pub fn do_physics(&mut self) {
        let mut grid = match self.grid.take() {
            Some(grid) => grid,
            None => return,
        };
        let now_ms = self.clock.now_ms();

        grid.reset();
        self.emit_particles(now_ms);
        self.drain_particles(now_ms);
        for i in 0..self.particles.len() {
            grid.bind(i, self.particles.position[i]);
        }

        self.density_pass(&grid);
        self.pressure_update();
        self.force_pass(&grid);
        self.apply_forced_velocity(&grid);

        grid.reset();
        self.integrate();
        for i in 0..self.particles.len() {
            grid.bind(i, self.particles.position[i]);
        }

        self.grid = Some(grid);
    }

    fn emit_particles(&mut self, now_ms: f64) {
        let mass = self.fluid.particle_mass;
        let bounds = self.bounds;
        for source in &mut self.sources {
            if self.particles.len() >= SIM_MAX_PARTICLES {
                break;
            }
            if let Some(emitted) = source.emit(now_ms, &mut self.rng) {
                // rate counts attempts: a rejected sample still consumed
                // this interval
                if bounds.contains(emitted.position) {
                    self.particles.push(emitted.position, emitted.velocity, mass);
                }
            }
        }
    }

    fn drain_particles(&mut self, now_ms: f64) {
        for sink in &mut self.sinks {
            if !sink.ready(now_ms) {
                continue;
            }
            // at most one removal per sink per interval
            let eligible = (0..self.particles.len())
                .find(|&i| sink.is_eligible(self.particles.position[i]));
            if let Some(i) = eligible {
                self.particles.swap_remove(i);
                sink.mark_drained(now_ms);
            }
        }
    }

    fn density_pass(&mut self, grid: &SpatialGrid) {
        let ParticleVec {
            position,
            density,
            mass,
            ..
        } = &mut self.particles;
        let position: &[V2] = position;
        let mass: &[FT] = mass;

        grid.for_each_pair(|i, j| {
            let r_sq = (position[i] - position[j]).norm_squared();
            if r_sq < H_SQ {
                let w = poly6(r_sq);
                density[i] += mass[j] * w;
                density[j] += mass[i] * w;
            }
        });
    }

    fn pressure_update(&mut self) {
        let k = self.fluid.gas_constant;
        let rest_density = self.fluid.rest_density;
        for i in 0..self.particles.len() {
            self.particles.pressure[i] = FT::max(0., k * (self.particles.density[i] - rest_density));
        }
    }

    fn force_pass(&mut self, grid: &SpatialGrid) {
        let viscosity = self.fluid.viscosity;
        let ParticleVec {
            position,
            velocity,
            force,
            density,
            pressure,
            mass,
        } = &mut self.particles;
        let position: &[V2] = position;
        let velocity: &[V2] = velocity;
        let density: &[FT] = density;
        let pressure: &[FT] = pressure;
        let mass: &[FT] = mass;

        grid.for_each_pair(|i, j| {
            let diff = position[i] - position[j];
            let r_sq = diff.norm_squared();
            if r_sq < H_SQ {
                let r = r_sq.sqrt() + DISTANCE_EPS;

                // only the neighbor density appears in both denominators
                let f_press = mass[j] * (pressure[i] + pressure[j]) / (2. * density[j]) * spiky_grad2(r);
                let f_visc = viscosity * mass[j] * visc_lapl(r) / density[j];

                let pair_force = diff * f_press + (velocity[j] - velocity[i]) * f_visc;
                force[i] += pair_force;
                force[j] -= pair_force;
            }
        });
    }

    fn apply_forced_velocity(&mut self, grid: &SpatialGrid) {
        if !self.forced_velocity.armed {
            return;
        }
        if let Some(cell) = self.forced_velocity.cell {
            let target = self.forced_velocity.velocity;
            for &p in grid.cell_particles(cell) {
                self.particles.velocity[p as usize] = target;
                self.particles.force[p as usize] = zero();
            }
        }
        self.forced_velocity.armed = false;
    }

    fn integrate(&mut self) {
        let dt = self.params.dt;
        let friction = self.params.friction;
        let bounds = self.bounds;
        let colliders = &self.colliders;
        let ParticleVec {
            position,
            velocity,
            force,
            density,
            pressure,
            mass,
        } = &mut self.particles;

        for i in 0..position.len() {
            // Boundary repulsion feeds the acceleration of this step, so it
            // has to precede the force readout.
            let press_over_rho = pressure[i] / density[i];
            let sides = [
                (position[i].x - bounds.xmin, vec2f(1., 0.)),
                (bounds.xmax - position[i].x, vec2f(-1., 0.)),
                (position[i].y - bounds.ymin, vec2f(0., 1.)),
                (bounds.ymax - position[i].y, vec2f(0., -1.)),
            ];
            for (dist, inward) in sides {
                if dist > 0. && dist < H {
                    let magnitude = (mass[i] * press_over_rho * spiky_grad2(dist) * dist).abs();
                    force[i] += inward * magnitude;
                }
            }

            // symplectic Euler with a hard speed bound
            let accel = force[i] / density[i];
            velocity[i] += accel * dt;
            let speed = velocity[i].norm();
            if speed > V_MAX {
                velocity[i] *= V_MAX / speed;
            }
            position[i] += velocity[i] * dt;

            // project out of penetrated colliders; inbound normal velocity
            // is killed, the tangential remainder scaled by friction
            for collider in colliders {
                let d = collider.distance_to(position[i]);
                if d >= 0. {
                    continue;
                }
                let grad = collider.finite_diff_gradient(position[i], SDF_GRADIENT_EPS);
                let normal = grad / (grad.norm() + SDF_GRADIENT_EPS);
                position[i] += normal * (-d + COLLISION_MARGIN);
                let v_n = velocity[i].dot(&normal);
                if v_n < 0. {
                    velocity[i] = (velocity[i] - normal * v_n) * friction;
                }
            }

            // domain boundary: reflect the offending component, clamp back
            if position[i].x <= bounds.xmin {
                velocity[i].x = -velocity[i].x * BOUNDARY_DAMPING;
                position[i].x = bounds.xmin + BOUNDARY_MARGIN;
            } else if position[i].x >= bounds.xmax {
                velocity[i].x = -velocity[i].x * BOUNDARY_DAMPING;
                position[i].x = bounds.xmax - BOUNDARY_MARGIN;
            }
            if position[i].y <= bounds.ymin {
                velocity[i].y = -velocity[i].y * BOUNDARY_DAMPING;
                position[i].y = bounds.ymin + BOUNDARY_MARGIN;
            } else if position[i].y >= bounds.ymax {
                velocity[i].y = -velocity[i].y * BOUNDARY_DAMPING;
                position[i].y = bounds.ymax - BOUNDARY_MARGIN;
            }

            // accumulators for the next tick
            force[i] = zero();
            density[i] = mass[i] * poly6(0.);
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation::new()
    }
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    (a - b).abs() <= tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    assert!(
        is_ft_approx_eq(a, b, tolerance),
        "assertion failed: {} != {} (tolerance {}): {}",
        a,
        b,
        tolerance,
        s()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sdf::PlaneSide;
    use crate::vec3f;

    const DT: FT = 0.015;

    /// Simulation over the domain `[0, 20] x [0, 20]` with a manual clock.
    fn test_sim(seed: u64) -> (Simulation, ManualClock) {
        let clock = ManualClock::new();
        let mut sim = Simulation::with_clock(Box::new(clock.clone()), seed);
        sim.init(600., 600., 0., 600., 0., 600.);
        (sim, clock)
    }

    fn tick(sim: &mut Simulation, clock: &ManualClock) {
        clock.advance(15.);
        sim.do_physics();
    }

    #[test]
    fn do_physics_before_init_is_a_noop() {
        let mut sim = Simulation::with_seed(1);
        sim.do_physics();
        assert_eq!(sim.get_particle_count(), 0);
    }

    #[test]
    fn single_pair_density() {
        let (mut sim, _clock) = test_sim(1);
        sim.add_particle(vec2f(0.5, 0.5), zero());
        sim.add_particle(vec2f(0.7, 0.5), zero());

        let mut grid = sim.grid.take().unwrap();
        grid.reset();
        for i in 0..sim.particles.len() {
            grid.bind(i, sim.particles.position[i]);
        }
        sim.density_pass(&grid);

        let expected = poly6(0.) + poly6(0.04);
        for i in 0..2 {
            assert_ft_approx_eq(sim.particles.density[i], expected, 1e-4, || {
                format!("density of particle {}", i)
            });
        }
    }

    #[test]
    fn pressure_is_clamped_nonnegative() {
        let (mut sim, _clock) = test_sim(1);
        // a lone particle sits below rest density
        sim.add_particle(vec2f(10., 10.), zero());
        sim.pressure_update();
        assert_eq!(sim.get_particle_pressure(0), 0.);
    }

    #[test]
    fn pair_forces_are_equal_and_opposite() {
        let (mut sim, _clock) = test_sim(1);
        sim.add_particle(vec2f(9.9, 10.), zero());
        sim.add_particle(vec2f(10.1, 10.), zero());

        let mut grid = sim.grid.take().unwrap();
        grid.reset();
        for i in 0..sim.particles.len() {
            grid.bind(i, sim.particles.position[i]);
        }
        sim.density_pass(&grid);
        sim.pressure_update();
        sim.force_pass(&grid);

        let sum = sim.particles.force[0] + sim.particles.force[1];
        assert_ft_approx_eq(sum.norm(), 0., 1e-5, || "momentum balance".to_string());

        // pressure pushes the pair apart
        assert!(sim.particles.force[0].x < 0.);
        assert!(sim.particles.force[1].x > 0.);
    }

    #[test]
    fn circle_ejection() {
        let (mut sim, clock) = test_sim(1);
        sim.add_static_object(StaticCollider::circle(vec2f(5., 5.), 1., vec3f(1., 1., 1.)));
        sim.add_particle(vec2f(5., 5.), zero());

        tick(&mut sim, &clock);

        let offset = sim.particles.position[0] - vec2f(5., 5.);
        assert_ft_approx_eq(offset.norm(), 1.01, 0.01, || "ejection distance".to_string());
        assert_eq!(sim.get_particle_velocity(0), zero::<V2>());
    }

    #[test]
    fn collision_resolver_leaves_clear_particles_alone() {
        let (mut sim, clock) = test_sim(1);
        sim.add_static_object(StaticCollider::circle(vec2f(5., 5.), 1., vec3f(1., 1., 1.)));
        sim.add_particle(vec2f(8., 5.), zero());

        tick(&mut sim, &clock);

        // d >= 0.01 at (8, 5): the resolver must not have touched position
        assert_eq!(sim.particles.position[0], vec2f(8., 5.));
    }

    #[test]
    fn line_source_emits_at_rate() {
        let (mut sim, clock) = test_sim(42);
        sim.add_particle_source(vec2f(1., 5.), vec2f(1., 0.), 0., 1000., 2.);

        for _ in 0..10 {
            tick(&mut sim, &clock);
        }

        let count = sim.get_particle_count();
        assert!(count >= 8 && count <= 12, "count {}", count);
        let bounds = sim.bounds;
        for i in 0..count {
            assert!(bounds.contains(sim.particles.position[i]));
        }
    }

    #[test]
    fn point_source_emits_through_engine() {
        let (mut sim, clock) = test_sim(11);
        sim.add_source(ParticleSource::point(vec2f(10., 10.), 1., 1000., 0.));

        for _ in 0..5 {
            tick(&mut sim, &clock);
        }

        assert_eq!(sim.get_particle_count(), 5);
        for i in 0..5 {
            // spawned within the spawn radius, drift bounded by a few steps
            assert!((sim.particles.position[i] - vec2f(10., 10.)).norm() < 2.);
        }
    }

    #[test]
    fn zero_rate_source_emits_nothing() {
        let (mut sim, clock) = test_sim(1);
        sim.add_particle_source(vec2f(1., 5.), vec2f(1., 0.), 0., 0., 2.);
        for _ in 0..5 {
            tick(&mut sim, &clock);
        }
        assert_eq!(sim.get_particle_count(), 0);
    }

    #[test]
    fn sink_removes_at_most_one_per_interval() {
        let (mut sim, clock) = test_sim(7);
        sim.add_particle_sink(vec2f(10., 10.), 1000., 5.);

        for _ in 0..500 {
            let angle = sim.rng.gen_range::<FT, _>(0. ..crate::floating_type_mod::TAU);
            let radius = sim.rng.gen_range(0. ..5.0 as FT);
            sim.add_particle(vec2f(10. + angle.cos() * radius, 10. + angle.sin() * radius), zero());
        }

        tick(&mut sim, &clock);
        assert_eq!(sim.get_particle_count(), 499);
    }

    #[test]
    fn forced_velocity_is_one_shot() {
        let (mut sim, clock) = test_sim(1);
        let starts = [vec2f(5.2, 5.2), vec2f(5.4, 5.5), vec2f(5.7, 5.3)];
        for p in starts {
            sim.add_particle(p, zero());
        }

        let scale = sim.params.scale;
        sim.force_velocity(5.5 * scale, (20. - 5.5) * scale, 3., 0.);

        tick(&mut sim, &clock);

        for i in 0..3 {
            // the override replaced velocity and zeroed force, so the
            // particle drifted exactly one step at (3, 0)
            assert_eq!(sim.get_particle_velocity(i), vec2f(3., 0.));
            assert_ft_approx_eq(
                sim.particles.position[i].x,
                starts[i].x + 3. * DT,
                1e-4,
                || format!("drift of particle {}", i),
            );
            assert_ft_approx_eq(sim.particles.position[i].y, starts[i].y, 1e-4, || {
                format!("no cross drift of particle {}", i)
            });
        }
        assert!(!sim.forced_velocity.armed);

        // next tick evolves freely, nothing re-applies the override
        tick(&mut sim, &clock);
        assert!(!sim.forced_velocity.armed);
    }

    #[test]
    fn out_of_bounds_particle_is_pulled_back() {
        let (mut sim, clock) = test_sim(1);
        let xmax = sim.bounds.xmax;
        sim.add_particle(vec2f(xmax + 1., 5.), zero());

        tick(&mut sim, &clock);

        assert_ft_approx_eq(sim.particles.position[0].x, xmax - BOUNDARY_MARGIN, 1e-5, || {
            "clamped x".to_string()
        });
        assert_eq!(sim.particles.position[0].y, 5.);
    }

    #[test]
    fn invariants_hold_after_ticks() {
        let (mut sim, clock) = test_sim(99);
        sim.add_static_object(StaticCollider::circle(vec2f(10., 10.), 2., vec3f(1., 0., 0.)));
        sim.add_particle_source(vec2f(2., 10.), vec2f(1., 0.), 4., 200., 2.);
        sim.add_particle_sink(vec2f(18., 10.), 100., 2.);
        sim.set_num_particles(300);

        for _ in 0..20 {
            tick(&mut sim, &clock);
        }

        let bounds = sim.bounds;
        let floor = sim.fluid.particle_mass * poly6(0.);
        for i in 0..sim.get_particle_count() {
            let p = sim.particles.position[i];
            assert!(p.x >= bounds.xmin && p.x <= bounds.xmax);
            assert!(p.y >= bounds.ymin && p.y <= bounds.ymax);
            assert!(sim.particles.velocity[i].norm() <= V_MAX + 1e-4);
            assert!(sim.particles.density[i] >= floor - 1e-4);
            assert!(sim.particles.pressure[i] >= 0.);
            for collider in &sim.colliders {
                assert!(collider.distance_to(p) >= -1e-3);
            }
        }
    }

    #[test]
    fn stale_index_queries_return_defaults() {
        let (sim, _clock) = test_sim(1);
        assert_eq!(sim.get_particle_position(10), zero::<V2>());
        assert_eq!(sim.get_particle_velocity(10), zero::<V2>());
        assert_eq!(sim.get_particle_pressure(10), 0.);
        assert_eq!(sim.get_particle_density(10), 0.);
    }

    #[test]
    fn position_query_converts_to_screen_units() {
        let (mut sim, _clock) = test_sim(1);
        sim.add_particle(vec2f(5., 5.), zero());
        let screen = sim.get_particle_position(0);
        assert_eq!(screen, vec2f(150., 450.));
    }

    #[test]
    fn set_num_particles_reallocates_exactly() {
        let (mut sim, _clock) = test_sim(5);
        sim.set_num_particles(40);
        assert_eq!(sim.get_particle_count(), 40);

        let first_position = sim.particles.position[0];
        sim.set_num_particles(40);
        // no-op: the population was not reallocated
        assert_eq!(sim.particles.position[0], first_position);

        sim.set_num_particles(10);
        assert_eq!(sim.get_particle_count(), 10);

        let bounds = sim.bounds;
        for p in &sim.particles.position {
            assert!(bounds.contains(*p));
        }
    }

    #[test]
    fn cleanup_keeps_grid_and_colliders() {
        let (mut sim, clock) = test_sim(1);
        sim.add_static_object(StaticCollider::circle(vec2f(5., 5.), 1., vec3f(1., 1., 1.)));
        sim.add_particle_source(vec2f(1., 5.), vec2f(1., 0.), 0., 100., 1.);
        sim.add_particle_sink(vec2f(19., 5.), 100., 1.);
        sim.set_num_particles(10);

        sim.cleanup();

        assert_eq!(sim.get_particle_count(), 0);
        assert!(sim.get_particle_sources().is_empty());
        assert!(sim.get_particle_sinks().is_empty());
        assert_eq!(sim.get_static_colliders().len(), 1);

        // the engine keeps ticking on the retained grid
        tick(&mut sim, &clock);
    }

    #[test]
    fn removing_a_plane_drops_its_attachments() {
        let (mut sim, _clock) = test_sim(1);
        let rect0 = StaticCollider::rectangle(vec2f(2., 2.), vec2f(2., 2.), vec3f(1., 1., 1.));
        let rect1 = StaticCollider::rectangle(vec2f(8., 8.), vec2f(2., 2.), vec3f(0., 1., 0.));
        sim.add_static_object(rect0.clone());
        sim.add_static_object(rect1.clone());

        sim.add_particle_sink_from_plane(0, PlaneSide::Top, 10., 1.);
        sim.add_particle_source_from_plane(1, PlaneSide::Right, 10., 1.);
        sim.add_particle_source(vec2f(1., 1.), vec2f(1., 0.), 0., 10., 1.);

        assert!(sim.remove_static_object(&rect0));
        assert!(!sim.remove_static_object(&rect0));

        // sink attached to rect0 is gone; rect1's source re-pointed to index 0
        assert!(sim.get_particle_sinks().is_empty());
        assert_eq!(sim.get_particle_sources().len(), 2);
        let attached: Vec<_> = sim
            .get_particle_sources()
            .iter()
            .filter_map(|s| s.attached_plane)
            .collect();
        assert_eq!(attached, vec![(0, PlaneSide::Right)]);

        sim.clear_static_objects();
        assert_eq!(sim.get_particle_sources().len(), 1);
        assert!(sim.get_particle_sources()[0].attached_plane.is_none());
    }

    #[test]
    fn source_from_non_rectangle_is_ignored() {
        let (mut sim, _clock) = test_sim(1);
        sim.add_static_object(StaticCollider::circle(vec2f(5., 5.), 1., vec3f(1., 1., 1.)));
        sim.add_particle_source_from_plane(0, PlaneSide::Top, 10., 1.);
        sim.add_particle_source_from_plane(3, PlaneSide::Top, 10., 1.);
        assert!(sim.get_particle_sources().is_empty());
    }

    #[test]
    fn init_is_idempotent_on_unchanged_dimensions() {
        let (mut sim, _clock) = test_sim(1);
        sim.set_num_particles(5);
        sim.init(600., 600., 0., 600., 0., 600.);
        assert_eq!(sim.get_particle_count(), 5);

        // changed dimensions rebuild the grid; particles survive
        sim.init(900., 600., 0., 900., 0., 600.);
        assert_eq!(sim.grid.as_ref().unwrap().nx(), 30);
        assert_eq!(sim.get_particle_count(), 5);
    }

    #[test]
    fn resize_applies_interior_margin() {
        let (mut sim, _clock) = test_sim(1);
        sim.resize(0., 600., 0., 600.);
        let bounds = sim.bounds;
        assert_ft_approx_eq(bounds.xmin, 5. / 30., 1e-6, || "xmin".to_string());
        assert_ft_approx_eq(bounds.xmax, 595. / 30., 1e-6, || "xmax".to_string());
    }
}
