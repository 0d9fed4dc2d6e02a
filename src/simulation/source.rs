use rand::Rng;

use crate::{
    floating_type_mod::{FT, TAU},
    perp,
    sdf::{PlaneSide, RectangleCollider},
    vec2f, V2,
};

/// Jitter along the emission direction for line sources, simulation units.
pub const EMIT_JITTER: FT = 0.05;

/// Relative speed perturbation applied per velocity component.
pub const EMIT_SPEED_VARIATION: FT = 0.15;

/// Outward speed of particles leaving a point source.
const POINT_EMIT_SPEED: FT = 0.5;

#[derive(Clone, Debug)]
pub enum SourceShape {
    Point {
        spawn_radius: FT,
    },
    /// `direction` is the unit emission direction; the spawn segment of
    /// length `length` runs perpendicular to it through `position`.
    Line {
        direction: V2,
        length: FT,
    },
}

/// Position/velocity sample produced by one emission attempt.
#[derive(Clone, Copy, Debug)]
pub struct EmittedParticle {
    pub position: V2,
    pub velocity: V2,
}

/**
 * Particle emitter. Emission is rate-limited by timestamps: one attempt per
 * elapsed `1000/rate` ms interval. The timestamp advances on every attempt,
 * accepted or not, so the effective emission rate is at most the configured
 * one (out-of-domain samples are discarded by the engine).
 */
#[derive(Clone, Debug)]
pub struct ParticleSource {
    pub position: V2,
    pub shape: SourceShape,

    /// Emission attempts per second. Nonpositive rates never emit.
    pub rate: FT,

    /// Initial speed imparted to emitted particles (line sources).
    pub velocity_magnitude: FT,

    /// Collider index + side this source derives its geometry from. The
    /// relation is a lookup, not ownership: removing the collider removes
    /// the source.
    pub attached_plane: Option<(usize, PlaneSide)>,

    last_emit_ms: f64,
}

impl ParticleSource {
    pub fn line(position: V2, direction: V2, length: FT, rate: FT, velocity_magnitude: FT) -> ParticleSource {
        let dir_norm = direction.norm();
        let direction = if dir_norm > 0. {
            direction / dir_norm
        } else {
            vec2f(1., 0.)
        };
        ParticleSource {
            position,
            shape: SourceShape::Line { direction, length },
            rate,
            velocity_magnitude,
            attached_plane: None,
            last_emit_ms: f64::NEG_INFINITY,
        }
    }

    pub fn point(position: V2, spawn_radius: FT, rate: FT, velocity_magnitude: FT) -> ParticleSource {
        ParticleSource {
            position,
            shape: SourceShape::Point { spawn_radius },
            rate,
            velocity_magnitude,
            attached_plane: None,
            last_emit_ms: f64::NEG_INFINITY,
        }
    }

    /**
     * Source centered on one side of a rectangle collider, emitting outward
     * along the side normal over the full side length.
     */
    pub fn from_plane(
        rect: &RectangleCollider,
        plane_index: usize,
        side: PlaneSide,
        rate: FT,
        velocity_magnitude: FT,
    ) -> ParticleSource {
        let (midpoint, outward, length) = rect.side_geometry(side);
        ParticleSource {
            position: midpoint,
            shape: SourceShape::Line {
                direction: outward,
                length,
            },
            rate,
            velocity_magnitude,
            attached_plane: Some((plane_index, side)),
            last_emit_ms: f64::NEG_INFINITY,
        }
    }

    /**
     * One emission attempt. Returns a sample when the rate interval has
     * elapsed; the caller decides acceptance (domain bounds, particle cap).
     */
    pub fn emit(&mut self, now_ms: f64, rng: &mut impl Rng) -> Option<EmittedParticle> {
        if self.rate <= 0. {
            return None;
        }
        let interval_ms = 1000. / self.rate as f64;
        if now_ms - self.last_emit_ms < interval_ms {
            return None;
        }
        self.last_emit_ms = now_ms;

        Some(match self.shape {
            SourceShape::Line { direction, length } => {
                let u = rng.gen_range(-length * 0.5..=length * 0.5);
                let jitter = rng.gen_range(-EMIT_JITTER..=EMIT_JITTER);
                let position = self.position + perp(direction) * u + direction * jitter;
                let velocity = vec2f(
                    direction.x
                        * self.velocity_magnitude
                        * (1. + rng.gen_range(-EMIT_SPEED_VARIATION..=EMIT_SPEED_VARIATION)),
                    direction.y
                        * self.velocity_magnitude
                        * (1. + rng.gen_range(-EMIT_SPEED_VARIATION..=EMIT_SPEED_VARIATION)),
                );
                EmittedParticle { position, velocity }
            }
            SourceShape::Point { spawn_radius } => {
                let angle = rng.gen_range::<FT, _>(0. ..TAU);
                let radius = rng.gen_range(0. ..=spawn_radius);
                let outward = vec2f(angle.cos(), angle.sin());
                EmittedParticle {
                    position: self.position + outward * radius,
                    velocity: outward * POINT_EMIT_SPEED,
                }
            }
        })
    }
}
