use crate::{
    floating_type_mod::FT,
    perp,
    sdf::{PlaneSide, RectangleCollider},
    V2,
};

/**
 * Particle drain. A ready sink removes at most one eligible particle per
 * `1000/rate` ms interval, and its timestamp only advances on a successful
 * removal, so drain throughput is capped at `rate` particles per second.
 */
#[derive(Clone, Debug)]
pub struct ParticleSink {
    pub position: V2,

    /// Removal attempts per second. Nonpositive rates never drain.
    pub rate: FT,

    /// Capture distance: radial for point sinks, perpendicular for line sinks.
    pub range: FT,

    /// For line/plane sinks: unit direction along the capture segment and
    /// its length. `position` is the segment midpoint.
    pub line: Option<(V2, FT)>,

    /// Collider index + side this sink derives its geometry from; removed
    /// together with the collider.
    pub attached_plane: Option<(usize, PlaneSide)>,

    last_drain_ms: f64,
}

impl ParticleSink {
    pub fn point(position: V2, rate: FT, range: FT) -> ParticleSink {
        ParticleSink {
            position,
            rate,
            range,
            line: None,
            attached_plane: None,
            last_drain_ms: f64::NEG_INFINITY,
        }
    }

    /// Sink spanning one side of a rectangle collider.
    pub fn from_plane(
        rect: &RectangleCollider,
        plane_index: usize,
        side: PlaneSide,
        rate: FT,
        range: FT,
    ) -> ParticleSink {
        let (midpoint, outward, length) = rect.side_geometry(side);
        ParticleSink {
            position: midpoint,
            rate,
            range,
            line: Some((perp(outward), length)),
            attached_plane: Some((plane_index, side)),
            last_drain_ms: f64::NEG_INFINITY,
        }
    }

    /// Whether the rate interval has elapsed since the last removal.
    pub fn ready(&self, now_ms: f64) -> bool {
        if self.rate <= 0. {
            return false;
        }
        now_ms - self.last_drain_ms >= 1000. / self.rate as f64
    }

    pub fn is_eligible(&self, p: V2) -> bool {
        let offset = p - self.position;
        match self.line {
            None => offset.norm() <= self.range,
            Some((along, length)) => {
                let parallel = offset.dot(&along).abs();
                let perpendicular = offset.dot(&perp(along)).abs();
                perpendicular <= self.range && parallel <= length * 0.5
            }
        }
    }

    /// Record a successful removal; the next interval starts now.
    pub fn mark_drained(&mut self, now_ms: f64) {
        self.last_drain_ms = now_ms;
    }
}
