use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, vec2f, V2, V3};

/// Step used for finite-difference surface normals.
pub const SDF_GRADIENT_EPS: FT = 1e-4;

/**
 * Signed distance to a collider surface: negative strictly inside, zero on
 * the surface, positive outside.
 */
#[enum_dispatch]
pub trait SignedDistance {
    fn distance_to(&self, p: V2) -> FT;
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircleCollider {
    pub center: V2,
    pub radius: FT,
    pub color: V3,
}

impl SignedDistance for CircleCollider {
    fn distance_to(&self, p: V2) -> FT {
        (p - self.center).norm() - self.radius
    }
}

/// Axis-aligned rectangle; `min_corner` is the lower-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct RectangleCollider {
    pub min_corner: V2,
    pub size: V2,
    pub color: V3,
}

impl SignedDistance for RectangleCollider {
    fn distance_to(&self, p: V2) -> FT {
        let min = self.min_corner;
        let max = self.min_corner + self.size;

        if p.x > min.x && p.x < max.x && p.y > min.y && p.y < max.y {
            // inside: negated distance to the nearest edge
            let dist_to_edge = FT::min(
                FT::min(p.x - min.x, max.x - p.x),
                FT::min(p.y - min.y, max.y - p.y),
            );
            -dist_to_edge
        } else {
            let dx = FT::max(FT::max(min.x - p.x, 0.), p.x - max.x);
            let dy = FT::max(FT::max(min.y - p.y, 0.), p.y - max.y);
            vec2f(dx, dy).norm()
        }
    }
}

impl RectangleCollider {
    /**
     * Geometry of one side: midpoint, outward unit normal and side length.
     * Attached sources and sinks derive their placement from this.
     */
    pub fn side_geometry(&self, side: PlaneSide) -> (V2, V2, FT) {
        let min = self.min_corner;
        let size = self.size;
        match side {
            PlaneSide::Top => (
                vec2f(min.x + size.x * 0.5, min.y + size.y),
                vec2f(0., 1.),
                size.x,
            ),
            PlaneSide::Bottom => (vec2f(min.x + size.x * 0.5, min.y), vec2f(0., -1.), size.x),
            PlaneSide::Left => (vec2f(min.x, min.y + size.y * 0.5), vec2f(-1., 0.), size.y),
            PlaneSide::Right => (
                vec2f(min.x + size.x, min.y + size.y * 0.5),
                vec2f(1., 0.),
                size.y,
            ),
        }
    }
}

/// Side of a rectangle collider that a source or sink is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneSide {
    Top,
    Bottom,
    Left,
    Right,
}

/**
 * Static obstacle variants. The set is closed: dispatch happens by variant,
 * and both shapes ship together with the engine.
 */
#[enum_dispatch(SignedDistance)]
#[derive(Clone, Debug, PartialEq)]
pub enum StaticCollider {
    Circle(CircleCollider),
    Rectangle(RectangleCollider),
}

impl StaticCollider {
    pub fn circle(center: V2, radius: FT, color: V3) -> StaticCollider {
        assert!(radius > 0.);
        StaticCollider::Circle(CircleCollider {
            center,
            radius,
            color,
        })
    }

    pub fn rectangle(min_corner: V2, size: V2, color: V3) -> StaticCollider {
        assert!(size.x > 0. && size.y > 0.);
        StaticCollider::Rectangle(RectangleCollider {
            min_corner,
            size,
            color,
        })
    }

    pub fn color(&self) -> V3 {
        match self {
            StaticCollider::Circle(c) => c.color,
            StaticCollider::Rectangle(r) => r.color,
        }
    }

    pub fn as_rectangle(&self) -> Option<&RectangleCollider> {
        match self {
            StaticCollider::Rectangle(r) => Some(r),
            StaticCollider::Circle(_) => None,
        }
    }

    /**
     * One-sided finite-difference gradient of the signed distance. Forward
     * differences keep the gradient nonzero for a point sitting exactly on
     * a circle center, so the collision resolver always has an escape
     * direction.
     */
    pub fn finite_diff_gradient(&self, x: V2, eps: FT) -> V2 {
        let d0 = self.distance_to(x);
        vec2f(
            (self.distance_to(x + vec2f(eps, 0.)) - d0) / eps,
            (self.distance_to(x + vec2f(0., eps)) - d0) / eps,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    fn white() -> V3 {
        vec3f(1., 1., 1.)
    }

    #[test]
    fn circle_signed_distance() {
        let c = StaticCollider::circle(vec2f(5., 5.), 1., white());

        crate::assert_ft_approx_eq(c.distance_to(vec2f(5., 5.)), -1., 1e-5, || {
            "center".to_string()
        });
        crate::assert_ft_approx_eq(c.distance_to(vec2f(6., 5.)), 0., 1e-5, || {
            "surface".to_string()
        });
        crate::assert_ft_approx_eq(c.distance_to(vec2f(8., 5.)), 2., 1e-5, || {
            "outside".to_string()
        });
    }

    #[test]
    fn rectangle_signed_distance() {
        let r = StaticCollider::rectangle(vec2f(1., 1.), vec2f(4., 2.), white());

        // inside: nearest edge is the top one
        crate::assert_ft_approx_eq(r.distance_to(vec2f(3., 2.5)), -0.5, 1e-5, || {
            "inside".to_string()
        });
        // straight out of the right edge
        crate::assert_ft_approx_eq(r.distance_to(vec2f(7., 2.)), 2., 1e-5, || {
            "outside edge".to_string()
        });
        // diagonal out of the upper-right corner
        crate::assert_ft_approx_eq(
            r.distance_to(vec2f(6., 4.)),
            (2.0 as FT).sqrt(),
            1e-5,
            || "outside corner".to_string(),
        );
        crate::assert_ft_approx_eq(r.distance_to(vec2f(5., 3.)), 0., 1e-5, || {
            "corner on surface".to_string()
        });
    }

    #[test]
    fn gradient_nonzero_at_circle_center() {
        let c = StaticCollider::circle(vec2f(5., 5.), 1., white());
        let grad = c.finite_diff_gradient(vec2f(5., 5.), SDF_GRADIENT_EPS);

        // forward differences see both axes increase away from the center
        assert!(grad.norm() > 0.5);
    }

    #[test]
    fn gradient_matches_outward_direction() {
        let c = StaticCollider::circle(vec2f(0., 0.), 2., white());
        let grad = c.finite_diff_gradient(vec2f(3., 0.), SDF_GRADIENT_EPS);

        crate::assert_ft_approx_eq(grad.x, 1., 0.01, || "radial gradient x".to_string());
        crate::assert_ft_approx_eq(grad.y, 0., 0.01, || "radial gradient y".to_string());
    }

    #[test]
    fn rectangle_side_geometry() {
        let r = StaticCollider::rectangle(vec2f(2., 1.), vec2f(4., 2.), white());
        let rect = r.as_rectangle().unwrap();

        let (mid, dir, len) = rect.side_geometry(PlaneSide::Top);
        assert_eq!(mid, vec2f(4., 3.));
        assert_eq!(dir, vec2f(0., 1.));
        assert_eq!(len, 4.);

        let (mid, dir, len) = rect.side_geometry(PlaneSide::Left);
        assert_eq!(mid, vec2f(2., 2.));
        assert_eq!(dir, vec2f(-1., 0.));
        assert_eq!(len, 2.);
    }
}
