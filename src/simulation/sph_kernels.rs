use crate::floating_type_mod::{FT, PI};

/// Kernel support radius. One simulation unit is one support radius, so the
/// spatial grid can use unit cells.
pub const H: FT = 1.;
pub const H_SQ: FT = H * H;

/// Bump added to a pair distance before it is used as a divisor.
pub const DISTANCE_EPS: FT = 1e-6;

/**
 * Poly6 density kernel evaluated on the squared distance.
 *
 * The coefficient is the classic 3D normalization `315/(64 pi H^9)` even
 * though the simulation is planar; the rest-density default is calibrated
 * against it, so both have to change together.
 */
pub fn poly6(r_sq: FT) -> FT {
    if r_sq < H_SQ {
        let v = H_SQ - r_sq;
        315. / (64. * PI * H.powi(9)) * v * v * v
    } else {
        0.
    }
}

/**
 * Scalar factor of the Spiky pressure gradient: multiplied with the pair
 * difference `p1 - p2` it yields the gradient vector used by the force pass.
 *
 * The coefficient is positive and the force pass pairs it with the
 * direction `p1 - p2`, which together push overlapping pairs apart. Callers
 * must pass `r` already bumped by [`DISTANCE_EPS`].
 */
pub fn spiky_grad2(r: FT) -> FT {
    if r < H {
        let v = H - r;
        45. / (PI * H.powi(6)) * v * v / r
    } else {
        0.
    }
}

/** Laplacian of the viscosity kernel, linear falloff over the support. */
pub fn visc_lapl(r: FT) -> FT {
    if r < H {
        45. / (PI * H.powi(5)) * (1. - r / H)
    } else {
        0.
    }
}

#[test]
fn poly6_normalization_test() {
    // The coefficient normalizes the kernel over the 3-ball; integrate in
    // spherical shells and check the volume integral comes out as 1.
    let shell_count = 4000;
    let dr = H / shell_count as FT;

    let mut integral: FT = 0.;
    for i in 0..shell_count {
        let r = (i as FT + 0.5) * dr;
        integral += poly6(r * r) * 4. * PI * r * r * dr;
    }

    println!("poly6 3-ball integral: {}", integral);
    crate::assert_ft_approx_eq(integral, 1.0, 0.001, || "poly6 normalization".to_string());
}

#[test]
fn poly6_support_test() {
    assert!(poly6(H_SQ) == 0.);
    assert!(poly6(H_SQ * 1.5) == 0.);
    assert!(poly6(0.) > 0.);

    // monotone falloff towards the support boundary
    let mut last = poly6(0.);
    for i in 1..=100 {
        let r = H * i as FT / 100.;
        let w = poly6(r * r);
        assert!(w <= last);
        last = w;
    }
}

#[test]
fn spiky_grad2_matches_spiky_derivative_test() {
    // spiky_grad2(r) * r is the magnitude of the gradient of the Spiky
    // kernel W(r) = 15/(pi H^6) (H - r)^3; compare against a central
    // difference of W.
    let spiky = |r: FT| {
        if r < H {
            let v = H - r;
            15. / (PI * H.powi(6)) * v * v * v
        } else {
            0.
        }
    };

    let diff = 1e-3;
    for i in 1..10 {
        let r = H * i as FT / 10.;
        let numeric = -(spiky(r + diff * 0.5) - spiky(r - diff * 0.5)) / diff;
        let analytic = spiky_grad2(r) * r;
        crate::assert_ft_approx_eq(analytic, numeric, 0.01, || {
            format!("spiky gradient magnitude at r={}", r)
        });
    }
}

#[test]
fn visc_lapl_falloff_test() {
    crate::assert_ft_approx_eq(visc_lapl(0.), 45. / (PI * H.powi(5)), 1e-4, || {
        "viscous Laplacian at r=0".to_string()
    });
    crate::assert_ft_approx_eq(visc_lapl(H * 0.5), 45. / (PI * H.powi(5)) * 0.5, 1e-4, || {
        "viscous Laplacian at r=H/2".to_string()
    });
    assert!(visc_lapl(H) == 0.);
}
