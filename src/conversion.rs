//! Mass relations for compact binaries.
//!
//! Mass ratio follows the `q = m2 / m1 <= 1` convention.

use crate::parameters::Parameters;

pub fn total_mass(mass_1: f64, mass_2: f64) -> f64 {
    mass_1 + mass_2
}

pub fn chirp_mass(mass_1: f64, mass_2: f64) -> f64 {
    (mass_1 * mass_2).powf(0.6) / total_mass(mass_1, mass_2).powf(0.2)
}

pub fn mass_ratio(mass_1: f64, mass_2: f64) -> f64 {
    mass_2 / mass_1
}

pub fn symmetric_mass_ratio(mass_1: f64, mass_2: f64) -> f64 {
    mass_1 * mass_2 / total_mass(mass_1, mass_2).powi(2)
}

/// Component masses `(mass_1, mass_2)` from chirp mass and mass ratio.
pub fn component_masses(chirp_mass: f64, mass_ratio: f64) -> (f64, f64) {
    let total = chirp_mass * (1. + mass_ratio).powf(1.2) / mass_ratio.powf(0.6);
    let mass_1 = total / (1. + mass_ratio);
    (mass_1, mass_1 * mass_ratio)
}

/// Add every mass parameter that can be derived from those present.
///
/// Component masses take precedence over `chirp_mass`/`mass_ratio` when
/// both pairs are given.
pub fn generate_mass_parameters(params: &Parameters) -> Parameters {
    let mut out = params.clone();
    let components = match (params.get("mass_1"), params.get("mass_2")) {
        (Some(m1), Some(m2)) => Some((m1, m2)),
        _ => match (params.get("chirp_mass"), params.get("mass_ratio")) {
            (Some(mc), Some(q)) => Some(component_masses(mc, q)),
            _ => None,
        },
    };
    if let Some((m1, m2)) = components {
        out.insert("mass_1", m1);
        out.insert("mass_2", m2);
        out.insert("chirp_mass", chirp_mass(m1, m2));
        out.insert("mass_ratio", mass_ratio(m1, m2));
        out.insert("total_mass", total_mass(m1, m2));
        out.insert("symmetric_mass_ratio", symmetric_mass_ratio(m1, m2));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn equal_mass_binary() {
        assert_relative_eq!(symmetric_mass_ratio(30., 30.), 0.25);
        assert_relative_eq!(mass_ratio(30., 30.), 1.);
        assert_relative_eq!(chirp_mass(30., 30.), 30. * 0.25f64.powf(0.6), epsilon = 1e-12);
    }

    #[test]
    fn derives_components_from_chirp_mass() {
        let params = Parameters::from([("chirp_mass", 28.0), ("mass_ratio", 0.8)]);
        let converted = generate_mass_parameters(&params);
        let m1 = converted.get("mass_1").unwrap();
        let m2 = converted.get("mass_2").unwrap();
        assert_relative_eq!(chirp_mass(m1, m2), 28., epsilon = 1e-10);
        assert_relative_eq!(m2 / m1, 0.8, epsilon = 1e-12);
        assert!(converted.contains_key("symmetric_mass_ratio"));
    }

    #[test]
    fn leaves_unrelated_parameters_alone() {
        let params = Parameters::from([("mu", 1.0)]);
        assert_eq!(generate_mass_parameters(&params), params);
    }

    proptest! {
        #[test]
        fn component_mass_round_trip(m1 in 1f64..200f64, q in 0.05f64..1f64) {
            let m2 = m1 * q;
            let (a, b) = component_masses(chirp_mass(m1, m2), mass_ratio(m1, m2));
            prop_assert!((a - m1).abs() < 1e-8 * m1);
            prop_assert!((b - m2).abs() < 1e-8 * m1);
        }
    }
}
