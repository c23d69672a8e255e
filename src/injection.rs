//! Injection parameters for a simulated binary black hole signal.

use serde::{Deserialize, Serialize};

use crate::conversion;
use crate::error::Result;
use crate::parameters::Parameters;

/// Keys a precessing binary black hole waveform model needs.
pub const REQUIRED_BBH_KEYS: [&str; 15] = [
    "mass_1",
    "mass_2",
    "a_1",
    "a_2",
    "tilt_1",
    "tilt_2",
    "phi_12",
    "phi_jl",
    "luminosity_distance",
    "theta_jn",
    "psi",
    "phase",
    "geocent_time",
    "ra",
    "dec",
];

/// The true source parameters of a simulated binary black hole merger.
///
/// Masses are detector-frame solar masses, distance is in Mpc, angles in
/// radians and `geocent_time` is a GPS time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryBlackHoleInjection {
    pub mass_1: f64,
    pub mass_2: f64,
    pub a_1: f64,
    pub a_2: f64,
    pub tilt_1: f64,
    pub tilt_2: f64,
    pub phi_12: f64,
    pub phi_jl: f64,
    pub luminosity_distance: f64,
    pub theta_jn: f64,
    pub psi: f64,
    pub phase: f64,
    pub geocent_time: f64,
    pub ra: f64,
    pub dec: f64,
}

impl Default for BinaryBlackHoleInjection {
    fn default() -> Self {
        Self {
            mass_1: 36.,
            mass_2: 29.,
            a_1: 0.4,
            a_2: 0.3,
            tilt_1: 0.5,
            tilt_2: 1.0,
            phi_12: 1.7,
            phi_jl: 0.3,
            luminosity_distance: 2000.,
            theta_jn: 0.4,
            psi: 2.659,
            phase: 1.3,
            geocent_time: 1126259642.413,
            ra: 1.375,
            dec: -1.2108,
        }
    }
}

impl BinaryBlackHoleInjection {
    fn values(&self) -> [f64; 15] {
        [
            self.mass_1,
            self.mass_2,
            self.a_1,
            self.a_2,
            self.tilt_1,
            self.tilt_2,
            self.phi_12,
            self.phi_jl,
            self.luminosity_distance,
            self.theta_jn,
            self.psi,
            self.phase,
            self.geocent_time,
            self.ra,
            self.dec,
        ]
    }

    pub fn to_parameters(&self) -> Parameters {
        REQUIRED_BBH_KEYS
            .iter()
            .copied()
            .zip(self.values())
            .collect()
    }

    /// Build the record from a parameter map.
    ///
    /// Component masses may be replaced by `chirp_mass` and `mass_ratio`.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let params = conversion::generate_mass_parameters(params);
        params.require(&REQUIRED_BBH_KEYS)?;
        let get = |key: &str| params.require_value(key);
        Ok(Self {
            mass_1: get("mass_1")?,
            mass_2: get("mass_2")?,
            a_1: get("a_1")?,
            a_2: get("a_2")?,
            tilt_1: get("tilt_1")?,
            tilt_2: get("tilt_2")?,
            phi_12: get("phi_12")?,
            phi_jl: get("phi_jl")?,
            luminosity_distance: get("luminosity_distance")?,
            theta_jn: get("theta_jn")?,
            psi: get("psi")?,
            phase: get("phase")?,
            geocent_time: get("geocent_time")?,
            ra: get("ra")?,
            dec: get("dec")?,
        })
    }

    pub fn chirp_mass(&self) -> f64 {
        conversion::chirp_mass(self.mass_1, self.mass_2)
    }

    pub fn mass_ratio(&self) -> f64 {
        conversion::mass_ratio(self.mass_1, self.mass_2)
    }
}
