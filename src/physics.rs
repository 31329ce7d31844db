//! Compton-scattering cross sections and the energy-dependent detection
//! efficiency model.
//!
//! Everything in this module is a pure function of its arguments: energies in
//! keV, cross sections in cm^2.  Callers guarantee `cos_theta` lies in
//! `[-1, 1]`.

use serde::Deserialize;

use crate::{Areaf32, Energyf32, Ratiof32};

/// Electron rest energy, in keV
pub const ELECTRON_REST_ENERGY: Energyf32 = 511.0;

/// Classical electron radius, in cm
const RE_CM: f64 = 2.818_070e-13;

/// FWHM of a Gaussian = 2 sqrt(2 ln 2) sigma
const FWHM_TO_SIGMA: f64 = 2.354_820_045;

/// Energy of a photon of energy `energy` after Compton scattering through an
/// angle with cosine `cos_theta`
pub fn photon_energy_after_compton_scatter(cos_theta: Ratiof32, energy: Energyf32) -> Energyf32 {
    energy / (1.0 + (energy / ELECTRON_REST_ENERGY) * (1.0 - cos_theta))
}

/// `photon_energy_after_compton_scatter` specialised to annihilation photons
pub fn photon_energy_after_compton_scatter_511kev(cos_theta: Ratiof32) -> Energyf32 {
    ELECTRON_REST_ENERGY / (2.0 - cos_theta)
}

/// Klein-Nishina differential cross section per electron, in cm^2/sr
pub fn dif_compton_cross_section(cos_theta: Ratiof32, energy: Energyf32) -> Areaf32 {
    let k = (energy / ELECTRON_REST_ENERGY) as f64;
    let cos_theta = cos_theta as f64;
    let sin_theta_squared = 1.0 - cos_theta * cos_theta;
    // ratio of scattered to incident photon energy
    let p = 1.0 / (1.0 + k * (1.0 - cos_theta));
    (0.5 * RE_CM * RE_CM * p * p * (p + 1.0 / p - sin_theta_squared)) as Areaf32
}

// Total Klein-Nishina cross section in units of 2 pi re^2, as a function of
// the photon energy in units of the electron rest energy.
fn total_cross_section_reduced(a: f64) -> f64 {
    let l = (1.0 + 2.0 * a).ln();
    (1.0 + a) / (a * a) * (2.0 * (1.0 + a) / (1.0 + 2.0 * a) - l / a)
        + l / (2.0 * a)
        - (1.0 + 3.0 * a) / ((1.0 + 2.0 * a) * (1.0 + 2.0 * a))
}

/// Total Compton cross section per electron at the given energy, in cm^2
pub fn total_compton_cross_section(energy: Energyf32) -> Areaf32 {
    let a = (energy / ELECTRON_REST_ENERGY) as f64;
    (2.0 * std::f64::consts::PI * RE_CM * RE_CM * total_cross_section_reduced(a)) as Areaf32
}

/// Total Compton cross section expressed relative to its value at 511 keV.
///
/// Shares the reduced form with `total_compton_cross_section`, so the ratio is
/// exact rather than a quotient of two separately rounded values.  At a = 1
/// the reduced form evaluates to (40 - 27 ln 3) / 18.
pub fn total_compton_cross_section_relative_to_511kev(energy: Energyf32) -> Ratiof32 {
    let a = (energy / ELECTRON_REST_ENERGY) as f64;
    let at_511kev = (40.0 - 27.0 * 3.0_f64.ln()) / 18.0;
    (total_cross_section_reduced(a) / at_511kev) as Ratiof32
}

// --------------------------------------------------------------------------------
//                  Detection efficiency

/// Acceptance window on the measured photon energy, in keV
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnergyWindow {
    pub low: Energyf32,
    pub high: Energyf32,
}

/// Gaussian energy-resolution model: the FWHM at `reference_energy` is
/// `fwhm_fraction * reference_energy`, and scales with the square root of the
/// photon energy.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnergyResolution {
    #[serde(default = "default_reference_energy")]
    pub reference_energy: Energyf32,
    pub fwhm_fraction: Ratiof32,
}

fn default_reference_energy() -> Energyf32 { ELECTRON_REST_ENERGY }

impl EnergyResolution {
    /// Gaussian sigma of the measured energy for a photon of energy `energy`
    pub fn sigma_at(&self, energy: Energyf32) -> Energyf32 {
        (self.fwhm_fraction as f64 * ((energy * self.reference_energy) as f64).sqrt()
         / FWHM_TO_SIGMA) as Energyf32
    }
}

/// Probability that a photon of true energy `energy` is measured inside
/// `window`, for the given energy resolution
pub fn detection_efficiency(
    energy: Energyf32,
    window: &EnergyWindow,
    resolution: &EnergyResolution,
) -> Ratiof32 {
    let sigma_times_sqrt2 = resolution.sigma_at(energy) as f64 * std::f64::consts::SQRT_2;
    (0.5 * (erf((window.high as f64 - energy as f64) / sigma_times_sqrt2)
          - erf((window.low  as f64 - energy as f64) / sigma_times_sqrt2))) as Ratiof32
}

/// Smallest scattered-photon energy which is still accepted: the energy whose
/// upper `nsigma` tail reaches the window's lower bound.
///
/// Solving E + nsigma sigma(E) = low with sigma(E) = c sqrt(E) is a quadratic
/// in sqrt(E).
pub fn energy_lower_limit(low: Energyf32, nsigma: Ratiof32, resolution: &EnergyResolution) -> Energyf32 {
    let c = nsigma as f64 * resolution.fwhm_fraction as f64
        * (resolution.reference_energy as f64).sqrt() / FWHM_TO_SIGMA;
    let u = 0.5 * (-c + (c * c + 4.0 * low as f64).sqrt());
    (u * u) as Energyf32
}

/// Cosine of the maximum scattering angle whose scattered annihilation photon
/// is still accepted by the window: scattering angles with a smaller cosine
/// lose too much energy to be detected.
///
/// May fall below -1, in which case no angle is excluded.
pub fn max_cos_angle(low: Energyf32, nsigma: Ratiof32, resolution: &EnergyResolution) -> Ratiof32 {
    2.0 - ELECTRON_REST_ENERGY / energy_lower_limit(low, nsigma, resolution)
}

/// Error function, via the Abramowitz & Stegun 7.1.26 rational approximation
/// (absolute error below 1.5e-7)
pub fn erf(x: f64) -> f64 {
    const A1: f64 =  0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 =  1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 =  1.061405429;
    const P : f64 =  0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn typical_resolution() -> EnergyResolution {
        EnergyResolution { reference_energy: 511.0, fwhm_fraction: 0.22 }
    }

    #[rstest(/**/ x,      expected,
             case( 0.0,   0.0),
             case( 0.5,   0.5204999),
             case( 1.0,   0.8427008),
             case( 2.0,   0.9953223),
             case(-1.0,  -0.8427008),
             case( 6.0,   1.0),
    )]
    fn erf_reference_values(x: f64, expected: f64) {
        assert_float_eq!(erf(x), expected, abs <= 2e-7);
    }

    #[test]
    fn no_scattering_means_no_energy_loss() {
        for energy in [100.0, 300.0, 511.0, 700.0] {
            assert_float_eq!(photon_energy_after_compton_scatter(1.0, energy), energy,
                             ulps <= 4);
        }
        assert_float_eq!(photon_energy_after_compton_scatter_511kev(1.0), 511.0, ulps <= 4);
    }

    #[test]
    fn backscatter_of_annihilation_photon_gives_one_third() {
        // cos theta = -1: E' = 511 / 3
        assert_float_eq!(photon_energy_after_compton_scatter_511kev(-1.0), 511.0 / 3.0,
                         ulps <= 4);
    }

    #[test]
    fn specialised_formula_agrees_with_general_one() {
        for cos_theta in [-1.0, -0.5, 0.0, 0.3, 0.99] {
            assert_float_eq!(photon_energy_after_compton_scatter(cos_theta, 511.0),
                             photon_energy_after_compton_scatter_511kev(cos_theta),
                             ulps <= 4);
        }
    }

    #[test]
    fn forward_scattering_dominates_at_511kev() {
        let forward  = dif_compton_cross_section( 0.99, 511.0);
        let oblique  = dif_compton_cross_section( 0.5 , 511.0);
        let sideways = dif_compton_cross_section( 0.0 , 511.0);
        let backward = dif_compton_cross_section(-1.0 , 511.0);
        assert!(forward > oblique && oblique > sideways);
        assert!(forward > backward);
    }

    #[test]
    fn total_cross_section_at_zero_energy_approaches_thomson() {
        // sigma_T = (8/3) pi re^2
        let thomson = 8.0 / 3.0 * std::f64::consts::PI * RE_CM * RE_CM;
        let low_energy = total_compton_cross_section(0.01) as f64;
        assert_float_eq!(low_energy, thomson, rel <= 1e-2);
    }

    proptest! {
        #[test]
        fn relative_cross_section_is_ratio_of_totals(energy in 50.0..700.0_f32) {
            let relative = total_compton_cross_section_relative_to_511kev(energy);
            let ratio = total_compton_cross_section(energy)
                      / total_compton_cross_section(511.0);
            prop_assert!((relative - ratio).abs() <= 1e-5 * ratio.abs());
        }

        #[test]
        fn total_cross_section_decreases_with_energy(energy in 50.0..700.0_f32) {
            prop_assert!(total_compton_cross_section(energy)
                       > total_compton_cross_section(energy + 10.0));
        }

        #[test]
        fn scattered_energy_decreases_with_angle(cos_theta in -1.0..0.99_f32) {
            let e_more_scattered = photon_energy_after_compton_scatter_511kev(cos_theta);
            let e_less_scattered = photon_energy_after_compton_scatter_511kev(cos_theta + 0.01);
            prop_assert!(e_more_scattered < e_less_scattered);
        }
    }

    #[test]
    fn efficiency_is_high_in_the_middle_of_a_wide_window() {
        let window = EnergyWindow { low: 100.0, high: 900.0 };
        let eff = detection_efficiency(511.0, &window, &typical_resolution());
        assert!(eff > 0.999, "efficiency {eff} should be close to 1");
    }

    #[test]
    fn efficiency_is_low_far_outside_the_window() {
        let window = EnergyWindow { low: 450.0, high: 650.0 };
        let eff = detection_efficiency(100.0, &window, &typical_resolution());
        assert!(eff < 1e-3, "efficiency {eff} should be close to 0");
    }

    #[test]
    fn perfect_resolution_recovers_the_window_bound() {
        let sharp = EnergyResolution { reference_energy: 511.0, fwhm_fraction: 0.0 };
        assert_float_eq!(energy_lower_limit(425.0, 3.0, &sharp), 425.0, ulps <= 4);
    }

    #[test]
    fn energy_lower_limit_sits_below_the_window_bound() {
        let res = typical_resolution();
        let low = 425.0;
        let e_min = energy_lower_limit(low, 3.0, &res);
        assert!(e_min < low);
        // and the gap is nsigma sigmas, evaluated at e_min
        assert_float_eq!(e_min + 3.0 * res.sigma_at(e_min), low, rel <= 1e-4);
    }

    #[test]
    fn max_cos_angle_round_trips_through_the_compton_formula() {
        let res = typical_resolution();
        let cos_limit = max_cos_angle(425.0, 3.0, &res);
        let energy_at_limit = photon_energy_after_compton_scatter_511kev(cos_limit);
        assert_float_eq!(energy_at_limit, energy_lower_limit(425.0, 3.0, &res), rel <= 1e-5);
    }
}
