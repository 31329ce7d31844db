//! Configuration file parsing for the scatter estimation.
//!
//! One composed struct per component, so each component receives only the
//! parameters it owns.  Quantities with units are written as strings
//! (`ring_radius = "380 mm"`) and parsed through `uom`.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

use crate::Error;
use crate::image::MaskParameters;
use crate::physics::{EnergyResolution, EnergyWindow};
use crate::scanner::Scanner;

pub fn deserialize_uom<'d, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    <&str>::deserialize(deserializer)?
        .parse()
        .map_err(de::Error::custom)
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub scanner: Scanner,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
    #[serde(default)]
    pub masking: MaskConfig,
    #[serde(default)]
    pub tail_fit: TailFitConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    pub files: FilesConfig,
}

pub fn read_config_file(path: PathBuf) -> Result<Config, Error> {
    let config = fs::read_to_string(&path)
        .map_err(|e| format!("Couldn't read config file `{path:?}`: {e}"))?;
    Ok(toml::from_str(&config)?)
}

// --------------------------------------------------------------------------------
//                  Simulation

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {

    /// Name of the registered simulation method
    #[serde(default = "default_method")]
    pub method: String,

    /// Voxels at or below this attenuation (1/mm) never become scatter points
    #[serde(default = "default_attenuation_threshold")]
    pub attenuation_threshold: f32,

    /// Jitter each scatter point uniformly within its voxel.  Recommended:
    /// without it, discretisation artefacts are more visible.
    #[serde(default = "default_true")]
    pub random: bool,

    /// Seed for the jitter; fixed by default so reruns reproduce bit-wise
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Seed from the wall clock instead, making every run different
    #[serde(default)]
    pub seed_from_time: bool,

    /// Cache the line integrals (turn off only when short of memory)
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Subsampling zoom for the transverse plane (>= 1; larger is coarser)
    #[serde(default = "default_zoom")]
    pub zoom_xy: f32,

    /// Subsampling zoom for the axial direction
    #[serde(default = "default_zoom")]
    pub zoom_z: f32,

    /// Crystals per ring of the reduced scanner; derived from the zoomed
    /// voxel size when absent
    #[serde(default)]
    pub sub_num_dets_per_ring: Option<usize>,

    /// Rings of the reduced scanner; derived from the zoomed voxel size when
    /// absent
    #[serde(default)]
    pub sub_num_rings: Option<usize>,

    #[serde(default = "default_energy_window")]
    pub energy_window: EnergyWindow,

    #[serde(default = "default_energy_resolution")]
    pub energy_resolution: EnergyResolution,
}

fn default_method() -> String { "single-scatter".to_string() }
fn default_attenuation_threshold() -> f32 { 0.001 }
fn default_true() -> bool { true }
fn default_seed() -> u64 { 42 }
fn default_zoom() -> f32 { 3.0 }
fn default_energy_window() -> EnergyWindow { EnergyWindow { low: 425.0, high: 650.0 } }
fn default_energy_resolution() -> EnergyResolution {
    EnergyResolution { reference_energy: 511.0, fwhm_fraction: 0.22 }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            attenuation_threshold: default_attenuation_threshold(),
            random: true,
            seed: default_seed(),
            seed_from_time: false,
            use_cache: true,
            zoom_xy: default_zoom(),
            zoom_z: default_zoom(),
            sub_num_dets_per_ring: None,
            sub_num_rings: None,
            energy_window: default_energy_window(),
            energy_resolution: default_energy_resolution(),
        }
    }
}

// --------------------------------------------------------------------------------
//                  Reconstruction

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReconstructionConfig {
    /// Name of the registered reconstruction method
    #[serde(default = "default_recon_method")]
    pub method: String,
    /// Iterations per reconstruction call (for iterative methods)
    #[serde(default = "default_recon_iterations")]
    pub iterations: usize,
}

fn default_recon_method() -> String { "MLEM".to_string() }
fn default_recon_iterations() -> usize { 8 }

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self { method: default_recon_method(), iterations: default_recon_iterations() }
    }
}

// --------------------------------------------------------------------------------
//                  Masking

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct MaskConfig {
    /// Voxels outside [min_threshold, max_threshold] are zeroed ...
    #[serde(default = "default_mask_min")]
    pub min_threshold: f32,
    #[serde(default = "default_mask_max")]
    pub max_threshold: f32,
    /// ... and the rest remapped to (value + add_scalar) * times_scalar
    #[serde(default)]
    pub add_scalar: f32,
    #[serde(default = "default_one")]
    pub times_scalar: f32,
    /// Bins whose forward-projected mask value is at or below this belong to
    /// the tails
    #[serde(default = "default_tail_threshold")]
    pub tail_threshold: f32,
}

fn default_mask_min() -> f32 { 0.003 }
fn default_mask_max() -> f32 { f32::INFINITY }
fn default_one() -> f32 { 1.0 }
fn default_tail_threshold() -> f32 { 1e-4 }

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            min_threshold: default_mask_min(),
            max_threshold: default_mask_max(),
            add_scalar: 0.0,
            times_scalar: 1.0,
            tail_threshold: default_tail_threshold(),
        }
    }
}

impl From<&MaskConfig> for MaskParameters {
    fn from(config: &MaskConfig) -> Self {
        Self {
            min_threshold: config.min_threshold,
            max_threshold: config.max_threshold,
            add_scalar: config.add_scalar,
            times_scalar: config.times_scalar,
        }
    }
}

// --------------------------------------------------------------------------------
//                  Tail fitting

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct TailFitConfig {
    #[serde(default = "default_min_scale")]
    pub min_scale_factor: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale_factor: f32,
    /// Half width of the axial box filter applied to the scale factors
    #[serde(default = "default_half_filter_width")]
    pub half_filter_width: usize,
}

fn default_min_scale() -> f32 { 0.4 }
fn default_max_scale() -> f32 { 100.0 }
fn default_half_filter_width() -> usize { 1 }

impl Default for TailFitConfig {
    fn default() -> Self {
        Self {
            min_scale_factor: default_min_scale(),
            max_scale_factor: default_max_scale(),
            half_filter_width: default_half_filter_width(),
        }
    }
}

// --------------------------------------------------------------------------------
//                  Estimation pipeline

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplineOrder { Nearest, Linear, Cubic }

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct EstimationConfig {

    /// Number of simulate-fit-reconstruct rounds
    #[serde(default = "default_scatter_iterations")]
    pub scatter_iterations: usize,

    /// Average the activity estimates of the first two iterations before the
    /// third, damping oscillations of the coupled loop
    #[serde(default)]
    pub do_average_at_2: bool,

    /// Interpolation used when upsampling the low-resolution estimate
    #[serde(default = "default_spline")]
    pub spline: SplineOrder,

    /// Merge the interleaved tangential samples before interpolating
    #[serde(default)]
    pub remove_interleaving: bool,

    /// Write every intermediate artifact next to the outputs
    #[serde(default)]
    pub run_debug_mode: bool,

    /// Also export the scatter estimate of every iteration, not just the last
    #[serde(default)]
    pub export_scatter_estimates_of_each_iteration: bool,
}

fn default_scatter_iterations() -> usize { 5 }
fn default_spline() -> SplineOrder { SplineOrder::Linear }

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            scatter_iterations: default_scatter_iterations(),
            do_average_at_2: false,
            spline: default_spline(),
            remove_interleaving: false,
            run_debug_mode: false,
            export_scatter_estimates_of_each_iteration: false,
        }
    }
}

// --------------------------------------------------------------------------------
//                  Files

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {

    /// The measured (prompt) 3D projection data
    pub input_projdata: PathBuf,

    /// Attenuation image at 511 keV, in 1/mm
    pub atten_image: PathBuf,

    /// Detector normalisation factors; unit factors when absent
    #[serde(default)]
    pub norm_projdata: Option<PathBuf>,

    /// Background (randoms) estimate; zero when absent
    #[serde(default)]
    pub background_projdata: Option<PathBuf>,

    /// Initial activity estimate; uniform when absent
    #[serde(default)]
    pub initial_activity_image: Option<PathBuf>,

    /// Load the mask image instead of recomputing it from the attenuation
    #[serde(default)]
    pub mask_image: Option<PathBuf>,

    /// Load the mask projection data instead of recomputing them
    #[serde(default)]
    pub mask_projdata: Option<PathBuf>,

    /// Prefix for every file the run writes
    #[serde(default = "default_output_prefix")]
    pub output_prefix: PathBuf,
}

fn default_output_prefix() -> PathBuf { PathBuf::from("scatter") }

#[cfg(test)]
mod tests {
    use super::*;

    //  ---  Parse string as TOML  -------------------------
    fn parse<'d, D: Deserialize<'d>>(input: &'d str) -> D {
        toml::from_str(input).unwrap()
    }
    //  ---  Macro for concise assertions about values of parsed fields -------------------
    macro_rules! check {
        ($type:ident($text:expr).$field:ident = $expected:expr) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            assert_eq!(config.$field, $expected);
        };
        ($type:ident($text:expr) fields: $($field:ident = $expected:expr);+$(;)?) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            $(assert_eq!(config.$field, $expected);)*
        }
    }

    #[test]
    fn defaults_match_their_documentation() {
        check!{EstimationConfig("") fields:
               scatter_iterations = 5;
               do_average_at_2    = false;
               spline             = SplineOrder::Linear
        }
        check!{TailFitConfig("") fields:
               min_scale_factor  = 0.4;
               max_scale_factor  = 100.0;
               half_filter_width = 1
        }
        check!{SimulationConfig("") fields:
               method                = "single-scatter";
               attenuation_threshold = 0.001;
               random                = true;
               seed                  = 42;
               use_cache             = true
        }
    }

    #[test]
    fn scanner_quantities_carry_units() {
        use units::mm;
        let scanner: Scanner = parse(r#"
            num_rings = 4
            num_dets_per_ring = 192
            ring_radius = "32.5 cm"
            ring_spacing = "4.0 mm"
        "#);
        assert_eq!(scanner.ring_radius, mm(325.0));
        assert_eq!(scanner.ring_spacing, mm(4.0));
    }

    #[test]
    fn spline_order_parses_from_lowercase_names() {
        check!(EstimationConfig(r#"spline = "cubic""#).spline = SplineOrder::Cubic);
        check!(EstimationConfig(r#"spline = "nearest""#).spline = SplineOrder::Nearest);
    }

    // ----- Make sure that unknown fields are not accepted -----------------------------
    #[test]
    #[should_panic]
    fn reject_unknown_field() {
        let _: TailFitConfig = parse("unknown_field = 666");
    }

    #[test]
    fn whole_config_file_parses() {
        let config: Config = parse(r#"
            [scanner]
            num_rings = 8
            num_dets_per_ring = 64
            ring_radius = "200 mm"
            ring_spacing = "6 mm"

            [simulation]
            attenuation_threshold = 0.002
            zoom_xy = 2.0
            zoom_z = 2.0
            energy_window = { low = 430.0, high = 620.0 }

            [estimation]
            scatter_iterations = 3

            [files]
            input_projdata = "prompts.pd"
            atten_image = "mu_map.img"
            background_projdata = "randoms.pd"
        "#);
        assert_eq!(config.estimation.scatter_iterations, 3);
        assert_eq!(config.simulation.zoom_xy, 2.0);
        assert_eq!(config.simulation.energy_window, EnergyWindow { low: 430.0, high: 620.0 });
        assert_eq!(config.files.norm_projdata, None);
        assert_eq!(config.files.background_projdata, Some(PathBuf::from("randoms.pd")));
        // untouched sections fall back to their defaults
        assert_eq!(config.tail_fit.max_scale_factor, 100.0);
        assert_eq!(config.reconstruction.method, "MLEM");
    }
}
