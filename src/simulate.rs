//! Single-Compton-scatter simulation: for every detector pair of a template
//! geometry, estimate the coincidence rate due to photon pairs of which one
//! photon scattered exactly once.

use std::collections::HashMap;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use units::mm2_;

use crate::{Error, Muf32, Point, Vector, ratio_};
use crate::image::Image;
use crate::config::SimulationConfig;
use crate::integrals::{IntegralCache, integral_between_2_points};
use crate::physics::{
    ELECTRON_REST_ENERGY, EnergyResolution, EnergyWindow,
    detection_efficiency, dif_compton_cross_section, max_cos_angle,
    photon_energy_after_compton_scatter_511kev,
    total_compton_cross_section, total_compton_cross_section_relative_to_511kev,
};
use crate::projdata::{ProjData, Bin};
use crate::scanner::{DetectionPoints, ProjDataInfo, ViewSegment};
use crate::utils::group_digits;

/// A sampled scattering origin: a voxel of the (subsampled) attenuation image
/// whose density is high enough to matter
#[derive(Clone, Copy, Debug)]
pub struct ScatterPoint {
    pub coord: Point,
    pub mu_value: Muf32,
}

/// The capability interface behind which concrete simulation methods sit.
/// The orchestrator refreshes the activity estimate and re-runs the
/// simulation once per scatter iteration.
pub trait ScatterSimulator: Send {
    fn method_info(&self) -> String;
    fn set_activity_image(&mut self, image: Image);
    /// (Re)draw the scatter points; returns how many were sampled
    fn sample_scatter_points(&mut self) -> Result<usize, Error>;
    fn process_data(&mut self) -> Result<(ProjData, f64), Error>;
}

// --------------------------------------------------------------------------------
//                  Registry

pub struct SimulatorInputs {
    pub template: ProjDataInfo,
    pub attenuation_image: Image,
    pub density_image_for_scatter_points: Image,
}

pub type SimulatorConstructor =
    fn(&SimulationConfig, SimulatorInputs) -> Result<Box<dyn ScatterSimulator>, Error>;

/// Maps method names from the configuration to constructors.  Resolution
/// happens once, when the configuration is loaded.
pub struct SimulatorRegistry {
    constructors: HashMap<String, SimulatorConstructor>,
}

impl Default for SimulatorRegistry {
    fn default() -> Self {
        let mut registry = Self { constructors: HashMap::new() };
        registry.register("single-scatter", |config, inputs| {
            Ok(Box::new(SingleScatterSimulation::new(config, inputs)))
        });
        registry
    }
}

impl SimulatorRegistry {

    pub fn register(&mut self, name: &str, constructor: SimulatorConstructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn create(
        &self,
        config: &SimulationConfig,
        inputs: SimulatorInputs,
    ) -> Result<Box<dyn ScatterSimulator>, Error> {
        let constructor = self.constructors.get(&config.method)
            .ok_or_else(|| format!("unknown scatter simulation method `{}`", config.method))?;
        constructor(config, inputs)
    }
}

// --------------------------------------------------------------------------------
//                  Single-scatter simulation

pub struct SingleScatterSimulation {
    info: ProjDataInfo,
    activity_image: Option<Image>,
    attenuation_image: Image,
    density_image_for_scatter_points: Image,
    attenuation_threshold: Muf32,
    random: bool,
    rng: StdRng,
    window: EnergyWindow,
    resolution: EnergyResolution,
    /// smallest scattering-angle cosine whose scattered photon can still be
    /// detected; contributions beyond it are dropped without integrating
    cos_angle_cutoff: f32,
    scatter_points: Vec<ScatterPoint>,
    scatter_volume: f32,
    detection_points: DetectionPoints,
    // (ring, crystal) -> deduplicated detection-point index
    det_lookup: Option<Vec<usize>>,
    cache: IntegralCache,
}

impl SingleScatterSimulation {

    pub fn new(config: &SimulationConfig, inputs: SimulatorInputs) -> Self {
        let rng = match config.seed_from_time {
            // explicitly requested irreproducibility
            true => StdRng::seed_from_u64(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(config.seed)),
            false => StdRng::seed_from_u64(config.seed),
        };
        Self {
            info: inputs.template,
            activity_image: None,
            attenuation_image: inputs.attenuation_image,
            density_image_for_scatter_points: inputs.density_image_for_scatter_points,
            attenuation_threshold: config.attenuation_threshold,
            random: config.random,
            rng,
            window: config.energy_window,
            resolution: config.energy_resolution,
            cos_angle_cutoff: max_cos_angle(config.energy_window.low, 3.0,
                                            &config.energy_resolution),
            scatter_points: vec![],
            scatter_volume: 0.0,
            detection_points: DetectionPoints::default(),
            det_lookup: None,
            cache: IntegralCache::new(config.use_cache),
        }
    }

    /// Replace the attenuation image used for the line integrals.  The cached
    /// attenuation integrals become meaningless, so they are dropped.
    pub fn set_attenuation_image(&mut self, image: Image) {
        self.attenuation_image = image;
        self.cache.remove_cache_for_integrals_over_attenuation();
    }

    /// Replace the image from which scatter points are drawn.  Both caches
    /// are keyed on scatter-point indices, so they are dropped along with the
    /// stale points.
    pub fn set_density_image_for_scatter_points(&mut self, image: Image) {
        self.density_image_for_scatter_points = image;
        self.scatter_points.clear();
        self.cache.remove_cache_for_integrals_over_activity();
        self.cache.remove_cache_for_integrals_over_attenuation();
    }

    pub fn scatter_points(&self) -> &[ScatterPoint] { &self.scatter_points }

    // ----------------------------------------------------------------------------
    //                  Detection points

    fn ensure_detection_points(&mut self) {
        if self.det_lookup.is_some() { return }
        let scanner = self.info.scanner;
        let lookup = itertools::iproduct!(0..scanner.num_rings, 0..scanner.num_dets_per_ring)
            .map(|(ring, det)| {
                let coord = scanner.detector_coordinate(ring, det);
                self.detection_points.find_or_insert(coord)
            })
            .collect();
        self.det_lookup = Some(lookup);
    }

    fn det_point_index(&self, ring: usize, det: usize) -> usize {
        let lookup = self.det_lookup.as_ref().expect("detection points not initialised");
        lookup[ring * self.info.scanner.num_dets_per_ring + det]
    }

    // ----------------------------------------------------------------------------
    //                  Integrals

    fn integral_over_activity_image_between_scattpoint_det(&self, sp: usize, det: usize) -> f32 {
        let activity = self.activity_image.as_ref().expect("activity image not set");
        integral_between_2_points(activity,
                                  self.scatter_points[sp].coord,
                                  self.detection_points.get(det))
    }

    fn exp_integral_over_attenuation_image_between_scattpoint_det(&self, sp: usize, det: usize) -> f32 {
        let integral = integral_between_2_points(&self.attenuation_image,
                                                 self.scatter_points[sp].coord,
                                                 self.detection_points.get(det));
        (-integral).exp()
    }

    // ----------------------------------------------------------------------------
    //                  The estimate

    /// Geometric acceptance of a detector seen from `emis_point`: cosine of
    /// the incidence angle on the crystal face over the squared distance
    fn emis_to_det_solid_angle_factor(&self, emis_point: Point, detector_coord: Point) -> f64 {
        let to_det = detector_coord - emis_point;
        let dist_squared = mm2_(to_det.norm_squared());
        if dist_squared == 0.0 { return 0.0 }
        let normal = self.info.scanner.detector_normal(detector_coord);
        let cos_incidence = ratio_(normal.dot(to_det) / to_det.norm()).abs();
        cos_incidence as f64 / dist_squared as f64
    }

    /// Efficiency of an unscattered coincidence between two detection points;
    /// the baseline against which the scatter sum is normalised
    pub fn detection_efficiency_no_scatter(&self, det_num_a: usize, det_num_b: usize) -> f64 {
        let pa = self.detection_points.get(det_num_a);
        let pb = self.detection_points.get(det_num_b);
        let ab = pb - pa;
        let dist_squared = mm2_(ab.norm_squared());
        if dist_squared == 0.0 { return 0.0 }
        let cos_a = ratio_(self.info.scanner.detector_normal(pa).dot( ab) / ab.norm()).abs();
        let cos_b = ratio_(self.info.scanner.detector_normal(pb).dot(-ab) / ab.norm()).abs();
        let eff_511 = detection_efficiency(ELECTRON_REST_ENERGY, &self.window, &self.resolution) as f64;
        eff_511 * eff_511 * cos_a as f64 * cos_b as f64 / dist_squared as f64
    }

    /// Contribution of one scatter point to the coincidence rate of one
    /// detector pair.
    ///
    /// Each term corresponds to one assignment of the unscattered leg: the
    /// pair is emitted somewhere along that leg (the activity line integral),
    /// one photon reaches its detector at 511 keV, the other scatters at the
    /// scatter point and arrives with reduced energy.  Attenuation along the
    /// scattered leg is approximated by raising the 511 keV attenuation
    /// factor to the ratio of total cross sections at the two energies.
    pub fn single_scatter_estimate_for_one_scatter_point(
        &self,
        scatter_point_num: usize,
        det_num_a: usize,
        det_num_b: usize,
    ) -> f64 {
        let ScatterPoint { coord: scatter_point, mu_value } = self.scatter_points[scatter_point_num];
        let coord_a = self.detection_points.get(det_num_a);
        let coord_b = self.detection_points.get(det_num_b);

        let scatter_to_a = coord_a - scatter_point;
        let scatter_to_b = coord_b - scatter_point;
        if mm2_(scatter_to_a.norm_squared()) == 0.0 || mm2_(scatter_to_b.norm_squared()) == 0.0 {
            return 0.0;
        }

        let cos_theta = -ratio_(scatter_to_a.dot(scatter_to_b)
                                / (scatter_to_a.norm() * scatter_to_b.norm()));
        if cos_theta < self.cos_angle_cutoff { return 0.0 }

        let new_energy = photon_energy_after_compton_scatter_511kev(cos_theta);
        let eff_scattered = detection_efficiency(new_energy, &self.window, &self.resolution) as f64;
        if eff_scattered <= 0.0 { return 0.0 }
        let eff_511 = detection_efficiency(ELECTRON_REST_ENERGY, &self.window, &self.resolution) as f64;

        let emiss_to_a = self.cache.activity_value(
            scatter_point_num, det_num_a,
            || self.integral_over_activity_image_between_scattpoint_det(scatter_point_num, det_num_a));
        let emiss_to_b = self.cache.activity_value(
            scatter_point_num, det_num_b,
            || self.integral_over_activity_image_between_scattpoint_det(scatter_point_num, det_num_b));
        if emiss_to_a == 0.0 && emiss_to_b == 0.0 { return 0.0 }

        let atten_to_a = self.cache.attenuation_value(
            scatter_point_num, det_num_a,
            || self.exp_integral_over_attenuation_image_between_scattpoint_det(scatter_point_num, det_num_a));
        let atten_to_b = self.cache.attenuation_value(
            scatter_point_num, det_num_b,
            || self.exp_integral_over_attenuation_image_between_scattpoint_det(scatter_point_num, det_num_b));

        let relative_cross_section = total_compton_cross_section_relative_to_511kev(new_energy);
        let atten_to_a_scattered = (atten_to_a as f64).powf(relative_cross_section as f64);
        let atten_to_b_scattered = (atten_to_b as f64).powf(relative_cross_section as f64);

        // emission on the A leg: unscattered photon to A, scattered one to B
        let term_a = emiss_to_a as f64 * atten_to_a as f64 * atten_to_b_scattered
                   * eff_511 * eff_scattered;
        // and the mirror image
        let term_b = emiss_to_b as f64 * atten_to_b as f64 * atten_to_a_scattered
                   * eff_511 * eff_scattered;

        let omega_a = self.emis_to_det_solid_angle_factor(scatter_point, coord_a);
        let omega_b = self.emis_to_det_solid_angle_factor(scatter_point, coord_b);

        let differential = dif_compton_cross_section(cos_theta, ELECTRON_REST_ENERGY) as f64
                         / total_compton_cross_section(ELECTRON_REST_ENERGY) as f64;

        (term_a + term_b) * mu_value as f64 * differential * omega_a * omega_b
    }

    /// Single-scatter estimate for one detector pair: the sum over all
    /// scatter points, scaled by the per-point volume and normalised by the
    /// unscattered-pair efficiency.  Symmetric under swapping the detectors.
    pub fn scatter_estimate(&self, det_num_a: usize, det_num_b: usize) -> f64 {
        let mut scatter_ratio = 0.0;
        for scatter_point_num in 0..self.scatter_points.len() {
            scatter_ratio += self.single_scatter_estimate_for_one_scatter_point(
                scatter_point_num, det_num_a, det_num_b);
        }
        let baseline = self.detection_efficiency_no_scatter(det_num_a, det_num_b);
        if baseline == 0.0 { return 0.0 }
        scatter_ratio * self.scatter_volume as f64 / baseline
    }

    /// Scatter estimates for every bin of one (view, segment) unit; returns
    /// the sinograms' worth of values and their sum
    pub fn process_data_for_view_segment_num(&self, vs: ViewSegment) -> (Array2<f32>, f64) {
        let info = &self.info;
        let mut out = Array2::zeros((info.num_axial(vs.segment), info.num_tangential));
        let mut unit_total = 0.0;
        for axial in 0..info.num_axial(vs.segment) {
            let (ring_a, ring_b) = info.rings_for(vs.segment, axial);
            for (ti, tang) in info.tangential_positions().enumerate() {
                let (det_a, det_b) = info.det_pair_for(vs.view, tang);
                let estimate = self.scatter_estimate(
                    self.det_point_index(ring_a, det_a),
                    self.det_point_index(ring_b, det_b));
                out[(axial, ti)] = estimate as f32;
                unit_total += estimate;
            }
        }
        (out, unit_total)
    }
}

impl ScatterSimulator for SingleScatterSimulation {

    fn method_info(&self) -> String {
        "analytic single-scatter estimate (Watson)".to_string()
    }

    /// The activity caches are keyed on the activity image's content, so
    /// replacing it drops them.
    fn set_activity_image(&mut self, image: Image) {
        self.activity_image = Some(image);
        self.cache.remove_cache_for_integrals_over_activity();
    }

    fn sample_scatter_points(&mut self) -> Result<usize, Error> {
        // indices are about to change meaning
        self.cache.remove_cache_for_integrals_over_activity();
        self.cache.remove_cache_for_integrals_over_attenuation();
        self.scatter_points.clear();

        let density = &self.density_image_for_scatter_points;
        let fov = density.fov;
        for i in 0..fov.num_voxels() {
            let mu_value = density[i];
            if mu_value <= self.attenuation_threshold { continue }
            let centre = fov.voxel_centre1(i);
            let coord = if self.random {
                let jitter = |extent: units::Length, rng: &mut StdRng|
                    extent * (rng.gen::<f32>() - 0.5);
                let vs = fov.voxel_size;
                centre + Vector::new(jitter(vs.x, &mut self.rng),
                                     jitter(vs.y, &mut self.rng),
                                     jitter(vs.z, &mut self.rng))
            } else {
                centre
            };
            self.scatter_points.push(ScatterPoint { coord, mu_value });
        }
        self.scatter_volume = fov.voxel_volume();
        Ok(self.scatter_points.len())
    }

    fn process_data(&mut self) -> Result<(ProjData, f64), Error> {
        if self.activity_image.is_none() {
            return Err("scatter simulation: activity image not set".into());
        }
        if self.scatter_points.is_empty() {
            self.sample_scatter_points()?;
        }
        if self.scatter_points.is_empty() {
            return Err(format!(
                "scatter simulation: no voxel of the scatter-point image exceeds \
                 the attenuation threshold {}", self.attenuation_threshold).into());
        }
        self.ensure_detection_points();

        // Pre-populating makes the parallel loop below read-only.  The cache
        // has to be moved out while its fill closures borrow `self`.
        if self.cache.enabled() {
            let mut cache = std::mem::replace(&mut self.cache, IntegralCache::new(true));
            cache.populate(
                self.scatter_points.len(),
                self.detection_points.len(),
                |sp, det| self.integral_over_activity_image_between_scattpoint_det(sp, det),
                |sp, det| self.exp_integral_over_attenuation_image_between_scattpoint_det(sp, det),
            );
            self.cache = cache;
        }

        let units = self.info.view_segments();
        let progress = indicatif::ProgressBar::new(units.len() as u64)
            .with_message("simulating single scatter");

        #[cfg    (feature = "serial") ] let iter = units.    iter();
        #[cfg(not(feature = "serial"))] let iter = units.par_iter();

        let results: Vec<(ViewSegment, Array2<f32>, f64)> = iter
            .map(|&vs| {
                let (values, unit_total) = self.process_data_for_view_segment_num(vs);
                progress.inc(1);
                (vs, values, unit_total)
            })
            .collect();
        progress.finish_and_clear();

        let mut output = ProjData::zeros(self.info);
        let mut total = 0.0;
        for (vs, values, unit_total) in results {
            total += unit_total;
            for axial in 0..self.info.num_axial(vs.segment) {
                for (ti, tang) in self.info.tangential_positions().enumerate() {
                    output.set_value(
                        Bin { segment: vs.segment, view: vs.view, axial, tang },
                        values[(axial, ti)]);
                }
            }
        }
        println!("total scatter simulated over {} bins: {:.6e}",
                 group_digits(self.info.total_bins()), total);
        Ok((output, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::fov::FOV;
    use crate::scanner::Scanner;
    use float_eq::assert_float_eq;
    use units::mm;

    fn test_scanner() -> Scanner {
        Scanner {
            num_rings: 2,
            num_dets_per_ring: 12,
            ring_radius: mm(150.0),
            ring_spacing: mm(10.0),
        }
    }

    fn water_cylinder(fov: FOV, radius_mm: f32) -> Image {
        let mut image = Image::zeros(fov);
        for i in 0..fov.num_voxels() {
            let c = fov.voxel_centre1(i);
            let r = (units::mm_(c.x).powi(2) + units::mm_(c.y).powi(2)).sqrt();
            if r < radius_mm {
                image[i] = 0.0096; // water at 511 keV, 1/mm
            }
        }
        image
    }

    fn central_point_source(fov: FOV) -> Image {
        let mut image = Image::zeros(fov);
        let centre = [fov.n[0] / 2, fov.n[1] / 2, fov.n[2] / 2];
        image[centre] = 1.0;
        image
    }

    fn test_simulation(random: bool) -> SingleScatterSimulation {
        let config = SimulationConfig { random, ..Default::default() };
        let fov = FOV::new((mm(120.0), mm(120.0), mm(20.0)), (12, 12, 2));
        let inputs = SimulatorInputs {
            template: crate::scanner::ProjDataInfo::new_full(test_scanner()).ssrb(),
            attenuation_image: water_cylinder(fov, 40.0),
            density_image_for_scatter_points: water_cylinder(fov, 40.0),
        };
        let mut sim = SingleScatterSimulation::new(&config, inputs);
        sim.set_activity_image(central_point_source(fov));
        sim
    }

    #[test]
    fn sampling_respects_the_attenuation_threshold() {
        let mut sim = test_simulation(false);
        let n = sim.sample_scatter_points().unwrap();
        assert!(n > 0);
        for p in sim.scatter_points() {
            assert!(p.mu_value > sim.attenuation_threshold);
        }
    }

    #[test]
    fn threshold_above_all_densities_leaves_no_points_and_fails_fast() {
        let mut sim = test_simulation(false);
        sim.attenuation_threshold = 1.0; // far above water
        assert_eq!(sim.sample_scatter_points().unwrap(), 0);
        assert!(sim.process_data().is_err());
    }

    #[test]
    fn estimate_is_symmetric_in_the_detector_pair() {
        let mut sim = test_simulation(false);
        sim.sample_scatter_points().unwrap();
        sim.ensure_detection_points();
        for (a, b) in [(0, 6), (1, 17), (3, 20), (5, 11)] {
            let ab = sim.scatter_estimate(a, b);
            let ba = sim.scatter_estimate(b, a);
            assert_float_eq!(ab, ba, rel <= 1e-12);
        }
    }

    #[test]
    fn fixed_seed_reproduces_jittered_points() {
        let mut first = test_simulation(true);
        let mut second = test_simulation(true);
        first.sample_scatter_points().unwrap();
        second.sample_scatter_points().unwrap();
        assert_eq!(first.scatter_points().len(), second.scatter_points().len());
        for (p, q) in first.scatter_points().iter().zip(second.scatter_points()) {
            assert_eq!(units::mm_(p.coord.x), units::mm_(q.coord.x));
            assert_eq!(units::mm_(p.coord.z), units::mm_(q.coord.z));
        }
    }

    #[test]
    fn jitter_does_not_change_the_number_of_points() {
        let mut jittered = test_simulation(true);
        let mut centred  = test_simulation(false);
        let n_jittered = jittered.sample_scatter_points().unwrap();
        let n_centred  = centred .sample_scatter_points().unwrap();
        assert_eq!(n_jittered, n_centred);
        // and every jittered point stays inside the FOV
        let fov = jittered.density_image_for_scatter_points.fov;
        for p in jittered.scatter_points() {
            assert!(fov.voxel_at(p.coord).is_some(), "jittered point left the FOV");
        }
    }

    #[test]
    fn resampling_scatter_points_invalidates_the_caches() {
        let mut sim = test_simulation(false);
        sim.sample_scatter_points().unwrap();
        sim.ensure_detection_points();
        let (with_cold_cache, _) = sim.process_data_for_view_segment_num(
            ViewSegment { view: 0, segment: 0 });
        // process_data populates the cache; resampling must not leave stale entries
        let _ = sim.process_data().unwrap();
        sim.sample_scatter_points().unwrap();
        let (after_resample, _) = sim.process_data_for_view_segment_num(
            ViewSegment { view: 0, segment: 0 });
        for (a, b) in with_cold_cache.iter().zip(after_resample.iter()) {
            assert_float_eq!(*a, *b, rel <= 1e-5);
        }
    }

    #[test]
    fn simulated_scatter_is_positive_somewhere() {
        let mut sim = test_simulation(false);
        let (output, total) = sim.process_data().unwrap();
        assert!(total > 0.0, "a water cylinder around a point source must scatter");
        assert!(output.total() > 0.0);
        assert!(output.bins().all(|bin| output.value(bin) >= 0.0));
        assert!(output.bins().all(|bin| output.value(bin).is_finite()));
    }
}
