//! The iterative scatter-estimation pipeline: reconstruct a low-resolution
//! activity estimate, simulate single scatter on it, fit the simulated
//! sinograms to the tails of the measured data, feed the corrected data back
//! into the reconstruction, and finally upsample to the full 3-D geometry.
//!
//! All iterations run on axially rebinned (2-D) data; only the final
//! upsampling restores the oblique segments.

use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::Error;
use crate::config::{Config, SplineOrder, TailFitConfig};
use crate::image::Image;
use crate::projdata::{ProjData, SinogramFactors};
use crate::projector::{attenuation_factors, forward_project};
use crate::recon::{Reconstruction, ReconstructionRegistry};
use crate::scanner::{Axis, ProjDataInfo, subsample_projdata_info};
use crate::simulate::{ScatterSimulator, SimulatorInputs, SimulatorRegistry};
use crate::subsample::subsample_image;
use crate::utils::timing::Progress;

pub struct ScatterEstimationOutput {
    /// Full-resolution 3-D scatter estimate
    pub scatter: ProjData,
    /// Scatter + randoms: the additive term for a subsequent reconstruction
    pub additive: ProjData,
}

struct SetUpData {
    info_3d: ProjDataInfo,
    input_3d: ProjData,
    input_2d: ProjData,
    mult_3d: ProjData,
    mult_2d: ProjData,
    randoms_3d: ProjData,
    randoms_2d: ProjData,
    data_to_fit_3d: ProjData,
    data_to_fit_2d: ProjData,
    mask_projdata_3d: ProjData,
    mask_projdata_2d: ProjData,
    simulator: Box<dyn ScatterSimulator>,
    reconstruction: Box<dyn Reconstruction>,
    initial_activity: Image,
}

/// The orchestrator.  `set_up()` must succeed before `process_data()`; any
/// failure during set-up aborts the whole pipeline.
pub struct ScatterEstimation {
    config: Config,
    input_projdata: Option<ProjData>,
    atten_image: Option<Image>,
    norm_projdata: Option<ProjData>,
    background_projdata: Option<ProjData>,
    mask_image: Option<Image>,
    set_up_data: Option<SetUpData>,
}

impl ScatterEstimation {

    pub fn new(config: Config) -> Self {
        Self {
            config,
            input_projdata: None,
            atten_image: None,
            norm_projdata: None,
            background_projdata: None,
            mask_image: None,
            set_up_data: None,
        }
    }

    pub fn get_iterations_num(&self) -> usize { self.config.estimation.scatter_iterations }

    // Inputs may be handed over directly instead of being loaded from the
    // configured files; anything set here wins over the file.
    pub fn set_input_projdata(&mut self, data: ProjData) { self.input_projdata = Some(data) }
    pub fn set_attenuation_image(&mut self, image: Image) { self.atten_image = Some(image) }
    pub fn set_normalisation_projdata(&mut self, data: ProjData) { self.norm_projdata = Some(data) }
    pub fn set_background_projdata(&mut self, data: ProjData) { self.background_projdata = Some(data) }
    pub fn set_mask_image(&mut self, image: Image) { self.mask_image = Some(image) }

    fn output_path(&self, suffix: &str) -> PathBuf {
        output_path(&self.config.files.output_prefix, suffix)
    }

    /// Load or derive everything the iteration loop needs.
    pub fn set_up(
        &mut self,
        simulators: &SimulatorRegistry,
        reconstructions: &ReconstructionRegistry,
    ) -> Result<(), Error> {
        let mut timer = Progress::new();
        let config = &self.config;
        let files = &config.files;
        let debug = config.estimation.run_debug_mode;

        // --- measured data and attenuation ----------------------------------
        let input_3d = match self.input_projdata.take() {
            Some(data) => data,
            None => ProjData::from_file(&files.input_projdata)?,
        };
        if input_3d.info.rebinned {
            return Err("the input projection data must be 3-D (not axially rebinned)".into());
        }
        let info_3d = input_3d.info;
        let info_2d = info_3d.ssrb();

        let atten_image = match self.atten_image.take() {
            Some(image) => image,
            None => Image::from_raw_file(&files.atten_image)?,
        };

        timer.start("rebinning the measured data");
        let input_2d = input_3d.ssrb();
        timer.done();

        // --- multiplicative normalisation -----------------------------------
        // The 2-D factor is a rebinned combination of the 3-D parts:
        // detector efficiencies are averaged harmonically, attenuation
        // factors arithmetically.
        timer.start("computing attenuation and normalisation factors");
        let norm_3d = match self.norm_projdata.take() {
            Some(data) => data,
            None => match &files.norm_projdata {
                Some(path) => ProjData::from_file(path)?,
                None => {
                    let mut ones = ProjData::zeros(info_3d);
                    ones.map_in_place(|_| 1.0);
                    ones
                }
            },
        };
        if norm_3d.info != info_3d {
            return Err("normalisation projdata geometry differs from the input data".into());
        }
        let att_3d = attenuation_factors(&atten_image, info_3d);

        let invert_guarded = |v: f32| if v != 0.0 { 1.0 / v } else { 0.0 };
        let mut norm_2d = norm_3d.clone();
        norm_2d.map_in_place(invert_guarded);
        let mut norm_2d = norm_2d.ssrb_averaged();
        norm_2d.map_in_place(invert_guarded);

        let mut mult_2d = att_3d.ssrb_averaged();
        mult_2d.mul_assign(&norm_2d);

        let mut mult_3d = att_3d;
        mult_3d.mul_assign(&norm_3d);
        timer.done();

        // --- background (randoms) -------------------------------------------
        let randoms_3d = match self.background_projdata.take() {
            Some(data) => data,
            None => match &files.background_projdata {
                Some(path) => ProjData::from_file(path)?,
                None => ProjData::zeros(info_3d),
            },
        };
        if randoms_3d.info != info_3d {
            return Err("background projdata geometry differs from the input data".into());
        }
        let randoms_2d = randoms_3d.ssrb();

        let mut data_to_fit_3d = input_3d.clone();
        data_to_fit_3d.sub_assign(&randoms_3d);
        let mut data_to_fit_2d = input_2d.clone();
        data_to_fit_2d.sub_assign(&randoms_2d);

        // --- mask ------------------------------------------------------------
        let mask_image = match self.mask_image.take() {
            Some(image) => image,
            None => match &files.mask_image {
                Some(path) => Image::from_raw_file(path)?,
                None => {
                    let mut mask = atten_image.clone();
                    mask.apply_mask_in_place(&(&config.masking).into());
                    mask
                }
            },
        };
        if debug {
            mask_image.write_to_raw_file(&self.output_path("_mask.img"))?;
        }

        let tail = config.masking.tail_threshold;
        let to_tail_weights = |projected: &mut ProjData| {
            projected.map_in_place(|v| if v <= tail { 1.0 } else { 0.0 });
        };
        let (mask_projdata_3d, mask_projdata_2d) = match &files.mask_projdata {
            Some(path) => {
                let loaded = ProjData::from_file(path)?;
                if loaded.info != info_3d {
                    return Err("mask projdata geometry differs from the input data".into());
                }
                // a rebinned bin is tail only if every contribution was tail
                let mut rebinned = loaded.ssrb_averaged();
                rebinned.map_in_place(|v| if v >= 1.0 - 1e-6 { 1.0 } else { 0.0 });
                (loaded, rebinned)
            }
            None => {
                timer.start("projecting the mask image");
                let mut projected_3d = forward_project(&mask_image, info_3d);
                to_tail_weights(&mut projected_3d);
                let mut projected_2d = forward_project(&mask_image, info_2d);
                to_tail_weights(&mut projected_2d);
                timer.done();
                (projected_3d, projected_2d)
            }
        };
        if debug {
            mask_projdata_3d.to_file(&self.output_path("_mask.pd"))?;
        }

        // --- reduced geometry and simulator ----------------------------------
        let scanner = info_3d.scanner;
        let sub_vox_xy = atten_image.fov.voxel_size.x * config.simulation.zoom_xy;
        let sub_vox_z  = atten_image.fov.voxel_size.z * config.simulation.zoom_z;
        let sub_num_dets = config.simulation.sub_num_dets_per_ring.unwrap_or_else(|| {
            let n = scanner.vox_size_to_num_dets(sub_vox_xy, Axis::Transverse);
            (n.min(scanner.num_dets_per_ring)) & !1
        });
        let sub_num_rings = config.simulation.sub_num_rings.unwrap_or_else(|| {
            scanner.vox_size_to_num_dets(sub_vox_z, Axis::Axial)
                .clamp(1, scanner.num_rings)
        });
        let sub_info = subsample_projdata_info(&info_3d, sub_num_dets, sub_num_rings)?;

        timer.start("subsampling the attenuation image");
        let sub_atten_path = debug.then(|| self.output_path("_sub_atten.img"));
        let sub_atten = subsample_image(&atten_image,
                                        config.simulation.zoom_xy,
                                        config.simulation.zoom_z,
                                        sub_atten_path.as_deref())?;
        timer.done();

        let simulator = simulators.create(&config.simulation, SimulatorInputs {
            template: sub_info.ssrb(),
            attenuation_image: sub_atten.clone(),
            density_image_for_scatter_points: sub_atten.clone(),
        })?;
        println!("scatter simulation method: {}", simulator.method_info());

        // --- reconstruction --------------------------------------------------
        let recon_fov = sub_atten.fov;
        let reconstruction = reconstructions.create(&config.reconstruction, recon_fov)?;
        println!("reconstruction method: {}", reconstruction.method_info());

        let initial_activity = match &files.initial_activity_image {
            Some(path) => {
                let image = Image::from_raw_file(path)?;
                let image = if image.fov.n == recon_fov.n { image } else {
                    subsample_image(&image,
                                    config.simulation.zoom_xy,
                                    config.simulation.zoom_z,
                                    None)?
                };
                if image.fov.n != recon_fov.n {
                    return Err("initial activity image does not match the reduced FOV".into());
                }
                image
            }
            None => Image::ones(recon_fov),
        };

        self.set_up_data = Some(SetUpData {
            info_3d,
            input_3d,
            input_2d,
            mult_3d,
            mult_2d,
            randoms_3d,
            randoms_2d,
            data_to_fit_3d,
            data_to_fit_2d,
            mask_projdata_3d,
            mask_projdata_2d,
            simulator,
            reconstruction,
            initial_activity,
        });
        Ok(())
    }

    /// Run the iteration loop and the final upsampling; `set_up()` first.
    pub fn process_data(&mut self) -> Result<ScatterEstimationOutput, Error> {
        let config = self.config.clone();
        let estimation = &config.estimation;
        let out_path = |suffix: &str| output_path(&config.files.output_prefix, suffix);
        let d = self.set_up_data.as_mut()
            .ok_or("scatter estimation: set_up() must succeed before process_data()")?;
        if estimation.scatter_iterations == 0 {
            return Err("scatter estimation: at least one iteration is required".into());
        }

        let mut timer = Progress::new();
        let mut activity = d.initial_activity.clone();
        let mut first_iteration_activity: Option<Image> = None;
        let mut additive_2d = d.randoms_2d.clone();
        let mut scatter_2d: Option<ProjData> = None;

        for iteration in 0..estimation.scatter_iterations {
            println!("scatter iteration {} of {}", iteration + 1, estimation.scatter_iterations);

            timer.start("  reconstructing the activity estimate");
            activity = d.reconstruction.reconstruct(
                &d.input_2d, Some(&d.mult_2d), Some(&additive_2d), &activity)?;
            timer.done();

            if estimation.do_average_at_2 {
                match iteration {
                    0 => first_iteration_activity = Some(activity.clone()),
                    1 => {
                        let first = first_iteration_activity.take()
                            .expect("iteration 0 stored its activity estimate");
                        for (v, f) in activity.data.iter_mut().zip(first.data.iter()) {
                            *v = 0.5 * (*v + f);
                        }
                    }
                    _ => {}
                }
            }

            timer.start("  simulating single scatter");
            d.simulator.set_activity_image(activity.clone());
            let (scatter_lowres, total) = d.simulator.process_data()?;
            timer.done_with_message(&format!("  simulated scatter total {total:.6e}"));

            let fitted = upsample_and_fit_scatter_estimate(
                &scatter_lowres,
                d.input_2d.info,
                &d.data_to_fit_2d,
                &d.mask_projdata_2d,
                Some(&d.mult_2d),
                &config.tail_fit,
                estimation.spline,
                estimation.remove_interleaving,
            )?;

            if estimation.export_scatter_estimates_of_each_iteration || estimation.run_debug_mode {
                fitted.to_file(&out_path(&format!("_iter_{}.pd", iteration + 1)))?;
            }

            additive_2d = d.randoms_2d.clone();
            additive_2d.add_assign(&fitted);
            scatter_2d = Some(fitted);
        }

        // --- final upsampling to the oblique segments ------------------------
        let scatter_2d = scatter_2d.expect("the loop ran at least once");
        timer.start("upsampling the scatter estimate to 3-D");
        let scatter_3d = upsample_and_fit_scatter_estimate(
            &scatter_2d,
            d.info_3d,
            &d.data_to_fit_3d,
            &d.mask_projdata_3d,
            Some(&d.mult_3d),
            &config.tail_fit,
            estimation.spline,
            estimation.remove_interleaving,
        )?;
        timer.done();

        let mut additive = d.randoms_3d.clone();
        additive.add_assign(&scatter_3d);

        let measured_total = d.input_3d.total();
        if measured_total > 0.0 {
            println!("estimated scatter fraction: {:.3}",
                     scatter_3d.total() / measured_total);
        }

        scatter_3d.to_file(&out_path(".pd"))?;
        additive.to_file(&out_path("_additive.pd"))?;
        if estimation.run_debug_mode {
            d.input_2d.to_file(&out_path("_input_2d.pd"))?;
        }

        Ok(ScatterEstimationOutput { scatter: scatter_3d, additive })
    }
}

fn output_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

// --------------------------------------------------------------------------------
//                  Upsample and tail-fit

/// Upsample a coarse, axially rebinned scatter estimate onto `target_info`
/// and fit it to the tails of the measured data:
///
/// 1. interpolate segment 0 to the target's rebinned sampling
/// 2. expand to the oblique segments (inverse of the axial rebinning)
/// 3. apply the multiplicative `normalisation`, putting the estimate in
///    measured-data units
/// 4. per-sinogram scale factors against `data_to_fit` where
///    `tail_weights` > 0, clamped to the configured bounds
/// 5. box-filter the factors axially, then apply them
#[allow(clippy::too_many_arguments)]
pub fn upsample_and_fit_scatter_estimate(
    scatter: &ProjData,
    target_info: ProjDataInfo,
    data_to_fit: &ProjData,
    tail_weights: &ProjData,
    normalisation: Option<&ProjData>,
    tail_fit: &TailFitConfig,
    spline: SplineOrder,
    remove_interleaving: bool,
) -> Result<ProjData, Error> {
    if !scatter.info.rebinned {
        return Err("upsample_and_fit: the scatter estimate must be axially rebinned".into());
    }
    let target_2d = if target_info.rebinned { target_info } else { target_info.ssrb() };

    let mut source = scatter.segment(0).clone();
    if remove_interleaving {
        merge_interleaved_tangentials(&mut source);
    }

    let interpolated = interpolate_sinograms(&source, scatter.info, target_2d, spline);
    let mut upsampled_2d = ProjData::zeros(target_2d);
    upsampled_2d.segment_mut(0).assign(&interpolated);

    let mut upsampled = if target_info.rebinned {
        upsampled_2d
    } else {
        upsampled_2d.inverse_ssrb(target_info)
    };

    if let Some(normalisation) = normalisation {
        upsampled.mul_assign(normalisation);
    }

    let mut factors = get_scale_factors_per_sinogram(data_to_fit, &upsampled, tail_weights);
    factors.clamp(tail_fit.min_scale_factor, tail_fit.max_scale_factor);
    factors.filter_axially(tail_fit.half_filter_width);
    upsampled.scale_sinograms(&factors);
    Ok(upsampled)
}

/// Raw per-sinogram scale factor: the ratio of measured to simulated counts
/// in the tail region.  Sinograms with no simulated counts in the tails keep
/// a factor of 1.
pub fn get_scale_factors_per_sinogram(
    data_to_fit: &ProjData,
    scatter: &ProjData,
    tail_weights: &ProjData,
) -> SinogramFactors {
    assert_eq!(data_to_fit.info, scatter.info);
    assert_eq!(data_to_fit.info, tail_weights.info);
    let info = scatter.info;
    let mut factors = SinogramFactors::ones(&info);
    for (seg_idx, segment) in info.segments().enumerate() {
        let data = data_to_fit.segment(segment);
        let simulated = scatter.segment(segment);
        let weights = tail_weights.segment(segment);
        for axial in 0..info.num_axial(segment) {
            let mut measured_tail = 0.0_f64;
            let mut simulated_tail = 0.0_f64;
            for view in 0..info.num_views() {
                for t in 0..info.num_tangential {
                    let w = weights[(axial, view, t)] as f64;
                    if w == 0.0 { continue }
                    measured_tail  += w * data[(axial, view, t)] as f64;
                    simulated_tail += w * simulated[(axial, view, t)] as f64;
                }
            }
            if simulated_tail > 0.0 {
                factors.0[seg_idx][axial] = (measured_tail / simulated_tail) as f32;
            }
        }
    }
    factors
}

/// Merge the two interleaved tangential samplings of a no-arc-correction
/// sinogram by averaging each sample with its neighbour, suppressing the
/// odd/even zig-zag before interpolation.
fn merge_interleaved_tangentials(sinograms: &mut Array3<f32>) {
    let (n_ax, n_view, n_tang) = sinograms.dim();
    if n_tang < 2 { return }
    for a in 0..n_ax {
        for v in 0..n_view {
            let mut merged = Vec::with_capacity(n_tang);
            for t in 0..n_tang {
                let next = (t + 1).min(n_tang - 1);
                merged.push(0.5 * (sinograms[(a, v, t)] + sinograms[(a, v, next)]));
            }
            for t in 0..n_tang {
                sinograms[(a, v, t)] = merged[t];
            }
        }
    }
}

// Sampling taps and weights for one interpolation coordinate
fn taps(x: f32, len: usize, spline: SplineOrder, cyclic: bool) -> Vec<(usize, f32)> {
    let clamp_or_wrap = |i: i64| -> usize {
        if cyclic {
            i.rem_euclid(len as i64) as usize
        } else {
            i.clamp(0, len as i64 - 1) as usize
        }
    };
    match spline {
        SplineOrder::Nearest => vec![(clamp_or_wrap(x.round() as i64), 1.0)],
        SplineOrder::Linear => {
            let i = x.floor() as i64;
            let u = x - i as f32;
            vec![(clamp_or_wrap(i), 1.0 - u), (clamp_or_wrap(i + 1), u)]
        }
        SplineOrder::Cubic => {
            // Catmull-Rom
            let i = x.floor() as i64;
            let u = x - i as f32;
            let (u2, u3) = (u * u, u * u * u);
            vec![
                (clamp_or_wrap(i - 1), -0.5 * u3 + u2 - 0.5 * u),
                (clamp_or_wrap(i    ),  1.5 * u3 - 2.5 * u2 + 1.0),
                (clamp_or_wrap(i + 1), -1.5 * u3 + 2.0 * u2 + 0.5 * u),
                (clamp_or_wrap(i + 2),  0.5 * u3 - 0.5 * u2),
            ]
        }
    }
}

/// Resample rebinned sinograms from the `from` geometry to the `to` geometry.
/// Views are periodic over half a turn; axial positions span the same
/// physical extent on both grids; tangential positions scale with the crystal
/// pitch and share the central bin.
fn interpolate_sinograms(
    source: &Array3<f32>,
    from: ProjDataInfo,
    to: ProjDataInfo,
    spline: SplineOrder,
) -> Array3<f32> {
    let (ax_lo, view_lo, tang_lo) = source.dim();
    let (ax_hi, view_hi, tang_hi) = (to.num_axial(0), to.num_views(), to.num_tangential);

    let axial_scale = if ax_hi > 1 { (ax_lo as f32 - 1.0) / (ax_hi as f32 - 1.0) } else { 0.0 };
    let view_scale = view_lo as f32 / view_hi as f32;
    let tang_scale = from.scanner.num_dets_per_ring as f32 / to.scanner.num_dets_per_ring as f32;
    let centre_lo = (tang_lo / 2) as f32;
    let centre_hi = (tang_hi / 2) as f32;

    let mut out = Array3::zeros((ax_hi, view_hi, tang_hi));
    for a in 0..ax_hi {
        let a_taps = taps(a as f32 * axial_scale, ax_lo, spline, false);
        for v in 0..view_hi {
            let v_taps = taps(v as f32 * view_scale, view_lo, spline, true);
            for t in 0..tang_hi {
                let t_lo = (t as f32 - centre_hi) * tang_scale + centre_lo;
                let t_taps = taps(t_lo, tang_lo, spline, false);
                let mut value = 0.0;
                for &(ai, aw) in &a_taps {
                    for &(vi, vw) in &v_taps {
                        for &(ti, tw) in &t_taps {
                            value += aw * vw * tw * source[(ai, vi, ti)];
                        }
                    }
                }
                out[(a, v, t)] = value;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projdata::Bin;
    use crate::scanner::Scanner;
    use float_eq::assert_float_eq;
    use units::mm;

    fn scanner() -> Scanner {
        Scanner {
            num_rings: 3,
            num_dets_per_ring: 16,
            ring_radius: mm(150.0),
            ring_spacing: mm(8.0),
        }
    }

    fn uniform(info: ProjDataInfo, value: f32) -> ProjData {
        let mut data = ProjData::zeros(info);
        data.map_in_place(|_| value);
        data
    }

    #[test]
    fn scale_factors_recover_a_known_ratio() {
        let info = ProjDataInfo::new_full(scanner()).ssrb();
        let measured = uniform(info, 6.0);
        let simulated = uniform(info, 2.0);
        let tails = uniform(info, 1.0);
        let factors = get_scale_factors_per_sinogram(&measured, &simulated, &tails);
        for seg in &factors.0 {
            for &f in seg {
                assert_float_eq!(f, 3.0, rel <= 1e-6);
            }
        }
    }

    #[test]
    fn sinograms_without_tail_counts_keep_factor_one() {
        let info = ProjDataInfo::new_full(scanner()).ssrb();
        let measured = uniform(info, 6.0);
        let simulated = uniform(info, 0.0);
        let tails = uniform(info, 1.0);
        let factors = get_scale_factors_per_sinogram(&measured, &simulated, &tails);
        assert!(factors.0[0].iter().all(|&f| f == 1.0));
    }

    #[test]
    fn applied_factors_respect_the_clamp_bounds() {
        let info = ProjDataInfo::new_full(scanner()).ssrb();
        let measured = uniform(info, 1000.0);
        let simulated = uniform(info, 1.0);
        let tails = uniform(info, 1.0);
        let tail_fit = TailFitConfig::default();
        let fitted = upsample_and_fit_scatter_estimate(
            &simulated, info, &measured, &tails, None, &tail_fit,
            SplineOrder::Linear, false).unwrap();
        // the raw ratio of 1000 is clamped at max_scale_factor = 100
        for bin in fitted.bins() {
            assert_float_eq!(fitted.value(bin), 100.0, rel <= 1e-5);
        }
    }

    #[test]
    fn interpolation_preserves_a_constant_estimate() {
        let coarse_info = subsample_projdata_info(
            &ProjDataInfo::new_full(scanner()), 8, 2).unwrap().ssrb();
        let fine_info = ProjDataInfo::new_full(scanner()).ssrb();
        let coarse = uniform(coarse_info, 2.5);
        let measured = uniform(fine_info, 2.5);
        let tails = uniform(fine_info, 1.0);
        for spline in [SplineOrder::Nearest, SplineOrder::Linear, SplineOrder::Cubic] {
            let fitted = upsample_and_fit_scatter_estimate(
                &coarse, fine_info, &measured, &tails, None,
                &TailFitConfig::default(), spline, false).unwrap();
            for bin in fitted.bins() {
                assert_float_eq!(fitted.value(bin), 2.5, rel <= 1e-4);
            }
        }
    }

    #[test]
    fn upsampling_fills_the_oblique_segments() {
        let full = ProjDataInfo::new_full(scanner());
        let coarse = uniform(full.ssrb(), 1.0);
        let measured = uniform(full, 4.0);
        let tails = uniform(full, 1.0);
        let fitted = upsample_and_fit_scatter_estimate(
            &coarse, full, &measured, &tails, None,
            &TailFitConfig::default(), SplineOrder::Linear, false).unwrap();
        let oblique = Bin { segment: 2, view: 1, axial: 0, tang: 0 };
        assert_float_eq!(fitted.value(oblique), 4.0, rel <= 1e-5);
    }

    #[test]
    fn interleaving_removal_flattens_the_zigzag() {
        let info = ProjDataInfo::new_full(scanner()).ssrb();
        let mut zigzag = ProjData::zeros(info);
        for bin in zigzag.bins().collect::<Vec<_>>() {
            let t = (bin.tang + (info.num_tangential / 2) as i32) as usize;
            zigzag.set_value(bin, if t % 2 == 0 { 1.0 } else { 3.0 });
        }
        let mut source = zigzag.segment(0).clone();
        merge_interleaved_tangentials(&mut source);
        // interior samples all average to 2
        let (n_ax, n_view, n_tang) = source.dim();
        for a in 0..n_ax {
            for v in 0..n_view {
                for t in 0..n_tang - 1 {
                    assert_float_eq!(source[(a, v, t)], 2.0, ulps <= 2);
                }
            }
        }
    }
}
