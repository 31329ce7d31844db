//! Line integrals over density images, and the (scatter point, detector)
//! tables which memoize them.

use ndarray::Array2;
use rayon::prelude::*;
use units::mm_;

use crate::image::Image;
use crate::Point;

/// Numerically integrate `image` along the straight line from `p1` to `p2`,
/// by the midpoint rule with a sampling step of half the smallest voxel
/// dimension.  Voxel values are in units of 1/mm (or activity per mm), so the
/// result is dimensionless (or total activity along the line).
///
/// Only the stretch of the line inside the FOV is sampled.  The endpoints are
/// put into a canonical order first, so swapping them gives the identical
/// result.
pub fn integral_between_2_points(image: &Image, p1: Point, p2: Point) -> f32 {
    let (p1, p2) = canonical_order(p1, p2);
    let entry = match image.fov.entry(p1, p2) {
        Some(p) => p,
        None => return 0.0,
    };
    let exit = match image.fov.entry(p2, p1) {
        Some(p) => p,
        None => return 0.0,
    };
    let displacement = exit - entry;
    let length = displacement.norm();
    let length_mm = mm_(length);
    if !(length_mm > 0.0) { return 0.0 }
    let vs = image.fov.voxel_size;
    let smallest_voxel = mm_(vs.x).min(mm_(vs.y)).min(mm_(vs.z));
    let n = (length_mm / (0.5 * smallest_voxel)).ceil().max(1.0) as usize;
    let step = length / n as f32;
    let direction = displacement / length;
    let mut sum = 0.0;
    for i in 0..n {
        let p = entry + direction * (step * (i as f32 + 0.5));
        sum += image.value_at(p);
    }
    sum * mm_(step)
}

fn canonical_order(p1: Point, p2: Point) -> (Point, Point) {
    let key = |p: Point| (mm_(p.x), mm_(p.y), mm_(p.z));
    if key(p1) <= key(p2) { (p1, p2) } else { (p2, p1) }
}

// --------------------------------------------------------------------------------
//                  Caching

/// Memoized line integrals, one cell per (scatter point, detection point)
/// pair: one table for integrals over the activity image, one for the
/// exponentiated integrals over the attenuation image.
///
/// `f32::NAN` marks a cell which has not been computed yet.  Invalidation is
/// explicit: call the `remove_*` methods before re-sampling scatter points,
/// replacing an image, or changing the detector sampling.  With caching
/// disabled every read recomputes, trading speed for memory.
#[derive(Clone, Debug)]
pub struct IntegralCache {
    enabled: bool,
    activity: Option<Array2<f32>>,
    attenuation: Option<Array2<f32>>,
}

fn empty_table(n_scatter_points: usize, n_detectors: usize) -> Array2<f32> {
    Array2::from_elem((n_scatter_points, n_detectors), f32::NAN)
}

// Allocate if missing or wrongly sized; existing compatible data survive.
fn initialise(table: &mut Option<Array2<f32>>, n_scatter_points: usize, n_detectors: usize) {
    let wrong_size = table.as_ref()
        .map_or(true, |t| t.dim() != (n_scatter_points, n_detectors));
    if wrong_size {
        *table = Some(empty_table(n_scatter_points, n_detectors));
    }
}

fn lookup(table: &mut Option<Array2<f32>>, row: usize, col: usize,
          compute: impl FnOnce() -> f32) -> f32 {
    match table {
        // reading before initialisation falls back to an uncached computation
        None => compute(),
        Some(t) => {
            let cell = t[(row, col)];
            if cell.is_nan() {
                let value = compute();
                t[(row, col)] = value;
                value
            } else {
                cell
            }
        }
    }
}

fn peek(table: &Option<Array2<f32>>, row: usize, col: usize,
        compute: impl FnOnce() -> f32) -> f32 {
    match table {
        Some(t) if !t[(row, col)].is_nan() => t[(row, col)],
        _ => compute(),
    }
}

impl IntegralCache {

    pub fn new(enabled: bool) -> Self {
        Self { enabled, activity: None, attenuation: None }
    }

    pub fn enabled(&self) -> bool { self.enabled }

    pub fn initialise_cache_for_integrals_over_activity(&mut self, n_scatter_points: usize, n_detectors: usize) {
        if self.enabled { initialise(&mut self.activity, n_scatter_points, n_detectors) }
    }

    pub fn initialise_cache_for_integrals_over_attenuation(&mut self, n_scatter_points: usize, n_detectors: usize) {
        if self.enabled { initialise(&mut self.attenuation, n_scatter_points, n_detectors) }
    }

    pub fn remove_cache_for_integrals_over_activity(&mut self) { self.activity = None }

    pub fn remove_cache_for_integrals_over_attenuation(&mut self) { self.attenuation = None }

    /// Cached activity-image line integral between a scatter point and a
    /// detection point; computed (and stored) on first use
    pub fn cached_integral_over_activity_image_between_scattpoint_det(
        &mut self,
        scatter_point_num: usize,
        det_num: usize,
        compute: impl FnOnce() -> f32,
    ) -> f32 {
        if !self.enabled { return compute() }
        lookup(&mut self.activity, scatter_point_num, det_num, compute)
    }

    /// Cached `exp(-integral)` over the attenuation image between a scatter
    /// point and a detection point; computed (and stored) on first use
    pub fn cached_exp_integral_over_attenuation_image_between_scattpoint_det(
        &mut self,
        scatter_point_num: usize,
        det_num: usize,
        compute: impl FnOnce() -> f32,
    ) -> f32 {
        if !self.enabled { return compute() }
        lookup(&mut self.attenuation, scatter_point_num, det_num, compute)
    }

    /// Read-only variants for use after `populate`: a miss recomputes but
    /// cannot store, so they are safe to call from parallel workers.
    pub fn activity_value(&self, scatter_point_num: usize, det_num: usize,
                          compute: impl FnOnce() -> f32) -> f32 {
        if !self.enabled { return compute() }
        peek(&self.activity, scatter_point_num, det_num, compute)
    }

    pub fn attenuation_value(&self, scatter_point_num: usize, det_num: usize,
                             compute: impl FnOnce() -> f32) -> f32 {
        if !self.enabled { return compute() }
        peek(&self.attenuation, scatter_point_num, det_num, compute)
    }

    /// Fill both tables in parallel, so that subsequent parallel reads never
    /// miss
    pub fn populate(
        &mut self,
        n_scatter_points: usize,
        n_detectors: usize,
        activity_integral: impl Fn(usize, usize) -> f32 + Sync,
        exp_attenuation_integral: impl Fn(usize, usize) -> f32 + Sync,
    ) {
        if !self.enabled { return }
        let fill = |f: &(dyn Fn(usize, usize) -> f32 + Sync)| {
            let values: Vec<f32> = (0..n_scatter_points * n_detectors)
                .into_par_iter()
                .map(|i| f(i / n_detectors, i % n_detectors))
                .collect();
            Array2::from_shape_vec((n_scatter_points, n_detectors), values).unwrap()
        };
        self.activity    = Some(fill(&activity_integral));
        self.attenuation = Some(fill(&exp_attenuation_integral));
    }
}
