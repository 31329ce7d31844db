//! In-memory projection data: one 3-D array per segment, indexed by
//! (axial position, view, tangential position).

use std::path::Path;

use ndarray::{Array3, Zip};

use crate::Error;
use crate::scanner::ProjDataInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bin {
    pub segment: i32,
    pub view: usize,
    pub axial: usize,
    pub tang: i32,
}

#[derive(Clone, Debug)]
pub struct ProjData {
    pub info: ProjDataInfo,
    segments: Vec<Array3<f32>>,
}

impl ProjData {

    pub fn zeros(info: ProjDataInfo) -> Self {
        let segments = info.segments()
            .map(|s| Array3::zeros((info.num_axial(s), info.num_views(), info.num_tangential)))
            .collect();
        Self { info, segments }
    }

    fn segment_index(&self, segment: i32) -> usize {
        (segment + self.info.max_segment as i32) as usize
    }

    pub fn segment(&self, segment: i32) -> &Array3<f32> {
        &self.segments[self.segment_index(segment)]
    }

    pub fn segment_mut(&mut self, segment: i32) -> &mut Array3<f32> {
        let i = self.segment_index(segment);
        &mut self.segments[i]
    }

    fn tang_index(&self, tang: i32) -> usize {
        (tang + (self.info.num_tangential / 2) as i32) as usize
    }

    pub fn value(&self, bin: Bin) -> f32 {
        let t = self.tang_index(bin.tang);
        self.segment(bin.segment)[(bin.axial, bin.view, t)]
    }

    pub fn set_value(&mut self, bin: Bin, value: f32) {
        let t = self.tang_index(bin.tang);
        self.segment_mut(bin.segment)[(bin.axial, bin.view, t)] = value;
    }

    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        let info = self.info;
        info.segments().flat_map(move |segment| {
            (0..info.num_axial(segment)).flat_map(move |axial| {
                (0..info.num_views()).flat_map(move |view| {
                    info.tangential_positions().map(move |tang| {
                        Bin { segment, view, axial, tang }
                    })
                })
            })
        })
    }

    pub fn total(&self) -> f64 {
        self.segments.iter().map(|s| s.iter().map(|&v| v as f64).sum::<f64>()).sum()
    }

    /// Apply `f` to every element, in place
    pub fn map_in_place(&mut self, f: impl Fn(f32) -> f32 + Copy) {
        for s in self.segments.iter_mut() { s.mapv_inplace(f) }
    }

    fn zip_in_place(&mut self, other: &Self, f: impl Fn(&mut f32, f32)) {
        assert_eq!(self.info, other.info, "projection data geometries differ");
        for (a, b) in self.segments.iter_mut().zip(other.segments.iter()) {
            Zip::from(a).and(b).for_each(|x, &y| f(x, y));
        }
    }

    pub fn add_assign(&mut self, other: &Self) { self.zip_in_place(other, |x, y| *x += y) }
    pub fn sub_assign(&mut self, other: &Self) { self.zip_in_place(other, |x, y| *x -= y) }
    pub fn mul_assign(&mut self, other: &Self) { self.zip_in_place(other, |x, y| *x *= y) }

    /// Element-wise division, mapping x/0 to 0
    pub fn div_assign_guarded(&mut self, other: &Self) {
        self.zip_in_place(other, |x, y| *x = if y != 0.0 { *x / y } else { 0.0 });
    }

    // ----------------------------------------------------------------------------
    //                  Axial rebinning

    /// Single-slice rebinning: collapse every segment into one 2-D set with an
    /// axial slot for each mean ring position (half-ring-spacing grid).
    pub fn ssrb(&self) -> Self {
        let info_2d = self.info.ssrb();
        let mut out = Self::zeros(info_2d);
        for segment in self.info.segments() {
            let data = self.segment(segment);
            let out_seg = out.segment_mut(0);
            for axial in 0..self.info.num_axial(segment) {
                // mean ring position of (segment, axial), in half-ring units
                let slot = 2 * axial + segment.unsigned_abs() as usize;
                for view in 0..self.info.num_views() {
                    for t in 0..self.info.num_tangential {
                        out_seg[(slot, view, t)] += data[(axial, view, t)];
                    }
                }
            }
        }
        out
    }

    /// `ssrb` for factor-like data (normalisation, attenuation factors):
    /// every axial slot is divided by the number of sinograms rebinned into
    /// it, so factors are averaged rather than summed.
    pub fn ssrb_averaged(&self) -> Self {
        let mut out = self.ssrb();
        let mut contributions = vec![0_u32; out.info.num_axial(0)];
        for segment in self.info.segments() {
            for axial in 0..self.info.num_axial(segment) {
                contributions[2 * axial + segment.unsigned_abs() as usize] += 1;
            }
        }
        let out_seg = out.segment_mut(0);
        for (slot, &n) in contributions.iter().enumerate() {
            if n > 1 {
                out_seg.index_axis_mut(ndarray::Axis(0), slot)
                       .mapv_inplace(|v| v / n as f32);
            }
        }
        out
    }

    /// Inverse of `ssrb`: distribute a single-segment 2-D set over the oblique
    /// segments of `target`, each oblique sinogram reading the slot at its
    /// mean ring position.
    pub fn inverse_ssrb(&self, target: ProjDataInfo) -> Self {
        assert!(self.info.rebinned, "inverse_ssrb needs axially rebinned input");
        let mut out = Self::zeros(target);
        let data = self.segment(0);
        for segment in target.segments() {
            let out_seg = out.segment_mut(segment);
            for axial in 0..target.num_axial(segment) {
                let slot = 2 * axial + segment.unsigned_abs() as usize;
                for view in 0..target.num_views() {
                    for t in 0..target.num_tangential {
                        out_seg[(axial, view, t)] = data[(slot, view, t)];
                    }
                }
            }
        }
        out
    }

    // ----------------------------------------------------------------------------
    //                  Per-sinogram scaling

    /// Multiply each (segment, axial) sinogram by its factor
    pub fn scale_sinograms(&mut self, factors: &SinogramFactors) {
        for (seg_idx, segment) in self.info.segments().enumerate() {
            let data = self.segment_mut(segment);
            for (axial, mut sinogram) in data.outer_iter_mut().enumerate() {
                sinogram.mapv_inplace(|v| v * factors.0[seg_idx][axial]);
            }
        }
    }

    pub fn to_file(&self, path: &Path) -> Result<(), Error> {
        crate::io::raw::RawProjData::from(self).write_to_file(path)?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        crate::io::raw::RawProjData::read_from_file(path)?.try_into()
    }

    pub (crate) fn segments_raw(&self) -> &[Array3<f32>] { &self.segments }

    pub (crate) fn from_segments(info: ProjDataInfo, segments: Vec<Array3<f32>>) -> Self {
        Self { info, segments }
    }
}

/// One scale factor per (segment, axial position)
#[derive(Clone, Debug, PartialEq)]
pub struct SinogramFactors(pub Vec<Vec<f32>>);

impl SinogramFactors {

    pub fn ones(info: &ProjDataInfo) -> Self {
        Self(info.segments().map(|s| vec![1.0; info.num_axial(s)]).collect())
    }

    pub fn clamp(&mut self, min: f32, max: f32) {
        for seg in self.0.iter_mut() {
            for f in seg.iter_mut() { *f = f.clamp(min, max) }
        }
    }

    /// Box-smooth the factors along the axial direction, independently per
    /// segment
    pub fn filter_axially(&mut self, half_width: usize) {
        if half_width == 0 { return }
        for seg in self.0.iter_mut() {
            let n = seg.len();
            let smoothed: Vec<f32> = (0..n).map(|i| {
                let lo = i.saturating_sub(half_width);
                let hi = (i + half_width).min(n - 1);
                seg[lo..=hi].iter().sum::<f32>() / (hi - lo + 1) as f32
            }).collect();
            *seg = smoothed;
        }
    }
}
