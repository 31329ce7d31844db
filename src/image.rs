use std::path::Path;

use crate::{Error, Intensityf32, Point};
use crate::fov::FOV;
use crate::index::{Index1_u, Index3_u, index3_to_1};

pub type ImageData = Vec<Intensityf32>;

#[derive(Clone, Debug)]
pub struct Image {
    pub fov: FOV,
    pub data: ImageData,
}

impl core::ops::IndexMut<Index1_u> for Image {
    #[inline]
    fn index_mut(&mut self, i: Index1_u) -> &mut Self::Output { &mut self.data[i] }
}

impl core::ops::Index<Index1_u> for Image {
    type Output = Intensityf32;
    #[inline]
    fn index(&self, i: Index1_u) -> &Self::Output { &self.data[i] }
}

impl core::ops::IndexMut<Index3_u> for Image {
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output {
        let i1 = index3_to_1(i3, self.fov.n);
        &mut self.data[i1]
    }
}

impl core::ops::Index<Index3_u> for Image {
    type Output = Intensityf32;
    fn index(&self, i3: Index3_u) -> &Self::Output {
        let i1 = index3_to_1(i3, self.fov.n);
        &self.data[i1]
    }
}

impl Image {

    pub fn new(fov: FOV, data: ImageData) -> Self {
        if data.len() != fov.num_voxels() {
            panic!("Image data does not match dimensions {:?}", fov.n);
        };
        Image { fov, data }
    }

    pub fn ones (fov: FOV) -> Self { Self { data: vec![1.0; fov.num_voxels()], fov } }
    pub fn zeros(fov: FOV) -> Self { Self { data: vec![0.0; fov.num_voxels()], fov } }

    pub fn max_value(&self) -> Intensityf32 { self.data.iter().cloned().fold(0.0, f32::max) }

    /// Value of the voxel containing `p`; zero outside the FOV
    pub fn value_at(&self, p: Point) -> Intensityf32 {
        self.fov.voxel_at(p).map_or(0.0, |i3| self[i3])
    }

    /// Trilinear interpolation of the voxel-centre samples at `p`; clamps to
    /// the edge voxels, zero outside the FOV
    pub fn trilinear_at(&self, p: Point) -> Intensityf32 {
        use units::ratio_;
        if !self.fov.contains(p) { return 0.0 }
        let corner = self.fov.voxel_centre([0, 0, 0]);
        let frac = (p - corner).component_div(self.fov.voxel_size);
        let fs = [ratio_(frac.x), ratio_(frac.y), ratio_(frac.z)];
        let mut lo = [0_usize; 3];
        let mut t  = [0.0_f32; 3];
        for axis in 0..3 {
            let max = self.fov.n[axis] - 1;
            let f = fs[axis].clamp(0.0, max as f32);
            lo[axis] = (f.floor() as usize).min(max.saturating_sub(1));
            t [axis] = (f - lo[axis] as f32).clamp(0.0, 1.0);
            if max == 0 { lo[axis] = 0; t[axis] = 0.0; }
        }
        let mut value = 0.0;
        for (dx, wx) in [(0, 1.0 - t[0]), (1, t[0])] {
            for (dy, wy) in [(0, 1.0 - t[1]), (1, t[1])] {
                for (dz, wz) in [(0, 1.0 - t[2]), (1, t[2])] {
                    let w = wx * wy * wz;
                    if w == 0.0 { continue }
                    let i3 = [(lo[0] + dx).min(self.fov.n[0] - 1),
                              (lo[1] + dy).min(self.fov.n[1] - 1),
                              (lo[2] + dz).min(self.fov.n[2] - 1)];
                    value += w * self[i3];
                }
            }
        }
        value
    }

    pub fn from_raw_file(path: &Path) -> Result<Self, Error> {
        Ok((&crate::io::raw::RawImage::read_from_file(path)?).into())
    }

    pub fn write_to_raw_file(&self, path: &Path) -> Result<(), Error> {
        crate::io::raw::RawImage::from(self).write_to_file(path)?;
        Ok(())
    }
}

// --------------------------------------------------------------------------------
//                  Masking

/// Thresholds and affine remapping used to carve a mask out of an image
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskParameters {
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub add_scalar: f32,
    pub times_scalar: f32,
}

impl Image {
    /// Zero every voxel whose value lies outside
    /// `[min_threshold, max_threshold]`; remap the remaining voxels to
    /// `(value + add_scalar) * times_scalar`.
    pub fn apply_mask_in_place(&mut self, pars: &MaskParameters) {
        for v in self.data.iter_mut() {
            if *v < pars.min_threshold || *v > pars.max_threshold {
                *v = 0.0;
            } else {
                *v = (*v + pars.add_scalar) * pars.times_scalar;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use units::mm;
    use float_eq::assert_float_eq;

    fn small_fov() -> FOV { FOV::new((mm(40.0), mm(40.0), mm(40.0)), (4, 4, 4)) }

    #[test]
    fn value_at_voxel_centres() {
        let fov = small_fov();
        let mut image = Image::zeros(fov);
        image[[1, 2, 3]] = 7.5;
        assert_eq!(image.value_at(fov.voxel_centre([1, 2, 3])), 7.5);
        assert_eq!(image.value_at(fov.voxel_centre([0, 0, 0])), 0.0);
        // outside the FOV
        assert_eq!(image.value_at(Point::in_mm(100.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn trilinear_reproduces_voxel_centres() {
        let fov = small_fov();
        let mut image = Image::zeros(fov);
        for (i, v) in image.data.iter_mut().enumerate() { *v = i as f32 }
        for i in 0..fov.num_voxels() {
            let p = fov.voxel_centre1(i);
            assert_float_eq!(image.trilinear_at(p), i as f32, abs <= 1e-3);
        }
    }

    #[test]
    fn trilinear_interpolates_between_neighbours() {
        let fov = small_fov();
        let mut image = Image::zeros(fov);
        image[[1, 1, 1]] = 2.0;
        image[[2, 1, 1]] = 4.0;
        let a = fov.voxel_centre([1, 1, 1]);
        let b = fov.voxel_centre([2, 1, 1]);
        let midpoint = a + (b - a) * 0.5;
        assert_float_eq!(image.trilinear_at(midpoint), 3.0, abs <= 1e-3);
    }

    #[test]
    fn mask_zeroes_out_of_range_and_remaps_the_rest() {
        let fov = small_fov();
        let mut image = Image::zeros(fov);
        image[0_usize] = 0.5;  // in range
        image[1_usize] = 5.0;  // above max
        image[2_usize] = -1.0; // below min
        image.apply_mask_in_place(&MaskParameters {
            min_threshold: 0.0, max_threshold: 1.0,
            add_scalar: 1.0, times_scalar: 2.0,
        });
        assert_eq!(image[0_usize], 3.0);
        assert_eq!(image[1_usize], 0.0);
        assert_eq!(image[2_usize], 0.0);
        assert_eq!(image[3_usize], 2.0); // zero was in range: (0 + 1) * 2
    }
}
