//! Forward and back projection between images and sinogram-ordered
//! projection data, by sampling along each bin's line of response.

use ndarray::Array2;
#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use units::mm_;

use crate::fov::FOV;
use crate::image::Image;
use crate::integrals::integral_between_2_points;
use crate::projdata::{Bin, ProjData};
use crate::scanner::ProjDataInfo;

/// Line integral of `image` along every bin of `info`
pub fn forward_project(image: &Image, info: ProjDataInfo) -> ProjData {
    let units = info.view_segments();

    #[cfg    (feature = "serial") ] let iter = units.    iter();
    #[cfg(not(feature = "serial"))] let iter = units.par_iter();

    let results: Vec<_> = iter
        .map(|&vs| {
            let mut values = Array2::zeros((info.num_axial(vs.segment), info.num_tangential));
            for axial in 0..info.num_axial(vs.segment) {
                for (ti, tang) in info.tangential_positions().enumerate() {
                    let (p1, p2) = info.lor_endpoints(vs.segment, vs.view, axial, tang);
                    values[(axial, ti)] = integral_between_2_points(image, p1, p2);
                }
            }
            (vs, values)
        })
        .collect();

    let mut out = ProjData::zeros(info);
    for (vs, values) in results {
        for axial in 0..info.num_axial(vs.segment) {
            for (ti, tang) in info.tangential_positions().enumerate() {
                out.set_value(Bin { segment: vs.segment, view: vs.view, axial, tang },
                              values[(axial, ti)]);
            }
        }
    }
    out
}

/// `exp(-integral)` of the attenuation image along every bin: the survival
/// probability of a photon pair on each line of response.  This is the
/// attenuation term of the forward model; its reciprocal is the attenuation
/// correction factor.
pub fn attenuation_factors(attenuation: &Image, info: ProjDataInfo) -> ProjData {
    let mut factors = forward_project(attenuation, info);
    factors.map_in_place(|integral| (-integral).exp());
    factors
}

/// Adjoint of `forward_project`: smear every bin value back along its line of
/// response, weighting by the sampled path length through each voxel
pub fn back_project(data: &ProjData, fov: FOV) -> Image {
    let info = data.info;
    let units = info.view_segments();

    let backproject_unit = |vs: &crate::scanner::ViewSegment| {
        let mut buffer = vec![0.0_f32; fov.num_voxels()];
        for axial in 0..info.num_axial(vs.segment) {
            for tang in info.tangential_positions() {
                let bin = Bin { segment: vs.segment, view: vs.view, axial, tang };
                let value = data.value(bin);
                if value == 0.0 { continue }
                let (p1, p2) = info.lor_endpoints(vs.segment, vs.view, axial, tang);
                smear_along_line(&mut buffer, fov, p1, p2, value);
            }
        }
        buffer
    };

    #[cfg(feature = "serial")]
    let combined = {
        let mut total = vec![0.0_f32; fov.num_voxels()];
        for vs in &units {
            for (t, b) in total.iter_mut().zip(backproject_unit(vs)) { *t += b }
        }
        total
    };

    #[cfg(not(feature = "serial"))]
    let combined = units.par_iter()
        .map(backproject_unit)
        .reduce(|| vec![0.0_f32; fov.num_voxels()],
                |mut l, r| {
                    for (a, b) in l.iter_mut().zip(r) { *a += b }
                    l
                });

    Image::new(fov, combined)
}

fn smear_along_line(buffer: &mut [f32], fov: FOV, p1: crate::Point, p2: crate::Point, value: f32) {
    let displacement = p2 - p1;
    let length = displacement.norm();
    let length_mm = mm_(length);
    if !(length_mm > 0.0) { return }
    let vs = fov.voxel_size;
    let smallest_voxel = mm_(vs.x).min(mm_(vs.y)).min(mm_(vs.z));
    let n = (length_mm / (0.5 * smallest_voxel)).ceil().max(1.0) as usize;
    let step = length / n as f32;
    let direction = displacement / length;
    for i in 0..n {
        let p = p1 + direction * (step * (i as f32 + 0.5));
        if let Some(i3) = fov.voxel_at(p) {
            let i1 = crate::index::index3_to_1(i3, fov.n);
            buffer[i1] += value * mm_(step);
        }
    }
}
