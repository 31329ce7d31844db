//! Reduce the resolution of a density image, trading spatial fidelity for
//! simulation speed.

use std::path::Path;

use units::Length;

use crate::Error;
use crate::fov::FOV;
use crate::image::Image;

/// Resample `image` onto a grid whose voxels are `zoom_xy` times larger in
/// the transverse plane and `zoom_z` times larger axially, by trilinear
/// interpolation at the new voxel centres.  The new grid covers at least the
/// extent of the original.
///
/// If `output_filename` is given, the result is also persisted there.
pub fn subsample_image(
    image: &Image,
    zoom_xy: f32,
    zoom_z: f32,
    output_filename: Option<&Path>,
) -> Result<Image, Error> {
    if !(zoom_xy >= 1.0 && zoom_z >= 1.0) {
        return Err(format!("zoom factors must be >= 1 (got xy: {zoom_xy}, z: {zoom_z})").into());
    }
    let fov = image.fov;
    let new_n = [
        (fov.n[0] as f32 / zoom_xy).ceil() as usize,
        (fov.n[1] as f32 / zoom_xy).ceil() as usize,
        (fov.n[2] as f32 / zoom_z ).ceil() as usize,
    ];
    if new_n.iter().any(|&n| n == 0) {
        return Err("subsampling produced an empty image".into());
    }
    let new_voxel: [Length; 3] = [
        fov.voxel_size.x * zoom_xy,
        fov.voxel_size.y * zoom_xy,
        fov.voxel_size.z * zoom_z,
    ];
    let new_fov = FOV::new(
        (new_voxel[0] * new_n[0] as f32,
         new_voxel[1] * new_n[1] as f32,
         new_voxel[2] * new_n[2] as f32),
        (new_n[0], new_n[1], new_n[2]),
    );

    let mut out = Image::zeros(new_fov);
    for i in 0..new_fov.num_voxels() {
        out[i] = image.trilinear_at(new_fov.voxel_centre1(i));
    }

    if let Some(path) = output_filename {
        out.write_to_raw_file(path)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use units::{mm, mm_};

    #[test]
    fn uniform_image_stays_uniform() {
        let fov = FOV::new((mm(80.0), mm(80.0), mm(40.0)), (8, 8, 4));
        let image = Image::ones(fov);
        let sub = subsample_image(&image, 2.0, 2.0, None).unwrap();
        assert_eq!(sub.fov.n, [4, 4, 2]);
        for &v in &sub.data {
            assert_float_eq!(v, 1.0, abs <= 1e-6);
        }
    }

    #[test]
    fn voxel_size_scales_with_the_zoom_factors() {
        let fov = FOV::new((mm(80.0), mm(80.0), mm(40.0)), (8, 8, 4));
        let image = Image::ones(fov);
        let sub = subsample_image(&image, 2.0, 1.0, None).unwrap();
        assert_float_eq!(mm_(sub.fov.voxel_size.x), 20.0, ulps <= 2);
        assert_float_eq!(mm_(sub.fov.voxel_size.y), 20.0, ulps <= 2);
        assert_float_eq!(mm_(sub.fov.voxel_size.z), 10.0, ulps <= 2);
    }

    #[test]
    fn extent_is_preserved_for_non_dividing_zooms() {
        let fov = FOV::new((mm(90.0), mm(90.0), mm(30.0)), (9, 9, 3));
        let image = Image::ones(fov);
        let sub = subsample_image(&image, 2.0, 2.0, None).unwrap();
        // 9 / 2 rounds up to 5 voxels of 20 mm: the grid grows, never shrinks
        assert_eq!(sub.fov.n, [5, 5, 2]);
        assert!(mm_(sub.fov.half_width.x) >= 45.0);
    }

    #[test]
    fn rejects_shrinking_zoom_factors() {
        let fov = FOV::new((mm(80.0), mm(80.0), mm(40.0)), (8, 8, 4));
        let image = Image::ones(fov);
        assert!(subsample_image(&image, 0.5, 1.0, None).is_err());
    }
}
