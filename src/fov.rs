//! The size and granularity of the field of view (FOV) on which density and
//! activity images are sampled

use units::uom::ConstZero;
use units::{Length, mm_, ratio_};

use crate::{Lengthf32, Point, Vector};
use crate::index::{BoxDim_u, Index1_u, Index3_u, index1_to_3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FOV {
    pub half_width: Vector,
    pub n: BoxDim_u,
    pub voxel_size: Vector,
}

impl FOV {

    pub fn new(
        full_size: (Length, Length, Length),
        (nx, ny, nz): (usize, usize, usize)
    ) -> Self {
        let (dx, dy, dz) = full_size;
        let half_width = Vector::new(dx/2.0, dy/2.0, dz/2.0);
        let n = [nx, ny, nz];
        let voxel_size = Self::voxel_size(n, half_width);
        Self { half_width, n, voxel_size }
    }

    fn voxel_size(n: BoxDim_u, half_width: Vector) -> Vector {
        let full_width = half_width * 2.0;
        Vector::new(full_width[0] / n[0] as f32,
                    full_width[1] / n[1] as f32,
                    full_width[2] / n[2] as f32,
        )
    }

    /// Total number of voxels
    pub fn num_voxels(&self) -> usize { self.n[0] * self.n[1] * self.n[2] }

    /// Volume of a single voxel, in mm^3
    pub fn voxel_volume(&self) -> Lengthf32 {
        let s = self.voxel_size;
        mm_(s.x) * mm_(s.y) * mm_(s.z)
    }

    /// The corner of the FOV with the lowest coordinate values
    fn corner(&self) -> Point {
        Point::new(-self.half_width.x, -self.half_width.y, -self.half_width.z)
    }

    /// Find centre of voxel with given 3D index
    pub fn voxel_centre(&self, i: Index3_u) -> Point {
        let s = self.voxel_size;
        Point::new((i[0] as Lengthf32 + 0.5) * s.x - self.half_width[0],
                   (i[1] as Lengthf32 + 0.5) * s.y - self.half_width[1],
                   (i[2] as Lengthf32 + 0.5) * s.z - self.half_width[2],)
    }

    /// Find centre of voxel with given 1D index
    pub fn voxel_centre1(&self, i: Index1_u) -> Point {
        self.voxel_centre(index1_to_3(i, self.n))
    }

    /// Index of the voxel containing the given point, if it lies inside the FOV
    pub fn voxel_at(&self, p: Point) -> Option<Index3_u> {
        let frac = (p - self.corner()).component_div(self.voxel_size);
        let fs = [ratio_(frac.x), ratio_(frac.y), ratio_(frac.z)];
        let mut index = [0; 3];
        for axis in 0..3 {
            if fs[axis] < 0.0 { return None }
            let i = fs[axis].floor() as usize;
            if i >= self.n[axis] { return None }
            index[axis] = i;
        }
        Some(index)
    }

    pub fn contains(&self, p: Point) -> bool { self.voxel_at(p).is_some() }

    /// Point at which the line from `p1` to `p2` enters the FOV, if it does
    pub fn entry(&self, p1: Point, p2: Point) -> Option<Point> {

        use ncollide3d::query::RayCast;
        use ncollide3d::shape::Cuboid;

        type Ray      = ncollide3d::query::Ray    <Lengthf32>;
        type Isometry = ncollide3d::math::Isometry<Lengthf32>;

        let lor_length = (p2 - p1).norm();
        if lor_length <= Length::ZERO { return None }
        let lor_direction = (p2 - p1).normalize();
        let lor: Ray = Ray::new(p1.into(), lor_direction.into());
        let iso: Isometry = Isometry::identity();
        Cuboid::new(self.half_width.into())
            .toi_with_ray(&iso, &lor, mm_(lor_length), true)
            .map(|toi| lor.origin + lor.dir * toi)
            .map(Into::into)
    }

}
