//! Conversions between the uom-aware types and the `f32`-based `ncollide3d`
//! maths types, interpreting raw floats as lengths in mm.

use units::{Length, mm, mm_, ratio_};
use crate::{Point, Vector, RatioVec};

impl From<ncollide3d::math::Point<f32>> for Point {
    fn from(p: ncollide3d::math::Point<f32>) -> Self {
        let x: Length = mm(p.x);
        let y: Length = mm(p.y);
        let z: Length = mm(p.z);
        Self::new(x, y, z)
    }
}

impl From<Point> for ncollide3d::math::Point<f32> {
    fn from(p: Point) -> Self {
        Self::new(mm_(p.x), mm_(p.y), mm_(p.z))
    }
}

impl From<Vector> for ncollide3d::math::Vector<f32> {
    fn from(v: Vector) -> Self {
        Self::new(mm_(v.x), mm_(v.y), mm_(v.z))
    }
}

impl From<RatioVec> for ncollide3d::math::Vector<f32> {
    fn from(v: RatioVec) -> Self {
        Self::new(ratio_(v.x), ratio_(v.y), ratio_(v.z))
    }
}
