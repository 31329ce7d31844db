//! Units of measure for the scatter simulation.
//!
//! Geometry is expressed in a millimetre-based `uom` system (`mmps`), so that
//! lengths, areas and ratios are distinguished at the type level.  Quantities
//! for which a typed implementation is not (yet) worth the trouble live in
//! [`todo`] as plain-`f32` aliases.

pub mod todo;

pub use uom;

pub mod mmps {

  // TODO: replace with system! macro, once it has been fixed in uom
  pub mod f32 {
    use uom::{ISQ, system};
    ISQ!(uom::si, f32, (millimeter, kilogram, picosecond, ampere, kelvin, mole, candela));

    /// The full circle constant (τ) Equal to 2π.
    pub const TWOPI: Angle = Angle {
        dimension: std::marker::PhantomData,
        units: std::marker::PhantomData,
        value: std::f32::consts::TAU,
    };
  }

}

pub use uom::si::Quantity;
pub use mmps::f32::{Angle, TWOPI, Length, Area, Ratio};
mod units {
  pub use uom::si::{length::{nanometer, millimeter, centimeter},
                    ratio ::ratio,
                    angle ::{radian, revolution},
  };
}
// Making values from float literals seems to be very long-winded, so provide
// some pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f32) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(cm     Length         centimeter);
wrap!(mm     Length         millimeter);
wrap!(nm     Length          nanometer);
wrap!(ratio  Ratio               ratio);
wrap!(radian Angle              radian);
wrap!(turn   Angle          revolution);

// Reverse direction of the above.
pub fn mm_(x: Length) -> f32 { x.get::<units::millimeter>() }
pub fn cm_(x: Length) -> f32 { x.get::<units::centimeter>() }
pub fn mm2_(x: Area) -> f32 { x.get::<uom::si::area::square_millimeter>() }

pub fn ratio_ (x: Ratio) -> f32 { x.get::<uom::si::ratio::ratio>() }
pub fn radian_(x: Angle) -> f32 { x.get::<uom::si::angle::radian>() }
pub fn turn_  (x: Angle) -> f32 { x.get::<uom::si::angle::revolution>() }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sum_of_lengths() {
    let v = vec![mm(1.0), cm(1.0)];
    let total: Length = v.into_iter().sum();
    use units::nanometer;
    assert_uom_eq!(nanometer, total, mm(11.0), ulps <= 1);
  }

  #[test]
  fn round_trips() {
    assert_eq!(mm_(mm(17.5)), 17.5);
    assert_eq!(ratio_(ratio(0.25)), 0.25);
    assert_eq!(radian_(radian(1.25)), 1.25);
  }

  #[test]
  fn area_sqrt_gives_length() {
    let a: Area = mm(3.0) * mm(12.0);
    use units::millimeter;
    assert_uom_eq!(millimeter, a.sqrt(), mm(6.0), ulps <= 1);
  }

  #[test]
  fn one_turn_is_tau_radians() {
    use uom::si::angle::radian as rad;
    assert_uom_eq!(rad, turn(1.0), radian(std::f32::consts::TAU), ulps <= 1);
  }
}
