pub use units::{Angle, Area, Length, Ratio, TWOPI};
pub use units::{cm, mm, mm_, mm2_, radian, ratio, ratio_, turn};
pub use units::todo::{Areaf32, Energyf32, Intensityf32, Lengthf32, Muf32, Ratiof32};

pub use geometry::{Point, RatioVec, Vector};

pub use crate::index::{BoxDim_u, Index1_u, Index3_u};

/// All fallible set-up and orchestration steps report through this.
pub type Error = Box<dyn std::error::Error>;
