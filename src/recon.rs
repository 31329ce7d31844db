//! The reconstruction seam: the scatter estimation drives an external
//! reconstruction through this interface, and resolves the configured method
//! name through a registry, once, at configuration time.

use std::collections::HashMap;

use crate::Error;
use crate::config::ReconstructionConfig;
use crate::fov::FOV;
use crate::image::Image;
use crate::projdata::ProjData;
use crate::projector::{back_project, forward_project};

pub trait Reconstruction: Send {
    fn method_info(&self) -> String;
    fn is_iterative(&self) -> bool { true }
    /// Produce a refined activity estimate from `measured` data, given the
    /// multiplicative (normalisation x attenuation) and additive (randoms +
    /// scatter) terms of the forward model
    fn reconstruct(
        &mut self,
        measured: &ProjData,
        multiplicative: Option<&ProjData>,
        additive: Option<&ProjData>,
        initial: &Image,
    ) -> Result<Image, Error>;
}

pub type ReconstructionConstructor =
    fn(&ReconstructionConfig, FOV) -> Result<Box<dyn Reconstruction>, Error>;

pub struct ReconstructionRegistry {
    constructors: HashMap<String, ReconstructionConstructor>,
}

impl Default for ReconstructionRegistry {
    fn default() -> Self {
        let mut registry = Self { constructors: HashMap::new() };
        registry.register("MLEM", |config, fov| {
            Ok(Box::new(Mlem { iterations: config.iterations, fov }))
        });
        registry
    }
}

impl ReconstructionRegistry {

    pub fn register(&mut self, name: &str, constructor: ReconstructionConstructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn create(
        &self,
        config: &ReconstructionConfig,
        fov: FOV,
    ) -> Result<Box<dyn Reconstruction>, Error> {
        let constructor = self.constructors.get(&config.method)
            .ok_or_else(|| format!("unknown reconstruction method `{}`", config.method))?;
        constructor(config, fov)
    }
}

// --------------------------------------------------------------------------------
//                  MLEM

/// Maximum-likelihood expectation maximisation over sinogram bins.
///
/// Forward model: expected = forward(image) * multiplicative + additive.
pub struct Mlem {
    pub iterations: usize,
    pub fov: FOV,
}

impl Reconstruction for Mlem {

    fn method_info(&self) -> String { format!("MLEM ({} iterations)", self.iterations) }

    fn reconstruct(
        &mut self,
        measured: &ProjData,
        multiplicative: Option<&ProjData>,
        additive: Option<&ProjData>,
        initial: &Image,
    ) -> Result<Image, Error> {
        if initial.fov != self.fov {
            return Err("MLEM: initial image FOV differs from the configured FOV".into());
        }
        // Sensitivity: backprojection of the multiplicative factors (of ones,
        // if there are none)
        let sensitivity = match multiplicative {
            Some(m) => back_project(m, self.fov),
            None => {
                let mut ones = ProjData::zeros(measured.info);
                ones.map_in_place(|_| 1.0);
                back_project(&ones, self.fov)
            }
        };

        let mut image = initial.clone();
        // MLEM cannot recover from a voxel stuck at zero
        for v in image.data.iter_mut() {
            if *v <= 0.0 { *v = 1e-6 }
        }

        for _ in 0..self.iterations {
            let mut expected = forward_project(&image, measured.info);
            if let Some(m) = multiplicative { expected.mul_assign(m) }
            if let Some(a) = additive       { expected.add_assign(a) }

            let mut ratio = measured.clone();
            ratio.div_assign_guarded(&expected);
            if let Some(m) = multiplicative { ratio.mul_assign(m) }

            let update = back_project(&ratio, self.fov);
            for (v, (u, s)) in image.data.iter_mut()
                .zip(update.data.iter().zip(sensitivity.data.iter())) {
                if *s > 0.0 { *v *= u / s } else { *v = 0.0 }
            }
        }
        Ok(image)
    }
}
