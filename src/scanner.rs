//! Cylindrical scanner geometry and the layout of its projection data.
//!
//! Projection data are indexed by (segment, view, axial position, tangential
//! position).  Segments group sinograms by ring difference (span 1):
//! segment s holds the coincidences between rings (a, a + s).

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use serde::Deserialize;
use units::uom::ConstZero;
use units::{Length, mm_, ratio_, turn};

use crate::{Error, Point, RatioVec, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scanner {
    pub num_rings: usize,
    pub num_dets_per_ring: usize,
    #[serde(deserialize_with = "crate::config::deserialize_uom")]
    pub ring_radius: Length,
    #[serde(deserialize_with = "crate::config::deserialize_uom")]
    pub ring_spacing: Length,
}

/// Which image axis a detector count constrains
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis { Transverse, Axial }

impl Scanner {

    pub fn total_detectors(&self) -> usize { self.num_rings * self.num_dets_per_ring }

    pub fn axial_length(&self) -> Length { self.ring_spacing * self.num_rings as f32 }

    /// Centre of crystal `det` in ring `ring`
    pub fn detector_coordinate(&self, ring: usize, det: usize) -> Point {
        let phi = turn(det as f32 / self.num_dets_per_ring as f32);
        let z = (ring as f32 - (self.num_rings as f32 - 1.0) / 2.0) * self.ring_spacing;
        Point::new(self.ring_radius * phi.cos(),
                   self.ring_radius * phi.sin(),
                   z)
    }

    /// Inward-pointing unit normal of the detector surface at `coord`
    pub fn detector_normal(&self, coord: Point) -> RatioVec {
        let radial = Vector::new(coord.x, coord.y, Length::ZERO);
        -radial / radial.norm()
    }

    /// The voxel size which samples the scanner geometry optimally along
    /// `axis`, given `n` detectors (crystals per ring, or rings): half the
    /// detector pitch.
    pub fn num_dets_to_vox_size(&self, n: usize, axis: Axis) -> Length {
        match axis {
            Axis::Transverse => self.ring_radius * std::f32::consts::PI / n as f32,
            Axis::Axial      => self.axial_length() / (2.0 * n as f32),
        }
    }

    /// Inverse of `num_dets_to_vox_size`: the detector count whose optimal
    /// voxel size is closest to `size`
    pub fn vox_size_to_num_dets(&self, size: Length, axis: Axis) -> usize {
        let n = match axis {
            Axis::Transverse => self.ring_radius * std::f32::consts::PI / size,
            Axis::Axial      => self.axial_length() / (size * 2.0),
        };
        ratio_(n).round() as usize
    }
}

// --------------------------------------------------------------------------------
//                  Projection data layout

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjDataInfo {
    pub scanner: Scanner,
    /// Segments run from `-max_segment` to `max_segment`
    pub max_segment: usize,
    /// Number of tangential positions (odd, centred on zero)
    pub num_tangential: usize,
    /// Axially-rebinned (single-segment, half-ring-spacing) geometry?
    pub rebinned: bool,
}

/// One (view, segment) unit of work
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewSegment {
    pub view: usize,
    pub segment: i32,
}

impl ProjDataInfo {

    /// Full 3D layout for `scanner`, with all ring differences
    pub fn new_full(scanner: Scanner) -> Self {
        let num_tangential = (scanner.num_dets_per_ring / 2).max(1) | 1;
        Self { scanner, max_segment: scanner.num_rings - 1, num_tangential, rebinned: false }
    }

    /// The single-segment layout produced by axial rebinning of `self`:
    /// one sinogram per half-ring-spacing axial slot
    pub fn ssrb(&self) -> Self {
        Self { max_segment: 0, rebinned: true, ..*self }
    }

    pub fn num_views(&self) -> usize { self.scanner.num_dets_per_ring / 2 }

    pub fn num_segments(&self) -> usize { 2 * self.max_segment + 1 }

    pub fn segments(&self) -> impl Iterator<Item = i32> {
        -(self.max_segment as i32)..=self.max_segment as i32
    }

    pub fn num_axial(&self, segment: i32) -> usize {
        if self.rebinned {
            2 * self.scanner.num_rings - 1
        } else {
            self.scanner.num_rings - segment.unsigned_abs() as usize
        }
    }

    pub fn tangential_positions(&self) -> impl Iterator<Item = i32> {
        let half = (self.num_tangential / 2) as i32;
        -half..=half
    }

    /// The ring pair contributing to (segment, axial position)
    pub fn rings_for(&self, segment: i32, axial: usize) -> (usize, usize) {
        if self.rebinned {
            // axial slots interleave direct (even) and cross (odd) planes
            (axial / 2, axial - axial / 2)
        } else if segment >= 0 {
            (axial, axial + segment as usize)
        } else {
            (axial + (-segment) as usize, axial)
        }
    }

    /// The in-ring crystal pair measured by (view, tangential position),
    /// for a scanner without arc correction
    pub fn det_pair_for(&self, view: usize, tang: i32) -> (usize, usize) {
        let n = self.scanner.num_dets_per_ring as i32;
        let a = (view as i32 + (tang >> 1)).rem_euclid(n) as usize;
        let b = (view as i32 - ((tang + 1) >> 1) + n / 2).rem_euclid(n) as usize;
        (a, b)
    }

    /// The detector-pair endpoints of the line of response of a bin
    pub fn lor_endpoints(&self, segment: i32, view: usize, axial: usize, tang: i32) -> (Point, Point) {
        let (ring_a, ring_b) = self.rings_for(segment, axial);
        let (det_a, det_b) = self.det_pair_for(view, tang);
        (self.scanner.detector_coordinate(ring_a, det_a),
         self.scanner.detector_coordinate(ring_b, det_b))
    }

    pub fn view_segments(&self) -> Vec<ViewSegment> {
        itertools::iproduct!(self.segments(), 0..self.num_views())
            .map(|(segment, view)| ViewSegment { view, segment })
            .collect()
    }

    /// Total number of bins across all segments
    pub fn total_bins(&self) -> usize {
        self.segments()
            .map(|s| self.num_views() * self.num_axial(s) * self.num_tangential)
            .sum()
    }
}

/// Reduced-geometry layout for a scanner with fewer crystals and rings,
/// keeping the physical radius and axial extent of the original.
///
/// Fails if either count is zero, exceeds the original sampling, or (for
/// crystals) is odd, since the view count is half the crystal count.
pub fn subsample_projdata_info(
    original: &ProjDataInfo,
    new_num_dets_per_ring: usize,
    new_num_rings: usize,
) -> Result<ProjDataInfo, Error> {
    let scanner = &original.scanner;
    if new_num_dets_per_ring == 0 || new_num_rings == 0 {
        return Err("subsampled scanner needs at least one detector and one ring".into());
    }
    if new_num_dets_per_ring > scanner.num_dets_per_ring || new_num_rings > scanner.num_rings {
        return Err(format!(
            "subsampled scanner ({new_num_dets_per_ring} dets x {new_num_rings} rings) \
             exceeds the original sampling ({} x {})",
            scanner.num_dets_per_ring, scanner.num_rings).into());
    }
    if new_num_dets_per_ring % 2 != 0 {
        return Err("subsampled detectors per ring must be even".into());
    }
    let reduced = Scanner {
        num_rings: new_num_rings,
        num_dets_per_ring: new_num_dets_per_ring,
        ring_radius: scanner.ring_radius,
        ring_spacing: scanner.axial_length() / new_num_rings as f32,
    };
    Ok(ProjDataInfo::new_full(reduced))
}

// --------------------------------------------------------------------------------
//                  Detection points

/// Deduplicating store of detector coordinates, filled on demand.
///
/// Coincident coordinates (the same crystal seen through different bins) map
/// to a single index, which is what the integral caches are keyed on.
#[derive(Clone, Debug, Default)]
pub struct DetectionPoints {
    points: Vec<Point>,
    index: HashMap<[OrderedFloat<f32>; 3], usize>,
}

impl DetectionPoints {

    fn key(coord: Point) -> [OrderedFloat<f32>; 3] {
        [OrderedFloat(mm_(coord.x)), OrderedFloat(mm_(coord.y)), OrderedFloat(mm_(coord.z))]
    }

    /// Index of `coord`, inserting it if it has not been seen before
    pub fn find_or_insert(&mut self, coord: Point) -> usize {
        let key = Self::key(coord);
        if let Some(&i) = self.index.get(&key) { return i }
        let i = self.points.len();
        self.points.push(coord);
        self.index.insert(key, i);
        i
    }

    pub fn get(&self, i: usize) -> Point { self.points[i] }

    pub fn len(&self) -> usize { self.points.len() }

    pub fn is_empty(&self) -> bool { self.points.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use units::mm;

    fn small_scanner() -> Scanner {
        Scanner {
            num_rings: 4,
            num_dets_per_ring: 16,
            ring_radius: mm(200.0),
            ring_spacing: mm(10.0),
        }
    }

    #[test]
    fn detector_coordinates_lie_on_the_ring() {
        let scanner = small_scanner();
        for ring in 0..scanner.num_rings {
            for det in 0..scanner.num_dets_per_ring {
                let p = scanner.detector_coordinate(ring, det);
                let r = (p.x * p.x + p.y * p.y).sqrt();
                assert_float_eq!(mm_(r), 200.0, rel <= 1e-5);
            }
        }
    }

    #[test]
    fn rings_are_centred_axially() {
        let scanner = small_scanner();
        let z_sum: f32 = (0..scanner.num_rings)
            .map(|ring| mm_(scanner.detector_coordinate(ring, 0).z))
            .sum();
        assert_float_eq!(z_sum, 0.0, abs <= 1e-4);
    }

    proptest! {
        // the round trip may be off by at most one detector
        #[test]
        fn vox_size_round_trip_within_one(n in 4..400_usize) {
            let scanner = small_scanner();
            for axis in [Axis::Transverse, Axis::Axial] {
                let size = scanner.num_dets_to_vox_size(n, axis);
                let back = scanner.vox_size_to_num_dets(size, axis);
                prop_assert!(back.abs_diff(n) <= 1);
            }
        }
    }

    #[rstest(/**/ segment, axial, expected,
             case( 0, 0, (0, 0)),
             case( 0, 3, (3, 3)),
             case( 2, 1, (1, 3)),
             case(-2, 1, (3, 1)),
             case( 3, 0, (0, 3)),
    )]
    fn ring_pairs(segment: i32, axial: usize, expected: (usize, usize)) {
        let info = ProjDataInfo::new_full(small_scanner());
        assert_eq!(info.rings_for(segment, axial), expected);
    }

    #[test]
    fn rebinned_axial_slots_interleave_direct_and_cross_planes() {
        let info = ProjDataInfo::new_full(small_scanner()).ssrb();
        assert_eq!(info.num_axial(0), 7);
        assert_eq!(info.rings_for(0, 0), (0, 0));
        assert_eq!(info.rings_for(0, 1), (0, 1));
        assert_eq!(info.rings_for(0, 2), (1, 1));
        assert_eq!(info.rings_for(0, 6), (3, 3));
    }

    #[test]
    fn detector_pairs_are_distinct_and_in_range() {
        let info = ProjDataInfo::new_full(small_scanner());
        for view in 0..info.num_views() {
            for tang in info.tangential_positions() {
                let (a, b) = info.det_pair_for(view, tang);
                assert!(a < 16 && b < 16);
                assert_ne!(a, b, "a LOR needs two distinct crystals");
            }
        }
    }

    #[test]
    fn zero_tangential_position_gives_opposing_detectors() {
        let info = ProjDataInfo::new_full(small_scanner());
        let (a, b) = info.det_pair_for(0, 0);
        assert_eq!((a + 8) % 16, b);
    }

    #[test]
    fn subsampling_rejects_incompatible_counts() {
        let info = ProjDataInfo::new_full(small_scanner());
        assert!(subsample_projdata_info(&info, 32, 2).is_err()); // more dets than source
        assert!(subsample_projdata_info(&info,  8, 9).is_err()); // more rings than source
        assert!(subsample_projdata_info(&info,  7, 2).is_err()); // odd detector count
        assert!(subsample_projdata_info(&info,  0, 2).is_err());
    }

    #[test]
    fn subsampling_preserves_the_axial_extent() {
        let info = ProjDataInfo::new_full(small_scanner());
        let sub = subsample_projdata_info(&info, 8, 2).unwrap();
        assert_float_eq!(mm_(sub.scanner.axial_length()),
                         mm_(info.scanner.axial_length()), ulps <= 2);
        assert_eq!(sub.scanner.num_dets_per_ring, 8);
        assert_eq!(sub.scanner.num_rings, 2);
    }

    #[test]
    fn detection_points_deduplicate_coincident_coordinates() {
        let mut points = DetectionPoints::default();
        let p = Point::in_mm(1.0, 2.0, 3.0);
        let q = Point::in_mm(1.0, 2.0, -3.0);
        let i = points.find_or_insert(p);
        let j = points.find_or_insert(q);
        let k = points.find_or_insert(p);
        assert_ne!(i, j);
        assert_eq!(i, k);
        assert_eq!(points.len(), 2);
    }
}
