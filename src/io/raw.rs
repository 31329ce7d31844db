//! Self-describing binary containers for images and projection data:
//! a small header followed by little-endian `f32`s.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use binrw::{binrw, BinReaderExt, BinWriterExt};
use units::mm;

use crate::Error;
use crate::fov::FOV;
use crate::image::Image;
use crate::projdata::ProjData;
use crate::scanner::{ProjDataInfo, Scanner};

// --------------------------------------------------------------------------------
//                  Images

#[binrw]
#[brw(little, magic = b"SSIM")]
pub struct RawImage {
    pub n: [u32; 3],
    pub voxel_size_mm: [f32; 3],
    #[br(count = n[0] as usize * n[1] as usize * n[2] as usize)]
    pub data: Vec<f32>,
}

impl RawImage {

    pub fn read_from_file(path: &Path) -> Result<Self, Error> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(reader.read_le()?)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_le(self)?;
        Ok(())
    }
}

impl From<&Image> for RawImage {
    fn from(image: &Image) -> Self {
        let vs = image.fov.voxel_size;
        Self {
            n: image.fov.n.map(|x| x as u32),
            voxel_size_mm: [units::mm_(vs.x), units::mm_(vs.y), units::mm_(vs.z)],
            data: image.data.clone(),
        }
    }
}

impl From<&RawImage> for Image {
    fn from(raw: &RawImage) -> Self {
        let n = raw.n.map(|x| x as usize);
        let [vx, vy, vz] = raw.voxel_size_mm;
        let fov = FOV::new((mm(vx * n[0] as f32), mm(vy * n[1] as f32), mm(vz * n[2] as f32)),
                           (n[0], n[1], n[2]));
        Image::new(fov, raw.data.clone())
    }
}

// --------------------------------------------------------------------------------
//                  Projection data

fn projdata_bin_count(num_rings: u32, max_segment: u32, num_views: u32,
                      num_tangential: u32, rebinned: u8) -> usize {
    let axials: usize = if rebinned != 0 {
        2 * num_rings as usize - 1
    } else {
        (-(max_segment as i64)..=max_segment as i64)
            .map(|s| num_rings as usize - s.unsigned_abs() as usize)
            .sum()
    };
    axials * num_views as usize * num_tangential as usize
}

#[binrw]
#[brw(little, magic = b"SSPD")]
pub struct RawProjData {
    pub num_rings: u32,
    pub num_dets_per_ring: u32,
    pub ring_radius_mm: f32,
    pub ring_spacing_mm: f32,
    pub max_segment: u32,
    pub num_tangential: u32,
    pub rebinned: u8,
    #[br(count = projdata_bin_count(num_rings, max_segment, num_dets_per_ring / 2,
                                    num_tangential, rebinned))]
    pub data: Vec<f32>,
}

impl RawProjData {

    pub fn read_from_file(path: &Path) -> Result<Self, Error> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(reader.read_le()?)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_le(self)?;
        Ok(())
    }
}

impl From<&ProjData> for RawProjData {
    fn from(projdata: &ProjData) -> Self {
        let info = projdata.info;
        let data = projdata.segments_raw().iter()
            .flat_map(|s| s.iter().copied())
            .collect();
        Self {
            num_rings: info.scanner.num_rings as u32,
            num_dets_per_ring: info.scanner.num_dets_per_ring as u32,
            ring_radius_mm: units::mm_(info.scanner.ring_radius),
            ring_spacing_mm: units::mm_(info.scanner.ring_spacing),
            max_segment: info.max_segment as u32,
            num_tangential: info.num_tangential as u32,
            rebinned: info.rebinned as u8,
            data,
        }
    }
}

impl TryFrom<RawProjData> for ProjData {
    type Error = Error;
    fn try_from(raw: RawProjData) -> Result<Self, Error> {
        let scanner = Scanner {
            num_rings: raw.num_rings as usize,
            num_dets_per_ring: raw.num_dets_per_ring as usize,
            ring_radius: mm(raw.ring_radius_mm),
            ring_spacing: mm(raw.ring_spacing_mm),
        };
        let info = ProjDataInfo {
            scanner,
            max_segment: raw.max_segment as usize,
            num_tangential: raw.num_tangential as usize,
            rebinned: raw.rebinned != 0,
        };
        let mut segments = vec![];
        let mut offset = 0;
        for s in info.segments() {
            let shape = (info.num_axial(s), info.num_views(), info.num_tangential);
            let len = shape.0 * shape.1 * shape.2;
            let chunk = raw.data.get(offset..offset + len)
                .ok_or("projection data file shorter than its header promises")?;
            segments.push(ndarray::Array3::from_shape_vec(shape, chunk.to_vec())?);
            offset += len;
        }
        if offset != raw.data.len() {
            return Err("projection data file longer than its header promises".into());
        }
        Ok(ProjData::from_segments(info, segments))
    }
}
