//! Disk-resident cell store: one binary file per cell.
//!
//! File layout:
//! - Header (15 bytes):
//!   - Magic: "KCELL" (5 bytes)
//!   - Version: u8 (1 byte)
//!   - Depth: i32 (4 bytes, little-endian)
//!   - Point count: u32 (4 bytes, little-endian)
//!   - Descriptor flags: u8 (bit 0 normals, bit 1 probabilityDynamic,
//!     bit 2 depths)
//! - Payload: positions as 3 × f32 per point, then each flagged descriptor
//!   column in full, all little-endian.
//!
//! Saves write to a temporary file in the same directory and rename it into
//! place, so readers never observe a partially written cell. Concurrent
//! access from multiple processes is not supported.

use nalgebra::Vector3;
use rustc_hash::FxHashSet;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::{CellStore, INVALID_CELL_DEPTH};
use crate::core::PointCloud;
use crate::error::{MapError, Result};
use crate::grid::CellInfo;

/// Magic bytes identifying a cell file.
const MAGIC: &[u8; 5] = b"KCELL";

/// Current format version.
const VERSION: u8 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 15;

const FLAG_NORMALS: u8 = 1 << 0;
const FLAG_PROBABILITY_DYNAMIC: u8 = 1 << 1;
const FLAG_DEPTHS: u8 = 1 << 2;

/// File extension for cell files.
const EXTENSION: &str = "kcell";

/// Cell store writing one file per cell under a directory.
#[derive(Debug)]
pub struct DiskCellStore {
    directory: PathBuf,
}

impl DiskCellStore {
    /// Open a store rooted at `directory`, creating it if needed.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Directory the cells live in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn cell_path(&self, row: i32, column: i32, aisle: i32) -> PathBuf {
        self.directory
            .join(format!("{}_{}_{}.{}", row, column, aisle, EXTENSION))
    }

    fn invalid_file(path: &Path, reason: impl Into<String>) -> MapError {
        MapError::InvalidCellFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn decode(path: &Path, bytes: &[u8]) -> Result<(i32, PointCloud)> {
        if bytes.len() < HEADER_SIZE {
            return Err(Self::invalid_file(path, "truncated header"));
        }
        if &bytes[0..5] != MAGIC {
            return Err(Self::invalid_file(path, "bad magic"));
        }
        if bytes[5] != VERSION {
            return Err(Self::invalid_file(
                path,
                format!("unsupported version {}", bytes[5]),
            ));
        }
        let depth = i32::from_le_bytes(bytes[6..10].try_into().unwrap());
        let count = u32::from_le_bytes(bytes[10..14].try_into().unwrap()) as usize;
        let flags = bytes[14];

        let mut expected = count * 12;
        if flags & FLAG_NORMALS != 0 {
            expected += count * 12;
        }
        if flags & FLAG_PROBABILITY_DYNAMIC != 0 {
            expected += count * 4;
        }
        if flags & FLAG_DEPTHS != 0 {
            expected += count * 4;
        }
        if bytes.len() != HEADER_SIZE + expected {
            return Err(Self::invalid_file(path, "payload size mismatch"));
        }

        let mut offset = HEADER_SIZE;
        let read_f32 = |bytes: &[u8], offset: &mut usize| {
            let value = f32::from_le_bytes(bytes[*offset..*offset + 4].try_into().unwrap());
            *offset += 4;
            value
        };

        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            let x = read_f32(bytes, &mut offset);
            let y = read_f32(bytes, &mut offset);
            let z = read_f32(bytes, &mut offset);
            positions.push(Vector3::new(x, y, z));
        }
        let mut cloud = PointCloud::from_positions(positions);

        if flags & FLAG_NORMALS != 0 {
            let mut normals = Vec::with_capacity(count);
            for _ in 0..count {
                let x = read_f32(bytes, &mut offset);
                let y = read_f32(bytes, &mut offset);
                let z = read_f32(bytes, &mut offset);
                normals.push(Vector3::new(x, y, z));
            }
            cloud.set_normals(normals);
        }
        if flags & FLAG_PROBABILITY_DYNAMIC != 0 {
            let mut probabilities = Vec::with_capacity(count);
            for _ in 0..count {
                probabilities.push(read_f32(bytes, &mut offset));
            }
            cloud.set_probability_dynamic(probabilities);
        }
        if flags & FLAG_DEPTHS != 0 {
            let mut depths = Vec::with_capacity(count);
            for _ in 0..count {
                depths.push(i32::from_le_bytes(
                    bytes[offset..offset + 4].try_into().unwrap(),
                ));
                offset += 4;
            }
            cloud.set_depths(depths);
        }

        Ok((depth, cloud))
    }

    fn encode(info: &CellInfo, cloud: &PointCloud) -> Vec<u8> {
        let count = cloud.len();
        let mut flags = 0u8;
        if cloud.normals().is_some() {
            flags |= FLAG_NORMALS;
        }
        if cloud.probability_dynamic().is_some() {
            flags |= FLAG_PROBABILITY_DYNAMIC;
        }
        if cloud.depths().is_some() {
            flags |= FLAG_DEPTHS;
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + count * 32);
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&info.depth.to_le_bytes());
        bytes.extend_from_slice(&(count as u32).to_le_bytes());
        bytes.push(flags);

        for position in cloud.positions() {
            bytes.extend_from_slice(&position.x.to_le_bytes());
            bytes.extend_from_slice(&position.y.to_le_bytes());
            bytes.extend_from_slice(&position.z.to_le_bytes());
        }
        if let Some(normals) = cloud.normals() {
            for normal in normals {
                bytes.extend_from_slice(&normal.x.to_le_bytes());
                bytes.extend_from_slice(&normal.y.to_le_bytes());
                bytes.extend_from_slice(&normal.z.to_le_bytes());
            }
        }
        if let Some(probabilities) = cloud.probability_dynamic() {
            for probability in probabilities {
                bytes.extend_from_slice(&probability.to_le_bytes());
            }
        }
        if let Some(depths) = cloud.depths() {
            for depth in depths {
                bytes.extend_from_slice(&depth.to_le_bytes());
            }
        }
        bytes
    }

    /// Parse "{row}_{column}_{aisle}" out of a cell file stem.
    fn parse_stem(stem: &str) -> Option<(i32, i32, i32)> {
        let mut parts = stem.split('_');
        let row = parts.next()?.parse().ok()?;
        let column = parts.next()?.parse().ok()?;
        let aisle = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((row, column, aisle))
    }

    /// Read only the depth field out of a cell file.
    fn read_depth(&self, path: &Path) -> Result<i32> {
        let mut header = [0u8; HEADER_SIZE];
        let mut file = fs::File::open(path)?;
        file.read_exact(&mut header)
            .map_err(|_| Self::invalid_file(path, "truncated header"))?;
        if &header[0..5] != MAGIC || header[5] != VERSION {
            return Err(Self::invalid_file(path, "bad magic or version"));
        }
        Ok(i32::from_le_bytes(header[6..10].try_into().unwrap()))
    }
}

impl CellStore for DiskCellStore {
    fn save_cell(&mut self, info: CellInfo, cloud: &PointCloud) -> Result<()> {
        let path = self.cell_path(info.row, info.column, info.aisle);
        let temp_path = path.with_extension("tmp");

        let bytes = Self::encode(&info, cloud);
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn retrieve_cell(
        &self,
        row: i32,
        column: i32,
        aisle: i32,
        _queried_depth: i32,
    ) -> Result<(CellInfo, PointCloud)> {
        let path = self.cell_path(row, column, aisle);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok((
                    CellInfo::new(row, column, aisle, INVALID_CELL_DEPTH),
                    PointCloud::new(),
                ));
            }
            Err(error) => return Err(error.into()),
        };
        let (depth, cloud) = Self::decode(&path, &bytes)?;
        Ok((CellInfo::new(row, column, aisle, depth), cloud))
    }

    fn all_cell_infos(&self) -> Result<FxHashSet<CellInfo>> {
        let mut infos = FxHashSet::default();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((row, column, aisle)) = Self::parse_stem(stem) else {
                continue;
            };
            let depth = self.read_depth(&path)?;
            infos.insert(CellInfo::new(row, column, aisle, depth));
        }
        Ok(infos)
    }

    fn clear_all(&mut self) -> Result<()> {
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let extension = path.extension().and_then(|e| e.to_str());
            if matches!(extension, Some(EXTENSION) | Some("tmp")) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
