use crate::error::{KnnError, Result};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Trait defining where the index draws its points from.
///
/// A source exposes up to `count()` vectors of `dim()` coordinates each,
/// addressed by a stable integer id. Exposed vectors must stay immutable for
/// the lifetime of the index; the index polls strictly by increasing id
/// during insertion, so a source may keep growing at the tail.
pub trait PointSource: Send + Sync {
    /// Dimension of every vector in the source.
    fn dim(&self) -> usize;

    /// Number of vectors currently exposed.
    fn count(&self) -> usize;

    /// A single coordinate of a single vector.
    fn get(&self, point: usize, coord: usize) -> f32;

    /// Borrow one full vector.
    fn point(&self, index: usize) -> &[f32];
}

/// An in-memory point source over a flat row-major buffer.
///
/// Rows can be appended with [`VecSource::feed`] after construction; ids
/// already exposed never move, so feeding while an index is bound is safe.
#[derive(Clone, Debug)]
pub struct VecSource {
    dim: usize,
    data: Vec<f32>,
}

impl VecSource {
    /// Creates an empty source for vectors of the given dimension.
    /// Dimension zero is rejected.
    pub fn new(dim: usize) -> Result<VecSource> {
        if dim == 0 {
            return Err(KnnError::InvalidParameter(
                "point dimension must be at least 1".to_string(),
            ));
        }
        Ok(VecSource {
            dim,
            data: Vec::new(),
        })
    }

    /// Creates a source over an existing flat buffer `[x0, y0, ..., x1, y1, ...]`.
    pub fn with_data(dim: usize, data: Vec<f32>) -> Result<VecSource> {
        let mut source = VecSource::new(dim)?;
        source.data = data;
        Ok(source)
    }

    /// Appends vectors from a flat buffer. A trailing partial vector is ignored.
    pub fn feed(&mut self, points: &[f32]) {
        let whole = points.len() - points.len() % self.dim;
        self.data.extend_from_slice(&points[..whole]);
    }

    /// Appends `count` uniform random vectors in `[0, 1)^dim`.
    pub fn feed_random(&mut self, count: usize) {
        let mut rng = StdRng::seed_from_u64(get_seed());
        self.data.reserve(count * self.dim);
        for _ in 0..count * self.dim {
            self.data.push(rng.r#gen::<f32>());
        }
    }

    /// Creates a source filled with `count` uniform random vectors in `[0, 1)^dim`.
    pub fn random(count: usize, dim: usize) -> Result<VecSource> {
        let mut source = VecSource::new(dim)?;
        source.feed_random(count);
        Ok(source)
    }
}

impl PointSource for VecSource {
    fn dim(&self) -> usize {
        self.dim
    }

    fn count(&self) -> usize {
        self.data.len() / self.dim
    }

    fn get(&self, point: usize, coord: usize) -> f32 {
        self.data[point * self.dim + coord]
    }

    fn point(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }
}

/// A point source loaded from a raw binary file of little-endian `f32`
/// records, `dim` coordinates per record, no header.
#[derive(Clone, Debug)]
pub struct BinarySource {
    dim: usize,
    data: Vec<f32>,
}

impl BinarySource {
    /// Opens `path` and reads up to `max_count` records of `dim` coordinates.
    ///
    /// The number of records actually exposed is `min(max_count, file_len /
    /// (4 * dim))`; a trailing partial record is dropped. A missing or
    /// unreadable file is an error, since the index cannot operate without
    /// its source.
    pub fn open<P: AsRef<Path>>(path: P, max_count: usize, dim: usize) -> Result<BinarySource> {
        if dim == 0 {
            return Err(KnnError::InvalidParameter(
                "point dimension must be at least 1".to_string(),
            ));
        }

        let file = File::open(path)?;
        let limit = (max_count as u64).saturating_mul(dim as u64).saturating_mul(4);
        let mut reader = BufReader::new(file).take(limit);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let floats = bytes.len() / 4;
        let records = floats / dim;
        let mut data = Vec::with_capacity(records * dim);
        for chunk in bytes.chunks_exact(4).take(records * dim) {
            data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Ok(BinarySource { dim, data })
    }
}

impl PointSource for BinarySource {
    fn dim(&self) -> usize {
        self.dim
    }

    fn count(&self) -> usize {
        self.data.len() / self.dim
    }

    fn get(&self, point: usize, coord: usize) -> f32 {
        self.data[point * self.dim + coord]
    }

    fn point(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }
}

fn get_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        (js_sys::Math::random() * 4294967296.0) as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        123456789 // Fixed seed for tests
    }
}
