//! Row-chunked matrix with a bounded LRU cache of materialised chunks.
//!
//! Rows are grouped into fixed-size chunks. A chunk is turned into a
//! [`CsrMatrix`] the first time it is needed and kept until more than
//! `max_cached_chunks` chunks are resident, at which point the least recently
//! used one is dropped. Dropped chunks are rebuilt on the next access.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use log::trace;

use crate::core::traits::{MatShape, MatVec, RowAccess};
use crate::error::SolverError;
use crate::matrix::dense::DenseMatrix;
use crate::matrix::sparse::CsrMatrix;

/// Backing store that can produce any contiguous block of rows.
pub trait ChunkSource: Send + Sync {
    /// `(rows, cols)` of the whole source.
    fn dims(&self) -> (usize, usize);
    /// Rows `rows` as a standalone CSR matrix with `rows.len()` rows.
    fn materialize(&self, rows: Range<usize>) -> CsrMatrix;
    /// Stored entries in the whole source.
    fn stored_entries(&self) -> usize;
}

impl ChunkSource for DenseMatrix {
    fn dims(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }
    fn materialize(&self, rows: Range<usize>) -> CsrMatrix {
        let ncols = self.ncols();
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0u32);
        for r in rows.clone() {
            for (c, v) in self.row_entries(r) {
                col_indices.push(c as u32);
                values.push(v);
            }
            row_ptr.push(col_indices.len() as u32);
        }
        CsrMatrix::from_parts_unchecked(rows.len(), ncols, row_ptr, col_indices, values, true)
    }
    fn stored_entries(&self) -> usize {
        self.nnz()
    }
}

impl ChunkSource for CsrMatrix {
    fn dims(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }
    fn materialize(&self, rows: Range<usize>) -> CsrMatrix {
        self.slice_rows(rows)
    }
    fn stored_entries(&self) -> usize {
        self.nnz()
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

#[derive(Default)]
struct ChunkCache {
    chunks: HashMap<usize, Arc<CsrMatrix>>,
    // Front is least recently used.
    order: VecDeque<usize>,
    stats: CacheStats,
}

impl ChunkCache {
    fn touch(&mut self, id: usize) {
        if let Some(pos) = self.order.iter().position(|&c| c == id) {
            self.order.remove(pos);
        }
        self.order.push_back(id);
    }
}

pub struct StreamingMatrix {
    source: Arc<dyn ChunkSource>,
    chunk_size: usize,
    max_cached_chunks: usize,
    cache: Mutex<ChunkCache>,
}

impl fmt::Debug for StreamingMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingMatrix")
            .field("dims", &self.source.dims())
            .field("chunk_size", &self.chunk_size)
            .field("max_cached_chunks", &self.max_cached_chunks)
            .field("cache", &self.cache_stats())
            .finish()
    }
}

impl StreamingMatrix {
    /// Stream over a dense matrix in chunks of `chunk_size` rows.
    pub fn from_matrix(
        dense: DenseMatrix,
        chunk_size: usize,
        max_cached_chunks: usize,
    ) -> Result<Self, SolverError> {
        Self::from_source(Arc::new(dense), chunk_size, max_cached_chunks)
    }

    pub fn from_source(
        source: Arc<dyn ChunkSource>,
        chunk_size: usize,
        max_cached_chunks: usize,
    ) -> Result<Self, SolverError> {
        if chunk_size == 0 {
            return Err(SolverError::Configuration("chunk size must be > 0".into()));
        }
        if max_cached_chunks == 0 {
            return Err(SolverError::Configuration("max cached chunks must be > 0".into()));
        }
        Ok(Self { source, chunk_size, max_cached_chunks, cache: Mutex::default() })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn num_chunks(&self) -> usize {
        self.source.dims().0.div_ceil(self.chunk_size)
    }

    fn chunk_rows(&self, id: usize) -> Range<usize> {
        let start = id * self.chunk_size;
        start..(start + self.chunk_size).min(self.source.dims().0)
    }

    /// The chunk with index `id`, or `None` if `id` is past the last chunk.
    pub fn get_chunk(&self, id: usize) -> Option<Arc<CsrMatrix>> {
        if id >= self.num_chunks() {
            return None;
        }
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(chunk) = cache.chunks.get(&id).cloned() {
                cache.stats.hits += 1;
                cache.touch(id);
                return Some(chunk);
            }
            cache.stats.misses += 1;
        }

        // Built without holding the lock; a racing builder produces the same
        // chunk and whichever lands second simply replaces it.
        let built = Arc::new(self.source.materialize(self.chunk_rows(id)));
        trace!("streaming: materialised chunk {id} ({} nnz)", built.nnz());

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.chunks.insert(id, Arc::clone(&built));
        cache.touch(id);
        while cache.chunks.len() > self.max_cached_chunks {
            let Some(lru) = cache.order.pop_front() else { break };
            if cache.chunks.remove(&lru).is_some() {
                cache.stats.evictions += 1;
                trace!("streaming: evicted chunk {lru}");
            }
        }
        Some(built)
    }

    pub fn cached_chunks(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).chunks.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).stats
    }
}

impl MatShape for StreamingMatrix {
    fn nrows(&self) -> usize {
        self.source.dims().0
    }
    fn ncols(&self) -> usize {
        self.source.dims().1
    }
}

impl MatVec for StreamingMatrix {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols(), "Input vector x has incorrect length");
        assert_eq!(y.len(), self.nrows(), "Output vector y has incorrect length");
        for id in 0..self.num_chunks() {
            let rows = self.chunk_rows(id);
            if let Some(chunk) = self.get_chunk(id) {
                chunk.multiply_vector(x, &mut y[rows]);
            }
        }
    }
}

/// Entries of one streamed row. Holds its chunk alive while iterating.
#[derive(Clone)]
pub struct StreamingRow {
    chunk: Option<Arc<CsrMatrix>>,
    pos: usize,
    end: usize,
}

impl Iterator for StreamingRow {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunk.as_ref()?;
        if self.pos >= self.end {
            return None;
        }
        let k = self.pos;
        self.pos += 1;
        Some((chunk.col_indices()[k] as usize, chunk.values()[k]))
    }
}

impl RowAccess for StreamingMatrix {
    type Row<'a> = StreamingRow;

    fn row_entries(&self, row: usize) -> StreamingRow {
        let chunk = self.get_chunk(row / self.chunk_size);
        let local = row % self.chunk_size;
        let (pos, end) = chunk.as_ref().map_or((0, 0), |c| {
            (c.row_ptr()[local] as usize, c.row_ptr()[local + 1] as usize)
        });
        StreamingRow { chunk, pos, end }
    }

    fn nnz(&self) -> usize {
        self.source.stored_entries()
    }

    /// Resident footprint: at most `max_cached_chunks` chunks of average density.
    fn memory_bytes(&self) -> usize {
        let rows = self.nrows().max(1);
        let per_row = self.source.stored_entries().div_ceil(rows);
        let resident_rows = (self.chunk_size * self.max_cached_chunks).min(rows);
        resident_rows * (per_row * (std::mem::size_of::<f64>() + std::mem::size_of::<u32>())
            + std::mem::size_of::<u32>())
    }
}
