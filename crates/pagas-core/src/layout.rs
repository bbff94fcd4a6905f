//! Block-distribution layout math.
//!
//! A distributed array is split blockwise along its leading dimension:
//! rank `r` owns leading indices `[r * ceil(extent / ranks), (r + 1) *
//! ceil(extent / ranks))`, except the last rank, which owns the remainder.
//! All owner, boundary, and page arithmetic used by the fault engine and
//! the synchronization protocol lives here so it can be tested without any
//! memory mapping.

use thiserror::Error;

/// Errors produced while constructing a layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("leading extent must be non-zero")]
    EmptyExtent,
    #[error("total size {size} is not a multiple of the leading extent {extent}")]
    IndivisibleStride { size: usize, extent: usize },
    #[error("allocation of {size} bytes is smaller than one page per rank ({ranks} ranks, {page_size}-byte pages)")]
    TooSmall {
        size: usize,
        ranks: u32,
        page_size: usize,
    },
    #[error("leading extent {extent} leaves some of {ranks} ranks with an empty block")]
    UnevenExtent { extent: usize, ranks: u32 },
}

/// Half-open range of page indices within an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: usize,
    pub end: usize,
}

impl PageSpan {
    /// Number of pages in the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span contains no pages.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether `page` falls inside the span.
    pub fn contains(&self, page: usize) -> bool {
        self.start <= page && page < self.end
    }
}

/// Returns ceil(a / b).
pub(crate) fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Block distribution of one allocation over the ranks of a job.
///
/// Offsets are relative to the allocation base; the registry translates
/// absolute addresses before consulting the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Total allocation size in bytes.
    size: usize,
    /// Extent of the leading (distributed) dimension.
    extent: usize,
    /// Bytes covered by one leading index.
    stride: usize,
    /// Bytes owned by every rank except possibly the last.
    bytes_per_block: usize,
    /// Number of ranks in the job.
    ranks: u32,
    /// Logical page size in bytes.
    page_size: usize,
}

impl BlockLayout {
    /// Build the layout for an allocation of `size` bytes whose leading
    /// dimension has `extent` entries, distributed over `ranks` ranks with
    /// `page_size`-byte pages.
    pub fn new(extent: usize, size: usize, ranks: u32, page_size: usize) -> Result<Self, LayoutError> {
        if extent == 0 {
            return Err(LayoutError::EmptyExtent);
        }
        if size % extent != 0 {
            return Err(LayoutError::IndivisibleStride { size, extent });
        }
        if size / page_size < ranks as usize {
            return Err(LayoutError::TooSmall {
                size,
                ranks,
                page_size,
            });
        }
        // The last rank owns the remainder after ceil-sized blocks; it
        // must be non-empty or its byte range would be inverted.
        if div_ceil(extent, ranks as usize) * (ranks as usize - 1) >= extent {
            return Err(LayoutError::UnevenExtent { extent, ranks });
        }
        let stride = size / extent;
        let bytes_per_block = div_ceil(extent, ranks as usize) * stride;
        Ok(Self {
            size,
            extent,
            stride,
            bytes_per_block,
            ranks,
            page_size,
        })
    }

    /// Total allocation size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Extent of the leading dimension.
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Bytes covered by one leading index.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes owned by every rank except possibly the last.
    pub fn bytes_per_block(&self) -> usize {
        self.bytes_per_block
    }

    /// Logical page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages spanned by the allocation (last page may be partial).
    pub fn page_count(&self) -> usize {
        div_ceil(self.size, self.page_size)
    }

    /// First leading index owned by `rank`.
    pub fn start(&self, rank: u32) -> usize {
        (rank as usize * div_ceil(self.extent, self.ranks as usize)).min(self.extent)
    }

    /// One past the last leading index owned by `rank`.
    pub fn end(&self, rank: u32) -> usize {
        if rank == self.ranks - 1 {
            self.extent
        } else {
            ((rank as usize + 1) * div_ceil(self.extent, self.ranks as usize)).min(self.extent)
        }
    }

    /// Byte range `[first, last]` (inclusive) owned by `rank`.
    pub fn owned_bytes(&self, rank: u32) -> (usize, usize) {
        let first = rank as usize * self.bytes_per_block;
        let last = if rank == self.ranks - 1 {
            self.size - 1
        } else {
            (rank as usize + 1) * self.bytes_per_block - 1
        };
        (first, last)
    }

    /// Rank owning the byte at `offset`.
    pub fn owner_of(&self, offset: usize) -> u32 {
        ((offset / self.bytes_per_block) as u32).min(self.ranks - 1)
    }

    /// Page index containing `offset`.
    pub fn page_of(&self, offset: usize) -> usize {
        offset / self.page_size
    }

    /// Byte offset where `page` starts.
    pub fn page_start(&self, page: usize) -> usize {
        page * self.page_size
    }

    /// Number of bytes of `page` that lie inside the allocation.
    pub fn page_len(&self, page: usize) -> usize {
        (self.size - self.page_start(page)).min(self.page_size)
    }

    /// Rank owning the first byte of the page after `page`, or `None` if
    /// that page lies outside the allocation. Drives sequential prefetch.
    pub fn next_page_owner(&self, page: usize) -> Option<u32> {
        let next_start = (page + 1) * self.page_size;
        if next_start >= self.size {
            None
        } else {
            Some(self.owner_of(next_start))
        }
    }

    /// Pages whose content is owned by `rank`, rounded outward so shared
    /// boundary pages appear in both neighbours' spans.
    pub fn owned_pages(&self, rank: u32) -> PageSpan {
        let (first, last) = self.owned_bytes(rank);
        PageSpan {
            start: first / self.page_size,
            end: last / self.page_size + 1,
        }
    }

    /// Whether `rank` shares its first page with the previous rank, i.e.
    /// its first owned byte falls in the middle of a page.
    pub fn shares_low_boundary(&self, rank: u32) -> bool {
        let (first, _) = self.owned_bytes(rank);
        rank != 0 && first % self.page_size != 0
    }

    /// Whether `rank` shares its last page with the next rank.
    pub fn shares_high_boundary(&self, rank: u32) -> bool {
        let (_, last) = self.owned_bytes(rank);
        rank != self.ranks - 1 && (last + 1) % self.page_size != 0
    }
}
