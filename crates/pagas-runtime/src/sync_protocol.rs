//! Synchronization boundary exchange.
//!
//! Block boundaries rarely fall on page boundaries, so the first and last
//! page of a rank's block usually carry a slice of a neighbour's data.
//! Those pages stay mapped read-write locally; after the barrier in
//! `sync`, each rank re-reads the foreign slice of its shared boundary
//! pages so its writable copy reflects the neighbour's writes from the
//! finished phase. Cached interior pages are not patched, they are
//! dropped wholesale by the cache reset.
//!
//! This module only computes the transfers; the runtime performs them.

use pagas_core::BlockLayout;

/// One neighbour slice to re-read during `sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryFetch {
    /// Rank owning the slice.
    pub owner: u32,
    /// Byte offset within the allocation.
    pub offset: usize,
    pub len: usize,
}

/// Transfers `rank` must perform for one allocation at a sync point.
/// At most two: the low half of its first page and the high half of its
/// last.
pub fn boundary_transfers(layout: &BlockLayout, rank: u32) -> Vec<BoundaryFetch> {
    let mut fetches = Vec::with_capacity(2);
    let (first, last) = layout.owned_bytes(rank);

    if layout.shares_low_boundary(rank) {
        let page_start = layout.page_start(layout.page_of(first));
        fetches.push(BoundaryFetch {
            owner: layout.owner_of(page_start),
            offset: page_start,
            len: first - page_start,
        });
    }

    if layout.shares_high_boundary(rank) {
        let page = layout.page_of(last);
        let page_end = layout.page_start(page) + layout.page_len(page);
        fetches.push(BoundaryFetch {
            owner: layout.owner_of(last + 1),
            offset: last + 1,
            len: page_end - (last + 1),
        });
    }

    fetches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> BlockLayout {
        // 2000-byte blocks on 1024-byte pages; every interior boundary
        // splits a page.
        BlockLayout::new(1000, 8000, 4, 1024).unwrap()
    }

    #[test]
    fn edge_ranks_fetch_one_slice() {
        let l = layout();
        // Rank 0: no low neighbour; its last owned byte is 1999, in the
        // middle of page 1, so it re-reads bytes 2000..2048 from rank 1.
        assert_eq!(
            boundary_transfers(&l, 0),
            vec![BoundaryFetch {
                owner: 1,
                offset: 2000,
                len: 48,
            }]
        );
        // Rank 3: first owned byte is 6000, in the middle of page 5, so
        // it re-reads bytes 5120..6000 from rank 2; no high neighbour.
        assert_eq!(
            boundary_transfers(&l, 3),
            vec![BoundaryFetch {
                owner: 2,
                offset: 5120,
                len: 880,
            }]
        );
    }

    #[test]
    fn interior_rank_fetches_both_slices() {
        let l = layout();
        // Rank 1 owns [2000, 3999]: low slice 1024..2000 from rank 0,
        // high slice 4000..4096 from rank 2.
        assert_eq!(
            boundary_transfers(&l, 1),
            vec![
                BoundaryFetch {
                    owner: 0,
                    offset: 1024,
                    len: 976,
                },
                BoundaryFetch {
                    owner: 2,
                    offset: 4000,
                    len: 96,
                },
            ]
        );
    }

    #[test]
    fn page_aligned_blocks_exchange_nothing() {
        let l = BlockLayout::new(8, 8 * 1024, 4, 1024).unwrap();
        for rank in 0..4 {
            assert!(boundary_transfers(&l, rank).is_empty());
        }
    }

    #[test]
    fn short_tail_page_clips_high_slice() {
        // 2500 bytes over 2 ranks, 1024-byte pages: rank 0 owns
        // [0, 1249], rank 1 owns [1250, 2499]; page 2 ends at 2500.
        let l = BlockLayout::new(10, 2500, 2, 1024).unwrap();
        assert_eq!(
            boundary_transfers(&l, 0),
            vec![BoundaryFetch {
                owner: 1,
                offset: 1250,
                len: 2048 - 1250,
            }]
        );
        assert_eq!(
            boundary_transfers(&l, 1),
            vec![BoundaryFetch {
                owner: 0,
                offset: 1024,
                len: 1250 - 1024,
            }]
        );
    }
}
