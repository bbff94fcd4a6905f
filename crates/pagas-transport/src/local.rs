//! In-process cluster transport.
//!
//! Runs a whole job inside one process: each rank is a thread holding one
//! [`LocalTransport`] endpoint. One-sided reads and writes go straight to
//! the owning rank's exported memory; collectives are built from a
//! generation barrier and per-rank crossbeam mailboxes. This is the
//! transport the runtime's integration tests and single-machine demos use.

use crate::{SegmentId, Transport, TransferHandle, TransportError};
use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

/// Exported region, stored as plain integers so the table stays `Send`.
#[derive(Debug, Clone, Copy)]
struct Region {
    base: usize,
    len: usize,
}

/// Tagged collective message: (source rank, payload).
type Mail = (u32, Vec<u8>);

struct BarrierState {
    arrived: u32,
    generation: u64,
}

/// State shared by every endpoint of one cluster.
struct ClusterShared {
    size: u32,
    barrier: Mutex<BarrierState>,
    barrier_cv: Condvar,
    /// (owner rank, segment) -> exported region.
    segments: RwLock<HashMap<(u32, SegmentId), Region>>,
    aborted: AtomicBool,
    abort_code: AtomicI32,
    /// Dropped on abort, closing every endpoint's abort receiver.
    abort_guards: Mutex<Vec<Sender<()>>>,
}

impl ClusterShared {
    fn abort_error(&self) -> TransportError {
        TransportError::Aborted(self.abort_code.load(Ordering::SeqCst))
    }

    fn check_abort(&self) -> Result<(), TransportError> {
        if self.aborted.load(Ordering::SeqCst) {
            Err(self.abort_error())
        } else {
            Ok(())
        }
    }

    fn barrier_wait(&self) -> Result<(), TransportError> {
        let mut state = self.barrier.lock();
        self.check_abort()?;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.barrier_cv.notify_all();
            return Ok(());
        }
        let generation = state.generation;
        while state.generation == generation {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(self.abort_error());
            }
            self.barrier_cv.wait(&mut state);
        }
        Ok(())
    }

    fn region(&self, owner: u32, segment: SegmentId) -> Result<Region, TransportError> {
        self.segments
            .read()
            .get(&(owner, segment))
            .copied()
            .ok_or(TransportError::UnknownSegment { owner, segment })
    }
}

/// In-process cluster: build once, hand one endpoint to each rank thread.
pub struct LocalCluster {
    endpoints: Vec<LocalTransport>,
}

impl LocalCluster {
    /// Create a cluster of `size` ranks.
    pub fn new(size: u32) -> Self {
        assert!(size > 0, "cluster needs at least one rank");
        let shared = Arc::new(ClusterShared {
            size,
            barrier: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            barrier_cv: Condvar::new(),
            segments: RwLock::new(HashMap::new()),
            aborted: AtomicBool::new(false),
            abort_code: AtomicI32::new(0),
            abort_guards: Mutex::new(Vec::new()),
        });

        let mut inboxes = Vec::with_capacity(size as usize);
        let mut senders = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let (tx, rx) = unbounded::<Mail>();
            senders.push(tx);
            inboxes.push(rx);
        }

        let endpoints = inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let (abort_tx, abort_rx) = unbounded::<()>();
                shared.abort_guards.lock().push(abort_tx);
                LocalTransport {
                    rank: rank as u32,
                    shared: Arc::clone(&shared),
                    peers: senders.clone(),
                    inbox,
                    stash: Mutex::new(HashMap::new()),
                    abort_rx,
                    pending: Mutex::new(HashMap::new()),
                    next_handle: AtomicU64::new(0),
                }
            })
            .collect();

        Self { endpoints }
    }

    /// Number of ranks in the cluster.
    pub fn size(&self) -> u32 {
        self.endpoints.len() as u32
    }

    /// Consume the cluster, yielding one endpoint per rank in rank order.
    pub fn into_endpoints(self) -> Vec<LocalTransport> {
        self.endpoints
    }
}

/// One rank's endpoint of a [`LocalCluster`].
pub struct LocalTransport {
    rank: u32,
    shared: Arc<ClusterShared>,
    peers: Vec<Sender<Mail>>,
    inbox: Receiver<Mail>,
    /// Messages received ahead of the collective that needs them.
    stash: Mutex<HashMap<u32, VecDeque<Vec<u8>>>>,
    abort_rx: Receiver<()>,
    pending: Mutex<HashMap<u64, Vec<u8>>>,
    next_handle: AtomicU64,
}

impl LocalTransport {
    /// Next collective message from `from`, stashing out-of-order arrivals
    /// from other peers.
    fn recv_from(&self, from: u32) -> Result<Vec<u8>, TransportError> {
        if let Some(queued) = self
            .stash
            .lock()
            .get_mut(&from)
            .and_then(|q| q.pop_front())
        {
            return Ok(queued);
        }
        loop {
            crossbeam::select! {
                recv(self.inbox) -> msg => {
                    let (src, payload) = msg.map_err(|_| TransportError::Disconnected)?;
                    if src == from {
                        return Ok(payload);
                    }
                    self.stash.lock().entry(src).or_default().push_back(payload);
                }
                recv(self.abort_rx) -> _ => {
                    return Err(self.shared.abort_error());
                }
            }
        }
    }

    fn send_to(&self, peer: u32, payload: Vec<u8>) -> Result<(), TransportError> {
        self.peers[peer as usize]
            .send((self.rank, payload))
            .map_err(|_| TransportError::Disconnected)
    }

    fn read_region(
        &self,
        dst: &mut [u8],
        owner: u32,
        segment: SegmentId,
        offset: usize,
    ) -> Result<(), TransportError> {
        self.shared.check_abort()?;
        let region = self.shared.region(owner, segment)?;
        if offset + dst.len() > region.len {
            return Err(TransportError::OutOfSegment {
                segment,
                offset,
                len: dst.len(),
                seg_len: region.len,
            });
        }
        // One-sided read: the runtime orders it after the owner's writes
        // with a barrier, so the bytes are stable while we copy.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (region.base + offset) as *const u8,
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.shared.size
    }

    unsafe fn export_segment(
        &self,
        segment: SegmentId,
        base: *mut u8,
        len: usize,
    ) -> Result<()> {
        self.shared.check_abort()?;
        self.shared.segments.write().insert(
            (self.rank, segment),
            Region {
                base: base as usize,
                len,
            },
        );
        Ok(())
    }

    fn unexport_segment(&self, segment: SegmentId) -> Result<()> {
        self.shared.segments.write().remove(&(self.rank, segment));
        Ok(())
    }

    fn get(&self, dst: &mut [u8], owner: u32, segment: SegmentId, offset: usize) -> Result<()> {
        self.read_region(dst, owner, segment, offset)?;
        Ok(())
    }

    fn get_begin(
        &self,
        owner: u32,
        segment: SegmentId,
        offset: usize,
        len: usize,
    ) -> Result<TransferHandle> {
        let mut staged = vec![0u8; len];
        self.read_region(&mut staged, owner, segment, offset)?;
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, staged);
        Ok(TransferHandle(id))
    }

    fn wait_into(&self, handle: TransferHandle, dst: &mut [u8]) -> Result<()> {
        let staged = self
            .pending
            .lock()
            .remove(&handle.0)
            .ok_or(TransportError::UnknownHandle(handle))?;
        if staged.len() != dst.len() {
            return Err(TransportError::LengthMismatch {
                expected: staged.len(),
                got: dst.len(),
            }
            .into());
        }
        dst.copy_from_slice(&staged);
        Ok(())
    }

    fn put(&self, src: &[u8], owner: u32, segment: SegmentId, offset: usize) -> Result<()> {
        self.shared.check_abort()?;
        let region = self.shared.region(owner, segment)?;
        if offset + src.len() > region.len {
            return Err(TransportError::OutOfSegment {
                segment,
                offset,
                len: src.len(),
                seg_len: region.len,
            }
            .into());
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                (region.base + offset) as *mut u8,
                src.len(),
            );
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier_wait()?;
        Ok(())
    }

    fn broadcast(&self, buf: &mut [u8], root: u32) -> Result<()> {
        self.shared.check_abort()?;
        if self.rank == root {
            for peer in 0..self.shared.size {
                if peer != root {
                    self.send_to(peer, buf.to_vec())?;
                }
            }
        } else {
            let payload = self.recv_from(root)?;
            if payload.len() != buf.len() {
                return Err(TransportError::LengthMismatch {
                    expected: payload.len(),
                    got: buf.len(),
                }
                .into());
            }
            buf.copy_from_slice(&payload);
        }
        Ok(())
    }

    fn gather_all(&self, send: &[u8], recv: &mut [u8]) -> Result<()> {
        self.shared.check_abort()?;
        let chunk = send.len();
        if recv.len() != chunk * self.shared.size as usize {
            return Err(TransportError::LengthMismatch {
                expected: chunk * self.shared.size as usize,
                got: recv.len(),
            }
            .into());
        }
        for peer in 0..self.shared.size {
            if peer != self.rank {
                self.send_to(peer, send.to_vec())?;
            }
        }
        recv[self.rank as usize * chunk..][..chunk].copy_from_slice(send);
        for peer in 0..self.shared.size {
            if peer != self.rank {
                let payload = self.recv_from(peer)?;
                recv[peer as usize * chunk..][..chunk].copy_from_slice(&payload);
            }
        }
        Ok(())
    }

    fn abort(&self, code: i32) {
        self.shared.abort_code.store(code, Ordering::SeqCst);
        if self.shared.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::error!(rank = self.rank, code, "collective abort");
        // Wake barrier waiters; notifying under the barrier lock means a
        // waiter either sees the flag before blocking or gets the wakeup.
        {
            let _state = self.shared.barrier.lock();
            self.shared.barrier_cv.notify_all();
        }
        // Close every abort channel so blocked receives return.
        self.shared.abort_guards.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_ranks<F>(size: u32, f: F)
    where
        F: Fn(LocalTransport) + Send + Sync + Copy + 'static,
    {
        let endpoints = LocalCluster::new(size).into_endpoints();
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|ep| thread::spawn(move || f(ep)))
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_rank_and_size() {
        let endpoints = LocalCluster::new(3).into_endpoints();
        for (i, ep) in endpoints.iter().enumerate() {
            assert_eq!(ep.rank(), i as u32);
            assert_eq!(ep.size(), 3);
        }
    }

    #[test]
    fn test_broadcast_from_root() {
        run_ranks(4, |ep| {
            let mut buf = if ep.rank() == 1 {
                0xABCD1234u64.to_le_bytes()
            } else {
                [0u8; 8]
            };
            ep.broadcast(&mut buf, 1).unwrap();
            assert_eq!(u64::from_le_bytes(buf), 0xABCD1234);
        });
    }

    #[test]
    fn test_gather_all_rank_order() {
        run_ranks(4, |ep| {
            let send = [ep.rank() as u8; 2];
            let mut recv = [0u8; 8];
            ep.gather_all(&send, &mut recv).unwrap();
            assert_eq!(recv, [0, 0, 1, 1, 2, 2, 3, 3]);
        });
    }

    #[test]
    fn test_one_sided_get_after_barrier() {
        run_ranks(2, |ep| {
            let mut local = vec![ep.rank() as u8 + 10; 64];
            unsafe {
                ep.export_segment(SegmentId(7), local.as_mut_ptr(), local.len())
                    .unwrap();
            }
            ep.barrier().unwrap();

            let peer = 1 - ep.rank();
            let mut dst = [0u8; 16];
            ep.get(&mut dst, peer, SegmentId(7), 8).unwrap();
            assert!(dst.iter().all(|&b| b == peer as u8 + 10));

            // Keep the exported region alive until every rank is done.
            ep.barrier().unwrap();
            ep.unexport_segment(SegmentId(7)).unwrap();
        });
    }

    #[test]
    fn test_async_get_completes_at_wait() {
        run_ranks(2, |ep| {
            let mut local = vec![ep.rank() as u8; 32];
            unsafe {
                ep.export_segment(SegmentId(1), local.as_mut_ptr(), local.len())
                    .unwrap();
            }
            ep.barrier().unwrap();

            let peer = 1 - ep.rank();
            let handle = ep.get_begin(peer, SegmentId(1), 0, 32).unwrap();
            let mut dst = [0u8; 32];
            ep.wait_into(handle, &mut dst).unwrap();
            assert!(dst.iter().all(|&b| b == peer as u8));

            ep.barrier().unwrap();
        });
    }

    #[test]
    fn test_get_out_of_segment_fails() {
        run_ranks(2, |ep| {
            let mut local = vec![0u8; 16];
            unsafe {
                ep.export_segment(SegmentId(2), local.as_mut_ptr(), local.len())
                    .unwrap();
            }
            ep.barrier().unwrap();
            let peer = 1 - ep.rank();
            let mut dst = [0u8; 16];
            assert!(ep.get(&mut dst, peer, SegmentId(2), 8).is_err());
            ep.barrier().unwrap();
        });
    }

    #[test]
    fn test_abort_unblocks_barrier() {
        let mut endpoints = LocalCluster::new(2).into_endpoints();
        let late = endpoints.pop().unwrap();
        let early = endpoints.pop().unwrap();

        let waiter = thread::spawn(move || early.barrier());
        // Give the waiter time to block, then abort instead of arriving.
        thread::sleep(std::time::Duration::from_millis(20));
        late.abort(3);
        let result = waiter.join().unwrap();
        assert!(result.is_err());

        // Every later collective fails too.
        assert!(late.barrier().is_err());
    }
}
