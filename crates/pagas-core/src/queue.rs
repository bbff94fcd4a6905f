//! Transfer queue with an intrusive free list.
//!
//! Entries for outstanding explicit prefetches live in a single growable
//! slot array threaded by two intrusive lists: a doubly-linked in-use list
//! in insertion order and a free list of vacant slots. Insert and remove
//! are O(1) amortised; the array doubles when the free list would run out,
//! keeping one spare slot so the free list is never empty.

const NOLINK: usize = usize::MAX;

#[derive(Debug)]
struct Slot<T> {
    payload: Option<T>,
    prev: usize,
    next: usize,
}

/// Growable queue of in-flight transfers.
#[derive(Debug)]
pub struct TransferQueue<T> {
    slots: Vec<Slot<T>>,
    used_head: usize,
    used_tail: usize,
    free_head: usize,
    free_tail: usize,
    used: usize,
}

impl<T> TransferQueue<T> {
    /// Create a queue with `capacity` initial slots (at least 2).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let mut queue = Self {
            slots: Vec::with_capacity(capacity),
            used_head: NOLINK,
            used_tail: NOLINK,
            free_head: NOLINK,
            free_tail: NOLINK,
            used: 0,
        };
        queue.extend_free(capacity);
        queue
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Total slot count, occupied plus free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of vacant slots.
    pub fn free_len(&self) -> usize {
        self.slots.len() - self.used
    }

    /// Append fresh vacant slots to the free list.
    fn extend_free(&mut self, count: usize) {
        for _ in 0..count {
            let idx = self.slots.len();
            self.slots.push(Slot {
                payload: None,
                prev: self.free_tail,
                next: NOLINK,
            });
            if self.free_tail != NOLINK {
                self.slots[self.free_tail].next = idx;
            } else {
                self.free_head = idx;
            }
            self.free_tail = idx;
        }
    }

    /// Insert a payload at the tail of the in-use list, growing the slot
    /// array if the free list would be exhausted. Returns the slot index,
    /// stable until `remove`.
    pub fn insert(&mut self, payload: T) -> usize {
        // Keep a spare so the free list never empties.
        if self.free_len() <= 1 {
            let grow = self.slots.len();
            self.extend_free(grow);
        }

        let idx = self.free_head;
        let next_free = self.slots[idx].next;
        if next_free != NOLINK {
            self.slots[next_free].prev = NOLINK;
        } else {
            self.free_tail = NOLINK;
        }
        self.free_head = next_free;

        let slot = &mut self.slots[idx];
        slot.payload = Some(payload);
        slot.prev = self.used_tail;
        slot.next = NOLINK;
        if self.used_tail != NOLINK {
            self.slots[self.used_tail].next = idx;
        } else {
            self.used_head = idx;
        }
        self.used_tail = idx;
        self.used += 1;
        idx
    }

    /// Payload stored at `index`, if occupied.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|s| s.payload.as_ref())
    }

    /// Mutable payload stored at `index`, if occupied.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(|s| s.payload.as_mut())
    }

    /// Linear scan of the in-use list in insertion order; returns the index
    /// of the first payload matching `pred`.
    pub fn find<F: FnMut(&T) -> bool>(&self, mut pred: F) -> Option<usize> {
        let mut idx = self.used_head;
        while idx != NOLINK {
            let slot = &self.slots[idx];
            if pred(slot.payload.as_ref().expect("in-use slot has payload")) {
                return Some(idx);
            }
            idx = slot.next;
        }
        None
    }

    /// Iterate occupied payloads in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        let mut idx = self.used_head;
        std::iter::from_fn(move || {
            if idx == NOLINK {
                return None;
            }
            let current = idx;
            let slot = &self.slots[current];
            idx = slot.next;
            Some((current, slot.payload.as_ref().expect("in-use slot has payload")))
        })
    }

    /// Unlink the slot at `index` from the in-use list and release it to
    /// the free list, returning its payload. Panics on a vacant index.
    pub fn remove(&mut self, index: usize) -> T {
        let payload = self.slots[index]
            .payload
            .take()
            .expect("remove of vacant queue slot");
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);

        if prev != NOLINK {
            self.slots[prev].next = next;
        } else {
            self.used_head = next;
        }
        if next != NOLINK {
            self.slots[next].prev = prev;
        } else {
            self.used_tail = prev;
        }

        let slot = &mut self.slots[index];
        slot.prev = self.free_tail;
        slot.next = NOLINK;
        if self.free_tail != NOLINK {
            self.slots[self.free_tail].next = index;
        } else {
            self.free_head = index;
        }
        self.free_tail = index;
        self.used -= 1;
        payload
    }

    /// Release every occupied slot, dropping payloads.
    pub fn reset(&mut self) {
        let indices: Vec<usize> = self.iter().map(|(i, _)| i).collect();
        for idx in indices {
            self.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove_balance() {
        let mut q: TransferQueue<u32> = TransferQueue::new(4);
        assert_eq!(q.free_len(), q.capacity());

        let a = q.insert(10);
        let b = q.insert(20);
        assert_eq!(q.len(), 2);
        assert_eq!(q.free_len(), q.capacity() - 2);

        assert_eq!(q.remove(a), 10);
        assert_eq!(q.remove(b), 20);
        assert_eq!(q.len(), 0);
        assert_eq!(q.free_len(), q.capacity());
    }

    #[test]
    fn test_find_in_insertion_order() {
        let mut q: TransferQueue<u32> = TransferQueue::new(4);
        q.insert(1);
        let b = q.insert(2);
        q.insert(2);
        // First match wins.
        assert_eq!(q.find(|&v| v == 2), Some(b));
        assert_eq!(q.find(|&v| v == 9), None);
    }

    #[test]
    fn test_remove_middle_keeps_links() {
        let mut q: TransferQueue<u32> = TransferQueue::new(4);
        let a = q.insert(1);
        let b = q.insert(2);
        let c = q.insert(3);
        q.remove(b);
        let order: Vec<u32> = q.iter().map(|(_, &v)| v).collect();
        assert_eq!(order, vec![1, 3]);
        q.remove(a);
        q.remove(c);
        assert!(q.is_empty());
    }

    #[test]
    fn test_growth_doubles_and_keeps_entries() {
        let mut q: TransferQueue<u32> = TransferQueue::new(2);
        let initial = q.capacity();
        let mut indices = Vec::new();
        for v in 0..10 {
            indices.push(q.insert(v));
        }
        assert!(q.capacity() > initial);
        assert_eq!(q.len(), 10);
        assert_eq!(q.free_len(), q.capacity() - 10);
        let order: Vec<u32> = q.iter().map(|(_, &v)| v).collect();
        assert_eq!(order, (0..10).collect::<Vec<u32>>());
        for idx in indices {
            q.remove(idx);
        }
        assert_eq!(q.free_len(), q.capacity());
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut q: TransferQueue<u32> = TransferQueue::new(2);
        let a = q.insert(1);
        q.remove(a);
        let cap = q.capacity();
        // Cycling through one slot never grows the array.
        for v in 0..100 {
            let idx = q.insert(v);
            q.remove(idx);
        }
        assert_eq!(q.capacity(), cap);
    }

    #[test]
    fn test_reset_releases_everything() {
        let mut q: TransferQueue<u32> = TransferQueue::new(2);
        for v in 0..5 {
            q.insert(v);
        }
        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.free_len(), q.capacity());
        assert_eq!(q.find(|_| true), None);
    }
}
