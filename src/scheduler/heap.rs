//! Array-backed binary min-heap.
//!
//! Parent/child positions use index arithmetic over a single `Vec`, so the
//! same core backs both the ready queue and the delayed-retry queue. The
//! element type decides ordering through [`HeapOrder`].

/// Strict ordering used by [`Heap`]. The element that precedes all others
/// is returned first.
pub trait HeapOrder {
    fn precedes(&self, other: &Self) -> bool;
}

/// Binary min-heap over a contiguous array.
#[derive(Debug)]
pub struct Heap<T> {
    items: Vec<T>,
}

impl<T: HeapOrder> Heap<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert in O(log n).
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove the first element in O(log n).
    pub fn pop(&mut self) -> Option<T> {
        let last = self.items.len().checked_sub(1)?;
        self.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove every element in unspecified order.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.items[i].precedes(&self.items[j])
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) { right } else { left };
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
    }
}

impl<T: HeapOrder> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}
