//!
//! Binary Min-Heap
//!
//! An array-backed heap ordered by `Ord`: `peek` and `extract` see the
//! smallest element. Equal elements come out in no particular order, so
//! callers that need stable ties fold a sequence number into the ordering.
//!

#[derive(Debug, Clone)]
pub struct Heap<T> {
    nodes: Vec<T>,
}

impl<T: Ord> Heap<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn insert(&mut self, item: T) {
        self.nodes.push(item);
        self.sift_up(self.nodes.len() - 1);
    }

    pub fn peek(&self) -> Option<&T> {
        self.nodes.first()
    }

    /// Remove and return the smallest element.
    pub fn extract(&mut self) -> Option<T> {
        if self.nodes.is_empty() {
            return None;
        }
        let last = self.nodes.len() - 1;
        self.nodes.swap(0, last);
        let top = self.nodes.pop();
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        top
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    fn sift_up(&mut self, mut k: usize) {
        while k > 0 {
            let parent = (k - 1) / 2;
            if self.nodes[k] >= self.nodes[parent] {
                break;
            }
            self.nodes.swap(k, parent);
            k = parent;
        }
    }

    fn sift_down(&mut self, mut k: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * k + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.nodes[right] < self.nodes[left] {
                right
            } else {
                left
            };
            if self.nodes[k] <= self.nodes[child] {
                break;
            }
            self.nodes.swap(k, child);
            k = child;
        }
    }
}

impl<T: Ord> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_in_ascending_order() {
        let mut heap = Heap::new();
        for n in [5, 3, 9, 1, 7, 3, 0, 8] {
            heap.insert(n);
        }
        assert_eq!(heap.len(), 8);
        assert_eq!(heap.peek(), Some(&0));

        let mut out = Vec::new();
        while let Some(n) = heap.extract() {
            out.push(n);
        }
        assert_eq!(out, vec![0, 1, 3, 3, 5, 7, 8, 9]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_interleaved_insert_and_extract() {
        let mut heap = Heap::with_capacity(4);
        heap.insert(10);
        heap.insert(4);
        assert_eq!(heap.extract(), Some(4));
        heap.insert(2);
        heap.insert(12);
        assert_eq!(heap.extract(), Some(2));
        assert_eq!(heap.extract(), Some(10));
        assert_eq!(heap.extract(), Some(12));
        assert_eq!(heap.extract(), None);
    }

    #[test]
    fn test_clear() {
        let mut heap: Heap<u8> = (0..10).fold(Heap::new(), |mut heap, n| {
            heap.insert(n);
            heap
        });
        heap.clear();
        assert_eq!(heap.peek(), None);
        assert_eq!(heap.len(), 0);
    }
}
