use std::collections::VecDeque;
use std::sync::Arc;

use fxhash::FxHashMap;
use stride_core::frame::Frame;

/// Bounded least-recently-used frame cache. `capacity: None` keeps every
/// frame; eviction spares a protected index so the frame on display is never
/// dropped underneath the consumer.
pub struct FrameCache {
    frames: FxHashMap<usize, Arc<Frame>>,
    lru: VecDeque<usize>,
    capacity: Option<usize>,
}

impl FrameCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            frames: FxHashMap::default(),
            lru: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.frames.contains_key(&index)
    }

    /// Read without touching recency.
    pub fn peek(&self, index: usize) -> Option<&Arc<Frame>> {
        self.frames.get(&index)
    }

    /// Read and mark the frame as most recently used.
    pub fn fetch(&mut self, index: usize) -> Option<Arc<Frame>> {
        let frame = self.frames.get(&index)?.clone();
        self.touch(index);
        Some(frame)
    }

    pub fn insert(&mut self, frame: Arc<Frame>, protect: Option<usize>) {
        let index = frame.index;
        if self.frames.insert(index, frame).is_none() {
            self.lru.push_back(index);
        } else {
            self.touch(index);
        }
        let cap = match self.capacity {
            Some(cap) => cap.max(1),
            None => return,
        };
        let mut scanned = 0;
        while self.frames.len() > cap && scanned <= self.lru.len() {
            let old = match self.lru.pop_front() {
                Some(old) => old,
                None => break,
            };
            scanned += 1;
            if Some(old) == protect {
                self.lru.push_back(old);
                continue;
            }
            self.frames.remove(&old);
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.lru.clear();
    }

    fn touch(&mut self, index: usize) {
        if let Some(pos) = self.lru.iter().position(|&i| i == index) {
            self.lru.remove(pos);
        }
        self.lru.push_back(index);
    }
}
