//! Frame replacement policies. The buffer pool talks to a [`Replacer`]
//! through three operations: pinned frames leave the candidate set, unpinned
//! frames enter it, and `victim` picks one to evict under the policy.

use std::collections::VecDeque;

use crate::FrameId;

pub trait Replacer: Send {
    /// Picks a candidate under the policy and removes it from the set.
    /// `None` when every frame is pinned.
    fn victim(&mut self) -> Option<FrameId>;

    /// Removes the frame from the candidate set.
    fn pin(&mut self, frame_id: FrameId);

    /// Adds the frame to the candidate set. Idempotent.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of frames currently eligible for eviction.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClockSlot {
    present: bool,
    referenced: bool,
}

/// Second-chance clock. Unpinning sets the reference bit; the sweeping hand
/// clears it once before the frame becomes a victim.
pub struct ClockReplacer {
    slots: Vec<ClockSlot>,
    hand: usize,
    len: usize,
}

impl ClockReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            slots: vec![ClockSlot::default(); pool_size],
            hand: 0,
            len: 0,
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        if self.len == 0 {
            return None;
        }
        // Two full passes: the first can clear second-chance bits, the
        // second can pick a victim.
        for _ in 0..self.slots.len() * 2 {
            let idx = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();
            let slot = &mut self.slots[idx];
            if !slot.present {
                continue;
            }
            if slot.referenced {
                slot.referenced = false;
                continue;
            }
            slot.present = false;
            self.len -= 1;
            return Some(idx);
        }
        None
    }

    fn pin(&mut self, frame_id: FrameId) {
        let slot = &mut self.slots[frame_id];
        if slot.present {
            slot.present = false;
            self.len -= 1;
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        let slot = &mut self.slots[frame_id];
        if !slot.present {
            slot.present = true;
            self.len += 1;
        }
        slot.referenced = true;
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Strict least-recently-unpinned queue.
pub struct LruReplacer {
    queue: VecDeque<FrameId>,
    present: Vec<bool>,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(pool_size),
            present: vec![false; pool_size],
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        let frame_id = self.queue.pop_front()?;
        self.present[frame_id] = false;
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.present[frame_id] {
            self.present[frame_id] = false;
            self.queue.retain(|&f| f != frame_id);
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if !self.present[frame_id] {
            self.present[frame_id] = true;
            self.queue.push_back(frame_id);
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}
