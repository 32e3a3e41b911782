//! Live Order Registry - every placed order, indexed by order ID.
//!
//! Order IDs are dense and allocated in emission order, so the registry is
//! an append-only `Vec` where slot `i` holds order `i`. Cancel targets are
//! drawn by index, which makes a cancel of a never-placed order impossible.
//!
//! Under [`CancelPolicy::LiveOnly`] a second list of uncancelled IDs is kept
//! and shrinks by swap-remove on every cancel.

use rand::Rng;

use crate::config::CancelPolicy;

/// The immutable identity of a placed order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderRef {
    /// Worker the order was placed on
    pub thread_id: u32,
    /// Sequential order ID
    pub order_id: u64,
}

pub struct OrderRegistry {
    /// Slot `i` is order `i`
    placed: Vec<OrderRef>,
    /// Uncancelled order IDs (LiveOnly only)
    live: Vec<u64>,
    policy: CancelPolicy,
}

impl OrderRegistry {
    pub fn new(policy: CancelPolicy) -> Self {
        Self::with_capacity(policy, 0)
    }

    /// Pre-size for an expected number of placements.
    pub fn with_capacity(policy: CancelPolicy, capacity: usize) -> Self {
        let live = match policy {
            CancelPolicy::LiveOnly => Vec::with_capacity(capacity),
            CancelPolicy::AnyPlaced => Vec::new(),
        };
        Self {
            placed: Vec::with_capacity(capacity),
            live,
            policy,
        }
    }

    /// ID the next placed order will receive.
    #[inline]
    pub fn next_order_id(&self) -> u64 {
        self.placed.len() as u64
    }

    /// Allocate the next order ID for `thread_id` and record it.
    pub fn place(&mut self, thread_id: u32) -> OrderRef {
        let order = OrderRef {
            thread_id,
            order_id: self.next_order_id(),
        };
        self.placed.push(order);
        if self.policy == CancelPolicy::LiveOnly {
            self.live.push(order.order_id);
        }
        order
    }

    /// Whether a cancel can be emitted right now.
    #[inline]
    pub fn has_cancel_target(&self) -> bool {
        match self.policy {
            CancelPolicy::AnyPlaced => !self.placed.is_empty(),
            CancelPolicy::LiveOnly => !self.live.is_empty(),
        }
    }

    /// Draw a cancel target uniformly from the eligible orders.
    ///
    /// Returns `None` when [`has_cancel_target`](Self::has_cancel_target)
    /// is false.
    pub fn pick_cancel<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<OrderRef> {
        if !self.has_cancel_target() {
            return None;
        }
        match self.policy {
            CancelPolicy::AnyPlaced => {
                let idx = rng.gen_range(0..self.placed.len());
                Some(self.placed[idx])
            }
            CancelPolicy::LiveOnly => {
                let idx = rng.gen_range(0..self.live.len());
                let order_id = self.live.swap_remove(idx);
                self.get(order_id)
            }
        }
    }

    /// Look up a placed order by ID.
    #[inline]
    pub fn get(&self, order_id: u64) -> Option<OrderRef> {
        usize::try_from(order_id)
            .ok()
            .and_then(|idx| self.placed.get(idx))
            .copied()
    }

    /// Number of orders placed so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.placed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Orders that are still eligible cancel targets.
    pub fn live_count(&self) -> usize {
        match self.policy {
            CancelPolicy::AnyPlaced => self.placed.len(),
            CancelPolicy::LiveOnly => self.live.len(),
        }
    }

    pub fn policy(&self) -> CancelPolicy {
        self.policy
    }
}
