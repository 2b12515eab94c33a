//! Queue anchor: head index, tail index and a modification tag packed into one
//! 64-bit word so that both ends of the list change in a single atomic update.
//!
//! Layout (most significant first):
//!
//! | bits  | field |
//! |-------|-------|
//! | 63-48 | tag   |
//! | 47-24 | tail  |
//! | 23-0  | head  |
//!
//! The tag is bumped on every committed update. With the compare-and-swap
//! backend this stops a stale head/tail pair from matching after the same
//! nodes were popped and pushed again.

#![cfg_attr(target_arch = "aarch64", allow(unsafe_code))]

use crate::arena::NIL;
use crate::caps::Capabilities;
use crate::fence;
use crossbeam_utils::CachePadded;
use fastpath_common::config::{FenceTechnique, QueueBackend};
use static_assertions::const_assert;
use std::sync::atomic::{AtomicU64, Ordering};

const INDEX_BITS: u32 = 24;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const TAIL_SHIFT: u32 = INDEX_BITS;
const TAG_SHIFT: u32 = 2 * INDEX_BITS;

const_assert!(TAG_SHIFT + 16 == 64);
const_assert!(NIL as u64 == INDEX_MASK);

/// Decoded anchor word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnchorState {
    pub(crate) head: u32,
    pub(crate) tail: u32,
    pub(crate) tag: u16,
}

impl AnchorState {
    pub(crate) const EMPTY: Self = Self {
        head: NIL,
        tail: NIL,
        tag: 0,
    };

    // Masks keep each field within its width
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn unpack(word: u64) -> Self {
        Self {
            head: (word & INDEX_MASK) as u32,
            tail: ((word >> TAIL_SHIFT) & INDEX_MASK) as u32,
            tag: (word >> TAG_SHIFT) as u16,
        }
    }

    pub(crate) fn pack(self) -> u64 {
        (u64::from(self.tag) << TAG_SHIFT)
            | ((u64::from(self.tail) & INDEX_MASK) << TAIL_SHIFT)
            | (u64::from(self.head) & INDEX_MASK)
    }

    pub(crate) fn is_empty(self) -> bool {
        self.head == NIL
    }

    /// Successor state with new ends and the next tag.
    pub(crate) fn advance(self, head: u32, tail: u32) -> Self {
        Self {
            head,
            tail,
            tag: self.tag.wrapping_add(1),
        }
    }
}

/// The shared anchor word plus the technique used to update it.
pub(crate) struct Anchor {
    word: CachePadded<AtomicU64>,
    backend: QueueBackend,
    fence: FenceTechnique,
}

impl Anchor {
    pub(crate) fn new(caps: &Capabilities) -> Self {
        Self {
            word: CachePadded::new(AtomicU64::new(AnchorState::EMPTY.pack())),
            backend: caps.queue_backend(),
            fence: caps.fence(),
        }
    }

    pub(crate) fn backend(&self) -> QueueBackend {
        self.backend
    }

    pub(crate) fn fence(&self) -> FenceTechnique {
        self.fence
    }

    /// Plain read, never arms a reservation.
    pub(crate) fn peek(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    /// Begin an update. With the exclusive backend this arms the reservation
    /// that the following commit consumes.
    pub(crate) fn open(&self, acquire: bool) -> u64 {
        match self.backend {
            #[cfg(target_arch = "aarch64")]
            QueueBackend::Exclusive => {
                let acquire = acquire && self.fence == FenceTechnique::StoreRelease;
                // SAFETY: the pointer comes from a live, aligned AtomicU64.
                unsafe { crate::arch::load_exclusive_u64(self.word.as_ptr(), acquire) }
            }
            _ => self.word.load(if acquire {
                Ordering::Acquire
            } else {
                Ordering::Relaxed
            }),
        }
    }

    /// Abandon an update begun with [`Anchor::open`].
    #[cfg_attr(not(target_arch = "aarch64"), allow(clippy::unused_self))]
    pub(crate) fn abandon(&self) {
        #[cfg(target_arch = "aarch64")]
        {
            if self.backend == QueueBackend::Exclusive {
                crate::arch::clear_exclusive();
            }
        }
    }

    /// Publish `new` if the anchor still holds `observed`, making every write
    /// made before the call visible to the thread that next acquires the anchor.
    pub(crate) fn commit_release(&self, observed: u64, new: u64) -> bool {
        fence::before_release(self.fence);
        self.store(observed, new, fence::release_ordering(self.fence), true)
    }

    /// Replace the anchor with `new` if it still holds `observed`, ordering
    /// every later read after the writes published by the previous owner.
    pub(crate) fn commit_acquire(&self, observed: u64, new: u64) -> bool {
        let committed = self.store(observed, new, fence::acquire_ordering(self.fence), false);
        if committed {
            fence::after_acquire(self.fence);
        }
        committed
    }

    #[cfg_attr(not(target_arch = "aarch64"), allow(unused_variables))]
    fn store(&self, observed: u64, new: u64, success: Ordering, release: bool) -> bool {
        match self.backend {
            #[cfg(target_arch = "aarch64")]
            QueueBackend::Exclusive => {
                let release = release && self.fence == FenceTechnique::StoreRelease;
                // SAFETY: the pointer comes from a live, aligned AtomicU64 and
                // the matching load-exclusive was issued by `open`.
                unsafe { crate::arch::store_exclusive_u64(self.word.as_ptr(), new, release) }
            }
            _ => self
                .word
                .compare_exchange_weak(observed, new, success, Ordering::Relaxed)
                .is_ok(),
        }
    }
}

impl std::fmt::Debug for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Anchor")
            .field("state", &AnchorState::unpack(self.peek()))
            .field("backend", &self.backend)
            .field("fence", &self.fence)
            .finish()
    }
}
