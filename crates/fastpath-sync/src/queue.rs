//! Lock-free multi-producer multi-consumer linked queue.
//!
//! Nodes come from a caller-owned [`NodeArena`]; the queue never allocates.
//! A single anchor word holds head and tail, so push and pop each take exactly
//! one atomic commit on the fast path.
//!
//! A push first claims the tail with the anchor commit and then links the old
//! tail to the new node. Between those two steps the old tail's link reads as
//! pending, and a pop that needs that link idles until it appears or until the
//! anchor moves underneath it.

use crate::anchor::{Anchor, AnchorState};
use crate::arena::{NodeArena, NodeHandle, NIL, PENDING};
use crate::caps::Capabilities;
use crate::fence;
use crate::idle::{CpuIdle, WaitOutcome};
use fastpath_common::config::QueueBackend;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// FIFO queue of arena nodes, safe for any number of pushers and poppers.
///
/// # Example
///
/// ```
/// use fastpath_sync::{Capabilities, LinkedQueue, NodeArena};
/// use std::sync::Arc;
///
/// let (arena, handles) = NodeArena::from_values([10u32, 20, 30]).unwrap();
/// let queue = LinkedQueue::new(Arc::new(arena), &Capabilities::default());
///
/// for handle in handles {
///     queue.push(handle);
/// }
///
/// let first = queue.pop().unwrap();
/// assert_eq!(*queue.arena().get(&first), 10);
/// ```
pub struct LinkedQueue<T> {
    anchor: Anchor,
    arena: Arc<NodeArena<T>>,
    idle: CpuIdle,
}

impl<T> LinkedQueue<T> {
    /// Create an empty queue over `arena` using the resolved capabilities.
    #[must_use]
    pub fn new(arena: Arc<NodeArena<T>>, caps: &Capabilities) -> Self {
        Self {
            anchor: Anchor::new(caps),
            arena,
            idle: CpuIdle::new(caps),
        }
    }

    /// Arena the queued nodes belong to.
    #[must_use]
    pub fn arena(&self) -> &Arc<NodeArena<T>> {
        &self.arena
    }

    /// Retry protocol in use.
    #[must_use]
    pub fn backend(&self) -> QueueBackend {
        self.anchor.backend()
    }

    /// Append a node at the tail.
    ///
    /// Payload writes made through the handle before this call are visible to
    /// the thread that pops the node.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to a different arena.
    pub fn push(&self, node: NodeHandle) {
        let index = self.arena.claim(node);
        self.arena
            .slot(index)
            .next
            .store(PENDING, Ordering::Relaxed);

        loop {
            let observed = self.anchor.open(false);
            let current = AnchorState::unpack(observed);
            let head = if current.is_empty() { index } else { current.head };
            let next = current.advance(head, index);

            if self.anchor.commit_release(observed, next.pack()) {
                if !current.is_empty() {
                    // Old tail is ours to link until its successor is set
                    fence::store_release(
                        &self.arena.slot(current.tail).next,
                        index,
                        self.anchor.fence(),
                    );
                }
                return;
            }
        }
    }

    /// Remove the node at the head, or `None` if the queue is empty.
    ///
    /// Never blocks on an empty queue. May briefly idle while a concurrent
    /// push finishes linking the head to its successor.
    pub fn pop(&self) -> Option<NodeHandle> {
        if AnchorState::unpack(self.anchor.peek()).is_empty() {
            return None;
        }

        loop {
            let observed = self.anchor.open(true);
            let current = AnchorState::unpack(observed);
            if current.is_empty() {
                self.anchor.abandon();
                return None;
            }

            let next = if current.head == current.tail {
                current.advance(NIL, NIL)
            } else {
                match self.await_link(current.head, observed) {
                    Some(successor) => current.advance(successor, current.tail),
                    None => continue,
                }
            };

            if self.anchor.commit_acquire(observed, next.pack()) {
                self.arena
                    .slot(current.head)
                    .next
                    .store(NIL, Ordering::Relaxed);
                return Some(self.arena.issue(current.head));
            }
        }
    }

    /// Whether the queue is empty at the moment of the call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        AnchorState::unpack(self.anchor.peek()).is_empty()
    }

    /// Pop every node currently reachable, in FIFO order.
    pub fn drain(&self) -> Vec<NodeHandle> {
        std::iter::from_fn(|| self.pop()).collect()
    }

    /// Successor of `head`, idling while it is still being published.
    ///
    /// Returns `None` when the anchor changed during the wait, in which case
    /// the observed head is stale.
    fn await_link(&self, head: u32, observed: u64) -> Option<u32> {
        let link = &self.arena.slot(head).next;
        let successor = link.load(Ordering::Acquire);
        if successor != PENDING {
            return Some(successor);
        }

        let anchor_moved = || self.anchor.peek() != observed;
        match self.idle.wait_for_change(link, PENDING, Some(&anchor_moved)) {
            WaitOutcome::Changed => {
                let successor = link.load(Ordering::Acquire);
                (successor != PENDING).then_some(successor)
            }
            WaitOutcome::Expired => None,
        }
    }
}

impl<T> fmt::Debug for LinkedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedQueue")
            .field("anchor", &self.anchor)
            .field("arena", &self.arena)
            .field("idle", &self.idle)
            .finish()
    }
}
