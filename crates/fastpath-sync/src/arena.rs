//! Caller-owned node storage for linked queues.
//!
//! Nodes live in a fixed-size arena allocated before any queue is used, so the
//! queue itself never allocates. Each node is referenced through a move-only
//! [`NodeHandle`]: holding the handle is what entitles a thread to touch the
//! payload, and pushing a node hands the handle to the queue.

#![allow(unsafe_code)]

use fastpath_common::{SubstrateError, SubstrateResult};
use static_assertions::const_assert;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Largest number of nodes an arena may hold.
///
/// Node indices are packed into 24 bits of the queue anchor; the all-ones
/// index is reserved as the empty marker.
pub const MAX_NODES: usize = (1 << 24) - 1;

/// Link value meaning "no successor".
pub(crate) const NIL: u32 = 0x00FF_FFFF;

/// Link value meaning "a successor is being published".
pub(crate) const PENDING: u32 = u32::MAX;

const_assert!(NIL as usize == MAX_NODES);
const_assert!(PENDING > NIL);

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Slot<T> {
    pub(crate) next: AtomicU32,
    value: UnsafeCell<T>,
}

/// Exclusive right to a node in a [`NodeArena`].
///
/// Handles cannot be cloned; whoever holds one owns the node's payload until
/// the handle is pushed onto a queue.
#[derive(PartialEq, Eq, Hash)]
pub struct NodeHandle {
    arena: u64,
    index: u32,
}

impl NodeHandle {
    /// Position of the node inside its arena.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Identifier of the owning arena.
    #[must_use]
    pub fn arena_id(&self) -> u64 {
        self.arena
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandle({}:{})", self.arena, self.index)
    }
}

/// Fixed pool of queue nodes with inline payloads.
///
/// A shared arena hands out `&T` to any thread holding a reference to a
/// handle, so it is only `Sync` when the payload is:
///
/// ```compile_fail
/// use fastpath_sync::NodeArena;
/// use std::cell::Cell;
///
/// fn shared<T: Sync>(_: &T) {}
///
/// let (arena, _nodes) = NodeArena::from_values([Cell::new(0u64)]).unwrap();
/// shared(&arena);
/// ```
pub struct NodeArena<T> {
    id: u64,
    slots: Box<[Slot<T>]>,
}

// SAFETY: `&T` is reached through `get`, which a shared `&NodeHandle` allows
// from several threads at once, hence `T: Sync`. `&mut T` requires the unique
// handle by `&mut`, and moving a handle between threads moves `T`, hence
// `T: Send`.
unsafe impl<T: Send + Sync> Sync for NodeArena<T> {}

impl<T> NodeArena<T> {
    /// Build an arena holding `values`, returning one handle per node in order.
    ///
    /// # Errors
    ///
    /// Returns [`SubstrateError::CapacityExceeded`] if more than [`MAX_NODES`]
    /// values are supplied.
    // Indices are bounded by MAX_NODES before the cast
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_values<I>(values: I) -> SubstrateResult<(Self, Vec<NodeHandle>)>
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        if values.len() > MAX_NODES {
            return Err(SubstrateError::CapacityExceeded {
                requested: values.len(),
                max: MAX_NODES,
            });
        }

        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        let slots: Box<[Slot<T>]> = values
            .into_iter()
            .map(|value| Slot {
                next: AtomicU32::new(NIL),
                value: UnsafeCell::new(value),
            })
            .collect();

        let handles = (0..slots.len())
            .map(|index| NodeHandle {
                arena: id,
                index: index as u32,
            })
            .collect();

        Ok((Self { id, slots }, handles))
    }

    /// Build an arena of `capacity` nodes initialised by `init(index)`.
    ///
    /// # Errors
    ///
    /// Returns [`SubstrateError::CapacityExceeded`] if `capacity > MAX_NODES`.
    pub fn with_capacity<F>(capacity: usize, init: F) -> SubstrateResult<(Self, Vec<NodeHandle>)>
    where
        F: FnMut(usize) -> T,
    {
        if capacity > MAX_NODES {
            return Err(SubstrateError::CapacityExceeded {
                requested: capacity,
                max: MAX_NODES,
            });
        }
        Self::from_values((0..capacity).map(init))
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the arena has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Unique identifier of this arena.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared access to a node's payload.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another arena.
    #[must_use]
    pub fn get<'a>(&'a self, node: &'a NodeHandle) -> &'a T {
        let index = self.check(node);
        // SAFETY: the handle is unique and borrowed for 'a, so no mutable
        // access through it can coexist with this reference.
        unsafe { &*self.slots[index as usize].value.get() }
    }

    /// Exclusive access to a node's payload.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another arena.
    #[must_use]
    pub fn get_mut<'a>(&'a self, node: &'a mut NodeHandle) -> &'a mut T {
        let index = self.check(node);
        // SAFETY: the handle is unique and mutably borrowed for 'a.
        unsafe { &mut *self.slots[index as usize].value.get() }
    }

    /// Validate ownership and surrender the handle, yielding its index.
    pub(crate) fn claim(&self, node: NodeHandle) -> u32 {
        self.check(&node)
    }

    /// Re-issue a handle for a node the caller has exclusive ownership of.
    pub(crate) fn issue(&self, index: u32) -> NodeHandle {
        debug_assert!((index as usize) < self.slots.len());
        NodeHandle {
            arena: self.id,
            index,
        }
    }

    pub(crate) fn slot(&self, index: u32) -> &Slot<T> {
        &self.slots[index as usize]
    }

    fn check(&self, node: &NodeHandle) -> u32 {
        assert_eq!(
            node.arena, self.id,
            "node handle from arena {} used with arena {}",
            node.arena, self.id
        );
        node.index
    }
}

impl<T> fmt::Debug for NodeArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeArena")
            .field("id", &self.id)
            .field("len", &self.slots.len())
            .finish()
    }
}
