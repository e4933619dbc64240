//! Named memory orderings for node and bucket access.
//!
//! Every atomic access in the crate goes through one of these so the pairing
//! between optimistic readers and locked writers stays visible at each site.

use std::sync::atomic::Ordering;

/// Loads of node or bucket fields during an optimistic read.
/// Pairs with the writer's [`WRITE_ORD`] stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Stores to node or bucket fields while holding the write lock.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Successful CAS on a version word or the root pointer.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Failed CAS: only the current value is needed.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Accesses already ordered by a held lock or a fence.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Version snapshot loads.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Version advance on unlock.
pub const UNLOCK_ORD: Ordering = Ordering::Release;
