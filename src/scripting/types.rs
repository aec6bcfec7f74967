//! Handle types for Rhai scripting integration.
//!
//! Every handle carries the shared session plus an id. Nothing is cached on
//! the script side, so a stale handle is caught by the session rather than
//! touching freed or reallocated state.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::canvas::LayerId;
use crate::ops::filters::FilterHandle;
use crate::session::{HandleId, Lease, Session};

pub type SharedSession = Arc<Mutex<Session>>;

/// Lock the session, recovering from a poisoned lock so a panic inside one
/// call cannot wedge teardown.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// The document the script is editing.
#[derive(Clone)]
pub struct DocumentHandle {
    pub session: SharedSession,
}

#[derive(Clone)]
pub struct LayerHandle {
    pub session: SharedSession,
    pub id: LayerId,
}

/// Iterator and painter handles hold a lease on their session entry, which
/// is swept once the script drops the last copy.
#[derive(Clone)]
pub struct IteratorHandle {
    pub session: SharedSession,
    pub id: HandleId,
    _lease: Lease,
}

impl IteratorHandle {
    pub fn new(session: SharedSession, lease: Lease) -> Self {
        Self { session, id: lease.id(), _lease: lease }
    }
}

#[derive(Clone)]
pub struct PainterHandle {
    pub session: SharedSession,
    pub id: HandleId,
    _lease: Lease,
}

impl PainterHandle {
    pub fn new(session: SharedSession, lease: Lease) -> Self {
        Self { session, id: lease.id(), _lease: lease }
    }
}

/// A filter and its private configuration. Setting a property on one
/// handle does not affect other handles for the same filter.
#[derive(Clone)]
pub struct FilterRef {
    pub session: SharedSession,
    pub filter: FilterHandle,
}
