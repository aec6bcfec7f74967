//! One script run's execution context.
//!
//! The session owns the document while a script runs, together with the
//! handle tables for iterators and painters, the registries, the progress
//! channel and the execution guard. Script-visible objects hold only a
//! [`HandleId`] and are resolved here on every call.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use crate::canvas::LayerId;
use crate::config::BridgeConfig;
use crate::document::Document;
use crate::error::BridgeError;
use crate::guard::{CancelToken, ExecutionGuard};
use crate::iterator::PixelIterator;
use crate::ops::filters::{FilterHandle, FilterRegistry};
use crate::ops::painter::{PaintContext, PaintEnv, PaintPrimitive};
use crate::ops::paintops::PaintOpRegistry;
use crate::ops::resources::ResourceCatalog;
use crate::pixel::PixelFormat;
use crate::progress::{ProgressChannel, ProgressSink};
use crate::transaction::TransactionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Keeps one handle-table entry alive. Script handles hold a lease; once
/// every clone is dropped the entry is swept on a later insert.
#[derive(Clone, Debug)]
pub struct Lease(Arc<HandleId>);

impl Lease {
    pub fn id(&self) -> HandleId {
        *self.0
    }
}

/// Entries per table before the first sweep.
const MIN_SWEEP: usize = 64;

struct HandleTable<T> {
    entries: HashMap<HandleId, (T, Weak<HandleId>)>,
    sweep_at: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self { entries: HashMap::new(), sweep_at: MIN_SWEEP }
    }
}

impl<T> HandleTable<T> {
    fn insert(&mut self, id: HandleId, value: T) -> Lease {
        if self.entries.len() >= self.sweep_at {
            self.entries.retain(|_, (_, lease)| lease.strong_count() > 0);
            self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP);
        }
        let lease = Lease(Arc::new(id));
        self.entries.insert(id, (value, Arc::downgrade(&lease.0)));
        lease
    }

    fn get(&self, id: &HandleId) -> Option<&T> {
        self.entries.get(id).map(|(value, _)| value)
    }

    fn get_mut(&mut self, id: &HandleId) -> Option<&mut T> {
        self.entries.get_mut(id).map(|(value, _)| value)
    }

    fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.retain(|_, (value, _)| keep(value));
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.sweep_at = MIN_SWEEP;
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// What a finished session hands back to the host.
#[derive(Debug)]
pub struct SessionReport {
    pub document: Document,
    /// Forced transaction closes and other non-fatal problems.
    pub warnings: Vec<String>,
    pub console_output: Vec<String>,
    /// Iterator steps the script consumed.
    pub steps: u64,
}

pub struct Session {
    document: Document,
    filters: FilterRegistry,
    paint_ops: PaintOpRegistry,
    resources: ResourceCatalog,
    progress: ProgressChannel,
    guard: ExecutionGuard,
    iterators: HandleTable<PixelIterator>,
    painters: HandleTable<PaintContext>,
    next_handle: u64,
    warnings: Vec<String>,
    console: Vec<String>,
}

impl Session {
    pub fn new(document: Document, config: &BridgeConfig) -> Self {
        let document = document.with_history_limits(&config.history);
        let mut progress = ProgressChannel::new();
        progress.reset();
        Self {
            document,
            filters: FilterRegistry::default(),
            paint_ops: PaintOpRegistry::default(),
            resources: ResourceCatalog::default(),
            progress,
            guard: ExecutionGuard::new(CancelToken::new(), config.step_budget),
            iterators: HandleTable::default(),
            painters: HandleTable::default(),
            next_handle: 0,
            warnings: Vec::new(),
            console: Vec::new(),
        }
    }

    /// Share a cancel flag owned by the host.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.guard = ExecutionGuard::new(token, self.guard.budget());
        self
    }

    pub fn attach_progress(&mut self, sink: Box<dyn ProgressSink>) {
        self.progress.attach(sink);
    }

    // ---- accessors ----------------------------------------------------------

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterRegistry {
        &mut self.filters
    }

    pub fn paint_ops_mut(&mut self) -> &mut PaintOpRegistry {
        &mut self.paint_ops
    }

    pub fn resources(&self) -> &ResourceCatalog {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceCatalog {
        &mut self.resources
    }

    pub fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    pub fn progress(&self) -> &ProgressChannel {
        &self.progress
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn console_output(&self) -> &[String] {
        &self.console
    }

    fn next_id(&mut self) -> HandleId {
        self.next_handle += 1;
        HandleId(self.next_handle)
    }

    // ---- document -----------------------------------------------------------

    /// Resolve a layer by name, or the active layer when `name` is `None`.
    pub fn layer_id(&self, name: Option<&str>) -> Result<LayerId, BridgeError> {
        match name {
            Some(name) => Ok(self.document.layer_by_name(name)?.id),
            None => Ok(self.document.active_layer_id()),
        }
    }

    pub fn add_layer(&mut self, name: &str, format: PixelFormat) -> LayerId {
        self.document.add_layer(name, format)
    }

    pub fn convert_layer_format(&mut self, layer: LayerId, format: PixelFormat) -> Result<(), BridgeError> {
        self.document.convert_layer_format(layer, format)
    }

    pub fn undo(&mut self) -> Result<Option<String>, BridgeError> {
        self.document.undo()
    }

    pub fn redo(&mut self) -> Result<Option<String>, BridgeError> {
        self.document.redo()
    }

    // ---- transactions -------------------------------------------------------

    pub fn begin_painting(&mut self, layer: LayerId, label: &str) -> Result<TransactionId, BridgeError> {
        self.document.begin_painting(layer, label)
    }

    /// Close the layer's transaction. Painters bound to it are dropped.
    pub fn end_painting(&mut self, layer: LayerId) -> Result<TransactionId, BridgeError> {
        let closed = self.document.end_painting(layer)?;
        self.painters.retain(|p| p.transaction() != closed);
        Ok(closed)
    }

    // ---- iterators ----------------------------------------------------------

    /// Iterator over `(x, y, w, h)` of `layer`, or the whole layer when no
    /// region is given. The entry lives as long as the returned lease.
    pub fn create_iterator(
        &mut self,
        layer: LayerId,
        region: Option<(i64, i64, i64, i64)>,
    ) -> Result<Lease, BridgeError> {
        let iterator = match region {
            Some((x, y, w, h)) => PixelIterator::new(&self.document, layer, x, y, w, h)?,
            None => PixelIterator::over_layer(&self.document, layer)?,
        };
        let id = self.next_id();
        Ok(self.iterators.insert(id, iterator))
    }

    /// Iterator entries currently held, live or awaiting a sweep.
    pub fn iterator_count(&self) -> usize {
        self.iterators.len()
    }

    pub fn painter_count(&self) -> usize {
        self.painters.len()
    }

    pub fn iterator(&self, id: HandleId) -> Result<&PixelIterator, BridgeError> {
        self.iterators
            .get(&id)
            .ok_or_else(|| BridgeError::InvalidIterator(format!("unknown iterator {id}")))
    }

    /// Advance the iterator, charging one step against the guard.
    pub fn iterator_next(&mut self, id: HandleId) -> Result<bool, BridgeError> {
        let iterator = self
            .iterators
            .get_mut(&id)
            .ok_or_else(|| BridgeError::InvalidIterator(format!("unknown iterator {id}")))?;
        iterator.next(&mut self.guard)
    }

    /// Run `f` with the iterator and the document.
    pub fn with_iterator<R>(
        &mut self,
        id: HandleId,
        f: impl FnOnce(&mut PixelIterator, &mut Document) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let iterator = self
            .iterators
            .get_mut(&id)
            .ok_or_else(|| BridgeError::InvalidIterator(format!("unknown iterator {id}")))?;
        f(iterator, &mut self.document)
    }

    pub fn iterator_copy_from(&mut self, target: HandleId, source: HandleId) -> Result<(), BridgeError> {
        let source = self.iterator(source)?.clone();
        self.with_iterator(target, |it, doc| it.copy_from(doc, &source))
    }

    // ---- painters -----------------------------------------------------------

    /// Painter on `layer`; the layer must have an open transaction.
    pub fn create_painter(&mut self, layer: LayerId) -> Result<Lease, BridgeError> {
        let painter = PaintContext::for_layer(&self.document, layer)?;
        let id = self.next_id();
        Ok(self.painters.insert(id, painter))
    }

    pub fn painter_mut(&mut self, id: HandleId) -> Result<&mut PaintContext, BridgeError> {
        self.painters
            .get_mut(&id)
            .ok_or_else(|| BridgeError::InvalidPainter(format!("painter {id} is no longer valid")))
    }

    pub fn paint(&mut self, id: HandleId, primitive: &PaintPrimitive, pressure: f64) -> Result<(), BridgeError> {
        let painter = self
            .painters
            .get(&id)
            .ok_or_else(|| BridgeError::InvalidPainter(format!("painter {id} is no longer valid")))?;
        let env = PaintEnv {
            document: &mut self.document,
            paint_ops: &self.paint_ops,
            resources: &self.resources,
            guard: &self.guard,
        };
        painter.paint(env, primitive, pressure)
    }

    // ---- filters ------------------------------------------------------------

    pub fn filter(&self, id: &str) -> Result<FilterHandle, BridgeError> {
        self.filters.get(id)
    }

    pub fn process_filter(
        &mut self,
        filter: &FilterHandle,
        layer: LayerId,
        area: Option<(i64, i64, i64, i64)>,
    ) -> Result<(), BridgeError> {
        filter.process(&mut self.document, layer, area, &self.guard)
    }

    // ---- progress & output --------------------------------------------------

    pub fn set_progress_total_steps(&mut self, total: i64) {
        self.progress.set_total_steps(total);
    }

    pub fn inc_progress(&mut self) {
        self.progress.inc();
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn print(&mut self, line: impl Into<String>) {
        self.console.push(line.into());
    }

    // ---- teardown -----------------------------------------------------------

    /// End the run: force-close open transactions, detach the progress
    /// observer, drop every handle and hand the document back.
    pub fn take_report(&mut self) -> SessionReport {
        for warning in self.document.force_close_transactions() {
            self.warnings.push(warning);
        }
        self.progress.detach();
        self.iterators.clear();
        self.painters.clear();
        let steps = self.guard.steps_used();
        let placeholder = Document::new("closed", 1, 1, PixelFormat::Gray8);
        let document = mem::replace(&mut self.document, placeholder);
        info!(
            "Session for '{}' finished: {} warning(s), {} step(s)",
            document.name,
            self.warnings.len(),
            steps
        );
        SessionReport {
            document,
            warnings: mem::take(&mut self.warnings),
            console_output: mem::take(&mut self.console),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn session() -> Session {
        Session::new(Document::new("s", 8, 8, PixelFormat::Rgba8), &BridgeConfig::default())
    }

    #[test]
    fn closing_a_transaction_drops_its_painters() {
        let mut s = session();
        let layer = s.layer_id(None).unwrap();
        s.begin_painting(layer, "a").unwrap();
        let painter = s.create_painter(layer).unwrap().id();
        s.paint(painter, &PaintPrimitive::At(crate::ops::shapes::Point::new(2.0, 2.0)), 1.0).unwrap();
        s.end_painting(layer).unwrap();
        let err = s.paint(painter, &PaintPrimitive::At(crate::ops::shapes::Point::new(2.0, 2.0)), 1.0);
        assert_eq!(err.unwrap_err().kind(), "invalid_painter");
    }

    #[test]
    fn painter_needs_an_open_transaction() {
        let mut s = session();
        let layer = s.layer_id(None).unwrap();
        assert_eq!(s.create_painter(layer).unwrap_err().kind(), "no_open_transaction");
    }

    #[test]
    fn iterator_steps_count_against_the_budget() {
        let config = BridgeConfig { step_budget: Some(3), ..BridgeConfig::default() };
        let mut s = Session::new(Document::new("b", 8, 8, PixelFormat::Rgba8), &config);
        let layer = s.layer_id(None).unwrap();
        let lease = s.create_iterator(layer, None).unwrap();
        let it = lease.id();
        for _ in 0..3 {
            assert!(s.iterator_next(it).unwrap());
        }
        assert_eq!(s.iterator_next(it).unwrap_err().kind(), "budget_exhausted");
    }

    #[test]
    fn copy_between_iterators() {
        let mut s = session();
        let src_layer = s.layer_id(None).unwrap();
        let dst_layer = s.add_layer("copy", PixelFormat::Rgba16);
        let src = s.create_iterator(src_layer, None).unwrap();
        s.begin_painting(dst_layer, "copy").unwrap();
        let dst = s.create_iterator(dst_layer, Some((0, 0, 1, 1))).unwrap();
        s.iterator_copy_from(dst.id(), src.id()).unwrap();
        s.end_painting(dst_layer).unwrap();
        let px = s.document().read_layer(dst_layer).unwrap().get_pixel(0, 0);
        assert_eq!(px, [65535, 65535, 65535, 65535]);
    }

    #[test]
    fn report_force_closes_and_detaches() {
        let mut s = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        s.attach_progress(Box::new(move |c: u64, t: u64| sink.lock().unwrap().push((c, t))));
        s.set_progress_total_steps(2);
        s.inc_progress();
        let layer = s.layer_id(None).unwrap();
        s.begin_painting(layer, "left open").unwrap();
        s.print("hello");

        let report = s.take_report();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.console_output, vec!["hello"]);
        assert!(!report.document.has_open_transactions());
        assert!(report.document.history().undo_description().unwrap().contains("(incomplete)"));
        assert!(!s.progress().is_attached());
        assert_eq!(*seen.lock().unwrap(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn dropped_handles_are_swept() {
        let mut s = session();
        let layer = s.layer_id(None).unwrap();
        let kept = s.create_iterator(layer, None).unwrap();
        for _ in 0..100_000 {
            s.create_iterator(layer, Some((0, 0, 2, 2))).unwrap();
        }
        assert!(s.iterator_count() <= 2 * MIN_SWEEP, "{} entries", s.iterator_count());
        assert!(s.iterator_next(kept.id()).unwrap());

        s.begin_painting(layer, "p").unwrap();
        for _ in 0..1_000 {
            s.create_painter(layer).unwrap();
        }
        assert!(s.painter_count() <= 2 * MIN_SWEEP);
        drop(kept);
        for _ in 0..MIN_SWEEP {
            s.create_iterator(layer, None).unwrap();
        }
        assert!(s.iterator_count() <= MIN_SWEEP);
    }
}
