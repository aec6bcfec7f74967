//! Row-major cursor over a rectangle of one layer.
//!
//! An iterator holds ids only (layer, store generation, transaction) and is
//! resolved against the document on every call, so a removed layer or a
//! reallocated store is detected instead of dereferenced.

use crate::canvas::{LayerId, TiledStore};
use crate::document::Document;
use crate::error::BridgeError;
use crate::guard::ExecutionGuard;
use crate::pixel::{PixelFormat, PixelValue, Rect};
use crate::transaction::TransactionId;

#[derive(Clone, Debug)]
pub struct PixelIterator {
    layer: LayerId,
    generation: u64,
    format: PixelFormat,
    /// Transaction writes go through. Bound at creation, or at the first
    /// write when the iterator was created outside a transaction.
    transaction: Option<TransactionId>,
    bounds: Rect,
    x: u32,
    y: u32,
    done: bool,
}

impl PixelIterator {
    /// Iterator over `(x, y, w, h)` intersected with the layer. An empty
    /// intersection gives an iterator that is already done.
    pub fn new(doc: &Document, layer: LayerId, x: i64, y: i64, w: i64, h: i64) -> Result<Self, BridgeError> {
        let target = doc.require_layer(layer)?;
        let store = target.pixels();
        let bounds = Rect::clip(x, y, w, h, store.width(), store.height());
        Ok(Self {
            layer,
            generation: store.generation(),
            format: store.format(),
            transaction: target.open_transaction().map(|t| t.id),
            bounds,
            x: bounds.x,
            y: bounds.y,
            done: bounds.is_empty(),
        })
    }

    /// Iterator over the whole layer.
    pub fn over_layer(doc: &Document, layer: LayerId) -> Result<Self, BridgeError> {
        let target = doc.require_layer(layer)?;
        Self::new(doc, layer, 0, 0, target.width() as i64, target.height() as i64)
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance one pixel. Returns `false` (and becomes done) when the region
    /// is exhausted. Every advance is charged to `guard`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self, guard: &mut ExecutionGuard) -> Result<bool, BridgeError> {
        if self.done {
            return Ok(false);
        }
        guard.step()?;
        if self.x + 1 < self.bounds.right() {
            self.x += 1;
            return Ok(true);
        }
        if self.y + 1 < self.bounds.bottom() {
            self.x = self.bounds.x;
            self.y += 1;
            return Ok(true);
        }
        self.done = true;
        Ok(false)
    }

    /// Back to the first pixel of the region.
    pub fn reset(&mut self) {
        self.x = self.bounds.x;
        self.y = self.bounds.y;
        self.done = self.bounds.is_empty();
    }

    fn position(&self) -> Result<(u32, u32), BridgeError> {
        if self.done {
            Err(BridgeError::InvalidIterator("iterator is exhausted".into()))
        } else {
            Ok((self.x, self.y))
        }
    }

    fn store<'d>(&self, doc: &'d Document) -> Result<&'d TiledStore, BridgeError> {
        let layer = doc
            .layer(self.layer)
            .ok_or_else(|| BridgeError::InvalidIterator("its layer was removed".into()))?;
        if layer.pixels().generation() != self.generation {
            return Err(BridgeError::InvalidIterator(format!(
                "layer '{}' was reallocated since the iterator was created",
                layer.name
            )));
        }
        Ok(layer.pixels())
    }

    fn store_mut<'d>(&mut self, doc: &'d mut Document) -> Result<&'d mut TiledStore, BridgeError> {
        let layer = doc
            .layer_mut(self.layer)
            .ok_or_else(|| BridgeError::InvalidIterator("its layer was removed".into()))?;
        if layer.pixels().generation() != self.generation {
            return Err(BridgeError::InvalidIterator(format!(
                "layer '{}' was reallocated since the iterator was created",
                layer.name
            )));
        }
        let open = layer.open_transaction().map(|t| t.id);
        match (self.transaction, open) {
            (Some(bound), Some(open)) if bound == open => {}
            (Some(bound), _) => {
                return Err(BridgeError::InvalidIterator(format!("transaction {bound} has been closed")));
            }
            (None, Some(open)) => self.transaction = Some(open),
            (None, None) => return Err(BridgeError::NoOpenTransaction(layer.name.clone())),
        }
        Ok(layer.pixels_mut())
    }

    // ---- reads --------------------------------------------------------------

    pub fn get(&self, doc: &Document, channel: usize) -> Result<u16, BridgeError> {
        let channel = self.format.check_channel(channel)?;
        Ok(self.pixel(doc)?[channel])
    }

    pub fn pixel(&self, doc: &Document) -> Result<PixelValue, BridgeError> {
        let store = self.store(doc)?;
        let (x, y) = self.position()?;
        Ok(store.get_pixel(x, y))
    }

    // ---- writes -------------------------------------------------------------

    /// Write one channel, clamping `value` to the native range.
    pub fn set(&mut self, doc: &mut Document, channel: usize, value: i64) -> Result<(), BridgeError> {
        let channel = self.format.check_channel(channel)?;
        let value = self.format.clamp_value(value);
        let (x, y) = self.position()?;
        self.store_mut(doc)?.set_channel(x, y, channel, value);
        Ok(())
    }

    /// Write every channel; `values` must have one entry per channel.
    pub fn set_pixel(&mut self, doc: &mut Document, values: &[i64]) -> Result<(), BridgeError> {
        let count = self.format.channel_count();
        if values.len() != count {
            return Err(BridgeError::InvalidArgument(format!(
                "{} pixels have {count} channels, got {}",
                self.format,
                values.len()
            )));
        }
        let mut px = [0u16; 4];
        for (slot, v) in px.iter_mut().zip(values) {
            *slot = self.format.clamp_value(*v);
        }
        let (x, y) = self.position()?;
        self.store_mut(doc)?.put_pixel(x, y, &px);
        Ok(())
    }

    /// `max - v` on every color channel; alpha is left alone.
    pub fn invert_color(&mut self, doc: &mut Document) -> Result<(), BridgeError> {
        let (x, y) = self.position()?;
        let max = self.format.max_value();
        let color_channels = self.format.color_channels();
        let store = self.store_mut(doc)?;
        let mut px = store.get_pixel(x, y);
        for v in px.iter_mut().take(color_channels) {
            *v = max - *v;
        }
        store.put_pixel(x, y, &px);
        Ok(())
    }

    /// Copy `other`'s current pixel here, converting formats if they differ.
    pub fn copy_from(&mut self, doc: &mut Document, other: &PixelIterator) -> Result<(), BridgeError> {
        let source = other.pixel(doc)?;
        let px = other.format.convert(&source, self.format);
        let (x, y) = self.position()?;
        self.store_mut(doc)?.put_pixel(x, y, &px);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(format: PixelFormat) -> (Document, LayerId) {
        let mut doc = Document::new("t", 5, 4, format);
        let id = doc.add_layer("work", format);
        (doc, id)
    }

    #[test]
    fn visits_every_pixel_exactly_once() {
        let (doc, layer) = doc_with(PixelFormat::Rgba8);
        let mut guard = ExecutionGuard::unlimited();
        let mut it = PixelIterator::new(&doc, layer, 1, 1, 3, 2).unwrap();
        let mut seen = vec![(it.x(), it.y())];
        let mut calls = 0;
        while it.next(&mut guard).unwrap() {
            calls += 1;
            seen.push((it.x(), it.y()));
        }
        calls += 1;
        assert_eq!(calls, 6);
        assert!(it.is_done());
        assert_eq!(seen, vec![(1, 1), (2, 1), (3, 1), (1, 2), (2, 2), (3, 2)]);
    }

    #[test]
    fn region_outside_layer_is_immediately_done() {
        let (doc, layer) = doc_with(PixelFormat::Rgba8);
        let mut guard = ExecutionGuard::unlimited();
        let mut it = PixelIterator::new(&doc, layer, 10, 10, 3, 3).unwrap();
        assert!(it.is_done());
        assert!(!it.next(&mut guard).unwrap());
        assert_eq!(guard.steps_used(), 0);
        assert_eq!(it.get(&doc, 0).unwrap_err().kind(), "invalid_iterator");
    }

    #[test]
    fn writes_clamp_and_are_visible_to_later_readers() {
        let (mut doc, layer) = doc_with(PixelFormat::Rgba8);
        doc.begin_painting(layer, "w").unwrap();
        let mut it = PixelIterator::over_layer(&doc, layer).unwrap();
        it.set(&mut doc, 0, 300).unwrap();
        it.set(&mut doc, 3, -5).unwrap();
        let reader = PixelIterator::over_layer(&doc, layer).unwrap();
        assert_eq!(reader.pixel(&doc).unwrap(), [255, 0, 0, 0]);
        assert!(matches!(it.set(&mut doc, 4, 1), Err(BridgeError::InvalidChannel { .. })));
    }

    #[test]
    fn double_invert_is_identity() {
        let (mut doc, layer) = doc_with(PixelFormat::Rgba16);
        doc.begin_painting(layer, "inv").unwrap();
        let mut guard = ExecutionGuard::unlimited();
        let mut it = PixelIterator::over_layer(&doc, layer).unwrap();
        it.set_pixel(&mut doc, &[1, 2000, 65535, 7]).unwrap();
        it.invert_color(&mut doc).unwrap();
        assert_eq!(it.pixel(&doc).unwrap(), [65534, 63535, 0, 7]);
        it.invert_color(&mut doc).unwrap();
        assert_eq!(it.pixel(&doc).unwrap(), [1, 2000, 65535, 7]);
        assert!(it.next(&mut guard).unwrap());
    }

    #[test]
    fn writes_after_transaction_close_are_invalid() {
        let (mut doc, layer) = doc_with(PixelFormat::Rgba8);
        doc.begin_painting(layer, "a").unwrap();
        let mut it = PixelIterator::over_layer(&doc, layer).unwrap();
        doc.end_painting(layer).unwrap();
        assert_eq!(it.set(&mut doc, 0, 1).unwrap_err().kind(), "invalid_iterator");
        doc.begin_painting(layer, "b").unwrap();
        assert_eq!(it.set(&mut doc, 0, 1).unwrap_err().kind(), "invalid_iterator");
        assert!(it.get(&doc, 0).is_ok());
    }

    #[test]
    fn writes_without_any_transaction_are_rejected() {
        let (mut doc, layer) = doc_with(PixelFormat::Rgba8);
        let mut it = PixelIterator::over_layer(&doc, layer).unwrap();
        assert_eq!(it.set(&mut doc, 0, 1).unwrap_err().kind(), "no_open_transaction");
        doc.begin_painting(layer, "late").unwrap();
        it.set(&mut doc, 0, 9).unwrap();
        assert_eq!(it.transaction(), doc.transaction_id(layer));
    }

    #[test]
    fn reallocation_invalidates_reads() {
        let (mut doc, layer) = doc_with(PixelFormat::Rgba8);
        let it = PixelIterator::over_layer(&doc, layer).unwrap();
        doc.convert_layer_format(layer, PixelFormat::Rgba16).unwrap();
        assert_eq!(it.pixel(&doc).unwrap_err().kind(), "invalid_iterator");
    }

    #[test]
    fn copy_from_converts_between_formats() {
        let mut doc = Document::new("t", 2, 2, PixelFormat::Rgba8);
        let wide = doc.add_layer("wide", PixelFormat::Rgba16);
        let base = doc.layers()[0].id;
        doc.begin_painting(wide, "copy").unwrap();
        let src = PixelIterator::over_layer(&doc, base).unwrap();
        let mut dst = PixelIterator::over_layer(&doc, wide).unwrap();
        dst.copy_from(&mut doc, &src).unwrap();
        assert_eq!(dst.pixel(&doc).unwrap(), [65535; 4]);
    }

    #[test]
    fn reset_restarts_the_walk() {
        let (doc, layer) = doc_with(PixelFormat::Gray8);
        let mut guard = ExecutionGuard::unlimited();
        let mut it = PixelIterator::new(&doc, layer, 0, 0, 2, 1).unwrap();
        while it.next(&mut guard).unwrap() {}
        it.reset();
        assert!(!it.is_done());
        assert_eq!((it.x(), it.y()), (0, 0));
    }
}
