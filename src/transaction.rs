//! Begin/end painting boundary.
//!
//! A layer is either idle or has exactly one open transaction. Closing a
//! transaction records every chunk it changed as a single undo entry.

use std::fmt;

use tracing::{info, warn};

use crate::canvas::{LayerId, TiledStore};
use crate::document::Document;
use crate::error::BridgeError;
use crate::history::{TilePatch, TransactionCommand};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub(crate) u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// State kept on a layer while painting is in progress.
#[derive(Clone, Debug)]
pub struct OpenTransaction {
    pub id: TransactionId,
    pub label: String,
    /// Store as it was at `begin_painting`. Shares every chunk with the live
    /// store until the first write to it.
    before: TiledStore,
}

impl Document {
    /// Open a transaction on `layer`. Fails with `nested_transaction` if one
    /// is already open; the open one is left untouched.
    pub fn begin_painting(&mut self, layer: LayerId, label: &str) -> Result<TransactionId, BridgeError> {
        let id = TransactionId(self.next_transaction + 1);
        let target = self.layer_mut(layer).ok_or_else(|| BridgeError::LayerNotFound(layer.to_string()))?;
        if let Some(open) = &target.transaction {
            return Err(BridgeError::NestedTransaction {
                layer: target.name.clone(),
                label: open.label.clone(),
            });
        }
        target.transaction = Some(OpenTransaction {
            id,
            label: label.to_string(),
            before: target.pixels().clone(),
        });
        self.next_transaction += 1;
        Ok(id)
    }

    /// Close the transaction on `layer` and push its undo entry. Returns the
    /// closed transaction's id.
    pub fn end_painting(&mut self, layer: LayerId) -> Result<TransactionId, BridgeError> {
        self.close_transaction(layer, false)
    }

    pub fn transaction_id(&self, layer: LayerId) -> Option<TransactionId> {
        self.layer(layer).and_then(|l| l.open_transaction()).map(|t| t.id)
    }

    pub fn has_open_transactions(&self) -> bool {
        self.layers().iter().any(|l| l.is_locked())
    }

    /// Close every open transaction, marking each entry incomplete. Returns
    /// one warning per forced close.
    pub fn force_close_transactions(&mut self) -> Vec<String> {
        let open: Vec<(LayerId, String, String)> = self
            .layers()
            .iter()
            .filter_map(|l| l.open_transaction().map(|t| (l.id, l.name.clone(), t.label.clone())))
            .collect();

        let mut warnings = Vec::new();
        for (id, name, label) in open {
            if self.close_transaction(id, true).is_ok() {
                let msg = format!("transaction \"{label}\" on layer '{name}' was not closed; recorded as incomplete");
                warn!("{msg}");
                warnings.push(msg);
            }
        }
        warnings
    }

    fn close_transaction(&mut self, layer: LayerId, incomplete: bool) -> Result<TransactionId, BridgeError> {
        let target = self.layer_mut(layer).ok_or_else(|| BridgeError::LayerNotFound(layer.to_string()))?;
        let Some(open) = target.transaction.take() else {
            return Err(BridgeError::NoOpenTransaction(target.name.clone()));
        };

        let changed = target.pixels().changed_tiles(&open.before);
        let before = TilePatch::capture(layer, &open.before, &changed);
        let after = TilePatch::capture(layer, target.pixels(), &changed);
        info!(
            layer = %target.name,
            label = %open.label,
            tiles = changed.len(),
            incomplete,
            "transaction closed"
        );

        self.history_mut()
            .push(Box::new(TransactionCommand::new(open.label, before, after, incomplete)));
        Ok(open.id)
    }
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::error::BridgeError;
    use crate::pixel::PixelFormat;

    #[test]
    fn nested_begin_leaves_first_transaction_open() {
        let mut doc = Document::new("t", 4, 4, PixelFormat::Rgba8);
        let layer = doc.active_layer_id();
        let first = doc.begin_painting(layer, "A").unwrap();
        let err = doc.begin_painting(layer, "B").unwrap_err();
        assert_eq!(err.kind(), "nested_transaction");
        assert_eq!(doc.transaction_id(layer), Some(first));
        assert_eq!(doc.end_painting(layer).unwrap(), first);
        assert_eq!(doc.history().undo_history(), vec!["A".to_string()]);
    }

    #[test]
    fn end_without_begin_is_rejected() {
        let mut doc = Document::new("t", 4, 4, PixelFormat::Rgba8);
        let layer = doc.active_layer_id();
        assert!(matches!(doc.end_painting(layer), Err(BridgeError::NoOpenTransaction(_))));
        assert_eq!(doc.history().undo_count(), 0);
    }

    #[test]
    fn empty_transaction_still_records_one_entry() {
        let mut doc = Document::new("t", 4, 4, PixelFormat::Rgba8);
        let layer = doc.active_layer_id();
        doc.begin_painting(layer, "nothing").unwrap();
        doc.end_painting(layer).unwrap();
        assert_eq!(doc.history().undo_count(), 1);
    }

    #[test]
    fn one_undo_restores_every_pixel_of_the_transaction() {
        let mut doc = Document::new("t", 100, 100, PixelFormat::Rgba8);
        let layer = doc.active_layer_id();
        doc.begin_painting(layer, "scatter").unwrap();
        for i in 0..100u32 {
            doc.layer_mut(layer).unwrap().pixels_mut().put_pixel(i, 99 - i, &[0, 0, 0, 255]);
        }
        doc.end_painting(layer).unwrap();

        assert_eq!(doc.undo().unwrap().as_deref(), Some("scatter"));
        let store = doc.read_layer(layer).unwrap();
        assert!((0..100u32).all(|i| store.get_pixel(i, 99 - i) == [255, 255, 255, 255]));
        doc.redo().unwrap();
        assert_eq!(doc.read_layer(layer).unwrap().get_pixel(0, 99), [0, 0, 0, 255]);
    }

    #[test]
    fn force_close_marks_entries_incomplete() {
        let mut doc = Document::new("t", 4, 4, PixelFormat::Rgba8);
        let layer = doc.active_layer_id();
        doc.begin_painting(layer, "stroke").unwrap();
        let warnings = doc.force_close_transactions();
        assert_eq!(warnings.len(), 1);
        assert!(!doc.has_open_transactions());
        assert_eq!(doc.history().undo_description().as_deref(), Some("stroke (incomplete)"));
    }
}
