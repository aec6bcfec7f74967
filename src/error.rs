//! Error taxonomy shared by every bridge call.
//!
//! Each variant carries a stable [`BridgeError::kind`] identifier so scripts
//! can branch on the failure without parsing messages.

use thiserror::Error;

use crate::pixel::PixelFormat;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    // -- caller-contract violations --
    #[error("layer not found: {0}")]
    LayerNotFound(String),
    #[error("a transaction (\"{label}\") is already open on layer '{layer}'")]
    NestedTransaction { layer: String, label: String },
    #[error("no transaction is open on layer '{0}'")]
    NoOpenTransaction(String),
    #[error("transaction \"{0}\" is still open")]
    TransactionInProgress(String),
    #[error("invalid iterator: {0}")]
    InvalidIterator(String),
    #[error("invalid painter: {0}")]
    InvalidPainter(String),
    #[error("filter not found: {0}")]
    FilterNotFound(String),
    #[error("paint operation not found: {0}")]
    PaintOpNotFound(String),
    #[error("{kind} not found: {name}")]
    ResourceNotFound { kind: &'static str, name: String },
    #[error("channel {channel} does not exist in pixel format {format}")]
    InvalidChannel { channel: String, format: PixelFormat },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- format incompatibility --
    #[error("filter '{filter}' does not support pixel format {format}")]
    IncompatibleFormat { filter: String, format: PixelFormat },

    // -- resource state --
    #[error("layer '{0}' is locked by an open transaction")]
    LayerLocked(String),

    // -- execution control --
    #[error("execution cancelled")]
    Cancelled,
    #[error("step budget of {0} iterator steps exhausted")]
    BudgetExhausted(u64),
}

impl BridgeError {
    /// Stable identifier exposed to scripts (`err.kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::LayerNotFound(_) => "layer_not_found",
            BridgeError::NestedTransaction { .. } => "nested_transaction",
            BridgeError::NoOpenTransaction(_) => "no_open_transaction",
            BridgeError::TransactionInProgress(_) => "transaction_in_progress",
            BridgeError::InvalidIterator(_) => "invalid_iterator",
            BridgeError::InvalidPainter(_) => "invalid_painter",
            BridgeError::FilterNotFound(_) => "filter_not_found",
            BridgeError::PaintOpNotFound(_) => "paint_op_not_found",
            BridgeError::ResourceNotFound { .. } => "resource_not_found",
            BridgeError::InvalidChannel { .. } => "invalid_channel",
            BridgeError::InvalidArgument(_) => "invalid_argument",
            BridgeError::IncompatibleFormat { .. } => "incompatible_format",
            BridgeError::LayerLocked(_) => "layer_locked",
            BridgeError::Cancelled => "cancelled",
            BridgeError::BudgetExhausted(_) => "budget_exhausted",
        }
    }

    /// Errors that stop the script regardless of `try`/`catch`.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, BridgeError::Cancelled | BridgeError::BudgetExhausted(_))
    }
}
