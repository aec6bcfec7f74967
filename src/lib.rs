//! PaintFE scripting bridge.
//!
//! Exposes a layered raster document (layers, pixel iterators, painters,
//! filters, progress reporting) to sandboxed Rhai scripts. Every capability
//! the scripts see is a typed Rust API first; [`scripting`] only marshals
//! arguments and errors across the boundary.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod canvas;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod guard;
pub mod history;
pub mod iterator;
pub mod logger;
pub mod ops;
pub mod pixel;
pub mod progress;
pub mod scripting;
pub mod session;
pub mod transaction;

pub use canvas::{CanvasState, Layer, LayerId, TiledStore};
pub use config::BridgeConfig;
pub use document::Document;
pub use error::BridgeError;
pub use guard::{CancelToken, ExecutionGuard};
pub use iterator::PixelIterator;
pub use ops::filters::{FilterHandle, FilterRegistry};
pub use ops::painter::{FillStyle, PaintContext, StrokeStyle};
pub use ops::paintops::PaintOpRegistry;
pub use pixel::{Color, PixelFormat, PixelValue, Rect};
pub use progress::{ProgressChannel, ProgressSink};
pub use scripting::{ScriptError, ScriptFailure, ScriptMessage, ScriptOutcome, execute_script, execute_script_sync};
pub use session::{HandleId, Lease, Session, SessionReport};
pub use transaction::TransactionId;
