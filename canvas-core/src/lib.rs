//! # canvas-core: CRDT document model for the node canvas
//!
//! ```text
//! PositionChange batch ──► changes::apply_changes ──► Document (new snapshot)
//!                                                        │
//!                               serialize / deserialize ◄┤
//!                                         merge        ◄─┘
//!                                                        │
//!                                    view::CanvasView ◄──┘ (renderer)
//! ```
//!
//! ## Modules
//!
//! - [`model`]: plain node/edge/position types
//! - [`document`]: Yrs-backed immutable snapshots, merge, blob format
//! - [`changes`]: batch position changes into one mutation
//! - [`view`]: render projection (dangling edges filtered)
//! - [`seed`]: first-run layout

pub mod changes;
pub mod document;
pub mod model;
pub mod seed;
pub mod view;

pub use changes::{apply_changes, apply_changes_with_outcome, ChangeOutcome, PositionChange};
pub use document::{CanvasMut, Document, DocumentError, FORMAT_VERSION};
pub use model::{Canvas, Edge, Node, NodeKind, Position, ReplicaId};
pub use seed::initial_canvas;
pub use view::{CanvasView, RenderEdge};
