//! Controllers for the three execution contexts and the bus between them.
//!
//! - [`background`]: sweep, relay and collaborator proxy
//! - [`page`]: the per-page widget and its gate
//! - [`popup`]: login, re-validation and sign-out
//! - [`runtime`]: message passing between contexts

pub mod background;
pub mod page;
pub mod popup;
pub mod runtime;

pub use background::{BackgroundController, RelayReport, SweepOutcome};
pub use page::{GateState, MessageRole, PageInstance, PageSnapshot, TranscriptLine};
pub use popup::{Community, PopupController, PopupView};
pub use runtime::{Envelope, RuntimeBus, TabId};
