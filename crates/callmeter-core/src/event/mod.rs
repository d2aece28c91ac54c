//! Call lifecycle model.
//!
//! - `lifecycle`: event enum, identifiers, and phase mapping
//! - `observer`: the capability every lifecycle consumer implements

pub mod lifecycle;
pub mod observer;

pub use lifecycle::{CallId, ConnectionId, Edge, EventKind, LifecycleEvent, Phase, Protocol};
pub use observer::LifecycleObserver;
