//! Top-level facade crate for callmeter.
//!
//! Re-exports the core model and the client instrumentation so users can depend on a single crate.

pub mod core {
    pub use callmeter_core::*;
}

pub mod client {
    pub use callmeter_client::*;
}
