//! Cross-messenger abstractions: the inbound event model consumed by the
//! routing core, and the delivery port the adapter crate implements.

pub mod port;
pub mod types;

pub use port::Delivery;
pub use types::InboundEvent;
