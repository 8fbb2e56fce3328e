//! Negotiation: the coordinator driving offer/answer and trickle ICE

pub mod coordinator;
pub mod events;

pub use coordinator::NegotiationCoordinator;
pub use events::CallEvent;
