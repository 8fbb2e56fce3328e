//! Endpoint state: negotiation state machine, candidates and their buffer

pub mod candidate;
pub mod candidate_buffer;
pub mod endpoint;
pub mod state;

pub use candidate::{CandidateInit, IceCandidate};
pub use candidate_buffer::{BufferDecision, CandidateBuffer};
pub use endpoint::{CandidateDisposition, Endpoint, EndpointId, Transition};
pub use state::{ConnectionState, InvalidTransition, StateEvent};
