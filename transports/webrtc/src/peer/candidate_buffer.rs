//! Holding area for remote candidates that arrive before the remote description

use super::IceCandidate;
use std::collections::VecDeque;
use tracing::debug;

/// What the buffer decided to do with an offered candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferDecision {
    /// Queued until the remote description is accepted
    Buffered,
    /// Already flushed once; the caller must apply the candidate right away
    ApplyNow(IceCandidate),
    /// Owner is closed; the candidate is discarded
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Buffering,
    Flushed,
    Discarded,
}

/// FIFO of remote candidates for one endpoint
///
/// Drained exactly once, when the owning endpoint accepts its remote
/// description. After that it stays empty and hands every late arrival back
/// for immediate application.
#[derive(Debug)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
    phase: Phase,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            phase: Phase::Buffering,
        }
    }

    /// Offer a candidate to the buffer
    pub fn enqueue(&mut self, candidate: IceCandidate) -> BufferDecision {
        match self.phase {
            Phase::Buffering => {
                debug!(
                    "Buffering candidate #{} from {} ({} queued)",
                    candidate.sequence,
                    candidate.owner,
                    self.queue.len() + 1
                );
                self.queue.push_back(candidate);
                BufferDecision::Buffered
            }
            Phase::Flushed => BufferDecision::ApplyNow(candidate),
            Phase::Discarded => BufferDecision::Dropped,
        }
    }

    /// Drain the queue in arrival order
    ///
    /// Only the first call yields candidates; the buffer is inert afterwards.
    pub fn take_for_flush(&mut self) -> Vec<IceCandidate> {
        if self.phase != Phase::Buffering {
            return Vec::new();
        }
        self.phase = Phase::Flushed;
        self.queue.drain(..).collect()
    }

    /// Drop everything and refuse future candidates
    pub fn discard(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.phase = Phase::Discarded;
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Snapshot of queued candidates, oldest first
    pub fn pending(&self) -> Vec<IceCandidate> {
        self.queue.iter().cloned().collect()
    }
}

impl Default for CandidateBuffer {
    fn default() -> Self {
        Self::new()
    }
}
