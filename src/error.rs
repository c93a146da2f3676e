//! Error types for bus transactions and read-back checking.

use std::fmt;
use std::io;

use crate::axi::Resp;
use crate::utils::hex;

/// Structural or status failures of a single bus transaction. Always fatal
/// to that transaction and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The slave answered a burst with SLVERR or DECERR.
    #[error("burst id {id} at {addr:#x} completed with {resp}")]
    ErrorResponse { id: u32, addr: u64, resp: Resp },

    /// A response carried an id with no burst in flight.
    #[error("response carries id {id}, which has no burst in flight")]
    UnexpectedId { id: u32 },

    /// `last` arrived before the declared burst length was reached.
    #[error("id {id}: last asserted on beat {beat} of a {beats}-beat burst")]
    EarlyLast { id: u32, beat: usize, beats: usize },

    /// The final beat arrived without `last`, or beats continued past it.
    #[error("id {id}: beat {beat} of a {beats}-beat burst is missing last")]
    MissingLast { id: u32, beat: usize, beats: usize },

    /// The data phase does not match the length declared in the address phase.
    #[error("id {id}: {driven} data beats for a {declared}-beat burst")]
    BeatCountMismatch { id: u32, driven: usize, declared: usize },

    /// A response arrived before the burst's data phase completed.
    #[error("id {id}: response received before the data phase completed")]
    EarlyResponse { id: u32 },

    /// A ready/valid rule was broken on a channel.
    #[error("{channel} at cycle {cycle}: {reason}")]
    HandshakeViolation {
        channel: String,
        cycle: u64,
        reason: String,
    },
}

/// One failed read-back comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub addr: u64,
    pub expected: Vec<u8>,
    pub observed: Vec<u8>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data mismatch at address {:#x}: expected [{}], observed [{}]",
            self.addr,
            hex(&self.expected),
            hex(&self.observed)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TbError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Read-back data differed from what was written. Collected over a whole
    /// sweep, not raised on the first difference.
    #[error("{} read-back mismatch(es); {summary}", .mismatches.len())]
    DataMismatch {
        mismatches: Vec<Mismatch>,
        summary: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid transfer request: {0}")]
    InvalidRequest(String),

    #[error("{name} did not finish within {cycles} cycles")]
    Timeout { name: String, cycles: u64 },

    #[error("{name} stalled at cycle {cycle}: no task can make progress")]
    Deadlock { name: String, cycle: u64 },

    #[error("task {0} was dropped before it finished")]
    TaskDropped(String),

    #[error("report I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("report generation failed: {0}")]
    Report(String),
}

pub type TbResult<T> = Result<T, TbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_lists_both_sequences() {
        let m = Mismatch {
            addr: 0x20,
            expected: vec![0x0a, 0x0b],
            observed: vec![0x0a, 0x00],
        };
        assert_eq!(
            m.to_string(),
            "data mismatch at address 0x20: expected [0a 0b], observed [0a 00]"
        );
    }

    #[test]
    fn protocol_errors_convert() {
        let err: TbError = ProtocolError::UnexpectedId { id: 3 }.into();
        assert!(matches!(err, TbError::Protocol(ProtocolError::UnexpectedId { id: 3 })));
        assert_eq!(
            err.to_string(),
            "protocol error: response carries id 3, which has no burst in flight"
        );
    }
}
