//! Reference model of a single bound session.
//!
//! Trivially correct by construction: plain queues, no streams, no locking.
//! Property tests apply the same [`Operation`] sequence to the model and to a
//! real controller over [`crate::SimTransport`] and compare results.

use std::collections::VecDeque;

/// Operations applied to both the model and the real controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Open the session
    Open,
    /// Close the session
    Close,
    /// Caller writes bytes
    Write(Vec<u8>),
    /// Device sends bytes
    Deliver(Vec<u8>),
    /// Device makes room for more output
    GrantCapacity(usize),
    /// Caller reads up to this many bytes
    Read(usize),
    /// Device ends the input stream
    EndStream,
}

/// Outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded with nothing to report
    Ok,
    /// Bytes returned by a read
    Bytes(Vec<u8>),
    /// Write attempted without an open session
    NotOpen,
}

/// Reference session model.
#[derive(Debug, Clone)]
pub struct ModelSession {
    initial_capacity: usize,
    open: bool,
    capacity: usize,
    read_queue: VecDeque<u8>,
    write_queue: VecDeque<u8>,
    transmitted: Vec<u8>,
}

impl ModelSession {
    /// Create a closed model whose sessions start with `initial_capacity`
    /// output bytes of room.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            open: false,
            capacity: 0,
            read_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
            transmitted: Vec::new(),
        }
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Open => {
                if !self.open {
                    self.open = true;
                    self.capacity = self.initial_capacity;
                }
                OperationResult::Ok
            },
            Operation::Close | Operation::EndStream => {
                self.reset();
                OperationResult::Ok
            },
            Operation::Write(bytes) => {
                if !self.open {
                    return OperationResult::NotOpen;
                }
                self.write_queue.extend(bytes);
                self.flush();
                OperationResult::Ok
            },
            Operation::Deliver(bytes) => {
                if self.open {
                    self.read_queue.extend(bytes);
                }
                OperationResult::Ok
            },
            Operation::GrantCapacity(bytes) => {
                if self.open {
                    self.capacity = self.capacity.saturating_add(*bytes);
                    self.flush();
                }
                OperationResult::Ok
            },
            Operation::Read(max) => {
                let n = (*max).min(self.read_queue.len());
                OperationResult::Bytes(self.read_queue.drain(..n).collect())
            },
        }
    }

    /// Whether a session is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Bytes received and not yet read.
    pub fn bytes_available(&self) -> usize {
        self.read_queue.len()
    }

    /// Bytes written and not yet accepted by the device.
    pub fn pending_write_bytes(&self) -> usize {
        self.write_queue.len()
    }

    /// Every byte the device has accepted.
    pub fn transmitted(&self) -> &[u8] {
        &self.transmitted
    }

    fn flush(&mut self) {
        let n = self.capacity.min(self.write_queue.len());
        self.transmitted.extend(self.write_queue.drain(..n));
        self.capacity -= n;
    }

    fn reset(&mut self) {
        self.open = false;
        self.capacity = 0;
        self.read_queue.clear();
        self.write_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_open() {
        let mut model = ModelSession::new(usize::MAX);
        assert_eq!(model.apply(&Operation::Write(vec![1])), OperationResult::NotOpen);
        assert_eq!(model.pending_write_bytes(), 0);
    }

    #[test]
    fn capacity_gates_transmission() {
        let mut model = ModelSession::new(1);
        model.apply(&Operation::Open);
        model.apply(&Operation::Write(vec![1, 2, 3]));
        assert_eq!(model.transmitted(), &[1]);

        model.apply(&Operation::GrantCapacity(5));
        assert_eq!(model.transmitted(), &[1, 2, 3]);
        assert_eq!(model.pending_write_bytes(), 0);
    }

    #[test]
    fn close_discards_buffers() {
        let mut model = ModelSession::new(0);
        model.apply(&Operation::Open);
        model.apply(&Operation::Write(vec![1]));
        model.apply(&Operation::Deliver(vec![2]));
        model.apply(&Operation::Close);

        assert!(!model.is_open());
        assert_eq!(model.bytes_available(), 0);
        assert_eq!(model.pending_write_bytes(), 0);
        assert_eq!(model.apply(&Operation::Read(4)), OperationResult::Bytes(Vec::new()));
    }
}
