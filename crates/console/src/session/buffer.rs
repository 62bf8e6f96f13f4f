//! Bounded console output buffer.

use std::collections::VecDeque;

use protocol::Line;

/// Default number of lines kept per session.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Append-only, capped sequence of console lines.
///
/// Every appended line receives the next sequence number (starting at 1).
/// When the buffer is full the oldest line is evicted; sequence numbers are
/// never reused, so a consumer can always ask for "everything after N".
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<Line>,
    capacity: usize,
    last_seq: u64,
    evicted: u64,
}

impl OutputBuffer {
    /// Creates a buffer holding at most `capacity` lines (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
            last_seq: 0,
            evicted: 0,
        }
    }

    /// Appends a line, assigning its sequence number. Returns that number.
    pub fn push(&mut self, mut line: Line) -> u64 {
        self.last_seq += 1;
        line.seq = self.last_seq;

        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.evicted += 1;
        }
        self.lines.push_back(line);

        self.last_seq
    }

    /// Lines currently held, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    /// Lines with a sequence number greater than `seq`, oldest first.
    pub fn since(&self, seq: u64) -> impl Iterator<Item = &Line> {
        // Sequence numbers are contiguous inside the buffer.
        let first = self.lines.front().map_or(self.last_seq + 1, |line| line.seq);
        let skip = if seq < first {
            0
        } else {
            usize::try_from(seq - first + 1).unwrap_or(usize::MAX)
        };
        self.lines.iter().skip(skip)
    }

    /// Most recently appended line.
    pub fn last(&self) -> Option<&Line> {
        self.lines.back()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sequence number of the last appended line (0 when nothing was ever
    /// appended).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Number of lines dropped to respect the capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Copies the held lines out.
    pub fn to_vec(&self) -> Vec<Line> {
        self.lines.iter().cloned().collect()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
