//! A bounded ring of recently emitted log lines, exposed through the
//! operator health surface the way OpenEthereum's RPC `parity_devLogs`
//! exposes `RotatingLogger`.

use std::collections::VecDeque;

use parking_lot::RwLock;

const DEFAULT_CAPACITY: usize = 1024;

/// Holds the most recent `capacity` formatted log lines plus the level
/// filter string the logger was configured with, so a running process can
/// report "what am I logging" and "what did I just log" without re-parsing
/// `RUST_LOG`.
pub struct RotatingLogger {
    levels: String,
    lines: RwLock<VecDeque<String>>,
    capacity: usize,
}

impl RotatingLogger {
    pub fn new(levels: String) -> Self {
        RotatingLogger {
            levels,
            lines: RwLock::new(VecDeque::with_capacity(DEFAULT_CAPACITY)),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn levels(&self) -> &str {
        &self.levels
    }

    pub fn append(&self, line: String) {
        let mut lines = self.lines.write();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.lines.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_line_once_capacity_is_exceeded() {
        let logger = RotatingLogger::new("info".into());
        for i in 0..DEFAULT_CAPACITY + 5 {
            logger.append(format!("line {i}"));
        }
        let logs = logger.logs();
        assert_eq!(logs.len(), DEFAULT_CAPACITY);
        assert_eq!(logs.first().unwrap(), &format!("line {}", 5));
    }

    #[test]
    fn reports_the_configured_level_string() {
        let logger = RotatingLogger::new("debug,pisa=trace".into());
        assert_eq!(logger.levels(), "debug,pisa=trace");
    }
}
