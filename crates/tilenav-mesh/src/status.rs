//! Composable status word for navmesh operations.
//!
//! Failures carry detail bits so callers can distinguish a full tile grid
//! from a corrupt file without string matching. Successes may carry detail
//! too (e.g. partial results).

use std::fmt;

/// Bit-composable operation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    pub const FAILURE: u32 = 1 << 31;
    pub const SUCCESS: u32 = 1 << 30;
    pub const IN_PROGRESS: u32 = 1 << 29;

    pub const DETAIL_MASK: u32 = 0x0fff_ffff;
    /// Input data magic did not match.
    pub const WRONG_MAGIC: u32 = 1 << 0;
    /// Input data version did not match.
    pub const WRONG_VERSION: u32 = 1 << 1;
    /// Allocation failed.
    pub const OUT_OF_MEMORY: u32 = 1 << 2;
    /// A parameter was invalid.
    pub const INVALID_PARAM: u32 = 1 << 3;
    /// Result buffer too small for the full result.
    pub const BUFFER_TOO_SMALL: u32 = 1 << 4;
    /// Ran out of link or node budget mid-operation.
    pub const OUT_OF_NODES: u32 = 1 << 5;
    /// Operation completed with a partial result.
    pub const PARTIAL_RESULT: u32 = 1 << 6;
    /// A tile already occupies the target grid location.
    pub const ALREADY_OCCUPIED: u32 = 1 << 7;

    pub const fn success() -> Self {
        Self(Self::SUCCESS)
    }

    pub const fn failure() -> Self {
        Self(Self::FAILURE)
    }

    pub const fn failure_detail(detail: u32) -> Self {
        Self(Self::FAILURE | detail)
    }

    pub const fn success_detail(detail: u32) -> Self {
        Self(Self::SUCCESS | detail)
    }

    pub fn is_success(self) -> bool {
        self.0 & Self::SUCCESS != 0
    }

    pub fn is_failure(self) -> bool {
        self.0 & Self::FAILURE != 0
    }

    pub fn has_detail(self, detail: u32) -> bool {
        self.0 & detail != 0
    }

    pub fn detail(self) -> u32 {
        self.0 & Self::DETAIL_MASK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            write!(f, "success")?;
        } else if self.is_failure() {
            write!(f, "failure")?;
        } else {
            write!(f, "in progress")?;
        }

        let names = [
            (Self::WRONG_MAGIC, "wrong magic"),
            (Self::WRONG_VERSION, "wrong version"),
            (Self::OUT_OF_MEMORY, "out of memory"),
            (Self::INVALID_PARAM, "invalid param"),
            (Self::BUFFER_TOO_SMALL, "buffer too small"),
            (Self::OUT_OF_NODES, "out of nodes"),
            (Self::PARTIAL_RESULT, "partial result"),
            (Self::ALREADY_OCCUPIED, "already occupied"),
        ];
        let details: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.has_detail(*bit))
            .map(|(_, name)| *name)
            .collect();
        if !details.is_empty() {
            write!(f, " ({})", details.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<Status> for tilenav_common::Error {
    fn from(status: Status) -> Self {
        tilenav_common::Error::NavMesh(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_composition() {
        let s = Status::failure_detail(Status::WRONG_MAGIC | Status::WRONG_VERSION);
        assert!(s.is_failure());
        assert!(!s.is_success());
        assert!(s.has_detail(Status::WRONG_MAGIC));
        assert!(s.has_detail(Status::WRONG_VERSION));
        assert!(!s.has_detail(Status::OUT_OF_MEMORY));
    }

    #[test]
    fn test_status_display() {
        let s = Status::failure_detail(Status::ALREADY_OCCUPIED);
        assert_eq!(s.to_string(), "failure (already occupied)");
    }
}
