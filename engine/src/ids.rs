//! Identifiers for graph entities.
//!
//! Every tensor and operator gets a `guid` from one shared counter. Tensors
//! additionally carry a `fuid`, a logical id that stays put when the optimizer
//! swaps tensors around, so callers can re-resolve a tensor after rewriting.
//!
//! Counters live in an [`IdGenerator`] that is handed to the graph explicitly.
//! Sharing one generator between graphs (through `Rc`) gives them a common
//! sequence; tests build their own and reset it for deterministic ids.

use serde::Serialize;
use std::cell::Cell;
use std::fmt;

/// Per-construction unique identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Guid(u64);

impl Guid {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical tensor identifier, stable across graph rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Fuid(u64);

impl Fuid {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Handle to a tensor owned by a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TensorId(Guid);

impl TensorId {
    pub fn guid(&self) -> Guid {
        self.0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Handle to an operator owned by a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OpId(Guid);

impl OpId {
    pub fn guid(&self) -> Guid {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Monotonic guid/fuid source.
#[derive(Debug)]
pub struct IdGenerator {
    next_guid: Cell<u64>,
    next_fuid: Cell<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1, 1)
    }

    /// Start both sequences at the given values.
    pub fn starting_at(guid: u64, fuid: u64) -> Self {
        Self {
            next_guid: Cell::new(guid),
            next_fuid: Cell::new(fuid),
        }
    }

    pub fn next_guid(&self) -> Guid {
        let id = self.next_guid.get();
        self.next_guid.set(id + 1);
        Guid(id)
    }

    pub fn next_fuid(&self) -> Fuid {
        let id = self.next_fuid.get();
        self.next_fuid.set(id + 1);
        Fuid(id)
    }

    pub fn next_tensor_id(&self) -> TensorId {
        TensorId(self.next_guid())
    }

    pub fn next_op_id(&self) -> OpId {
        OpId(self.next_guid())
    }

    /// Rewind both sequences to 1.
    ///
    /// Only meaningful before any graph sharing this generator has minted ids;
    /// rewinding under a live graph would hand out duplicates.
    pub fn reset(&self) {
        self.next_guid.set(1);
        self.next_fuid.set(1);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_sequence_is_shared() {
        let ids = IdGenerator::new();
        let t = ids.next_tensor_id();
        let op = ids.next_op_id();
        assert_eq!(t.guid(), Guid::new(1));
        assert_eq!(op.guid(), Guid::new(2));
        assert_eq!(ids.next_fuid(), Fuid::new(1));
    }

    #[test]
    fn test_reset() {
        let ids = IdGenerator::starting_at(40, 7);
        assert_eq!(ids.next_guid(), Guid::new(40));
        assert_eq!(ids.next_fuid(), Fuid::new(7));
        ids.reset();
        assert_eq!(ids.next_guid(), Guid::new(1));
        assert_eq!(ids.next_fuid(), Fuid::new(1));
    }

    #[test]
    fn test_display() {
        let ids = IdGenerator::new();
        assert_eq!(format!("{}", ids.next_tensor_id()), "t1");
        assert_eq!(format!("{}", ids.next_op_id()), "op2");
        assert_eq!(format!("{}", ids.next_fuid()), "f1");
    }
}
