//! Operation flags carried by raw notifications and aggregated changes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of the kinds of change observed for a path
///
/// Flags from several raw notifications are merged with `|`.
#[derive(Copy, Clone, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Op(u8);

impl Op {
    /// No change observed
    pub const NONE: Op = Op(0);
    /// Path was created
    pub const CREATE: Op = Op(1 << 0);
    /// File contents were written
    pub const WRITE: Op = Op(1 << 1);
    /// Path was removed
    pub const REMOVE: Op = Op(1 << 2);
    /// Path was renamed away
    pub const RENAME: Op = Op(1 << 3);
    /// Permissions or other metadata changed
    pub const CHMOD: Op = Op(1 << 4);

    const NAMES: [(Op, &'static str); 5] = [
        (Op::CREATE, "CREATE"),
        (Op::WRITE, "WRITE"),
        (Op::REMOVE, "REMOVE"),
        (Op::RENAME, "RENAME"),
        (Op::CHMOD, "CHMOD"),
    ];

    /// Raw bit representation
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: Op) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no bits are set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if the path may have gone away (removed or renamed)
    pub const fn is_removal(self) -> bool {
        self.0 & (Op::REMOVE.0 | Op::RENAME.0) != 0
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in Op::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_display() {
        let mut op = Op::WRITE;
        op |= Op::CREATE;
        assert_eq!(op.to_string(), "CREATE|WRITE");
        assert_eq!((Op::CHMOD | Op::REMOVE).to_string(), "REMOVE|CHMOD");
        assert_eq!(Op::NONE.to_string(), "NONE");
    }

    #[test]
    fn test_contains() {
        let op = Op::CREATE | Op::WRITE;
        assert!(op.contains(Op::CREATE));
        assert!(op.contains(Op::CREATE | Op::WRITE));
        assert!(!op.contains(Op::REMOVE));
    }

    #[test]
    fn test_removal_bits() {
        assert!(Op::REMOVE.is_removal());
        assert!(Op::RENAME.is_removal());
        assert!((Op::WRITE | Op::REMOVE).is_removal());
        assert!(!(Op::CREATE | Op::WRITE | Op::CHMOD).is_removal());
    }
}
