use std::fmt;

/// Namespace an entity lives in; each maps to its own remote user root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Release,
    Snapshot,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Release, Partition::Snapshot];

    pub fn from_snapshot_flag(is_snapshot: bool) -> Self {
        if is_snapshot {
            Partition::Snapshot
        } else {
            Partition::Release
        }
    }

    pub fn is_snapshot(self) -> bool {
        matches!(self, Partition::Snapshot)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Release => "release",
            Partition::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
