use std::fmt;

/// Lifecycle stage of one workspace.
///
/// Nothing is persisted between stages apart from the filesystem itself, so
/// a crash in the middle leaves an orphaned directory that has to be removed
/// with `cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Absent,
    /// Shared by every workspace: the archive cache is global.
    Downloading,
    Unpacking,
    Configuring,
    Running,
    Terminating,
}

impl WorkspaceState {
    /// The stage that follows this one in a normal lifecycle.
    pub fn next(self) -> Self {
        match self {
            Self::Absent => Self::Downloading,
            Self::Downloading => Self::Unpacking,
            Self::Unpacking => Self::Configuring,
            Self::Configuring => Self::Running,
            Self::Running => Self::Terminating,
            Self::Terminating => Self::Absent,
        }
    }
}

impl fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Downloading => "downloading",
            Self::Unpacking => "unpacking",
            Self::Configuring => "configuring",
            Self::Running => "running",
            Self::Terminating => "terminating",
        };
        f.write_str(name)
    }
}
