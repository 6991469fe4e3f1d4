/// Priority level for scheduled tasks.
///
/// Workers always drain the highest non-empty priority queue first; within
/// one priority tasks run in submission order.
///
/// # Ordering
///
/// `Critical > High > Low`. Derives `Ord` so priorities can be compared
/// and sorted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background work that may lag behind the frame, such as returning
    /// staging buffers once the GPU is done with them.
    #[default]
    Low,
    /// Work that should finish within the current frame.
    High,
    /// Work something is actively waiting on, such as the copy slices of a
    /// mesh being added.
    Critical,
}

impl Priority {
    /// All priorities from most to least urgent.
    pub const DESCENDING: [Priority; 3] = [Priority::Critical, Priority::High, Priority::Low];
}
