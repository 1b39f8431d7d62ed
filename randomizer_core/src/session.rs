use std::collections::HashSet;

/// Posts consumed in the current session, and the total result count last reported
/// for the current search constraints.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    used: HashSet<u64>,
    total_count: Option<u64>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, post_id: u64) -> bool {
        self.used.contains(&post_id)
    }

    /// Returns `false` if the post was already registered.
    pub fn register(&mut self, post_id: u64) -> bool {
        self.used.insert(post_id)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// Keep the previous count when the response carried none.
    pub fn set_total_count(&mut self, total_count: Option<u64>) {
        if total_count.is_some() {
            self.total_count = total_count;
        }
    }

    /// Every known match has been used.
    pub fn is_exhausted(&self) -> bool {
        self.total_count
            .is_some_and(|total| self.used.len() as u64 >= total)
    }

    pub fn reset(&mut self) {
        self.used.clear();
        self.total_count = None;
    }
}
