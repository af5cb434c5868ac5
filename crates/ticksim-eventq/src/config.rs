/// Construction parameters for an [`EventQueue`](crate::EventQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QueueConfig {
    /// Timeline name used in traces, diagnostics and checkpoints.
    ///
    /// Checkpoint containers key timelines by name, so queues saved together need distinct
    /// names.
    pub name: String,
    /// Number of item slots to allocate up front.
    pub capacity_hint: usize,
}

impl QueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_capacity_hint(mut self, capacity_hint: usize) -> Self {
        self.capacity_hint = capacity_hint;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            capacity_hint: 64,
        }
    }
}
