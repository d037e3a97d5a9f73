//! Stream names.

/// Consumer group shared by every worker of a lane.
pub const CONSUMER_GROUP: &str = "image-workers";

/// Stream names for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lanes {
    service: String,
}

impl Lanes {
    /// Create lane names prefixed with `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Upload job stream.
    #[must_use]
    pub fn upload(&self) -> String {
        format!("{}:jobs:upload", self.service)
    }

    /// Delete job stream.
    #[must_use]
    pub fn delete(&self) -> String {
        format!("{}:jobs:delete", self.service)
    }

    /// Completion event stream.
    #[must_use]
    pub fn completed(&self) -> String {
        format!("{}:events:images-completed", self.service)
    }

    /// Dead-letter stream of `lane`.
    #[must_use]
    pub fn dead_letter(lane: &str) -> String {
        format!("{lane}:dead")
    }
}
