use std::fmt;
use serde::Serialize;
use uuid::Uuid;

/// Identity of one stream subscriber, fixed for the life of its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        SubscriberId(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps connect/disconnect log lines readable
        write!(f, "sub-{}", &self.0.simple().to_string()[..8])
    }
}
