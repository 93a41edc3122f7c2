//! Core identifier types.

/// Unique identifier for a data loader session.
///
/// Assigned by the supervising service; unique within one
/// service instance for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(i32);

impl SessionId {
    /// Create a new SessionId with the given value
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<i32> for SessionId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SessionId::new(7).to_string(), "session-7");
    }

    #[test]
    fn test_roundtrip() {
        let id = SessionId::from(42);
        assert_eq!(id.as_i32(), 42);
        assert_eq!(id, SessionId::new(42));
    }
}
