//! Queue naming

use crate::envelope::RequestId;

/// Names of the queues a transport uses on the broker
///
/// The request queue is fixed; each reply queue is derived from a request id,
/// so anyone holding the id can find the reply without asking anybody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub requests: String,
    pub response_prefix: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            requests: "requests".to_string(),
            response_prefix: "response:".to_string(),
        }
    }
}

impl QueueNames {
    pub fn new(requests: impl Into<String>, response_prefix: impl Into<String>) -> Self {
        Self {
            requests: requests.into(),
            response_prefix: response_prefix.into(),
        }
    }

    /// Reply queue for the request with `id`
    pub fn response_queue(&self, id: &RequestId) -> String {
        format!("{}{}", self.response_prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let names = QueueNames::default();
        assert_eq!(names.requests, "requests");
        assert_eq!(names.response_queue(&RequestId::new("abc123")), "response:abc123");
    }

    #[test]
    fn test_custom_names() {
        let names = QueueNames::new("camera_jobs", "camera_reply_");
        assert_eq!(names.response_queue(&RequestId::new("42")), "camera_reply_42");
    }

    #[test]
    fn test_distinct_ids_get_distinct_queues() {
        let names = QueueNames::default();
        let a = names.response_queue(&RequestId::generate());
        let b = names.response_queue(&RequestId::generate());
        assert_ne!(a, b);
        assert_ne!(a, names.requests);
    }
}
