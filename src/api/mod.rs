//! REST API shared response types

pub mod abac;
pub mod health;
pub mod metrics;

use serde::{Deserialize, Serialize};

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response (for delete, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response_envelope() {
        let value = serde_json::to_value(SuccessResponse::new(vec![1, 2])).unwrap();
        assert_eq!(value, json!({ "data": [1, 2] }));
    }

    #[test]
    fn test_message_response() {
        let value = serde_json::to_value(MessageResponse::new("Policy deleted")).unwrap();
        assert_eq!(value, json!({ "message": "Policy deleted" }));
    }
}
