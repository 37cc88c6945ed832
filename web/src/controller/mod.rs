use serde::Serialize;
pub(crate) mod connected_users_controller;
pub(crate) mod health_check_controller;

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T) -> Self {
        Self {
            status_code,
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_serialize_api_response_wraps_data() {
        let response = ApiResponse::new(StatusCode::OK.into(), vec!["alice", "bob"]);
        let serialized = serde_json::to_value(&response).unwrap();

        assert_eq!(
            serialized,
            json!({"status_code": 200, "data": ["alice", "bob"]})
        );
    }

    #[tokio::test]
    async fn test_serialize_api_response_omits_missing_data() {
        let response = ApiResponse::<()> {
            status_code: StatusCode::NO_CONTENT.into(),
            data: None,
        };
        let serialized = serde_json::to_string(&response).unwrap();
        assert_eq!(serialized, json!({"status_code": 204}).to_string());
    }
}
