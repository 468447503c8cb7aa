use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::CoreError;

/// Text shown for any internal failure; the detail stays in the log.
pub const UNEXPECTED: &str = "Something unexpected happened";

/// Wrapper type for successful API responses.
///
/// Serializes as `{"status": "ok", ...}` with the payload's fields inlined.
#[derive(Serialize)]
pub struct ApiOk<T> {
    status: &'static str,
    #[serde(flatten)]
    body: T,
}

impl<T> ApiOk<T> {
    pub fn new(body: T) -> Self {
        Self { status: "ok", body }
    }
}

impl<T> IntoResponse for ApiOk<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Payload for bodies that carry nothing but the status.
#[derive(Serialize)]
pub struct Empty {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: &'static str,
    error_message: String,
}

/// A [`CoreError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(CoreError::Validation(rejection.body_text()))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(CoreError::Internal(err))
    }
}

fn failed(status: StatusCode, message: String) -> Response {
    // ---
    let body = ErrorBody {
        status: "failed",
        error_message: message,
    };
    (status, Json(body)).into_response()
}

/// 302 to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = match &self.0 {
            CoreError::Validation(_)
            | CoreError::Conflict(_)
            | CoreError::NoActiveRegistration
            | CoreError::NoActiveAuthentication
            | CoreError::RegistrationFailed
            | CoreError::SignInFailed
            | CoreError::AlreadyClaimed => StatusCode::BAD_REQUEST,
            CoreError::AlreadySignedIn | CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::Unauthorized { login_url } => return found(login_url),
            CoreError::Internal(err) => {
                let correlation_id = uuid::Uuid::new_v4();
                tracing::error!("Internal error [{}]: {:#}", correlation_id, err);
                return failed(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{UNEXPECTED} (ref {correlation_id})"),
                );
            }
        };
        failed(status, self.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ok_inlines_payload() {
        // ---
        #[derive(Serialize)]
        struct ReturnTo {
            return_to: String,
        }
        let response = ApiOk::new(ReturnTo {
            return_to: "/".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["return_to"], "/");
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        // ---
        let cases = [
            (CoreError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (CoreError::Conflict("taken".into()), StatusCode::BAD_REQUEST),
            (CoreError::NoActiveAuthentication, StatusCode::BAD_REQUEST),
            (CoreError::SignInFailed, StatusCode::BAD_REQUEST),
            (CoreError::AlreadyClaimed, StatusCode::BAD_REQUEST),
            (CoreError::AlreadySignedIn, StatusCode::FORBIDDEN),
            (CoreError::forbidden("expired"), StatusCode::FORBIDDEN),
            (CoreError::NotFound, StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            let message = err.to_string();
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), status);
            let json = body_json(response).await;
            assert_eq!(json["status"], "failed");
            assert_eq!(json["errorMessage"], message);
        }
    }

    #[tokio::test]
    async fn internal_errors_hide_detail() {
        // ---
        let response = ApiError(anyhow::anyhow!("password=hunter2").into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        let message = json["errorMessage"].as_str().unwrap();
        assert!(message.starts_with(UNEXPECTED));
        assert!(!message.contains("hunter2"));
    }

    #[test]
    fn unauthorized_redirects_to_login() {
        // ---
        let response = ApiError(CoreError::Unauthorized {
            login_url: "/login?returnTo=%2Faccount".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/login?returnTo=%2Faccount"
        );
    }
}
