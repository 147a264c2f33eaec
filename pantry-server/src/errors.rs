use std::fmt::Display;

use axum::{
    http,
    response::{IntoResponse, Response},
};

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
pub type WebResult<T> = std::result::Result<T, WebError>;

/// Every way a run of the recipe pipeline can fail.
///
/// None of these are retried. The first one raised ends the run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Model invocation failed: {0:#}")]
    ModelInvocation(#[source] anyhow::Error),
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),
    #[error("Image generation failed for recipe {index}: {source:#}")]
    PartialGenerationFailure {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("Storage write failed: {0:#}")]
    StorageWrite(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidRequest(_))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
    #[error("Not found")]
    NotFound,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        // In development, we want to return the error message
        // In production, we want to return a generic error message
        let display = |err: &dyn Display| {
            if cfg!(debug_assertions) {
                err.to_string()
            } else {
                "Internal Server Error".into()
            }
        };
        match self {
            // Bad input is always explained
            WebError::Pipeline(err) if err.is_client_error() => {
                (http::StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            WebError::Pipeline(err) => {
                (http::StatusCode::INTERNAL_SERVER_ERROR, display(&err)).into_response()
            }
            WebError::Internal(err) => {
                (http::StatusCode::INTERNAL_SERVER_ERROR, display(&err)).into_response()
            }
            WebError::NotFound => (http::StatusCode::NOT_FOUND, "Not Found").into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_codes() {
        let bad_input: WebError = PipelineError::InvalidRequest("no ingredients".into()).into();
        assert_eq!(bad_input.into_response().status(), http::StatusCode::BAD_REQUEST);

        let server_side = [
            PipelineError::ModelInvocation(anyhow!("throttled")),
            PipelineError::MalformedModelOutput("no answer".into()),
            PipelineError::PartialGenerationFailure {
                index: 1,
                source: anyhow!("boom"),
            },
            PipelineError::StorageWrite(anyhow!("denied")),
        ];
        for err in server_side {
            let response = WebError::from(err).into_response();
            assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_failure_index_in_message() {
        let err = PipelineError::PartialGenerationFailure {
            index: 2,
            source: anyhow!("quota"),
        };
        assert_eq!(
            err.to_string(),
            "Image generation failed for recipe 2: quota"
        );
    }
}
