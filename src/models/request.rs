use garde::Validate;
use serde::{Deserialize, Serialize};

/// Body of an ingress request. The location arrives separately as a header.
#[derive(Debug, Default, Deserialize)]
pub struct IngressBody {
    pub method: Option<String>,
    pub url: Option<String>,
}

/// Request record assembled from the ingress body and the `location` header.
#[derive(Debug, Clone, Default, Validate)]
pub struct IngressRequest {
    #[garde(required, length(min = 1))]
    pub method: Option<String>,

    #[garde(required, length(min = 1))]
    pub url: Option<String>,

    #[garde(required, length(min = 1))]
    pub location: Option<String>,
}

/// Response after a request is accepted for processing.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub message: String,
}

/// Error body for every rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
