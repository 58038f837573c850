use futures::future::BoxFuture;

use crate::gateway::{GatewayError, GatewayResult, GenerateRequest, ModelGateway};

pub const UNAVAILABLE_PROVIDER_ID: &str = "unavailable";

/// Stands in for a gateway that could not be configured; every call fails.
#[derive(Debug, Clone)]
pub struct UnavailableGateway {
    reason: String,
    default_model: String,
}

impl UnavailableGateway {
    pub fn new(reason: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            default_model: default_model.into(),
        }
    }
}

impl ModelGateway for UnavailableGateway {
    fn id(&self) -> &str {
        UNAVAILABLE_PROVIDER_ID
    }

    fn name(&self) -> &str {
        "Unavailable"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn generate<'a>(&'a self, request: GenerateRequest) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(async move {
            tracing::debug!(
                model_id = %request.model_id,
                reason = %self.reason,
                "rejecting generate request on unavailable gateway"
            );
            Err(GatewayError::Unavailable {
                stage: "unavailable-generate",
                reason: self.reason.clone(),
            })
        })
    }
}
