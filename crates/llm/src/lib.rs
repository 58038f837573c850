use std::sync::Arc;

mod gateway;
mod model;
mod rig_adapter;
mod unavailable;

pub use gateway::{
    GatewayConfig, GatewayError, GatewayResult, GatewayRole, GenerateRequest, HistoryTurn,
    ModelGateway,
};
pub use model::DEFAULT_OPENAI_MODEL;
pub use rig_adapter::{RIG_OPENAI_PROVIDER_ID, RigGateway};
pub use unavailable::UnavailableGateway;

/// Builds the gateway matching `config.provider_id`, defaulting to OpenAI through rig.
pub fn create_gateway(mut config: GatewayConfig) -> GatewayResult<Arc<dyn ModelGateway>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigGateway::new(config)?))
        }
        _ => Err(GatewayError::UnsupportedProvider {
            stage: "create-gateway",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let config = GatewayConfig::new("carrier-pigeon", "key", "");
        let error = create_gateway(config).err().expect("provider should be rejected");
        assert!(matches!(error, GatewayError::UnsupportedProvider { .. }));
    }

    #[test]
    fn blank_provider_defaults_to_openai() {
        let gateway = create_gateway(GatewayConfig::new("", "key", "")).unwrap();
        assert_eq!(gateway.id(), RIG_OPENAI_PROVIDER_ID);
        assert_eq!(gateway.default_model(), DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn missing_api_key_is_reported() {
        let error = create_gateway(GatewayConfig::new("openai", "  ", ""))
            .err()
            .expect("empty key should fail");
        assert!(matches!(error, GatewayError::MissingApiKey { .. }));
    }
}
