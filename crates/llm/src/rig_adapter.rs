use futures::future::BoxFuture;
use rig::completion::{AssistantContent, CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use snafu::{ResultExt, ensure};

use super::gateway::{
    CompletionsFailedSnafu, EmptyResponseSnafu, EmptyTurnSnafu, GatewayConfig, GatewayResult,
    GatewayRole, GenerateRequest, HistoryTurn, HttpClientSnafu, MissingApiKeySnafu, ModelGateway,
};
use super::model::DEFAULT_OPENAI_MODEL;

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

pub struct RigGateway {
    config: GatewayConfig,
}

impl RigGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-gateway-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &GatewayConfig) -> GatewayResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn to_rig_message(turn: &HistoryTurn) -> RigMessage {
        match turn.role {
            GatewayRole::User => RigMessage::user(turn.text.clone()),
            GatewayRole::Model => RigMessage::assistant(turn.text.clone()),
        }
    }

    /// Joins every text part of a completion; reasoning and tool calls are dropped.
    fn collect_text<'a>(parts: impl IntoIterator<Item = &'a AssistantContent>) -> String {
        parts
            .into_iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    async fn complete(config: &GatewayConfig, request: GenerateRequest) -> GatewayResult<String> {
        ensure!(
            !request.current_turn.trim().is_empty(),
            EmptyTurnSnafu {
                stage: "complete-validate-turn",
                model_id: request.model_id.clone(),
            }
        );

        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let history = request
            .history
            .iter()
            .map(Self::to_rig_message)
            .collect::<Vec<_>>();

        tracing::debug!(
            provider_id = %config.provider_id,
            model_id = %request.model_id,
            history_len = history.len(),
            "sending completion request"
        );

        let mut builder = model
            .completion_request(RigMessage::user(request.current_turn.clone()))
            .messages(history);

        if let Some(preamble) = request.preamble.as_ref()
            && !preamble.trim().is_empty()
        {
            builder = builder.preamble(preamble.clone());
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        let response = builder.send().await.context(CompletionsFailedSnafu {
            stage: "send-completion",
        })?;

        let text = Self::collect_text(response.choice.iter());
        ensure!(
            !text.trim().is_empty(),
            EmptyResponseSnafu {
                stage: "collect-completion-text",
                model_id: request.model_id.clone(),
            }
        );

        Ok(text)
    }
}

impl ModelGateway for RigGateway {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig OpenAI"
    }

    fn default_model(&self) -> &str {
        DEFAULT_OPENAI_MODEL
    }

    fn generate<'a>(&'a self, request: GenerateRequest) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(async move {
            let model_id = request.model_id.clone();
            let result = Self::complete(&self.config, request).await;
            if let Err(error) = &result {
                tracing::warn!(
                    provider_id = %self.config.provider_id,
                    model_id = %model_id,
                    error = %error,
                    "completion request failed"
                );
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_turns_become_assistant_messages() {
        let user = RigGateway::to_rig_message(&HistoryTurn::new(GatewayRole::User, "hi"));
        let model = RigGateway::to_rig_message(&HistoryTurn::new(GatewayRole::Model, "hello"));

        assert!(matches!(user, RigMessage::User { .. }));
        assert!(matches!(model, RigMessage::Assistant { .. }));
    }

    #[tokio::test]
    async fn blank_turn_fails_before_any_network_call() {
        let gateway = RigGateway::new(GatewayConfig::new("openai", "key", "http://127.0.0.1:9"))
            .expect("gateway with key");
        let request = GenerateRequest::new(DEFAULT_OPENAI_MODEL, Vec::new(), "   ");

        let error = gateway.generate(request).await.unwrap_err();
        assert!(matches!(error, crate::GatewayError::EmptyTurn { .. }));
    }
}
