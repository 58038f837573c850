use futures::future::BoxFuture;
use snafu::Snafu;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
}

impl GatewayConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
        }
    }
}

/// Role labels understood by the remote model.
///
/// The model speaks in `model` turns; callers translate their own assistant role
/// into this label before handing history over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayRole {
    User,
    Model,
}

impl GatewayRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One prior turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: GatewayRole,
    pub text: String,
}

impl HistoryTurn {
    pub fn new(role: GatewayRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model_id: String,
    pub history: Vec<HistoryTurn>,
    pub current_turn: String,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl GenerateRequest {
    pub fn new(
        model_id: impl Into<String>,
        history: Vec<HistoryTurn>,
        current_turn: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            history,
            current_turn: current_turn.into(),
            preamble: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("generate request for model '{model_id}' has an empty current turn"))]
    EmptyTurn {
        stage: &'static str,
        model_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("model '{model_id}' returned no text content"))]
    EmptyResponse {
        stage: &'static str,
        model_id: String,
    },
    #[snafu(display("gateway call did not finish within {limit:?}"))]
    TimedOut {
        stage: &'static str,
        limit: std::time::Duration,
    },
    #[snafu(display("gateway is unavailable: {reason}"))]
    Unavailable { stage: &'static str, reason: String },
}

/// Asynchronous boundary to a generative model.
///
/// `generate` resolves to the assistant text for `request.current_turn`, given the
/// prior `request.history`. Implementations never see local chat identifiers.
pub trait ModelGateway: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn generate<'a>(&'a self, request: GenerateRequest) -> BoxFuture<'a, GatewayResult<String>>;
}
