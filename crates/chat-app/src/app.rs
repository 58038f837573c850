use std::fmt::Write as _;
use std::sync::Arc;

use mentii_llm::{ModelGateway, UnavailableGateway, create_gateway};
use mentii_storage::{FileStore, KeyValueStore};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::chat::{ChatId, Role, SidebarItem, build_sidebar, current_unix_millis};
use crate::session::{RequestOrchestrator, SessionStore, SnapshotError, TurnOutcome};
use crate::settings::{Settings, SettingsStore};

pub const PROMPT: &str = "> ";
pub const THINKING_INDICATOR: &str = "Thinking...";

const HELP_TEXT: &str = "\
Type a message to send it to the active chat.
Commands:
  /new                start a new chat
  /list [query]       list chats, optionally filtered by title
  /select <n|id>      switch to a chat by list position or id
  /delete [n|id]      delete a chat (the active one by default)
  /show               print the active chat
  /model [id]         show or change the model
  /help               show this help
  /quit               exit
";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShellError {
    #[snafu(display("failed to open chat sessions on `{stage}`: {source}"))]
    OpenSession {
        stage: &'static str,
        source: SnapshotError,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write terminal output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    New,
    List { query: String },
    Select { target: Option<String> },
    Delete { target: Option<String> },
    Show,
    Model { model_id: Option<String> },
    Help,
    Quit,
    Unknown(String),
    Blank,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Blank;
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Submit(line.to_string());
        };

        // `//text` sends `/text` as a message.
        if rest.starts_with('/') {
            return Self::Submit(rest.to_string());
        }

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        let argument = (!argument.is_empty()).then(|| argument.to_string());

        match name {
            "new" => Self::New,
            "list" => Self::List {
                query: argument.unwrap_or_default(),
            },
            "select" => Self::Select { target: argument },
            "delete" => Self::Delete { target: argument },
            "show" => Self::Show,
            "model" => Self::Model { model_id: argument },
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end over the session store and orchestrator.
pub struct ChatShell {
    store: SessionStore,
    orchestrator: RequestOrchestrator,
    settings: Arc<SettingsStore>,
}

impl ChatShell {
    pub fn new(
        store: SessionStore,
        orchestrator: RequestOrchestrator,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            settings,
        }
    }

    /// Opens the persisted sessions and the configured gateway.
    pub fn open(settings: Arc<SettingsStore>) -> Result<Self, ShellError> {
        let current = settings.settings();
        let data_dir = current.resolved_data_dir();
        let backend: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir.clone()));
        let store = SessionStore::open(backend).context(OpenSessionSnafu {
            stage: "open-session-store",
        })?;
        tracing::info!(
            data_dir = ?data_dir,
            chats = store.list().len(),
            "opened chat sessions"
        );

        let orchestrator =
            RequestOrchestrator::new(connect_gateway(&current), current.to_orchestrator_config());
        Ok(Self::new(store, orchestrator, settings))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    /// Reads commands until `/quit` or end of input.
    pub async fn run<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<(), ShellError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        write_out(
            &mut writer,
            &format!(
                "mentii ({} chats, model {}). Type /help for commands.\n",
                self.store.list().len(),
                self.orchestrator.config().model_id
            ),
        )
        .await?;

        loop {
            write_out(&mut writer, PROMPT).await?;

            let mut line = String::new();
            let read = reader.read_line(&mut line).await.context(ReadInputSnafu {
                stage: "read-terminal-line",
            })?;
            if read == 0 {
                break;
            }

            if let Flow::Quit = self.dispatch(Command::parse(&line), &mut writer).await? {
                break;
            }
        }

        tracing::info!("terminal session finished");
        Ok(())
    }

    async fn dispatch<W>(&mut self, command: Command, writer: &mut W) -> Result<Flow, ShellError>
    where
        W: AsyncWrite + Unpin,
    {
        let output = match command {
            Command::Blank => return Ok(Flow::Continue),
            Command::Quit => return Ok(Flow::Quit),
            Command::Submit(text) => {
                // Input is not read again until the turn settles.
                write_out(writer, &format!("{THINKING_INDICATOR}\n")).await?;
                self.submit(text).await
            }
            Command::New => {
                self.store.create_chat();
                "Started a new chat.\n".to_string()
            }
            Command::List { query } => self.render_list(&query),
            Command::Select { target: None } => "Usage: /select <n|id>\n".to_string(),
            Command::Select {
                target: Some(target),
            } => match resolve_chat(&self.store, &target) {
                Some(chat_id) => {
                    self.store.set_active(chat_id);
                    format!("Switched to \"{}\".\n", self.chat_title(chat_id))
                }
                None => format!("No chat matches \"{target}\".\n"),
            },
            Command::Delete { target } => self.delete(target.as_deref()),
            Command::Show => self.render_active_chat(),
            Command::Model { model_id: None } => {
                format!("Model: {}\n", self.orchestrator.config().model_id)
            }
            Command::Model {
                model_id: Some(model_id),
            } => self.switch_model(model_id),
            Command::Help => HELP_TEXT.to_string(),
            Command::Unknown(name) => {
                format!("Unknown command \"/{name}\". Type /help for the list.\n")
            }
        };

        write_out(writer, &output).await?;
        Ok(Flow::Continue)
    }

    async fn submit(&mut self, text: String) -> String {
        self.orchestrator.set_input(text);
        let Some(report) = self.orchestrator.submit_input(&mut self.store).await else {
            return String::new();
        };

        let message_id = match report.outcome {
            TurnOutcome::Replied { message_id } | TurnOutcome::Fallback { message_id } => {
                message_id
            }
            TurnOutcome::Discarded => return String::new(),
        };

        self.store
            .get_chat(report.chat_id)
            .and_then(|chat| chat.messages.iter().find(|message| message.id == message_id))
            .map(|message| format!("{}\n", message.content))
            .unwrap_or_default()
    }

    fn delete(&mut self, target: Option<&str>) -> String {
        let chat_id = match target {
            Some(target) => resolve_chat(&self.store, target),
            None => self.store.active_chat_id(),
        };
        let Some(chat_id) = chat_id else {
            return match target {
                Some(target) => format!("No chat matches \"{target}\".\n"),
                None => "No active chat to delete.\n".to_string(),
            };
        };

        let title = self.chat_title(chat_id);
        if self.store.delete_chat(chat_id) {
            format!("Deleted \"{title}\".\n")
        } else {
            format!("No chat matches \"{chat_id}\".\n")
        }
    }

    fn switch_model(&mut self, model_id: String) -> String {
        self.orchestrator.set_model(model_id.clone());

        let mut settings = (*self.settings.settings()).clone();
        settings.model = model_id.clone();
        if let Err(error) = self.settings.update(settings) {
            tracing::warn!(error = %error, "failed to save model selection");
            return format!("Using model {model_id} for this session (settings not saved).\n");
        }

        format!("Using model {model_id}.\n")
    }

    fn render_list(&self, query: &str) -> String {
        let items = build_sidebar(
            self.store.list(),
            self.store.active_chat_id(),
            query,
            current_unix_millis(),
        );
        if items.is_empty() {
            return if query.trim().is_empty() {
                "No chats yet. Type a message to start one.\n".to_string()
            } else {
                format!("No chats match \"{}\".\n", query.trim())
            };
        }

        let mut output = String::new();
        for item in items {
            match item {
                SidebarItem::GroupHeader(title) => {
                    let _ = writeln!(output, "{title}");
                }
                SidebarItem::Chat(entry) => {
                    let marker = if entry.active { '*' } else { ' ' };
                    let _ = writeln!(
                        output,
                        "{marker} {}. {} ({} messages)",
                        entry.position, entry.title, entry.message_count
                    );
                }
            }
        }
        output
    }

    fn render_active_chat(&self) -> String {
        let Some(chat) = self.store.active_chat() else {
            return "No active chat. Type a message or /new to start one.\n".to_string();
        };

        let mut output = format!("# {}\n", chat.title);
        if chat.messages.is_empty() {
            output.push_str("(no messages yet)\n");
        }
        for message in &chat.messages {
            let speaker = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            let _ = writeln!(output, "{speaker}: {}", message.content);
        }
        output
    }

    fn chat_title(&self, chat_id: ChatId) -> String {
        self.store
            .get_chat(chat_id)
            .map(|chat| chat.title.clone())
            .unwrap_or_default()
    }
}

/// Small numbers pick a list position; anything else is read as a chat id.
fn resolve_chat(store: &SessionStore, target: &str) -> Option<ChatId> {
    let target = target.trim();
    if let Ok(position) = target.parse::<usize>()
        && (1..=store.list().len()).contains(&position)
    {
        return Some(store.list()[position - 1].id);
    }

    let chat_id = ChatId::parse(target).ok()?;
    store.contains(chat_id).then_some(chat_id)
}

fn connect_gateway(settings: &Settings) -> Arc<dyn ModelGateway> {
    let gateway = match settings.to_gateway_config() {
        Some(config) => create_gateway(config).map_err(|error| error.to_string()),
        None => Err("no API key configured (set api_key or OPENAI_API_KEY)".to_string()),
    };

    match gateway {
        Ok(gateway) => {
            tracing::info!(provider = gateway.id(), "model gateway ready");
            gateway
        }
        Err(reason) => {
            tracing::error!(reason = %reason, "model gateway unavailable, replies will use the fallback");
            Arc::new(UnavailableGateway::new(reason, settings.model.clone()))
        }
    }
}

async fn write_out<W>(writer: &mut W, text: &str) -> Result<(), ShellError>
where
    W: AsyncWrite + Unpin,
{
    if text.is_empty() {
        return Ok(());
    }

    writer
        .write_all(text.as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "write-terminal-output",
        })?;
    writer.flush().await.context(WriteOutputSnafu {
        stage: "flush-terminal-output",
    })
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use mentii_llm::{GatewayResult, GenerateRequest};

    use super::*;
    use crate::session::{FALLBACK_REPLY, OrchestratorConfig};

    struct EchoGateway;

    impl ModelGateway for EchoGateway {
        fn id(&self) -> &str {
            "echo"
        }

        fn name(&self) -> &str {
            "Echo"
        }

        fn default_model(&self) -> &str {
            "echo-1"
        }

        fn generate<'a>(
            &'a self,
            request: GenerateRequest,
        ) -> BoxFuture<'a, GatewayResult<String>> {
            Box::pin(async move { Ok(format!("echo: {}", request.current_turn)) })
        }
    }

    fn shell_with(gateway: Arc<dyn ModelGateway>, dir: &tempfile::TempDir) -> ChatShell {
        let settings = Arc::new(SettingsStore::from_file(dir.path().join("settings.json")));
        let orchestrator = RequestOrchestrator::new(gateway, OrchestratorConfig::new("echo-1"));
        ChatShell::new(SessionStore::in_memory(), orchestrator, settings)
    }

    async fn run_script(shell: &mut ChatShell, script: &str) -> String {
        let mut output = Vec::new();
        shell.run(script.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(Command::parse("Hi there\n"), Command::Submit("Hi there".to_string()));
        assert_eq!(Command::parse("   \n"), Command::Blank);
        assert_eq!(Command::parse("/new"), Command::New);
        assert_eq!(
            Command::parse("/list  rust notes "),
            Command::List {
                query: "rust notes".to_string()
            }
        );
        assert_eq!(Command::parse("/select"), Command::Select { target: None });
        assert_eq!(
            Command::parse("/delete 2"),
            Command::Delete {
                target: Some("2".to_string())
            }
        );
        assert_eq!(
            Command::parse("/model gpt-4o"),
            Command::Model {
                model_id: Some("gpt-4o".to_string())
            }
        );
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("/frobnicate"), Command::Unknown("frobnicate".to_string()));
        assert_eq!(Command::parse("//etc/hosts"), Command::Submit("/etc/hosts".to_string()));
    }

    #[tokio::test]
    async fn message_is_answered_and_shown() {
        let dir = tempfile::tempdir().unwrap();
        let mut shell = shell_with(Arc::new(EchoGateway), &dir);

        let output = run_script(&mut shell, "Hi\n/show\n/quit\n").await;

        assert!(output.contains(THINKING_INDICATOR));
        assert!(output.contains("echo: Hi\n"));
        assert!(output.contains("# Hi\nyou: Hi\nassistant: echo: Hi\n"));
        assert_eq!(shell.store().list().len(), 1);
        assert!(!shell.orchestrator().is_loading());
    }

    #[tokio::test]
    async fn unavailable_gateway_prints_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(UnavailableGateway::new("missing API key", "echo-1"));
        let mut shell = shell_with(gateway, &dir);

        let output = run_script(&mut shell, "Hello\n").await;

        assert!(output.contains(FALLBACK_REPLY));
        let chat = shell.store().active_chat().unwrap();
        assert_eq!(chat.messages.len(), 2);
    }

    #[tokio::test]
    async fn list_select_and_delete_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut shell = shell_with(Arc::new(EchoGateway), &dir);

        let output = run_script(
            &mut shell,
            "First topic\n/new\nSecond topic\n/list\n/select 2\n/delete\n/list topic\n",
        )
        .await;

        assert!(output.contains("Today\n* 1. Second topic (2 messages)\n  2. First topic (2 messages)\n"));
        assert!(output.contains("Switched to \"First topic\"."));
        assert!(output.contains("Deleted \"First topic\"."));
        assert_eq!(shell.store().list().len(), 1);
        assert_eq!(shell.store().active_chat().unwrap().title, "Second topic");
    }

    #[tokio::test]
    async fn unknown_targets_and_commands_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut shell = shell_with(Arc::new(EchoGateway), &dir);

        let output = run_script(&mut shell, "/select 9\n/delete\n/show\n/list\n/bogus\n").await;

        assert!(output.contains("No chat matches \"9\"."));
        assert!(output.contains("No active chat to delete."));
        assert!(output.contains("No active chat."));
        assert!(output.contains("No chats yet."));
        assert!(output.contains("Unknown command \"/bogus\"."));
        assert!(shell.store().list().is_empty());
    }

    #[tokio::test]
    async fn model_switch_is_saved_to_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut shell = shell_with(Arc::new(EchoGateway), &dir);

        let output = run_script(&mut shell, "/model gpt-4o\n/model\n").await;

        assert!(output.contains("Using model gpt-4o."));
        assert!(output.contains("Model: gpt-4o"));
        assert_eq!(shell.orchestrator().config().model_id, "gpt-4o");

        let reloaded = SettingsStore::from_file(dir.path().join("settings.json"));
        assert_eq!(reloaded.settings().model, "gpt-4o");
    }

    #[tokio::test]
    async fn open_restores_chats_from_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        let settings = Arc::new(SettingsStore::from_file(settings_path.clone()));
        let mut updated = (*settings.settings()).clone();
        updated.data_dir = Some(dir.path().join("data"));
        updated.provider_id = "offline".to_string();
        settings.update(updated).unwrap();

        {
            let mut shell = ChatShell::open(settings.clone()).unwrap();
            run_script(&mut shell, "Remember me\n").await;
        }

        let shell = ChatShell::open(settings).unwrap();
        assert_eq!(shell.store().list().len(), 1);
        assert_eq!(shell.store().list()[0].title, "Remember me");
    }
}
