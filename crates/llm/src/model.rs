/// Model used when settings do not name one.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
