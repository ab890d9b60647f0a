pub const APP_NAME: &str = "murmur";

/// Sent as `HTTP-Referer` / `X-Title` so OpenRouter can attribute traffic.
pub const APP_REFERER: &str = "https://github.com/murmur-chat/murmur";

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENROUTER_KEYS_URL: &str = "https://openrouter.ai/keys";

/// The single model the client currently drives. Stale settings are
/// normalized onto this on load.
pub const DEFAULT_MODEL: &str = "minimax/minimax-m2:free";

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

pub const DEFAULT_TEMPERATURE: f32 = 2.0;
pub const DEFAULT_MAX_TOKENS: u32 = 32768;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and friendly AI assistant. \
You provide accurate and creative responses, and you keep answers concise unless \
the user asks for depth.";

/// Bumped whenever the default system prompt (or settings shape) changes in
/// a way that stored conversations should pick up.
pub const SETTINGS_VERSION: u32 = 1;

// Durable storage keys.
pub const KEY_CONVERSATIONS: &str = "conversations";
pub const KEY_LAST_CONVERSATION: &str = "last_conversation";
pub const KEY_API_KEY: &str = "openrouter_api_key";
pub const KEY_PROVIDER: &str = "api_provider";
