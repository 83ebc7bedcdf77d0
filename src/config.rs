// config.rs - Bot Configuration
// Loads KEY=VALUE settings from a .env file (multi-path fallback) into the process
// environment, then builds a typed BotConfig from the merged environment.
//
// Used by: main.rs (startup), commands/ (backend URLs, limits, system prompt)

use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;

use crate::error::{BotError, BotResult};
use crate::utils::{get_boolean, parse_env_number, parse_env_string};

// Discord platform limits
pub const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;
pub const MAX_COMMAND_CHOICES: usize = 25;
pub const MAX_EMBED_FIELDS: usize = 25;
pub const MAX_FILES_LENGTH: usize = 10;

// Attachment text is cut at this many characters before it is added to a prompt
pub const MAX_ATTACHMENT_TEXT: usize = 8000;

const DEFAULT_MESSAGE_CHUNK_SIZE: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub ollama_url: Option<String>,
    pub stable_diffusion_url: Option<String>,
    pub channels: Vec<String>,
    pub system_prompt: Option<String>,
    pub use_system: bool,
    pub use_model_system: bool,
    pub max_attachments: usize,
    pub max_message_length: usize,
    pub message_chunk_size: usize,
    pub request_timeout: Duration,
}

impl BotConfig {
    /// Build the configuration from a key/value map (normally the process environment)
    pub fn from_map(map: &HashMap<String, String>) -> BotResult<Self> {
        let discord_token = map
            .get("DISCORD_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty() && token != "YOUR_BOT_TOKEN_HERE")
            .ok_or_else(|| BotError::Config("DISCORD_TOKEN is not defined".to_string()))?;

        let non_empty = |key: &str| {
            map.get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let channels = non_empty("CHANNELS")
            .map(|list| {
                list.split(',')
                    .map(|channel| channel.trim().to_string())
                    .filter(|channel| !channel.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let system_prompt = non_empty("SYSTEM_PROMPT").or_else(|| non_empty("SYSTEM"));

        let max_message_length = number_setting(map, "MAX_MESSAGE_LENGTH", DISCORD_MAX_MESSAGE_LENGTH as f64)?
            .min(DISCORD_MAX_MESSAGE_LENGTH as f64) as usize;
        let message_chunk_size = number_setting(map, "MESSAGE_CHUNK_SIZE", DEFAULT_MESSAGE_CHUNK_SIZE as f64)? as usize;
        if message_chunk_size == 0 || message_chunk_size >= max_message_length {
            return Err(BotError::Config(format!(
                "MESSAGE_CHUNK_SIZE must be between 1 and {}",
                max_message_length - 1
            )));
        }

        Ok(BotConfig {
            discord_token,
            ollama_url: non_empty("OLLAMA"),
            stable_diffusion_url: non_empty("STABLE_DIFFUSION"),
            channels,
            system_prompt,
            // Unset USE_SYSTEM means on, unset USE_MODEL_SYSTEM means off
            use_system: map.get("USE_SYSTEM").map(|v| get_boolean(v)).unwrap_or(true),
            use_model_system: map.get("USE_MODEL_SYSTEM").map(|v| get_boolean(v)).unwrap_or(false),
            max_attachments: number_setting(map, "MAX_ATTACHMENTS", 1.0)?.max(0.0) as usize,
            max_message_length,
            message_chunk_size,
            request_timeout: Duration::from_secs(
                number_setting(map, "REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS as f64)?.max(1.0) as u64,
            ),
        })
    }

    /// Configuration from the current process environment
    pub fn from_env() -> BotResult<Self> {
        let map: HashMap<String, String> = env::vars().collect();
        Self::from_map(&map)
    }

    /// System prompt with escapes resolved and <date> filled in
    pub fn rendered_system_prompt(&self) -> Option<String> {
        parse_env_string(self.system_prompt.as_deref()).filter(|prompt| !prompt.is_empty())
    }

    pub fn is_channel_allowed(&self, channel_id: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|channel| channel == channel_id)
    }
}

fn number_setting(map: &HashMap<String, String>, key: &str, default: f64) -> BotResult<f64> {
    match map.get(key).filter(|value| !value.trim().is_empty()) {
        None => Ok(default),
        Some(value) => parse_env_number(value)
            .filter(|number| *number >= 0.0)
            .ok_or_else(|| BotError::Config(format!("Invalid {} value '{}'", key, value))),
    }
}

/// Parse KEY=VALUE lines. Blank lines and `#` comments are skipped, a leading BOM is
/// removed and values may be wrapped in single or double quotes.
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut config = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(equals_pos) = line.find('=') {
            let key = line[..equals_pos].trim().trim_start_matches("export ").trim().to_string();
            let mut value = line[equals_pos + 1..].trim();
            for quote in ['"', '\''] {
                if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                    value = &value[1..value.len() - 1];
                }
            }
            config.insert(key, value.to_string());
        }
    }

    config
}

/// Load the first .env file found and export its values. Variables already set in the
/// environment win over the file. Returns the path that was loaded, if any.
pub fn load_env_file() -> Option<&'static str> {
    let config_paths = [".env", "../.env", "../../.env", "src/.env"];

    for config_path in config_paths {
        match fs::read_to_string(config_path) {
            Ok(content) => {
                for (key, value) in parse_env_file(&content) {
                    if env::var_os(&key).is_none() {
                        env::set_var(&key, &value);
                    }
                }
                return Some(config_path);
            }
            Err(_) => continue,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_env_file() {
        let content = "\u{feff}# comment\nDISCORD_TOKEN=abc\n\nOLLAMA = \"http://localhost:11434\"\nexport CHANNELS='1,2'\ngarbage line\n";
        let parsed = parse_env_file(content);
        assert_eq!(parsed.get("DISCORD_TOKEN").map(String::as_str), Some("abc"));
        assert_eq!(parsed.get("OLLAMA").map(String::as_str), Some("http://localhost:11434"));
        assert_eq!(parsed.get("CHANNELS").map(String::as_str), Some("1,2"));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_map(&map(&[("DISCORD_TOKEN", "token")])).unwrap();
        assert_eq!(config.ollama_url, None);
        assert!(config.channels.is_empty());
        assert!(config.use_system);
        assert!(!config.use_model_system);
        assert_eq!(config.max_attachments, 1);
        assert_eq!(config.max_message_length, 2000);
        assert_eq!(config.message_chunk_size, 100);
        assert!(config.is_channel_allowed("123"));
    }

    #[test]
    fn test_missing_token_fails_fast() {
        let err = BotConfig::from_map(&map(&[("OLLAMA", "http://x")])).unwrap_err();
        assert!(err.is_configuration());
        let err = BotConfig::from_map(&map(&[("DISCORD_TOKEN", "YOUR_BOT_TOKEN_HERE")])).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn test_channels_and_flags() {
        let config = BotConfig::from_map(&map(&[
            ("DISCORD_TOKEN", "token"),
            ("CHANNELS", "111, 222,,"),
            ("USE_SYSTEM", "off"),
            ("USE_MODEL_SYSTEM", "1"),
            ("MAX_ATTACHMENTS", "3"),
            ("SYSTEM", "fallback"),
        ]))
        .unwrap();
        assert_eq!(config.channels, vec!["111", "222"]);
        assert!(config.is_channel_allowed("222"));
        assert!(!config.is_channel_allowed("333"));
        assert!(!config.use_system);
        assert!(config.use_model_system);
        assert_eq!(config.max_attachments, 3);
        assert_eq!(config.system_prompt.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = BotConfig::from_map(&map(&[("DISCORD_TOKEN", "t"), ("MAX_ATTACHMENTS", "abc")])).unwrap_err();
        assert!(err.to_string().contains("MAX_ATTACHMENTS"));
        let err = BotConfig::from_map(&map(&[("DISCORD_TOKEN", "t"), ("MESSAGE_CHUNK_SIZE", "2000")])).unwrap_err();
        assert!(err.to_string().contains("MESSAGE_CHUNK_SIZE"));
    }

    #[test]
    fn test_message_length_capped() {
        let config = BotConfig::from_map(&map(&[("DISCORD_TOKEN", "t"), ("MAX_MESSAGE_LENGTH", "5000")])).unwrap();
        assert_eq!(config.max_message_length, 2000);
    }

    #[test]
    fn test_rendered_system_prompt() {
        let config = BotConfig::from_map(&map(&[
            ("DISCORD_TOKEN", "t"),
            ("SYSTEM_PROMPT", r"Be brief.\nDate: <date>"),
        ]))
        .unwrap();
        let prompt = config.rendered_system_prompt().unwrap();
        assert!(prompt.starts_with("Be brief.\nDate: "));
        assert!(!prompt.contains("<date>"));
    }
}
