/// Designated pin glyph.
pub const DEFAULT_PIN_EMOJI: &str = "📌";

/// Platform upload size ceiling in bytes.
pub const DEFAULT_UPLOAD_CEILING: usize = 8_000_000;

pub const DEFAULT_COMMAND_PREFIX: &str = "!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub command_prefix: String,
    pub pin_emoji: String,
    pub upload_ceiling: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            pin_emoji: DEFAULT_PIN_EMOJI.to_string(),
            upload_ceiling: DEFAULT_UPLOAD_CEILING,
        }
    }
}
