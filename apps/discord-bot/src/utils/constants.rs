//! Values the bot uses everywhere and never changes at runtime.

/// Embed colors.
pub struct Colors;

impl Colors {
    pub const SUCCESS: u32 = 0x00FF00;
    pub const FAIL: u32 = 0xFF0000;
    pub const CAUTION: u32 = 0xF09900;
    pub const INFO: u32 = 0x00FFFF;
}

/// Emoji the bot frequently uses in replies.
pub struct Emoji;

impl Emoji {
    pub const CHECKMARK: &'static str = "\u{2705}";
    pub const CROSS: &'static str = "\u{274C}";
    pub const STAR: &'static str = "\u{2B50}";
}
