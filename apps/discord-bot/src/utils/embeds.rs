use super::constants::Colors;
use serenity::all::CreateEmbed;

/// Create a caution-themed embed (orange).
pub fn caution_embed() -> CreateEmbed {
    base_embed(Colors::CAUTION)
}

/// Create an info-themed embed (cyan).
pub fn info_embed() -> CreateEmbed {
    base_embed(Colors::INFO)
}

fn base_embed(color: u32) -> CreateEmbed {
    CreateEmbed::default()
        .color(color)
        .footer(serenity::all::CreateEmbedFooter::new(concat!(
            "discord-bot v",
            env!("CARGO_PKG_VERSION")
        )))
        .timestamp(serenity::model::Timestamp::now())
}
