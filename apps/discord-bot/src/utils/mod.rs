pub mod constants;
pub mod embeds;
