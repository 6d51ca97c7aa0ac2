//! Lifecycle listeners with no commands of their own.

use super::{Cog, ReadyLog};

type Error = crate::error::Error;

pub fn setup() -> Result<Cog, Error> {
    Ok(Cog::new("EventCog").listener(ReadyLog::new("EventCog")))
}
