//! Per-session state and session specs.

use std::time::Instant;

use settle_core::{ConversationContext, DebtProfile, Episode, EpisodeBuilder, PolicyGuard, TurnTrace};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// What a caller supplies to start a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSpec {
    /// Generated when `None`.
    pub session_id: Option<String>,
    pub jurisdiction: String,
    pub debt: DebtProfile,
    pub prior_attempts: u32,
    /// Minutes since local midnight. Derived from the clock and the
    /// jurisdiction's UTC offset when `None`.
    pub local_minute_of_day: Option<u16>,
    /// Simulator persona, carried into the episode.
    pub persona: Option<String>,
}

impl SessionSpec {
    pub fn new(jurisdiction: impl Into<String>, debt: DebtProfile) -> Self {
        Self {
            session_id: None,
            jurisdiction: jurisdiction.into(),
            debt,
            prior_attempts: 0,
            local_minute_of_day: None,
            persona: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_prior_attempts(mut self, attempts: u32) -> Self {
        self.prior_attempts = attempts;
        self
    }

    pub fn at_minute(mut self, minute_of_day: u16) -> Self {
        self.local_minute_of_day = Some(minute_of_day);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }
}

/// One live conversation. Guarded by a per-session mutex that a turn holds
/// from AWAIT_INPUT to COMMIT.
#[derive(Debug)]
pub(crate) struct Session {
    pub id: String,
    pub guard: PolicyGuard,
    pub context: ConversationContext,
    pub traces: Vec<TurnTrace>,
    /// `None` once sealed.
    pub episode: Option<EpisodeBuilder>,
    pub sealed: Option<Episode>,
    pub opening_done: bool,
    pub closed: bool,
    pub last_active: Instant,
}

impl Session {
    pub fn new(id: String, guard: PolicyGuard, context: ConversationContext, episode: EpisodeBuilder) -> Self {
        Self {
            id,
            guard,
            context,
            traces: Vec::new(),
            episode: Some(episode),
            sealed: None,
            opening_done: false,
            closed: false,
            last_active: Instant::now(),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Current minute of day at `utc_offset_minutes` from UTC.
pub(crate) fn local_minute_of_day(utc_offset_minutes: i16) -> u16 {
    let now = OffsetDateTime::now_utc();
    minute_at_offset(now.hour(), now.minute(), utc_offset_minutes)
}

fn minute_at_offset(utc_hour: u8, utc_minute: u8, utc_offset_minutes: i16) -> u16 {
    let utc = i32::from(utc_hour) * 60 + i32::from(utc_minute);
    let local = (utc + i32::from(utc_offset_minutes)).rem_euclid(24 * 60);
    u16::try_from(local).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_wrap_around_midnight() {
        assert_eq!(minute_at_offset(10, 0, 0), 600);
        assert_eq!(minute_at_offset(2, 0, -300), 21 * 60);
        assert_eq!(minute_at_offset(22, 0, 330), 3 * 60 + 30);
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let stamp = now_rfc3339();
        assert!(OffsetDateTime::parse(&stamp, &Rfc3339).is_ok(), "{}", stamp);
    }
}
