//! Escalation policy: follow-up message content by attempt number.

/// Attempt ceiling. Follow-ups never advance past this step.
pub const MAX_ATTEMPTS: u32 = 4;

/// One step of the follow-up escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    CheckIn,
    Nudge,
    ThirdNotice,
    FinalNotice,
}

impl Escalation {
    /// Step for an attempt number, clamped to `[1, MAX_ATTEMPTS]`.
    pub fn from_attempt(attempt: u32) -> Self {
        match attempt.clamp(1, MAX_ATTEMPTS) {
            1 => Escalation::CheckIn,
            2 => Escalation::Nudge,
            3 => Escalation::ThirdNotice,
            _ => Escalation::FinalNotice,
        }
    }

    pub fn render(self, name: &str, context: &str) -> String {
        match self {
            Escalation::CheckIn => {
                format!("Hi {name},\n\nJust checking in on my previous message. {context}")
            }
            Escalation::Nudge => format!(
                "Hi {name},\n\nFollowing up again. I'd appreciate a quick update. {context}"
            ),
            Escalation::ThirdNotice => format!(
                "Hi {name},\n\nThis is my third email. Is this still something you're considering? {context}"
            ),
            Escalation::FinalNotice => format!(
                "Hi {name},\n\nIf I don't hear back by end of day, I'll assume this opportunity is closed. {context}"
            ),
        }
    }
}

/// Follow-up message for `attempt`, with `name` and `context` filled in.
pub fn select_message(name: &str, context: &str, attempt: u32) -> String {
    Escalation::from_attempt(attempt).render(name, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_map_to_steps() {
        assert_eq!(Escalation::from_attempt(0), Escalation::CheckIn);
        assert_eq!(Escalation::from_attempt(1), Escalation::CheckIn);
        assert_eq!(Escalation::from_attempt(2), Escalation::Nudge);
        assert_eq!(Escalation::from_attempt(3), Escalation::ThirdNotice);
        for attempt in 4..=10 {
            assert_eq!(Escalation::from_attempt(attempt), Escalation::FinalNotice);
        }
    }

    #[test]
    fn messages_substitute_name_and_context() {
        let msg = select_message("Jane", "Re: the proposal.", 1);
        assert_eq!(
            msg,
            "Hi Jane,\n\nJust checking in on my previous message. Re: the proposal."
        );
        assert!(select_message("Jane", "ctx", 2).contains("Following up again"));
        assert!(select_message("Jane", "ctx", 3).contains("third email"));
        assert!(select_message("Jane", "ctx", 4).contains("opportunity is closed"));
    }

    #[test]
    fn ceiling_repeats_final_message() {
        let last = select_message("Jane", "ctx", MAX_ATTEMPTS);
        for attempt in MAX_ATTEMPTS..=10 {
            assert_eq!(select_message("Jane", "ctx", attempt), last);
        }
    }

    #[test]
    fn each_step_is_distinct() {
        let messages: Vec<String> = (1..=MAX_ATTEMPTS)
            .map(|a| select_message("Jane", "ctx", a))
            .collect();
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
