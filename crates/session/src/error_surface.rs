/// Single-slot, user-visible error surface.
///
/// Holds at most one pending human-readable message. Every report overwrites
/// the previous one — the most recent failure wins the visible slot — and
/// nothing clears it except an explicit `clear`.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    pending: Option<String>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, message: impl Into<String>) {
        self.pending = Some(message.into());
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_report_overwrites_the_slot() {
        let mut slot = ErrorSlot::new();

        slot.report("pagination failed");
        slot.report("send failed");

        assert_eq!(slot.pending(), Some("send failed"));
    }

    #[test]
    fn only_an_explicit_clear_empties_the_slot() {
        let mut slot = ErrorSlot::new();
        slot.report("subscription failed");

        assert_eq!(slot.pending(), Some("subscription failed"));
        slot.clear();
        assert!(slot.is_empty());
    }
}
