/*!
 * Arbitration Filter
 * The coordinator's current rule for which pending message kind it will
 * service next. Selective acceptance by the channel's sole consumer is the
 * entire mutual-exclusion mechanism; there is no lock object anywhere.
 */

use super::types::MessageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptFilter {
    /// Service the oldest pending message regardless of kind
    #[default]
    Any,
    /// Service only a pending message of this kind; everything else stays
    /// queued and its sender stays blocked in `send`
    Exactly(MessageKind),
}

impl AcceptFilter {
    pub fn matches(self, kind: MessageKind) -> bool {
        match self {
            AcceptFilter::Any => true,
            AcceptFilter::Exactly(expected) => expected == kind,
        }
    }

    pub fn is_narrowed(self) -> bool {
        self != AcceptFilter::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_accepts_everything() {
        for kind in [MessageKind::Lock, MessageKind::Unlock, MessageKind::Term] {
            assert!(AcceptFilter::Any.matches(kind));
        }
    }

    #[test]
    fn narrowed_filter_defers_lock_and_term() {
        let filter = AcceptFilter::Exactly(MessageKind::Unlock);
        assert!(filter.matches(MessageKind::Unlock));
        assert!(!filter.matches(MessageKind::Lock));
        assert!(!filter.matches(MessageKind::Term));
        assert!(filter.is_narrowed());
    }
}
