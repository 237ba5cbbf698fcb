//! Sequence Resolver - picks the outstanding step for a lead

use outpost_storage::{Lead, SequenceStep};

/// Resolves which sequence step a lead should receive next
pub struct SequenceResolver;

impl SequenceResolver {
    /// The entry step: the lowest step number. On duplicate step numbers
    /// the first in listing order wins.
    pub fn entry_step(steps: &[SequenceStep]) -> Option<&SequenceStep> {
        let mut entry: Option<&SequenceStep> = None;
        for step in steps {
            match entry {
                Some(current) if current.step_number <= step.step_number => {}
                _ => entry = Some(step),
            }
        }
        entry
    }

    /// Next outstanding step for a lead.
    ///
    /// Steps beyond the entry step are stored and retrievable, but nothing
    /// advances a lead past step 1 today: dispatch only considers leads
    /// still in `active` status, and a delivered entry step moves them to
    /// `sent`. The resolver therefore always selects the entry step.
    pub fn next_step<'a>(steps: &'a [SequenceStep], _lead: &Lead) -> Option<&'a SequenceStep> {
        Self::entry_step(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn step(step_number: i64, subject: &str) -> SequenceStep {
        SequenceStep {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            step_number,
            subject: subject.to_string(),
            body: String::new(),
            delay_days: 0,
            delay_hours: 0,
            delay_minutes: 0,
            is_reply: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_step_is_lowest_number() {
        let steps = vec![step(2, "second"), step(1, "first"), step(3, "third")];
        let entry = SequenceResolver::entry_step(&steps).unwrap();
        assert_eq!(entry.step_number, 1);
        assert_eq!(entry.subject, "first");
    }

    #[test]
    fn test_entry_step_tie_keeps_listing_order() {
        let steps = vec![step(1, "a"), step(1, "b")];
        let entry = SequenceResolver::entry_step(&steps).unwrap();
        assert_eq!(entry.subject, "a");
    }

    #[test]
    fn test_entry_step_empty() {
        assert!(SequenceResolver::entry_step(&[]).is_none());
    }
}
