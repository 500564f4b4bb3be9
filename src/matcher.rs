use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::ApiError;
use crate::models::{Candidate, MatchedSlot, SlotGroup};
use crate::schedule;

/// Result of reconciling outstanding candidates against live inventory.
///
/// `matched` keeps the order the candidates were supplied in. `dropped`
/// holds candidates whose slot the user cancelled themselves; those are
/// considered handled and are not retried for the rest of the horizon.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedSlot>,
    pub residual: Vec<Candidate>,
    pub dropped: Vec<Candidate>,
}

/// Match each candidate against the fetched slot inventory.
///
/// A slot matches when the dates agree, the parsed times-of-day agree, the
/// slot is active and its free capacity covers the user plus companions.
/// Candidates with no qualifying slot land in `residual`.
pub fn match_candidates(
    groups: &[SlotGroup],
    candidates: &[Candidate],
    user_id: &str,
) -> Result<MatchOutcome, ApiError> {
    let mut by_date: HashMap<NaiveDate, &SlotGroup> = HashMap::new();
    for group in groups {
        by_date.insert(schedule::parse_remote_date(&group.id)?, group);
    }

    let mut outcome = MatchOutcome::default();
    'candidates: for candidate in candidates {
        let Some(group) = by_date.get(&candidate.date) else {
            outcome.residual.push(candidate.clone());
            continue;
        };
        let wanted = schedule::parse_time_of_day(&candidate.time)?;
        let required = candidate.required_spots();

        // Scan the whole day; slot ordering is not trusted.
        for slot in &group.classes {
            if schedule::parse_time_of_day(&slot.time)? != wanted {
                continue;
            }
            if slot.cancelled_by(user_id) {
                outcome.dropped.push(candidate.clone());
                continue 'candidates;
            }
            if slot.active && slot.available() >= required {
                outcome.matched.push(MatchedSlot {
                    class_id: slot.id.clone(),
                    date: schedule::parse_remote_date(&slot.date)?,
                    time: slot.time.clone(),
                });
                continue 'candidates;
            }
        }
        outcome.residual.push(candidate.clone());
    }
    Ok(outcome)
}
