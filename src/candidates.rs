use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use tracing::warn;

use crate::models::{Candidate, Preference, ScheduledClass};
use crate::schedule;

/// Forward calendar days considered when expanding preferences.
pub const HORIZON_DAYS: u32 = 8;

fn days_by_weekday(today: NaiveDate, horizon: u32) -> HashMap<Weekday, Vec<NaiveDate>> {
    let mut days: HashMap<Weekday, Vec<NaiveDate>> = HashMap::new();
    for date in schedule::horizon_dates(today, horizon) {
        days.entry(date.weekday()).or_default().push(date);
    }
    days
}

/// Expand preferences across the horizon into outstanding candidates.
///
/// Candidates that collide with an already-scheduled class (same date and
/// time, case-insensitive) or whose start is not strictly in the future are
/// dropped. Output order is preference order, then time order, then date
/// order.
pub fn generate(
    prefs: &[Preference],
    scheduled: &[ScheduledClass],
    now: NaiveDateTime,
    horizon: u32,
) -> Vec<Candidate> {
    let days = days_by_weekday(now.date(), horizon);
    let taken: HashSet<(NaiveDate, String)> = scheduled
        .iter()
        .map(|s| (s.date, s.time.to_lowercase()))
        .collect();

    let mut out = Vec::new();
    for pref in prefs {
        let Some(weekday) = schedule::parse_weekday(&pref.weekday) else {
            warn!("Unknown weekday '{}' in preference, skipping", pref.weekday);
            continue;
        };
        let Some(dates) = days.get(&weekday) else {
            continue;
        };

        for time in &pref.times {
            let minutes = match schedule::parse_time_of_day(time) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping preference time '{}': {}", time, e);
                    continue;
                }
            };
            for &date in dates {
                if taken.contains(&(date, time.to_lowercase())) {
                    continue;
                }
                let starts_at = date.and_time(schedule::minutes_to_time(minutes));
                if starts_at <= now {
                    continue;
                }
                out.push(Candidate {
                    date,
                    weekday,
                    time: time.clone(),
                    companions: pref.companions.clone(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassType;

    fn pref(weekday: &str, times: &[&str], companions: &[&str]) -> Preference {
        Preference {
            class_type: ClassType::Gym,
            weekday: weekday.to_string(),
            times: times.iter().map(|t| t.to_string()).collect(),
            companions: companions.iter().map(|c| c.to_string()).collect(),
        }
    }

    // 2024-01-07 was a Sunday.
    fn sunday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn monday_preference_from_sunday_yields_next_monday() {
        let prefs = vec![pref("monday", &["9:00 am"], &[])];
        let out = generate(&prefs, &[], sunday_morning(), 8);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].date, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(out[0].weekday, Weekday::Mon);
        assert_eq!(out[0].time, "9:00 am");
    }

    #[test]
    fn candidates_stay_on_their_weekday_inside_the_horizon() {
        let prefs = vec![
            pref("tuesday", &["6:30 pm"], &[]),
            pref("sunday", &["10:00 am"], &["ann"]),
        ];
        let today = sunday_morning().date();
        let out = generate(&prefs, &[], sunday_morning(), 8);
        for cand in &out {
            assert_eq!(cand.date.weekday(), cand.weekday);
            assert!(cand.date >= today);
            assert!(cand.date < today + chrono::Duration::days(8));
        }
        // Sunday appears twice in an 8-day horizon starting on a Sunday, but
        // today's 10:00 am has not passed at 8:00 am, so both survive.
        assert_eq!(out.iter().filter(|c| c.weekday == Weekday::Sun).count(), 2);
    }

    #[test]
    fn past_start_times_are_dropped() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        let prefs = vec![pref("sunday", &["10:00 am", "5:00 pm"], &[])];
        let out = generate(&prefs, &[], now, 8);
        // Today's 10:00 am is gone; today's 5:00 pm and next Sunday's pair remain.
        assert_eq!(out.len(), 3);
        assert!(out
            .iter()
            .all(|c| c.date != now.date() || c.time == "5:00 pm"));
    }

    #[test]
    fn scheduled_classes_are_excluded_case_insensitively() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let scheduled = vec![ScheduledClass {
            booking_id: "b1".into(),
            class_id: "c1".into(),
            date: monday,
            weekday: Weekday::Mon,
            time: "9:00 AM".into(),
        }];
        let prefs = vec![pref("monday", &["9:00 am", "6:00 pm"], &[])];
        let out = generate(&prefs, &scheduled, sunday_morning(), 8);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, "6:00 pm");
    }

    #[test]
    fn generation_is_idempotent() {
        let prefs = vec![
            pref("monday", &["9:00 am", "6:00 pm"], &["bob"]),
            pref("wednesday", &["7:15 am"], &[]),
        ];
        let first = generate(&prefs, &[], sunday_morning(), 8);
        let second = generate(&prefs, &[], sunday_morning(), 8);
        assert_eq!(first, second);
    }

    #[test]
    fn order_is_preference_then_time_then_date() {
        // Horizon of 9 days from a Sunday covers two Mondays.
        let prefs = vec![pref("monday", &["9:00 am", "6:00 pm"], &[])];
        let out = generate(&prefs, &[], sunday_morning(), 9);
        let jan8 = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let jan15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let got: Vec<(NaiveDate, &str)> =
            out.iter().map(|c| (c.date, c.time.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (jan8, "9:00 am"),
                (jan15, "9:00 am"),
                (jan8, "6:00 pm"),
                (jan15, "6:00 pm"),
            ]
        );
    }

    #[test]
    fn empty_time_list_yields_nothing() {
        let prefs = vec![pref("monday", &[], &[])];
        assert!(generate(&prefs, &[], sunday_morning(), 8).is_empty());
    }

    #[test]
    fn companions_are_carried_through() {
        let prefs = vec![pref("monday", &["9:00 am"], &["ann", "bob"])];
        let out = generate(&prefs, &[], sunday_morning(), 8);
        assert_eq!(out[0].companions, vec!["ann", "bob"]);
        assert_eq!(out[0].required_spots(), 3);
    }
}
