use chrono::{Datelike, Duration, NaiveDate};

use super::action::Action;
use super::front::Choice;

const WEEKDAYS: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn shift_month(first: NaiveDate, delta: i32) -> Option<NaiveDate> {
    let index = first.year() * 12 + first.month0() as i32 + delta;
    first_of_month(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn blank() -> Choice {
    Choice::new(" ", Action::Noop)
}

/// Month grid for the date picker. Days after `today` cannot be picked.
pub fn month_grid(month: NaiveDate, today: NaiveDate) -> Vec<Vec<Choice>> {
    let first = month.with_day(1).unwrap_or(month);
    let this_month = today.with_day(1).unwrap_or(today);
    let mut rows = Vec::new();

    let prev = shift_month(first, -1)
        .map(|m| Choice::new("«", Action::Month { year: m.year(), month: m.month() }))
        .unwrap_or_else(blank);
    let next = shift_month(first, 1)
        .filter(|m| *m <= this_month)
        .map(|m| Choice::new("»", Action::Month { year: m.year(), month: m.month() }))
        .unwrap_or_else(blank);
    rows.push(vec![
        prev,
        Choice::new(first.format("%B %Y").to_string(), Action::Noop),
        next,
    ]);

    rows.push(WEEKDAYS.iter().map(|d| Choice::new(*d, Action::Noop)).collect());

    let mut week: Vec<Choice> = (0..first.weekday().num_days_from_monday())
        .map(|_| blank())
        .collect();
    let mut day = first;
    while day.month() == first.month() {
        let choice = if day <= today {
            Choice::new(day.day().to_string(), Action::Day(day))
        } else {
            blank()
        };
        week.push(choice);
        if week.len() == 7 {
            rows.push(std::mem::take(&mut week));
        }
        day += Duration::days(1);
    }
    if !week.is_empty() {
        week.resize_with(7, blank);
        rows.push(week);
    }

    rows.push(vec![
        Choice::new("Yesterday", Action::Day(today - Duration::days(1))),
        Choice::new("Today", Action::Day(today)),
    ]);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn picks(rows: &[Vec<Choice>]) -> Vec<NaiveDate> {
        rows.iter()
            .flatten()
            .filter_map(|c| match c.action {
                Action::Day(date) => Some(date),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_past_month_has_every_day() {
        // June 2025 starts on a Sunday
        let rows = month_grid(d(2025, 6, 15), d(2025, 7, 10));
        assert_eq!(rows[0][1].label, "June 2025");
        assert_eq!(rows[2].iter().filter(|c| c.action == Action::Noop).count(), 6);
        // 30 grid days plus the two shortcuts
        assert_eq!(picks(&rows).len(), 32);
        assert!(rows.iter().all(|r| r.len() == 7 || r.len() == 3 || r.len() == 2));
        assert_eq!(rows[0][2].action, Action::Month { year: 2025, month: 7 });
    }

    #[test]
    fn test_current_month_stops_at_today() {
        let today = d(2025, 7, 10);
        let rows = month_grid(today, today);
        let grid_days: Vec<NaiveDate> = rows[2..rows.len() - 1]
            .iter()
            .flatten()
            .filter_map(|c| match c.action {
                Action::Day(date) => Some(date),
                _ => None,
            })
            .collect();
        assert_eq!(grid_days.last(), Some(&today));
        assert_eq!(grid_days.len(), 10);
        assert_eq!(rows[0][2].action, Action::Noop);
    }

    #[test]
    fn test_year_boundary_navigation() {
        let rows = month_grid(d(2025, 1, 5), d(2025, 7, 1));
        assert_eq!(rows[0][0].action, Action::Month { year: 2024, month: 12 });
        assert_eq!(rows[0][2].action, Action::Month { year: 2025, month: 2 });
    }
}
