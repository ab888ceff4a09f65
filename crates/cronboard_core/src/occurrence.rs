use crate::error::AppError;
use crate::model::OccurrencePair;
use chrono::{DateTime, Local, LocalResult, TimeZone};
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A parsed cron expression.
///
/// Holds one `cron::Schedule`, or two when day-of-month and day-of-week are
/// OR-combined.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, AppError> {
        let trimmed = expression.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let (second, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            count => {
                return Err(AppError::cron_parse(
                    trimmed,
                    format!("expected 5 or 6 fields, found {count}"),
                ));
            }
        };

        let (minute, hour, month) = (rest[0], rest[1], rest[3]);
        let day_of_month = if rest[2] == "?" { "*" } else { rest[2] };
        let weekdays =
            parse_weekdays(rest[4]).map_err(|message| AppError::cron_parse(trimmed, message))?;

        let patterns = match weekdays {
            None => vec![format!("{second} {minute} {hour} {day_of_month} {month} *")],
            Some(days) if day_of_month == "*" => {
                vec![format!("{second} {minute} {hour} * {month} {days}")]
            }
            Some(days) => vec![
                format!("{second} {minute} {hour} {day_of_month} {month} *"),
                format!("{second} {minute} {hour} * {month} {days}"),
            ],
        };

        let schedules = patterns
            .iter()
            .map(|pattern| {
                Schedule::from_str(pattern)
                    .map_err(|err| AppError::cron_parse(trimmed, err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedules,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Smallest firing time strictly after `after`.
    ///
    /// A wall-clock time repeated by a DST fall-back resolves to its first
    /// instant.
    pub fn next_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(after).next())
            .map(|at| match Local.from_local_datetime(&at.naive_local()) {
                LocalResult::Ambiguous(earliest, _) if earliest > *after && earliest < at => {
                    earliest
                }
                _ => at,
            })
            .min()
    }

    /// Largest firing time strictly before `before`.
    ///
    /// A wall-clock time repeated by a DST fall-back resolves to its last
    /// instant.
    pub fn previous_before(&self, before: &DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(before).next_back())
            .map(|at| match Local.from_local_datetime(&at.naive_local()) {
                LocalResult::Ambiguous(_, latest) if latest < *before && latest > at => latest,
                _ => at,
            })
            .max()
    }

    pub fn occurrences_around(
        &self,
        reference_time: &DateTime<Local>,
    ) -> Result<OccurrencePair, AppError> {
        let next = self
            .next_after(reference_time)
            .ok_or_else(|| AppError::no_occurrence(&self.expression))?;
        let previous = self
            .previous_before(reference_time)
            .ok_or_else(|| AppError::no_occurrence(&self.expression))?;
        Ok(OccurrencePair { previous, next })
    }
}

pub fn compute_occurrences(
    cron_expression: &str,
    reference_time: DateTime<Local>,
) -> Result<OccurrencePair, AppError> {
    CronSchedule::parse(cron_expression)?.occurrences_around(&reference_time)
}

/// Translate a traditional day-of-week field into a list of weekday names.
///
/// Returns `None` for an unrestricted field.
fn parse_weekdays(field: &str) -> Result<Option<String>, String> {
    if field == "*" || field == "?" {
        return Ok(None);
    }

    let mut days = BTreeSet::new();
    for element in field.split(',') {
        let (range, step) = match element.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<usize>()
                    .map_err(|_| format!("invalid day-of-week step '{step}'"))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".to_string());
                }
                (range, Some(step))
            }
            None => (element, None),
        };

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((start, end)) = range.split_once('-') {
            (weekday_number(start)?, weekday_number(end)?)
        } else {
            let day = weekday_number(range)?;
            if step.is_some() { (day, 6) } else { (day, day) }
        };

        if start > end {
            return Err(format!("invalid day-of-week range '{range}'"));
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days.insert(day % 7);
        }
    }

    let names: Vec<&str> = days.iter().map(|day| WEEKDAY_NAMES[*day]).collect();
    Ok(Some(names.join(",")))
}

fn weekday_number(token: &str) -> Result<usize, String> {
    if let Ok(value) = token.parse::<usize>() {
        return if value <= 7 {
            Ok(value)
        } else {
            Err(format!("day-of-week '{value}' is out of range 0-7"))
        };
    }

    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .ok_or_else(|| format!("invalid day-of-week '{token}'"))
}

#[cfg(test)]
mod tests {
    use super::{CronSchedule, compute_occurrences, parse_weekdays};
    use chrono::{DateTime, Duration, Local, TimeZone};

    fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn yearly_expression_spans_a_year() {
        let now = local(2024, 6, 1, 12, 0, 0);
        let pair = compute_occurrences("0 7 14 3 *", now).unwrap();

        assert_eq!(pair.previous, local(2024, 3, 14, 7, 0, 0));
        assert_eq!(pair.next, local(2025, 3, 14, 7, 0, 0));
    }

    #[test]
    fn monthly_expression_picks_neighbouring_months() {
        let now = local(2024, 6, 1, 12, 0, 0);
        let pair = compute_occurrences("0 18 20 * *", now).unwrap();

        assert_eq!(pair.previous, local(2024, 5, 20, 18, 0, 0));
        assert_eq!(pair.next, local(2024, 6, 20, 18, 0, 0));
    }

    #[test]
    fn weekday_numbers_follow_traditional_cron() {
        // 2024-06-01 is a Saturday.
        let now = local(2024, 6, 1, 12, 0, 0);

        let monday = compute_occurrences("0 9 * * 1", now).unwrap();
        assert_eq!(monday.next, local(2024, 6, 3, 9, 0, 0));
        assert_eq!(monday.previous, local(2024, 5, 27, 9, 0, 0));

        let sunday_zero = compute_occurrences("0 9 * * 0", now).unwrap();
        let sunday_seven = compute_occurrences("0 9 * * 7", now).unwrap();
        assert_eq!(sunday_zero.next, local(2024, 6, 2, 9, 0, 0));
        assert_eq!(sunday_zero, sunday_seven);
    }

    #[test]
    fn restricted_day_fields_are_or_combined() {
        // Fires on the 1st of the month or on any Wednesday.
        let now = local(2024, 6, 1, 12, 0, 0);
        let pair = compute_occurrences("0 9 1 * 3", now).unwrap();

        assert_eq!(pair.previous, local(2024, 6, 1, 9, 0, 0));
        assert_eq!(pair.next, local(2024, 6, 5, 9, 0, 0));
    }

    #[test]
    fn six_field_expression_includes_seconds() {
        let now = local(2024, 6, 1, 12, 0, 10);
        let pair = compute_occurrences("30 * * * * *", now).unwrap();

        assert_eq!(pair.next, local(2024, 6, 1, 12, 0, 30));
        assert_eq!(pair.previous, local(2024, 6, 1, 11, 59, 30));
    }

    #[test]
    fn occurrences_strictly_surround_reference() {
        let expressions = [
            "* * * * *",
            "*/15 * * * *",
            "0 0 * * *",
            "30 4 * * mon-fri",
            "0 7 14 3 *",
            "0 18 20 * *",
        ];
        let references = [
            local(2024, 1, 1, 0, 0, 0),
            local(2024, 6, 1, 12, 34, 56),
            local(2025, 12, 31, 23, 59, 59),
        ];

        for expression in expressions {
            for reference in references {
                let pair = compute_occurrences(expression, reference).unwrap();
                assert!(pair.previous < reference, "{expression} at {reference}");
                assert!(reference < pair.next, "{expression} at {reference}");
            }
        }
    }

    #[test]
    fn every_minute_is_within_a_minute() {
        let now = Local::now();
        let pair = compute_occurrences("* * * * *", now).unwrap();

        assert!(pair.next - now <= Duration::minutes(1));
        assert!(now - pair.previous <= Duration::minutes(1));
    }

    #[test]
    fn malformed_expressions_fail_with_cron_parse() {
        let now = local(2024, 6, 1, 12, 0, 0);
        for expression in ["not-a-cron", "", "61 * * * *", "0 9 * * 8", "0 9 * * 1,,2"] {
            let err = compute_occurrences(expression, now).unwrap_err();
            assert_eq!(err.code(), "cron_parse", "{expression}");
        }
    }

    #[test]
    fn impossible_date_fails_with_no_occurrence() {
        let now = local(2024, 6, 1, 12, 0, 0);
        let err = compute_occurrences("0 0 30 2 *", now).unwrap_err();
        assert_eq!(err.code(), "no_occurrence");
    }

    #[test]
    fn parse_keeps_trimmed_expression() {
        let schedule = CronSchedule::parse("  0 7 14 3 *  ").unwrap();
        assert_eq!(schedule.expression(), "0 7 14 3 *");
    }

    #[test]
    fn parse_weekdays_expands_ranges_steps_and_names() {
        assert_eq!(parse_weekdays("*").unwrap(), None);
        assert_eq!(parse_weekdays("?").unwrap(), None);
        assert_eq!(
            parse_weekdays("1-5").unwrap().as_deref(),
            Some("Mon,Tue,Wed,Thu,Fri")
        );
        assert_eq!(
            parse_weekdays("*/2").unwrap().as_deref(),
            Some("Sun,Tue,Thu,Sat")
        );
        assert_eq!(parse_weekdays("7").unwrap().as_deref(), Some("Sun"));
        assert_eq!(parse_weekdays("sat,0").unwrap().as_deref(), Some("Sun,Sat"));
        assert_eq!(parse_weekdays("5-7").unwrap().as_deref(), Some("Sun,Fri,Sat"));
    }

    #[test]
    fn parse_weekdays_rejects_bad_tokens() {
        assert!(parse_weekdays("funday").is_err());
        assert!(parse_weekdays("5-1").is_err());
        assert!(parse_weekdays("*/0").is_err());
        assert!(parse_weekdays("9").is_err());
    }
}
