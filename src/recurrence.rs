//! How often a recurring transaction repeats.

use time::{Date, Duration, Month};

use crate::{Error, choice::text_enum};

text_enum! {
    /// The interval between occurrences of a recurring transaction.
    pub enum Frequency ("recurrence frequency") {
        Daily => "daily",
        Weekly => "weekly",
        Biweekly => "biweekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

impl Frequency {
    /// The occurrence after `date`.
    ///
    /// Month based frequencies keep the day of the month, clamped to the length of the
    /// target month, e.g. 31 January plus one month is 28 or 29 February.
    ///
    /// # Errors
    /// Returns [Error::DateOutOfRange] if the next occurrence is past the last representable date.
    pub fn advance(&self, date: Date) -> Result<Date, Error> {
        let next = match self {
            Frequency::Daily => date.checked_add(Duration::days(1)),
            Frequency::Weekly => date.checked_add(Duration::weeks(1)),
            Frequency::Biweekly => date.checked_add(Duration::weeks(2)),
            Frequency::Monthly => add_months(date, 1),
            Frequency::Quarterly => add_months(date, 3),
            Frequency::Yearly => add_months(date, 12),
        };

        next.ok_or(Error::DateOutOfRange(date))
    }
}

/// Add `months` to `date`, clamping the day to the length of the resulting month.
///
/// Returns `None` if the result is past the last representable date.
pub fn add_months(date: Date, months: u32) -> Option<Date> {
    let month_index = date.month() as i32 - 1 + i32::try_from(months).ok()?;
    let year = date.year().checked_add(month_index.div_euclid(12))?;
    let month = Month::try_from((month_index.rem_euclid(12) + 1) as u8).ok()?;
    let day = date.day().min(time::util::days_in_month(month, year));

    Date::from_calendar_date(year, month, day).ok()
}

/// Every occurrence from `next` up to and including `today`, and the first one after `today`.
///
/// # Errors
/// Returns [Error::DateOutOfRange] if an occurrence cannot be advanced.
pub fn due_occurrences(
    frequency: Frequency,
    next: Date,
    today: Date,
) -> Result<(Vec<Date>, Date), Error> {
    let mut due = Vec::new();
    let mut occurrence = next;

    while occurrence <= today {
        due.push(occurrence);
        occurrence = frequency.advance(occurrence)?;
    }

    Ok((due, occurrence))
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::Error;

    use super::{Frequency, add_months, due_occurrences};

    #[test]
    fn advances_by_days_and_weeks() {
        assert_eq!(
            Frequency::Daily.advance(date!(2024 - 12 - 31)),
            Ok(date!(2025 - 01 - 01))
        );
        assert_eq!(
            Frequency::Weekly.advance(date!(2024 - 01 - 01)),
            Ok(date!(2024 - 01 - 08))
        );
        assert_eq!(
            Frequency::Biweekly.advance(date!(2024 - 01 - 01)),
            Ok(date!(2024 - 01 - 15))
        );
    }

    #[test]
    fn month_end_is_clamped() {
        assert_eq!(add_months(date!(2024 - 01 - 31), 1), Some(date!(2024 - 02 - 29)));
        assert_eq!(add_months(date!(2023 - 01 - 31), 1), Some(date!(2023 - 02 - 28)));
        assert_eq!(
            Frequency::Quarterly.advance(date!(2024 - 11 - 30)),
            Ok(date!(2025 - 02 - 28))
        );
        assert_eq!(
            Frequency::Yearly.advance(date!(2024 - 02 - 29)),
            Ok(date!(2025 - 02 - 28))
        );
    }

    #[test]
    fn catches_up_missed_occurrences() {
        let (due, next) =
            due_occurrences(Frequency::Weekly, date!(2024 - 01 - 01), date!(2024 - 01 - 20))
                .unwrap();

        assert_eq!(
            due,
            [date!(2024 - 01 - 01), date!(2024 - 01 - 08), date!(2024 - 01 - 15)]
        );
        assert_eq!(next, date!(2024 - 01 - 22));
    }

    #[test]
    fn nothing_due_before_next_occurrence() {
        let (due, next) =
            due_occurrences(Frequency::Monthly, date!(2024 - 02 - 01), date!(2024 - 01 - 20))
                .unwrap();

        assert!(due.is_empty());
        assert_eq!(next, date!(2024 - 02 - 01));
    }

    #[test]
    fn advancing_past_the_last_date_is_an_error() {
        let last = date!(9999 - 12 - 31);

        for frequency in Frequency::ALL {
            assert_eq!(frequency.advance(last), Err(Error::DateOutOfRange(last)));
        }
        assert_eq!(add_months(date!(9999 - 12 - 01), 1), None);
    }

    #[test]
    fn catching_up_past_the_last_date_stops_with_an_error() {
        let result =
            due_occurrences(Frequency::Yearly, date!(9998 - 06 - 01), date!(9999 - 12 - 31));

        assert_eq!(result, Err(Error::DateOutOfRange(date!(9999 - 06 - 01))));
    }
}
