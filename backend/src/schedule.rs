//! Weekday sets, index conversion and move-out date math.
//!
//! Internally every weekday is zero-based with Sunday = 0. The external
//! platform (and the replica tables mirroring it) counts Sunday = 1, so
//! indices coming over any boundary carry a [`DayIndexing`] tag and are
//! converted through [`Weekday::from_index`] before anything else sees them.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayIndexing {
    /// Sunday = 0 .. Saturday = 6
    ZeroBased,
    /// Sunday = 1 .. Saturday = 7
    OneBased,
}

impl DayIndexing {
    fn offset(self) -> i64 {
        match self {
            DayIndexing::ZeroBased => 0,
            DayIndexing::OneBased => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("day index {index} is out of range for {indexing:?} encoding")]
    IndexOutOfRange { index: i64, indexing: DayIndexing },
    #[error("reservation span must be at least one week, got {0}")]
    EmptySpan(u32),
    #[error("nights per week must be between 1 and 7, got {0}")]
    NightsOutOfRange(u32),
}

/// A weekday in the canonical zero-based, Sunday-first encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Weekday(u8);

impl Weekday {
    pub const SUNDAY: Weekday = Weekday(0);
    pub const SATURDAY: Weekday = Weekday(6);

    pub fn from_index(index: i64, indexing: DayIndexing) -> Result<Self, ScheduleError> {
        let canonical = index - indexing.offset();
        if (0..7).contains(&canonical) {
            Ok(Weekday(canonical as u8))
        } else {
            Err(ScheduleError::IndexOutOfRange { index, indexing })
        }
    }

    pub fn index(self, indexing: DayIndexing) -> i64 {
        i64::from(self.0) + indexing.offset()
    }

    fn bit(self) -> u8 {
        1 << self.0
    }
}

/// Set of weekdays backed by a seven-bit mask. Iteration is Sunday-first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    const FULL: u8 = 0b0111_1111;

    pub fn empty() -> Self {
        WeekdaySet(0)
    }

    pub fn all() -> Self {
        WeekdaySet(Self::FULL)
    }

    /// Converts tagged external indices, rejecting the whole set if any
    /// index is out of range for its declared encoding.
    pub fn from_indices<I>(indices: I, indexing: DayIndexing) -> Result<Self, ScheduleError>
    where
        I: IntoIterator,
        I::Item: Into<i64>,
    {
        indices.into_iter().try_fold(WeekdaySet::empty(), |set, index| {
            Weekday::from_index(index.into(), indexing).map(|day| set.with(day))
        })
    }

    pub fn to_indices(&self, indexing: DayIndexing) -> Vec<i16> {
        self.iter().map(|day| day.index(indexing) as i16).collect()
    }

    #[must_use]
    pub fn with(self, day: Weekday) -> Self {
        WeekdaySet(self.0 | day.bit())
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & day.bit() != 0
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_subset(&self, other: &WeekdaySet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn union(&self, other: &WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 | other.0)
    }

    pub fn intersection(&self, other: &WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 & other.0)
    }

    pub fn difference(&self, other: &WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 & !other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        (0..7u8).map(Weekday).filter(move |day| self.contains(*day))
    }
}

/// What a complementary-set computation yields when one of its inputs is
/// missing. An absent set is not the same as an empty one, so every caller
/// picks the reading that fits its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSet {
    /// Nothing can be claimed as unselected.
    Nothing,
    /// Treat the listing as open every day of the week.
    AllDays,
}

/// Days (or nights) the listing offers that the guest did not pick.
pub fn complementary(
    available: Option<&WeekdaySet>,
    selected: Option<&WeekdaySet>,
    missing: MissingSet,
) -> WeekdaySet {
    match (available, selected) {
        (Some(available), Some(selected)) => available.difference(selected),
        _ => match missing {
            MissingSet::Nothing => WeekdaySet::empty(),
            MissingSet::AllDays => WeekdaySet::all(),
        },
    }
}

/// The final partial week is counted by nights, not by a full 7-day block.
pub fn move_out_date(
    move_in_start: NaiveDate,
    span_weeks: u32,
    nights_per_week: u32,
) -> Result<NaiveDate, ScheduleError> {
    if span_weeks == 0 {
        return Err(ScheduleError::EmptySpan(span_weeks));
    }
    if !(1..=7).contains(&nights_per_week) {
        return Err(ScheduleError::NightsOutOfRange(nights_per_week));
    }
    let days = (i64::from(span_weeks) - 1) * 7 + i64::from(nights_per_week);
    Ok(move_in_start + Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(days: &[i64]) -> WeekdaySet {
        WeekdaySet::from_indices(days.iter().copied(), DayIndexing::ZeroBased).unwrap()
    }

    #[test]
    fn one_based_indices_shift_down_to_canonical() {
        let day = Weekday::from_index(1, DayIndexing::OneBased).unwrap();
        assert_eq!(day, Weekday::SUNDAY);
        assert_eq!(day.index(DayIndexing::ZeroBased), 0);
        let day = Weekday::from_index(7, DayIndexing::OneBased).unwrap();
        assert_eq!(day, Weekday::SATURDAY);
    }

    #[test]
    fn out_of_range_indices_are_rejected_per_encoding() {
        assert!(Weekday::from_index(0, DayIndexing::OneBased).is_err());
        assert!(Weekday::from_index(8, DayIndexing::OneBased).is_err());
        assert!(Weekday::from_index(7, DayIndexing::ZeroBased).is_err());
        assert!(Weekday::from_index(-1, DayIndexing::ZeroBased).is_err());

        let err = WeekdaySet::from_indices([1i64, 2, 7], DayIndexing::ZeroBased).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::IndexOutOfRange { index: 7, indexing: DayIndexing::ZeroBased }
        );
    }

    #[test]
    fn set_converts_back_to_external_encoding() {
        let days = WeekdaySet::from_indices([2i64, 3, 4, 5], DayIndexing::OneBased).unwrap();
        assert_eq!(days.to_indices(DayIndexing::ZeroBased), vec![1, 2, 3, 4]);
        assert_eq!(days.to_indices(DayIndexing::OneBased), vec![2, 3, 4, 5]);
        assert_eq!(days.len(), 4);
    }

    #[test]
    fn duplicate_indices_collapse() {
        let days = WeekdaySet::from_indices([1i64, 1, 1], DayIndexing::ZeroBased).unwrap();
        assert_eq!(days.len(), 1);
    }

    #[test]
    fn complementary_is_available_minus_selected() {
        let available = set(&[0, 1, 2, 3, 4, 5, 6]);
        let selected = set(&[1, 2, 3, 4]);
        let rest = complementary(Some(&available), Some(&selected), MissingSet::Nothing);
        assert_eq!(rest, set(&[0, 5, 6]));
        assert!(rest.intersection(&selected).is_empty());
        assert!(available.is_subset(&rest.union(&selected)));
    }

    #[test]
    fn complementary_properties_hold_for_every_subset() {
        for available_mask in 0u8..128 {
            let available = WeekdaySet(available_mask);
            for selected_mask in 0u8..128 {
                let selected = WeekdaySet(selected_mask & available_mask);
                let rest = complementary(Some(&available), Some(&selected), MissingSet::Nothing);
                assert!(rest.intersection(&selected).is_empty());
                assert!(available.is_subset(&rest.union(&selected)));
            }
        }
    }

    #[test]
    fn missing_inputs_follow_the_caller_default() {
        let selected = set(&[1, 2]);
        assert_eq!(
            complementary(None, Some(&selected), MissingSet::Nothing),
            WeekdaySet::empty()
        );
        assert_eq!(
            complementary(None, Some(&selected), MissingSet::AllDays),
            WeekdaySet::all()
        );
        let available = set(&[1, 2, 3]);
        assert_eq!(
            complementary(Some(&available), None, MissingSet::Nothing),
            WeekdaySet::empty()
        );
        // an empty set is present, not missing
        assert_eq!(
            complementary(Some(&WeekdaySet::empty()), Some(&selected), MissingSet::AllDays),
            WeekdaySet::empty()
        );
    }

    #[test]
    fn move_out_counts_final_week_by_nights() {
        let day0 = NaiveDate::from_ymd_opt(2026, 1, 4).unwrap();
        assert_eq!(move_out_date(day0, 1, 4).unwrap(), day0 + Duration::days(4));
        assert_eq!(move_out_date(day0, 13, 4).unwrap(), day0 + Duration::days(88));
        assert_eq!(move_out_date(day0, 2, 7).unwrap(), day0 + Duration::days(14));
    }

    #[test]
    fn move_out_rejects_degenerate_spans() {
        let day0 = NaiveDate::from_ymd_opt(2026, 1, 4).unwrap();
        assert_eq!(move_out_date(day0, 0, 4), Err(ScheduleError::EmptySpan(0)));
        assert_eq!(move_out_date(day0, 3, 0), Err(ScheduleError::NightsOutOfRange(0)));
        assert_eq!(move_out_date(day0, 3, 8), Err(ScheduleError::NightsOutOfRange(8)));
    }
}
