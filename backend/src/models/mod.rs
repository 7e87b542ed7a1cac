use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::StoreError;
use crate::pricing::RentalType;
use crate::schedule::{DayIndexing, Weekday, WeekdaySet};
use crate::status::ProposalStatus;

/// Weekday columns in the replica mirror the external platform's encoding.
pub const STORED_DAY_INDEXING: DayIndexing = DayIndexing::OneBased;

fn stored_days(column: &str, values: Vec<i16>) -> Result<WeekdaySet, StoreError> {
    WeekdaySet::from_indices(values, STORED_DAY_INDEXING)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

fn stored_day(column: &str, value: i16) -> Result<Weekday, StoreError> {
    Weekday::from_index(value.into(), STORED_DAY_INDEXING)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::listings)]
pub struct ListingRow {
    pub id: Uuid,
    pub host_id: Uuid,
    pub rental_type: Option<String>,
    pub available_days: Option<Vec<i16>>,
    pub available_nights: Option<Vec<i16>>,
    pub weekly_rate: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
    pub nightly_rates: serde_json::Value,
    pub house_rules: Vec<String>,
    pub cleaning_fee: Decimal,
    pub damage_deposit: Decimal,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub host_id: Uuid,
    pub rental_type: Option<String>,
    pub available_days: Option<WeekdaySet>,
    pub available_nights: Option<WeekdaySet>,
    pub weekly_rate: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
    /// Host rate per night, indexed by nights-per-week minus one.
    pub nightly_rates: Vec<Option<Decimal>>,
    pub house_rules: Vec<String>,
    pub cleaning_fee: Decimal,
    pub damage_deposit: Decimal,
    pub address: String,
}

impl Listing {
    pub fn nightly_rate_for(&self, nights_per_week: u32) -> Option<Decimal> {
        let tier = usize::try_from(nights_per_week).ok()?.checked_sub(1)?;
        self.nightly_rates.get(tier).copied().flatten()
    }
}

impl TryFrom<ListingRow> for Listing {
    type Error = StoreError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let nightly_rates = serde_json::from_value(row.nightly_rates)
            .map_err(|e| StoreError::Corrupt(format!("nightly_rates: {}", e)))?;
        Ok(Listing {
            id: row.id,
            host_id: row.host_id,
            rental_type: row.rental_type,
            available_days: row
                .available_days
                .map(|days| stored_days("available_days", days))
                .transpose()?,
            available_nights: row
                .available_nights
                .map(|nights| stored_days("available_nights", nights))
                .transpose()?,
            weekly_rate: row.weekly_rate,
            monthly_rate: row.monthly_rate,
            nightly_rates,
            house_rules: row.house_rules,
            cleaning_fee: row.cleaning_fee,
            damage_deposit: row.damage_deposit,
            address: row.address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub proposal_ids: Vec<Uuid>,
    pub favorite_listing_ids: Vec<Uuid>,
    pub about_me: Option<String>,
    pub need_for_space: Option<String>,
    pub special_needs: Option<String>,
    pub rental_application_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields a proposal may fill in on the guest record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub about_me: Option<String>,
    pub need_for_space: Option<String>,
    pub special_needs: Option<String>,
}

impl ProfilePatch {
    /// Keeps only the offered values whose field is blank on `user`.
    pub fn for_blank_fields(user: &User, offered: ProfilePatch) -> ProfilePatch {
        fn blank(value: &Option<String>) -> bool {
            value.as_deref().map_or(true, |v| v.trim().is_empty())
        }
        fn keep(current: &Option<String>, offered: Option<String>) -> Option<String> {
            offered.filter(|v| !v.trim().is_empty() && blank(current))
        }
        ProfilePatch {
            about_me: keep(&user.about_me, offered.about_me),
            need_for_space: keep(&user.need_for_space, offered.need_for_space),
            special_needs: keep(&user.special_needs, offered.special_needs),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.about_me.is_none() && self.need_for_space.is_none() && self.special_needs.is_none()
    }

    /// Writes the offered values into the blank fields of `user` and
    /// returns what was actually written.
    pub fn fill_blank(&self, user: &mut User) -> ProfilePatch {
        let applied = ProfilePatch::for_blank_fields(user, self.clone());
        applied.apply(user);
        applied
    }

    fn apply(&self, user: &mut User) {
        if let Some(v) = &self.about_me {
            user.about_me = Some(v.clone());
        }
        if let Some(v) = &self.need_for_space {
            user.need_for_space = Some(v.clone());
        }
        if let Some(v) = &self.special_needs {
            user.special_needs = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::rental_applications)]
pub struct RentalApplication {
    pub id: Uuid,
    pub guest_id: Uuid,
    pub submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
    pub move_in_start: NaiveDate,
    pub move_in_end: NaiveDate,
    pub move_out: NaiveDate,
    pub reservation_span_label: String,
    pub reservation_span_weeks: u32,
    pub days_selected: WeekdaySet,
    pub nights_selected: WeekdaySet,
    pub complementary_days: WeekdaySet,
    pub complementary_nights: WeekdaySet,
    pub check_in_day: Weekday,
    pub check_out_day: Weekday,
    pub rental_type: RentalType,
    pub proposed_nightly_price: Decimal,
    pub total_guest_price: Decimal,
    pub total_host_compensation: Decimal,
    pub four_week_rent: Decimal,
    pub host_rate: Decimal,
    pub duration_months: Decimal,
    pub cleaning_fee: Decimal,
    pub damage_deposit: Decimal,
    pub need_for_space: String,
    pub about_me: String,
    pub special_needs: Option<String>,
    pub guest_flexibility: Option<String>,
    pub preferred_gender: Option<String>,
    pub suggestion_metadata: Option<serde_json::Value>,
    pub status: ProposalStatus,
    pub status_history: Vec<String>,
    pub order_ranking: i32,
    pub finalized: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn nights_per_week(&self) -> u32 {
        self.nights_selected.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::proposals)]
pub struct ProposalRow {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
    pub move_in_start: NaiveDate,
    pub move_in_end: NaiveDate,
    pub move_out: NaiveDate,
    pub reservation_span_label: String,
    pub reservation_span_weeks: i32,
    pub days_selected: Vec<i16>,
    pub nights_selected: Vec<i16>,
    pub complementary_days: Vec<i16>,
    pub complementary_nights: Vec<i16>,
    pub check_in_day: i16,
    pub check_out_day: i16,
    pub nights_per_week: i32,
    pub rental_type: String,
    pub proposed_nightly_price: Decimal,
    pub total_guest_price: Decimal,
    pub total_host_compensation: Decimal,
    pub four_week_rent: Decimal,
    pub host_rate: Decimal,
    pub duration_months: Decimal,
    pub cleaning_fee: Decimal,
    pub damage_deposit: Decimal,
    pub need_for_space: String,
    pub about_me: String,
    pub special_needs: Option<String>,
    pub guest_flexibility: Option<String>,
    pub preferred_gender: Option<String>,
    pub suggestion_metadata: Option<serde_json::Value>,
    pub status: String,
    pub status_history: Vec<String>,
    pub order_ranking: i32,
    pub finalized: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Proposal> for ProposalRow {
    fn from(p: &Proposal) -> Self {
        ProposalRow {
            id: p.id,
            listing_id: p.listing_id,
            guest_id: p.guest_id,
            host_id: p.host_id,
            move_in_start: p.move_in_start,
            move_in_end: p.move_in_end,
            move_out: p.move_out,
            reservation_span_label: p.reservation_span_label.clone(),
            reservation_span_weeks: p.reservation_span_weeks as i32,
            days_selected: p.days_selected.to_indices(STORED_DAY_INDEXING),
            nights_selected: p.nights_selected.to_indices(STORED_DAY_INDEXING),
            complementary_days: p.complementary_days.to_indices(STORED_DAY_INDEXING),
            complementary_nights: p.complementary_nights.to_indices(STORED_DAY_INDEXING),
            check_in_day: p.check_in_day.index(STORED_DAY_INDEXING) as i16,
            check_out_day: p.check_out_day.index(STORED_DAY_INDEXING) as i16,
            nights_per_week: p.nights_per_week() as i32,
            rental_type: p.rental_type.to_string(),
            proposed_nightly_price: p.proposed_nightly_price,
            total_guest_price: p.total_guest_price,
            total_host_compensation: p.total_host_compensation,
            four_week_rent: p.four_week_rent,
            host_rate: p.host_rate,
            duration_months: p.duration_months,
            cleaning_fee: p.cleaning_fee,
            damage_deposit: p.damage_deposit,
            need_for_space: p.need_for_space.clone(),
            about_me: p.about_me.clone(),
            special_needs: p.special_needs.clone(),
            guest_flexibility: p.guest_flexibility.clone(),
            preferred_gender: p.preferred_gender.clone(),
            suggestion_metadata: p.suggestion_metadata.clone(),
            status: p.status.display().to_string(),
            status_history: p.status_history.clone(),
            order_ranking: p.order_ranking,
            finalized: p.finalized,
            deleted: p.deleted,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = StoreError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("proposal {}: {}", row.id, e)))?;
        let rental_type = row
            .rental_type
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("proposal {}: rental type", row.id)))?;
        Ok(Proposal {
            id: row.id,
            listing_id: row.listing_id,
            guest_id: row.guest_id,
            host_id: row.host_id,
            move_in_start: row.move_in_start,
            move_in_end: row.move_in_end,
            move_out: row.move_out,
            reservation_span_label: row.reservation_span_label,
            reservation_span_weeks: u32::try_from(row.reservation_span_weeks)
                .map_err(|e| StoreError::Corrupt(format!("reservation_span_weeks: {}", e)))?,
            days_selected: stored_days("days_selected", row.days_selected)?,
            nights_selected: stored_days("nights_selected", row.nights_selected)?,
            complementary_days: stored_days("complementary_days", row.complementary_days)?,
            complementary_nights: stored_days("complementary_nights", row.complementary_nights)?,
            check_in_day: stored_day("check_in_day", row.check_in_day)?,
            check_out_day: stored_day("check_out_day", row.check_out_day)?,
            rental_type,
            proposed_nightly_price: row.proposed_nightly_price,
            total_guest_price: row.total_guest_price,
            total_host_compensation: row.total_host_compensation,
            four_week_rent: row.four_week_rent,
            host_rate: row.host_rate,
            duration_months: row.duration_months,
            cleaning_fee: row.cleaning_fee,
            damage_deposit: row.damage_deposit,
            need_for_space: row.need_for_space,
            about_me: row.about_me,
            special_needs: row.special_needs,
            guest_flexibility: row.guest_flexibility,
            preferred_gender: row.preferred_gender,
            suggestion_metadata: row.suggestion_metadata,
            status,
            status_history: row.status_history,
            order_ranking: row.order_ranking,
            finalized: row.finalized,
            deleted: row.deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// What API callers see of a proposal.
#[derive(Debug, Serialize)]
pub struct ProposalView {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
    pub move_in_start: NaiveDate,
    pub move_in_end: NaiveDate,
    pub move_out: NaiveDate,
    pub reservation_span_weeks: u32,
    pub days_selected: Vec<i16>,
    pub nights_selected: Vec<i16>,
    pub rental_type: RentalType,
    pub total_guest_price: Decimal,
    pub total_host_compensation: Decimal,
    pub four_week_rent: Decimal,
    pub status: String,
    pub stage: i8,
    pub status_history: Vec<String>,
    pub order_ranking: i32,
}

impl From<&Proposal> for ProposalView {
    fn from(p: &Proposal) -> Self {
        ProposalView {
            id: p.id,
            listing_id: p.listing_id,
            guest_id: p.guest_id,
            host_id: p.host_id,
            move_in_start: p.move_in_start,
            move_in_end: p.move_in_end,
            move_out: p.move_out,
            reservation_span_weeks: p.reservation_span_weeks,
            days_selected: p.days_selected.to_indices(DayIndexing::ZeroBased),
            nights_selected: p.nights_selected.to_indices(DayIndexing::ZeroBased),
            rental_type: p.rental_type,
            total_guest_price: p.total_guest_price,
            total_host_compensation: p.total_host_compensation,
            four_week_rent: p.four_week_rent,
            status: p.status.display().to_string(),
            stage: p.status.stage(),
            status_history: p.status_history.clone(),
            order_ranking: p.order_ranking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = crate::schema::sync_queue)]
pub struct NewSyncQueueItem {
    pub correlation_id: String,
    pub sequence: i32,
    pub table_name: String,
    pub record_id: String,
    pub operation: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub idempotency_key: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}
