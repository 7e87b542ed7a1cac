//! Proposal creation and cancellation.
//!
//! Creation is one sequential path: validate, resolve references, price,
//! pick the initial status and persist. Only the proposal insert may fail
//! the request. Guest and host bookkeeping afterwards is best-effort, and
//! whatever did land in the replica is handed to the outbox.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::{ProposalStore, StoreError};
use crate::error::{ProposalError, ValidationError};
use crate::models::{ProfilePatch, Proposal, ProposalRow};
use crate::outbox::{Mutation, Operation, Outbox};
use crate::pricing::{self, CompensationInput, RentalType};
use crate::schedule::{self, DayIndexing, MissingSet, Weekday, WeekdaySet};
use crate::status::{self, ProposalStatus, Role};

const PROPOSALS_TABLE: &str = "proposals";
const USERS_TABLE: &str = "users";
/// Attempts at the ranking insert or a status transition before giving up
/// to a concurrent writer.
const WRITE_ATTEMPTS: u32 = 3;

/// Creation request as it arrives over the wire. Every field is optional
/// here so that missing ones surface as validation errors naming the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProposalRequest {
    pub guest_id: Option<Uuid>,
    pub listing_id: Option<Uuid>,
    pub move_in_start: Option<NaiveDate>,
    pub move_in_end: Option<NaiveDate>,
    /// Encoding of every day index in this request.
    pub day_indexing: Option<DayIndexing>,
    pub days_selected: Option<Vec<i64>>,
    pub nights_selected: Option<Vec<i64>>,
    pub reservation_span: Option<String>,
    pub reservation_span_weeks: Option<u32>,
    pub check_in_day: Option<i64>,
    pub check_out_day: Option<i64>,
    pub proposed_nightly_price: Option<Decimal>,
    pub four_week_rent: Option<Decimal>,
    /// Per-night host compensation quoted to the guest.
    pub host_compensation: Option<Decimal>,
    pub need_for_space: Option<String>,
    pub about_me: Option<String>,
    pub estimated_booking_total: Option<Decimal>,
    pub guest_flexibility: Option<String>,
    pub preferred_gender: Option<String>,
    pub special_needs: Option<String>,
    pub status: Option<String>,
    pub suggestion_metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
struct ValidatedRequest {
    guest_id: Uuid,
    listing_id: Uuid,
    move_in_start: NaiveDate,
    move_in_end: NaiveDate,
    days_selected: WeekdaySet,
    nights_selected: WeekdaySet,
    reservation_span: String,
    reservation_span_weeks: u32,
    check_in_day: Weekday,
    check_out_day: Weekday,
    proposed_nightly_price: Decimal,
    host_compensation: Decimal,
    estimated_booking_total: Decimal,
    need_for_space: String,
    about_me: String,
    guest_flexibility: Option<String>,
    preferred_gender: Option<String>,
    special_needs: Option<String>,
    status: Option<String>,
    suggestion_metadata: Option<Value>,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn amount(value: Option<Decimal>, field: &'static str) -> Result<Decimal, ValidationError> {
    let value = required(value, field)?;
    if value >= Decimal::ZERO {
        Ok(value)
    } else {
        Err(ValidationError::InvalidField {
            field,
            reason: "must be a non-negative amount".into(),
        })
    }
}

fn day_set(
    values: Option<Vec<i64>>,
    indexing: DayIndexing,
    field: &'static str,
) -> Result<WeekdaySet, ValidationError> {
    let set = WeekdaySet::from_indices(required(values, field)?, indexing)
        .map_err(|source| ValidationError::DayIndex { field, source })?;
    if set.is_empty() {
        return Err(ValidationError::InvalidField {
            field,
            reason: "at least one day is required".into(),
        });
    }
    Ok(set)
}

fn day(value: Option<i64>, indexing: DayIndexing, field: &'static str) -> Result<Weekday, ValidationError> {
    Weekday::from_index(required(value, field)?, indexing)
        .map_err(|source| ValidationError::DayIndex { field, source })
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CreateProposalRequest {
    fn validate(self) -> Result<ValidatedRequest, ValidationError> {
        let guest_id = required(self.guest_id, "guest_id")?;
        let listing_id = required(self.listing_id, "listing_id")?;
        let move_in_start = required(self.move_in_start, "move_in_start")?;
        let move_in_end = required(self.move_in_end, "move_in_end")?;
        if move_in_start > move_in_end {
            return Err(ValidationError::InvertedMoveIn {
                start: move_in_start,
                end: move_in_end,
            });
        }

        let indexing = required(self.day_indexing, "day_indexing")?;
        let days_selected = day_set(self.days_selected, indexing, "days_selected")?;
        let nights_selected = day_set(self.nights_selected, indexing, "nights_selected")?;
        let check_in_day = day(self.check_in_day, indexing, "check_in_day")?;
        let check_out_day = day(self.check_out_day, indexing, "check_out_day")?;

        let reservation_span_weeks = required(self.reservation_span_weeks, "reservation_span_weeks")?;
        if reservation_span_weeks == 0 {
            return Err(ValidationError::InvalidField {
                field: "reservation_span_weeks",
                reason: "must be at least one week".into(),
            });
        }
        // quoted by the client; the stored figure is recomputed
        amount(self.four_week_rent, "four_week_rent")?;

        Ok(ValidatedRequest {
            guest_id,
            listing_id,
            move_in_start,
            move_in_end,
            days_selected,
            nights_selected,
            reservation_span: required_text(self.reservation_span, "reservation_span")?,
            reservation_span_weeks,
            check_in_day,
            check_out_day,
            proposed_nightly_price: amount(self.proposed_nightly_price, "proposed_nightly_price")?,
            host_compensation: amount(self.host_compensation, "host_compensation")?,
            estimated_booking_total: amount(self.estimated_booking_total, "estimated_booking_total")?,
            need_for_space: required_text(self.need_for_space, "need_for_space")?,
            about_me: required_text(self.about_me, "about_me")?,
            guest_flexibility: blank_to_none(self.guest_flexibility),
            preferred_gender: blank_to_none(self.preferred_gender),
            special_needs: blank_to_none(self.special_needs),
            status: blank_to_none(self.status),
            suggestion_metadata: self.suggestion_metadata,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedProposal {
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    pub order_ranking: i32,
}

/// The authenticated caller of a proposal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

fn history_entry(at: DateTime<Utc>, status: ProposalStatus, note: Option<&str>) -> String {
    let stamp = at.format("%Y-%m-%d %H:%M UTC");
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => format!("{} - {} ({})", stamp, status, note),
        None => format!("{} - {}", stamp, status),
    }
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!("Could not serialize sync payload: {}", e);
        Value::Null
    })
}

/// Logs a failed secondary write with what is needed to replay it.
fn best_effort<T>(operation: &str, record: Uuid, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Best-effort write '{}' on user {} failed: {}", operation, record, e);
            None
        }
    }
}

#[derive(Clone)]
pub struct ProposalService {
    store: Arc<dyn ProposalStore>,
    outbox: Outbox,
    missing_availability: MissingSet,
}

impl ProposalService {
    pub fn new(store: Arc<dyn ProposalStore>, outbox: Outbox) -> Self {
        Self {
            store,
            outbox,
            missing_availability: MissingSet::Nothing,
        }
    }

    /// How complementary days and nights read a listing with no recorded
    /// availability.
    pub fn with_missing_availability(mut self, missing: MissingSet) -> Self {
        self.missing_availability = missing;
        self
    }

    pub fn create(&self, request: CreateProposalRequest) -> Result<CreatedProposal, ProposalError> {
        let req = request.validate()?;

        let listing = self
            .store
            .find_listing(req.listing_id)?
            .ok_or(ValidationError::ListingNotFound(req.listing_id))?;
        let guest = self
            .store
            .find_user(req.guest_id)?
            .ok_or(ValidationError::GuestNotFound(req.guest_id))?;
        let host = self
            .store
            .find_user(listing.host_id)?
            .ok_or(ValidationError::HostNotFound(listing.host_id))?;

        let application_submitted = match guest.rental_application_id {
            Some(id) => self.store.find_rental_application(id)?.map(|app| app.submitted),
            None => None,
        };

        let nights_per_week = req.nights_selected.len();
        let move_out = schedule::move_out_date(
            req.move_in_start,
            req.reservation_span_weeks,
            nights_per_week,
        )
        .map_err(|source| ValidationError::DayIndex { field: "nights_selected", source })?;
        if !req.days_selected.is_subset(&listing.available_days.unwrap_or_else(WeekdaySet::all)) {
            warn!("Guest {} selected days outside listing {} availability", guest.id, listing.id);
        }
        let complementary_days = schedule::complementary(
            listing.available_days.as_ref(),
            Some(&req.days_selected),
            self.missing_availability,
        );
        let complementary_nights = schedule::complementary(
            listing.available_nights.as_ref(),
            Some(&req.nights_selected),
            self.missing_availability,
        );

        let rental_type = RentalType::resolve(listing.rental_type.as_deref());
        let nightly_rate = listing.nightly_rate_for(nights_per_week).unwrap_or_else(|| {
            warn!(
                "Listing {} has no {}-night rate, using quoted host compensation",
                listing.id, nights_per_week
            );
            req.host_compensation
        });
        let compensation = pricing::calculate_compensation(&CompensationInput {
            rental_type,
            nights_per_week,
            weekly_rate: listing
                .weekly_rate
                .unwrap_or(nightly_rate * Decimal::from(nights_per_week)),
            nightly_rate,
            weeks: req.reservation_span_weeks,
            monthly_rate: listing.monthly_rate,
        });
        let total_guest_price = pricing::guest_total(
            req.proposed_nightly_price,
            nights_per_week,
            req.reservation_span_weeks,
        );
        if (total_guest_price - req.estimated_booking_total).abs() > Decimal::new(1, 2) {
            warn!(
                "Estimated booking total {} differs from computed {} for guest {}",
                req.estimated_booking_total, total_guest_price, guest.id
            );
        }

        let status = status::initial_status(req.status.as_deref(), application_submitted);
        let now = Utc::now();

        let mut proposal = Proposal {
            id: Uuid::new_v4(),
            listing_id: listing.id,
            guest_id: guest.id,
            host_id: host.id,
            move_in_start: req.move_in_start,
            move_in_end: req.move_in_end,
            move_out,
            reservation_span_label: req.reservation_span,
            reservation_span_weeks: req.reservation_span_weeks,
            days_selected: req.days_selected,
            nights_selected: req.nights_selected,
            complementary_days,
            complementary_nights,
            check_in_day: req.check_in_day,
            check_out_day: req.check_out_day,
            rental_type,
            proposed_nightly_price: req.proposed_nightly_price,
            total_guest_price,
            total_host_compensation: compensation.total_compensation,
            four_week_rent: compensation.four_week_rent,
            host_rate: compensation.host_rate,
            duration_months: compensation.duration_months,
            cleaning_fee: listing.cleaning_fee,
            damage_deposit: listing.damage_deposit,
            need_for_space: req.need_for_space.clone(),
            about_me: req.about_me.clone(),
            special_needs: req.special_needs.clone(),
            guest_flexibility: req.guest_flexibility,
            preferred_gender: req.preferred_gender,
            suggestion_metadata: req.suggestion_metadata,
            status,
            status_history: vec![history_entry(now, status, None)],
            order_ranking: 0,
            finalized: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.insert_ranked(&mut proposal)?;
        info!(
            "Created proposal {} for guest {} on listing {} ({}, rank {})",
            proposal.id, guest.id, listing.id, status, proposal.order_ranking
        );

        let mut mutations = vec![Mutation::new(
            1,
            PROPOSALS_TABLE,
            proposal.id,
            Operation::Insert,
            to_payload(&ProposalRow::from(&proposal)),
        )];

        if let Some(user) = best_effort(
            "append guest proposal",
            guest.id,
            self.store.append_user_proposal(guest.id, proposal.id),
        ) {
            mutations.push(Mutation::new(
                2,
                USERS_TABLE,
                user.id,
                Operation::Update,
                json!({ "proposal_ids": user.proposal_ids }),
            ));
        }

        if let Some(Some(user)) = best_effort(
            "add favorite listing",
            guest.id,
            self.store.add_favorite_listing(guest.id, listing.id),
        ) {
            mutations.push(Mutation::new(
                3,
                USERS_TABLE,
                user.id,
                Operation::Update,
                json!({ "favorite_listing_ids": user.favorite_listing_ids }),
            ));
        }

        let offered = ProfilePatch {
            about_me: Some(req.about_me),
            need_for_space: Some(req.need_for_space),
            special_needs: req.special_needs,
        };
        if let Some(Some((user, applied))) = best_effort(
            "fill guest profile",
            guest.id,
            self.store.fill_blank_profile(guest.id, &offered),
        ) {
            let mut fields = serde_json::Map::new();
            let written = [
                ("about_me", applied.about_me),
                ("need_for_space", applied.need_for_space),
                ("special_needs", applied.special_needs),
            ];
            for (name, value) in written {
                if let Some(value) = value {
                    fields.insert(name.to_string(), json!(value));
                }
            }
            mutations.push(Mutation::new(
                4,
                USERS_TABLE,
                user.id,
                Operation::Update,
                Value::Object(fields),
            ));
        }

        if let Some(user) = best_effort(
            "append host proposal",
            host.id,
            self.store.append_user_proposal(host.id, proposal.id),
        ) {
            mutations.push(Mutation::new(
                5,
                USERS_TABLE,
                user.id,
                Operation::Update,
                json!({ "proposal_ids": user.proposal_ids }),
            ));
        }

        self.outbox
            .enqueue(&format!("create-proposal:{}", proposal.id), mutations);

        Ok(CreatedProposal {
            proposal_id: proposal.id,
            status,
            order_ranking: proposal.order_ranking,
        })
    }

    /// Ranks the proposal after every earlier one by the same guest and
    /// inserts it. A ranking claimed concurrently is recounted.
    fn insert_ranked(&self, proposal: &mut Proposal) -> Result<(), ProposalError> {
        let mut attempt = 1;
        loop {
            let prior = self.store.count_guest_proposals(proposal.guest_id)?;
            proposal.order_ranking = i32::try_from(prior + 1)
                .map_err(|e| StoreError::Corrupt(format!("order ranking: {}", e)))?;
            match self.store.insert_proposal(proposal) {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(detail)) if attempt < WRITE_ATTEMPTS => {
                    warn!(
                        "Order ranking {} for guest {} was taken ({}), recounting",
                        proposal.order_ranking, proposal.guest_id, detail
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Guests and hosts see only their own proposals; admins see all.
    pub fn get(&self, actor: &Actor, proposal_id: Uuid) -> Result<Proposal, ProposalError> {
        let proposal = self
            .store
            .find_proposal(proposal_id)?
            .ok_or(ProposalError::NotFound(proposal_id))?;
        let visible = match actor.role {
            Role::Admin => true,
            Role::Guest => proposal.guest_id == actor.user_id,
            Role::Host => proposal.host_id == actor.user_id,
        };
        if visible {
            Ok(proposal)
        } else {
            Err(ProposalError::NotFound(proposal_id))
        }
    }

    /// Moves the proposal to the actor's terminal status when their role
    /// allows it from the current status.
    pub fn cancel(
        &self,
        actor: &Actor,
        proposal_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Proposal, ProposalError> {
        for _ in 0..WRITE_ATTEMPTS {
            let proposal = self
                .store
                .find_proposal(proposal_id)?
                .ok_or(ProposalError::NotFound(proposal_id))?;
            let owner = match actor.role {
                Role::Admin => true,
                Role::Guest => proposal.guest_id == actor.user_id,
                Role::Host => proposal.host_id == actor.user_id,
            };
            if !owner {
                return Err(ProposalError::Forbidden(format!(
                    "user {} is not a party to proposal {}",
                    actor.user_id, proposal_id
                )));
            }

            let target = status::cancellation_target(actor.role, proposal.status)?;
            let now = Utc::now();
            let Some(updated) = self.store.transition_proposal_status(
                proposal_id,
                proposal.status,
                target,
                &history_entry(now, target, reason),
                now,
            )?
            else {
                debug!(
                    "Proposal {} left '{}' before it could be cancelled, re-reading",
                    proposal_id, proposal.status
                );
                continue;
            };
            info!(
                "Proposal {} moved from '{}' to '{}' by {:?} {}",
                proposal_id, proposal.status, target, actor.role, actor.user_id
            );

            self.outbox.enqueue(
                &format!("cancel-proposal:{}", proposal_id),
                vec![Mutation::new(
                    1,
                    PROPOSALS_TABLE,
                    proposal_id,
                    Operation::Update,
                    json!({
                        "status": updated.status.display(),
                        "status_history": updated.status_history,
                    }),
                )],
            );
            return Ok(updated);
        }
        Err(ProposalError::Contended(proposal_id))
    }
}
