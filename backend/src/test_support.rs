//! In-memory stores and fixtures for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{InsertOutcome, OutboxStore, ProposalStore, StoreError};
use crate::models::{Listing, NewSyncQueueItem, ProfilePatch, Proposal, RentalApplication, User};
use crate::outbox::{Outbox, QueueTrigger};
use crate::proposal::CreateProposalRequest;
use crate::schedule::{DayIndexing, WeekdaySet};
use crate::status::ProposalStatus;

#[derive(Default)]
struct Tables {
    listings: HashMap<Uuid, Listing>,
    users: HashMap<Uuid, User>,
    applications: HashMap<Uuid, RentalApplication>,
    proposals: Vec<Proposal>,
    queue: Vec<NewSyncQueueItem>,
    fail_user_updates: bool,
    fail_proposal_insert: bool,
    fail_queue_inserts: bool,
    ranking_taken_on_next_insert: bool,
    status_changed_before_next_transition: Option<ProposalStatus>,
    edit_before_next_user_write: Option<Box<dyn FnOnce(&mut User) + Send>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn injected() -> StoreError {
    StoreError::Query(diesel::result::Error::BrokenTransactionManager)
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn put_listing(&self, listing: Listing) {
        self.tables().listings.insert(listing.id, listing);
    }

    pub fn put_user(&self, user: User) {
        self.tables().users.insert(user.id, user);
    }

    pub fn put_application(&self, application: RentalApplication) {
        self.tables().applications.insert(application.id, application);
    }

    pub fn user(&self, id: Uuid) -> User {
        self.tables().users[&id].clone()
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.tables().proposals.clone()
    }

    pub fn queue_rows(&self) -> Vec<NewSyncQueueItem> {
        self.tables().queue.clone()
    }

    pub fn fail_user_updates(&self, fail: bool) {
        self.tables().fail_user_updates = fail;
    }

    pub fn fail_proposal_insert(&self, fail: bool) {
        self.tables().fail_proposal_insert = fail;
    }

    pub fn fail_queue_inserts(&self, fail: bool) {
        self.tables().fail_queue_inserts = fail;
    }

    /// The next proposal insert finds its order ranking already claimed by
    /// a concurrent creation for the same guest.
    pub fn take_ranking_on_next_insert(&self) {
        self.tables().ranking_taken_on_next_insert = true;
    }

    /// Another writer edits the user just before the next locked user write.
    pub fn edit_before_next_user_write(&self, edit: impl FnOnce(&mut User) + Send + 'static) {
        self.tables().edit_before_next_user_write = Some(Box::new(edit));
    }

    /// Another writer moves the proposal to `status` just before the next
    /// status transition locks it.
    pub fn change_status_before_next_transition(&self, status: ProposalStatus) {
        self.tables().status_changed_before_next_transition = Some(status);
    }

    fn modify_user<F>(&self, user_id: Uuid, change: F) -> Result<Option<User>, StoreError>
    where
        F: FnOnce(&mut User) -> bool,
    {
        let mut tables = self.tables();
        if tables.fail_user_updates {
            return Err(injected());
        }
        let edit = tables.edit_before_next_user_write.take();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        if let Some(edit) = edit {
            edit(user);
        }
        if !change(user) {
            return Ok(None);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}

impl ProposalStore for MemoryStore {
    fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, StoreError> {
        Ok(self.tables().listings.get(&id).cloned())
    }

    fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables().users.get(&id).cloned())
    }

    fn find_rental_application(&self, id: Uuid) -> Result<Option<RentalApplication>, StoreError> {
        Ok(self.tables().applications.get(&id).cloned())
    }

    fn count_guest_proposals(&self, guest_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .tables()
            .proposals
            .iter()
            .filter(|p| p.guest_id == guest_id)
            .count() as i64)
    }

    fn insert_proposal(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.fail_proposal_insert {
            return Err(injected());
        }
        if std::mem::take(&mut tables.ranking_taken_on_next_insert) {
            let mut rival = proposal.clone();
            rival.id = Uuid::new_v4();
            tables.proposals.push(rival);
        }
        if tables
            .proposals
            .iter()
            .any(|p| p.guest_id == proposal.guest_id && p.order_ranking == proposal.order_ranking)
        {
            return Err(StoreError::Conflict(format!(
                "guest {} already has order ranking {}",
                proposal.guest_id, proposal.order_ranking
            )));
        }
        tables.proposals.push(proposal.clone());
        Ok(())
    }

    fn find_proposal(&self, id: Uuid) -> Result<Option<Proposal>, StoreError> {
        Ok(self
            .tables()
            .proposals
            .iter()
            .find(|p| p.id == id && !p.deleted)
            .cloned())
    }

    fn transition_proposal_status(
        &self,
        id: Uuid,
        from: ProposalStatus,
        to: ProposalStatus,
        history_entry: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Proposal>, StoreError> {
        let mut tables = self.tables();
        let interleaved = tables.status_changed_before_next_transition.take();
        let Some(proposal) = tables.proposals.iter_mut().find(|p| p.id == id && !p.deleted) else {
            return Ok(None);
        };
        if let Some(status) = interleaved {
            proposal.status = status;
            proposal.status_history.push(status.display().to_string());
        }
        if proposal.status != from {
            return Ok(None);
        }
        proposal.status = to;
        proposal.status_history.push(history_entry.to_string());
        proposal.updated_at = at;
        Ok(Some(proposal.clone()))
    }

    fn append_user_proposal(&self, user_id: Uuid, proposal_id: Uuid) -> Result<User, StoreError> {
        let changed = self.modify_user(user_id, |user| {
            if user.proposal_ids.contains(&proposal_id) {
                return false;
            }
            user.proposal_ids.push(proposal_id);
            true
        })?;
        Ok(changed.unwrap_or_else(|| self.user(user_id)))
    }

    fn add_favorite_listing(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        self.modify_user(user_id, |user| {
            if user.favorite_listing_ids.contains(&listing_id) {
                return false;
            }
            user.favorite_listing_ids.push(listing_id);
            true
        })
    }

    fn fill_blank_profile(
        &self,
        user_id: Uuid,
        offered: &ProfilePatch,
    ) -> Result<Option<(User, ProfilePatch)>, StoreError> {
        let mut applied = ProfilePatch::default();
        let updated = self.modify_user(user_id, |user| {
            applied = offered.fill_blank(user);
            !applied.is_empty()
        })?;
        Ok(updated.map(|user| (user, applied)))
    }
}

impl OutboxStore for MemoryStore {
    fn insert_pending(&self, item: &NewSyncQueueItem) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables();
        if tables.fail_queue_inserts {
            return Err(injected());
        }
        if tables
            .queue
            .iter()
            .any(|row| row.idempotency_key == item.idempotency_key)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        tables.queue.push(item.clone());
        Ok(InsertOutcome::Inserted)
    }
}

#[derive(Default)]
pub struct RecordingTrigger {
    fired: Mutex<Vec<String>>,
}

impl RecordingTrigger {
    pub fn fired(&self) -> Vec<String> {
        self.fired.lock().unwrap().clone()
    }
}

impl QueueTrigger for RecordingTrigger {
    fn fire(&self, correlation_id: &str) {
        self.fired.lock().unwrap().push(correlation_id.to_string());
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub trigger: Arc<RecordingTrigger>,
    pub outbox: Outbox,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
}

pub fn user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        proposal_ids: vec![],
        favorite_listing_ids: vec![],
        about_me: None,
        need_for_space: None,
        special_needs: None,
        rental_application_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// A nightly listing open all week at $50 a night for four-night stays.
pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::default());
    let trigger = Arc::new(RecordingTrigger::default());
    let outbox = Outbox::new(store.clone(), trigger.clone());

    let host = user("host@example.com");
    let guest = user("guest@example.com");
    let listing = Listing {
        id: Uuid::new_v4(),
        host_id: host.id,
        rental_type: Some("nightly".into()),
        available_days: Some(WeekdaySet::all()),
        available_nights: Some(WeekdaySet::all()),
        weekly_rate: Some(Decimal::from(300)),
        monthly_rate: None,
        nightly_rates: [80, 70, 60, 50, 45].into_iter().map(|rate| Some(Decimal::from(rate))).collect(),
        house_rules: vec!["No smoking".into()],
        cleaning_fee: Decimal::from(75),
        damage_deposit: Decimal::from(500),
        address: "12 Harbor Way".into(),
    };

    let fixture = Fixture {
        listing_id: listing.id,
        guest_id: guest.id,
        host_id: host.id,
        store,
        trigger,
        outbox,
    };
    fixture.store.put_user(host);
    fixture.store.put_user(guest);
    fixture.store.put_listing(listing);
    fixture
}

/// Four nights a week (Mon-Thu nights, Mon-Fri days) for 13 weeks.
pub fn request(fixture: &Fixture) -> CreateProposalRequest {
    CreateProposalRequest {
        guest_id: Some(fixture.guest_id),
        listing_id: Some(fixture.listing_id),
        move_in_start: NaiveDate::from_ymd_opt(2026, 11, 2),
        move_in_end: NaiveDate::from_ymd_opt(2026, 11, 9),
        day_indexing: Some(DayIndexing::ZeroBased),
        days_selected: Some(vec![1, 2, 3, 4, 5]),
        nights_selected: Some(vec![1, 2, 3, 4]),
        reservation_span: Some("13 weeks (3 months)".into()),
        reservation_span_weeks: Some(13),
        check_in_day: Some(1),
        check_out_day: Some(5),
        proposed_nightly_price: Some(Decimal::from(50)),
        four_week_rent: Some(Decimal::from(800)),
        host_compensation: Some(Decimal::from(50)),
        need_for_space: Some("Weekday commute to the hospital".into()),
        about_me: Some("Night-shift nurse, quiet".into()),
        estimated_booking_total: Some(Decimal::from(2600)),
        guest_flexibility: None,
        preferred_gender: None,
        special_needs: None,
        status: None,
        suggestion_metadata: None,
    }
}
