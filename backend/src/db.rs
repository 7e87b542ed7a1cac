use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use log::{error, info};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Listing, ListingRow, NewSyncQueueItem, ProfilePatch, Proposal, ProposalRow,
    RentalApplication, User,
};
use crate::schema::{listings, proposals, rental_applications, sync_queue, users};
use crate::status::ProposalStatus;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub fn establish_pool(database_url: &str, max_size: u32) -> Result<PgPool, PoolError> {
    info!("Creating database pool (max {} connections)", max_size);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().max_size(max_size).build(manager).map_err(|e| {
        error!("Failed to establish database pool: {}", e);
        e
    })
}

/// Replica access used by the proposal orchestrator.
pub trait ProposalStore: Send + Sync {
    fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, StoreError>;
    fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    fn find_rental_application(&self, id: Uuid) -> Result<Option<RentalApplication>, StoreError>;
    /// Counts every proposal the guest ever made, soft-deleted ones included.
    fn count_guest_proposals(&self, guest_id: Uuid) -> Result<i64, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the guest's order ranking is taken.
    fn insert_proposal(&self, proposal: &Proposal) -> Result<(), StoreError>;
    /// Soft-deleted proposals are not returned.
    fn find_proposal(&self, id: Uuid) -> Result<Option<Proposal>, StoreError>;
    /// Moves a live proposal from `from` to `to` and appends the history
    /// entry. Returns `None` when the proposal is gone or no longer in `from`.
    fn transition_proposal_status(
        &self,
        id: Uuid,
        from: ProposalStatus,
        to: ProposalStatus,
        history_entry: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Proposal>, StoreError>;
    /// Appends unless already present and returns the updated user.
    fn append_user_proposal(&self, user_id: Uuid, proposal_id: Uuid) -> Result<User, StoreError>;
    /// Returns `None` when the listing was already a favorite.
    fn add_favorite_listing(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
    ) -> Result<Option<User>, StoreError>;
    /// Writes the offered values into whichever profile fields are blank at
    /// write time. Returns `None` when none were.
    fn fill_blank_profile(
        &self,
        user_id: Uuid,
        offered: &ProfilePatch,
    ) -> Result<Option<(User, ProfilePatch)>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Durable queue table behind the outbox.
pub trait OutboxStore: Send + Sync {
    fn insert_pending(&self, item: &NewSyncQueueItem) -> Result<InsertOutcome, StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Locks the user row, applies `change`, writes the array and profile
    /// columns back and returns the new state.
    fn modify_user<F>(&self, user_id: Uuid, change: F) -> Result<Option<User>, StoreError>
    where
        F: FnOnce(&mut User) -> bool,
    {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let mut user = users::table
                .find(user_id)
                .select(User::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
            if !change(&mut user) {
                return Ok(None);
            }
            user.updated_at = Utc::now();
            let updated = diesel::update(users::table.find(user_id))
                .set((
                    users::proposal_ids.eq(&user.proposal_ids),
                    users::favorite_listing_ids.eq(&user.favorite_listing_ids),
                    users::about_me.eq(&user.about_me),
                    users::need_for_space.eq(&user.need_for_space),
                    users::special_needs.eq(&user.special_needs),
                    users::updated_at.eq(user.updated_at),
                ))
                .returning(User::as_returning())
                .get_result(conn)?;
            Ok(Some(updated))
        })
    }
}

impl ProposalStore for PgStore {
    fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, StoreError> {
        let mut conn = self.conn()?;
        listings::table
            .find(id)
            .select(ListingRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Listing::try_from)
            .transpose()
    }

    fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        Ok(users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_rental_application(&self, id: Uuid) -> Result<Option<RentalApplication>, StoreError> {
        let mut conn = self.conn()?;
        Ok(rental_applications::table
            .find(id)
            .select(RentalApplication::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn count_guest_proposals(&self, guest_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        Ok(proposals::table
            .filter(proposals::guest_id.eq(guest_id))
            .count()
            .get_result(&mut conn)?)
    }

    fn insert_proposal(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        match diesel::insert_into(proposals::table)
            .values(ProposalRow::from(proposal))
            .execute(&mut conn)
        {
            Ok(_) => Ok(()),
            Err(
                e @ diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ),
            ) => Err(StoreError::Conflict(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn find_proposal(&self, id: Uuid) -> Result<Option<Proposal>, StoreError> {
        let mut conn = self.conn()?;
        proposals::table
            .find(id)
            .filter(proposals::deleted.eq(false))
            .select(ProposalRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Proposal::try_from)
            .transpose()
    }

    fn transition_proposal_status(
        &self,
        id: Uuid,
        from: ProposalStatus,
        to: ProposalStatus,
        history_entry: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Proposal>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.transaction::<_, StoreError, _>(|conn| {
            let current: Option<(String, Vec<String>)> = proposals::table
                .find(id)
                .filter(proposals::deleted.eq(false))
                .select((proposals::status, proposals::status_history))
                .for_update()
                .first(conn)
                .optional()?;
            let mut history = match current {
                Some((status, history)) if status == from.display() => history,
                _ => return Ok(None),
            };
            history.push(history_entry.to_string());
            let row = diesel::update(proposals::table.find(id))
                .set((
                    proposals::status.eq(to.display()),
                    proposals::status_history.eq(&history),
                    proposals::updated_at.eq(at),
                ))
                .returning(ProposalRow::as_returning())
                .get_result(conn)?;
            Ok(Some(row))
        })?;
        row.map(Proposal::try_from).transpose()
    }

    fn append_user_proposal(&self, user_id: Uuid, proposal_id: Uuid) -> Result<User, StoreError> {
        let updated = self.modify_user(user_id, |user| {
            if user.proposal_ids.contains(&proposal_id) {
                return false;
            }
            user.proposal_ids.push(proposal_id);
            true
        })?;
        match updated {
            Some(user) => Ok(user),
            None => self
                .find_user(user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id))),
        }
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

impl OutboxStore for PgStore {
    fn insert_pending(&self, item: &NewSyncQueueItem) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.conn()?;
        let inserted = diesel::insert_into(sync_queue::table)
            .values(item)
            .on_conflict(sync_queue::idempotency_key)
            .do_nothing()
            .execute(&mut conn);
        match inserted {
            Ok(0) => Ok(InsertOutcome::Duplicate),
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }
}
