use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::PgConnection;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::folio;
use crate::models::{Customer, NewOrder, Order, Vehicle};
use crate::schema::orders;

/// Upper bound on allocate-then-insert rounds for one order.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

const FOLIO_CONSTRAINT: &str = "orders_folio_key";

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("folio {0} already exists")]
    DuplicateFolio(String),
    #[error("no folio could be claimed after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error("order {0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

pub type OrderStoreResult<T> = Result<T, OrderStoreError>;

/// A validated order that has not been written yet. `folio` is `None` unless
/// the client supplied one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderDraft {
    pub folio: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub workshop: Option<String>,
    pub technician: Option<String>,
    pub customer: Customer,
    pub vehicle: Vehicle,
    pub work_type: Option<String>,
    pub service_description: Option<String>,
    pub material: Option<String>,
    pub payment_method: Option<String>,
    pub material_cost: f64,
    pub labor_cost: f64,
    pub total: f64,
    pub discount: bool,
    pub observations: Option<String>,
    pub quality_rating: Option<String>,
    pub customer_signature: Option<String>,
    pub technician_signature: Option<String>,
    pub assigned_at: Option<NaiveDateTime>,
    pub contacted_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub completion_date: Option<NaiveDate>,
}

impl OrderDraft {
    pub fn to_new_order(&self, folio: String) -> NewOrder {
        NewOrder {
            id: Uuid::new_v4(),
            folio,
            service_date: self.service_date,
            workshop: self.workshop.clone(),
            technician: self.technician.clone(),
            customer: serde_json::to_value(&self.customer).unwrap_or_default(),
            vehicle: serde_json::to_value(&self.vehicle).unwrap_or_default(),
            work_type: self.work_type.clone(),
            service_description: self.service_description.clone(),
            material: self.material.clone(),
            payment_method: self.payment_method.clone(),
            material_cost: self.material_cost,
            labor_cost: self.labor_cost,
            total: self.total,
            discount: self.discount,
            observations: self.observations.clone(),
            quality_rating: self.quality_rating.clone(),
            customer_signature: self.customer_signature.clone(),
            technician_signature: self.technician_signature.clone(),
            assigned_at: self.assigned_at,
            contacted_at: self.contacted_at,
            completed_at: self.completed_at,
            completion_date: self.completion_date,
        }
    }
}

/// Inserts `new_order` as-is. A folio that is already taken is reported as
/// [`OrderStoreError::DuplicateFolio`]; the existing row is left untouched.
pub fn save_order(conn: &mut PgConnection, new_order: &NewOrder) -> OrderStoreResult<Order> {
    match diesel::insert_into(orders::table)
        .values(new_order)
        .get_result::<Order>(conn)
    {
        Ok(order) => Ok(order),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info))
            if info.constraint_name().map_or(true, |name| name == FOLIO_CONSTRAINT) =>
        {
            Err(OrderStoreError::DuplicateFolio(new_order.folio.clone()))
        }
        Err(err) => Err(OrderStoreError::from(err)),
    }
}

/// Writes a draft, allocating its folio when the client did not supply one.
///
/// Allocation reads the current maximum without locking; losing a race shows
/// up as a unique violation, after which a fresh candidate is derived. A
/// client-supplied folio is never replaced.
pub fn persist_order(conn: &mut PgConnection, draft: &OrderDraft) -> OrderStoreResult<Order> {
    if let Some(folio) = draft.folio.clone() {
        return save_order(conn, &draft.to_new_order(folio));
    }

    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let candidate = folio::allocate(conn)?;
        match save_order(conn, &draft.to_new_order(candidate)) {
            Ok(order) => {
                info!(folio = %order.folio, attempt, "allocated folio");
                return Ok(order);
            }
            Err(OrderStoreError::DuplicateFolio(folio)) => {
                warn!(%folio, attempt, "folio claimed concurrently; allocating again");
            }
            Err(err) => return Err(err),
        }
    }

    Err(OrderStoreError::Conflict {
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}

pub fn find_by_folio(conn: &mut PgConnection, folio: &str) -> OrderStoreResult<Order> {
    orders::table
        .filter(orders::folio.eq(folio))
        .first::<Order>(conn)
        .optional()?
        .ok_or_else(|| OrderStoreError::NotFound(folio.to_string()))
}

pub fn list_all(conn: &mut PgConnection) -> OrderStoreResult<Vec<Order>> {
    let rows = orders::table
        .order((orders::created_at.asc(), orders::folio.asc()))
        .load::<Order>(conn)?;
    Ok(rows)
}

/// Marks an order as paid. Repeating the call is a no-op that keeps the
/// first payment timestamp.
pub fn mark_paid(conn: &mut PgConnection, folio: &str) -> OrderStoreResult<Order> {
    let now = Utc::now().naive_utc();
    let updated = diesel::update(
        orders::table
            .filter(orders::folio.eq(folio))
            .filter(orders::paid.eq(false)),
    )
    .set((
        orders::paid.eq(true),
        orders::paid_at.eq(Some(now)),
        orders::updated_at.eq(now),
    ))
    .execute(conn)?;

    if updated == 0 {
        let order = find_by_folio(conn, folio)?;
        info!(%folio, "order already marked as paid");
        return Ok(order);
    }

    find_by_folio(conn, folio)
}

/// Folios of orders that have no rendered document yet, oldest first.
pub fn folios_without_documents(conn: &mut PgConnection) -> OrderStoreResult<Vec<String>> {
    use crate::schema::order_documents;

    let rendered: HashSet<String> = order_documents::table
        .select(order_documents::folio)
        .distinct()
        .load::<String>(conn)?
        .into_iter()
        .collect();

    let folios = orders::table
        .select(orders::folio)
        .order(orders::created_at.asc())
        .load::<String>(conn)?
        .into_iter()
        .filter(|folio| !rendered.contains(folio))
        .collect();
    Ok(folios)
}
