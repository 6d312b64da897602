//! # Contract Repository
//!
//! Database operations for service contracts and their refill lines.
//!
//! ## Billing Date Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  service_contracts.next_billing_date                                    │
//! │                                                                         │
//! │  set once by:   create()                                               │
//! │  advanced by:   claim_cycle()  ← RefillScheduler only, one cycle       │
//! │                                  per claim, compare-and-set on the     │
//! │                                  prior value                           │
//! │  no other statement in this crate writes it                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{rate_column, u32_column};
use crate::error::DbResult;
use atlas_core::billing::{ContractRefillItem, ContractStatus, NewContract, ServiceContract};
use atlas_core::{CoreError, Money, Quantity};

#[derive(Debug, sqlx::FromRow)]
struct ContractRecord {
    id: String,
    contract_number: String,
    customer_id: String,
    status: ContractStatus,
    next_billing_date: NaiveDate,
    billing_frequency_months: i64,
    auto_generate_refills: bool,
    tax_rate_bps: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ContractRecord {
    fn into_contract(self) -> DbResult<ServiceContract> {
        Ok(ServiceContract {
            billing_frequency_months: u32_column(
                "billing_frequency_months",
                self.billing_frequency_months,
            )?,
            tax_rate: rate_column("tax_rate_bps", self.tax_rate_bps)?,
            id: self.id,
            contract_number: self.contract_number,
            customer_id: self.customer_id,
            status: self.status,
            next_billing_date: self.next_billing_date,
            auto_generate_refills: self.auto_generate_refills,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefillItemRecord {
    id: String,
    contract_id: String,
    item_id: String,
    quantity_per_cycle: i64,
    contract_unit_price: i64,
    discount_bps: i64,
}

impl RefillItemRecord {
    fn into_item(self) -> DbResult<ContractRefillItem> {
        Ok(ContractRefillItem {
            discount: rate_column("discount_bps", self.discount_bps)?,
            id: self.id,
            contract_id: self.contract_id,
            item_id: self.item_id,
            quantity_per_cycle: Quantity::from_milli(self.quantity_per_cycle),
            contract_unit_price: Money::from_minor(self.contract_unit_price),
        })
    }
}

const CONTRACT_COLUMNS: &str = r#"
    id, contract_number, customer_id, status, next_billing_date,
    billing_frequency_months, auto_generate_refills, tax_rate_bps,
    created_at, updated_at
"#;

// =============================================================================
// Connection-level operations
// =============================================================================

/// Inserts a contract and its refill lines.
pub async fn insert(conn: &mut SqliteConnection, new: &NewContract) -> DbResult<ServiceContract> {
    new.validate()?;

    let now = Utc::now();
    let contract = ServiceContract {
        id: Uuid::new_v4().to_string(),
        contract_number: new.contract_number.clone(),
        customer_id: new.customer_id.clone(),
        status: new.status,
        next_billing_date: new.next_billing_date,
        billing_frequency_months: new.billing_frequency_months,
        auto_generate_refills: new.auto_generate_refills,
        tax_rate: new.tax_rate,
        created_at: now,
        updated_at: now,
    };

    debug!(
        id = %contract.id,
        contract_number = %contract.contract_number,
        next_billing_date = %contract.next_billing_date,
        "Inserting service contract"
    );

    sqlx::query(
        r#"
        INSERT INTO service_contracts (
            id, contract_number, customer_id, status, next_billing_date,
            billing_frequency_months, auto_generate_refills, tax_rate_bps,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&contract.id)
    .bind(&contract.contract_number)
    .bind(&contract.customer_id)
    .bind(contract.status)
    .bind(contract.next_billing_date)
    .bind(contract.billing_frequency_months as i64)
    .bind(contract.auto_generate_refills)
    .bind(contract.tax_rate.bps() as i64)
    .bind(contract.created_at)
    .bind(contract.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in &new.items {
        sqlx::query(
            r#"
            INSERT INTO contract_refill_items (
                id, contract_id, item_id, quantity_per_cycle,
                contract_unit_price, discount_bps
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&contract.id)
        .bind(&item.item_id)
        .bind(item.quantity_per_cycle.milli())
        .bind(item.contract_unit_price.minor())
        .bind(item.discount.bps() as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(contract)
}

/// Gets a contract by ID.
pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ServiceContract>> {
    let sql = format!("SELECT {CONTRACT_COLUMNS} FROM service_contracts WHERE id = ?1");
    let record: Option<ContractRecord> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    record.map(ContractRecord::into_contract).transpose()
}

/// Gets a contract by its business number.
pub async fn get_by_number(
    conn: &mut SqliteConnection,
    contract_number: &str,
) -> DbResult<Option<ServiceContract>> {
    let sql = format!("SELECT {CONTRACT_COLUMNS} FROM service_contracts WHERE contract_number = ?1");
    let record: Option<ContractRecord> = sqlx::query_as(&sql)
        .bind(contract_number)
        .fetch_optional(&mut *conn)
        .await?;

    record.map(ContractRecord::into_contract).transpose()
}

/// Refill lines of a contract in a stable order.
pub async fn refill_items(
    conn: &mut SqliteConnection,
    contract_id: &str,
) -> DbResult<Vec<ContractRefillItem>> {
    let records: Vec<RefillItemRecord> = sqlx::query_as(
        r#"
        SELECT id, contract_id, item_id, quantity_per_cycle, contract_unit_price, discount_bps
        FROM contract_refill_items
        WHERE contract_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(contract_id)
    .fetch_all(&mut *conn)
    .await?;

    records.into_iter().map(RefillItemRecord::into_item).collect()
}

/// Contracts the scheduler must bill on `today`.
///
/// Same predicate as `ServiceContract::is_due`, evaluated in SQL. ISO date
/// text compares in calendar order.
pub async fn due(conn: &mut SqliteConnection, today: NaiveDate) -> DbResult<Vec<ServiceContract>> {
    let sql = format!(
        "SELECT {CONTRACT_COLUMNS} FROM service_contracts
         WHERE status = ?1 AND auto_generate_refills = 1 AND next_billing_date <= ?2
         ORDER BY next_billing_date, contract_number"
    );
    let records: Vec<ContractRecord> = sqlx::query_as(&sql)
        .bind(ContractStatus::Active)
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

    records.into_iter().map(ContractRecord::into_contract).collect()
}

/// Claims one billing cycle: moves `next_billing_date` from `prior` to
/// `advanced` if, and only if, it is still `prior` and the contract is still
/// billable.
///
/// Returns `false` when another run got there first, or the contract was
/// suspended in between. This UPDATE is the first statement of the refill
/// transaction, so it also takes the database write lock.
pub(crate) async fn claim_cycle(
    conn: &mut SqliteConnection,
    id: &str,
    prior: NaiveDate,
    advanced: NaiveDate,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE service_contracts
        SET next_billing_date = ?3, updated_at = ?4
        WHERE id = ?1
          AND next_billing_date = ?2
          AND status = ?5
          AND auto_generate_refills = 1
        "#,
    )
    .bind(id)
    .bind(prior)
    .bind(advanced)
    .bind(Utc::now())
    .bind(ContractStatus::Active)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Changes a contract's status.
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: ContractStatus,
) -> DbResult<()> {
    debug!(id = %id, status = %status, "Updating contract status");

    let result = sqlx::query("UPDATE service_contracts SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ContractNotFound(id.to_string()).into());
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for service contract operations.
#[derive(Debug, Clone)]
pub struct ContractRepository {
    pool: SqlitePool,
}

impl ContractRepository {
    /// Creates a new ContractRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ContractRepository { pool }
    }

    /// Registers a contract with its refill lines, atomically.
    pub async fn create(&self, new: NewContract) -> DbResult<ServiceContract> {
        let mut tx = self.pool.begin().await?;
        let contract = insert(&mut tx, &new).await?;
        tx.commit().await?;
        Ok(contract)
    }

    /// Gets a contract by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ServiceContract>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    /// Gets a contract by number.
    pub async fn get_by_number(&self, contract_number: &str) -> DbResult<Option<ServiceContract>> {
        let mut conn = self.pool.acquire().await?;
        get_by_number(&mut conn, contract_number).await
    }

    /// Refill lines of a contract.
    pub async fn refill_items(&self, contract_id: &str) -> DbResult<Vec<ContractRefillItem>> {
        let mut conn = self.pool.acquire().await?;
        refill_items(&mut conn, contract_id).await
    }

    /// Contracts due on `today`.
    pub async fn due(&self, today: NaiveDate) -> DbResult<Vec<ServiceContract>> {
        let mut conn = self.pool.acquire().await?;
        due(&mut conn, today).await
    }

    /// Suspends, reactivates, cancels or expires a contract.
    pub async fn set_status(&self, id: &str, status: ContractStatus) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        set_status(&mut conn, id, status).await
    }
}
