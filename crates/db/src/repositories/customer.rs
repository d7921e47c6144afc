use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use telroute_core::domain::customer::{Customer, CustomerId, ServicePlan, UsageRecord};

use super::{CustomerDirectory, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerDirectory {
    pool: DbPool,
}

impl SqlCustomerDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    let date = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

/// Unlimited flags win over whatever limit the row also carries.
fn limit<T>(unlimited: bool, value: Option<T>) -> Option<T> {
    if unlimited {
        None
    } else {
        value
    }
}

fn row_to_customer(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(column(row, "customer_id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        service_plan_id: column(row, "service_plan_id")?,
    })
}

fn row_to_plan(row: &SqliteRow) -> Result<ServicePlan, RepositoryError> {
    Ok(ServicePlan {
        plan_id: column(row, "plan_id")?,
        name: column(row, "name")?,
        monthly_cost: column(row, "monthly_cost")?,
        data_limit_gb: limit(column(row, "unlimited_data")?, column(row, "data_limit_gb")?),
        voice_minutes: limit(column(row, "unlimited_voice")?, column(row, "voice_minutes")?),
        sms_count: limit(column(row, "unlimited_sms")?, column(row, "sms_count")?),
    })
}

fn row_to_usage(row: &SqliteRow) -> Result<UsageRecord, RepositoryError> {
    let start: String = column(row, "billing_period_start")?;
    let end: String = column(row, "billing_period_end")?;
    Ok(UsageRecord {
        customer_id: CustomerId(column(row, "customer_id")?),
        period_start: parse_date("billing_period_start", &start)?,
        period_end: parse_date("billing_period_end", &end)?,
        data_used_gb: column(row, "data_used_gb")?,
        voice_minutes_used: column(row, "voice_minutes_used")?,
        sms_count_used: column(row, "sms_count_used")?,
        total_bill_amount: column(row, "total_bill_amount")?,
    })
}

#[async_trait::async_trait]
impl CustomerDirectory for SqlCustomerDirectory {
    async fn find_customer(&self, identifier: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT customer_id, name, email, phone, service_plan_id
             FROM customers
             WHERE email = ? COLLATE NOCASE OR phone = ? OR customer_id = ?
             LIMIT 1",
        )
        .bind(identifier)
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn service_plans(&self) -> Result<Vec<ServicePlan>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT plan_id, name, monthly_cost, data_limit_gb, unlimited_data,
                    voice_minutes, unlimited_voice, sms_count, unlimited_sms
             FROM service_plans ORDER BY monthly_cost ASC, plan_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect()
    }

    async fn recent_usage(
        &self,
        customer_id: &CustomerId,
        periods: usize,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let periods = i64::try_from(periods)
            .map_err(|e| RepositoryError::Decode(format!("periods: {e}")))?;
        let rows = sqlx::query(
            "SELECT customer_id, billing_period_start, billing_period_end, data_used_gb,
                    voice_minutes_used, sms_count_used, total_bill_amount
             FROM customer_usage
             WHERE customer_id = ?
             ORDER BY billing_period_end DESC
             LIMIT ?",
        )
        .bind(&customer_id.0)
        .bind(periods)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_usage).collect()
    }
}

#[cfg(test)]
mod tests {
    use telroute_core::domain::customer::CustomerId;

    use super::SqlCustomerDirectory;
    use crate::repositories::CustomerDirectory;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO service_plans (plan_id, name, monthly_cost, data_limit_gb, unlimited_data,
                                        voice_minutes, unlimited_voice, sms_count, unlimited_sms)
             VALUES ('P100', 'Basic 2GB', 199.0, 2.0, 0, 300, 0, 100, 0),
                    ('P300', 'Smart 25GB', 449.0, 25.0, 0, NULL, 1, NULL, 1),
                    ('P500', 'Max Unlimited', 699.0, 999.0, 1, NULL, 1, NULL, 1)",
        )
        .execute(&pool)
        .await
        .expect("plans");
        sqlx::query(
            "INSERT INTO customers (customer_id, name, email, phone, service_plan_id)
             VALUES ('C-1001', 'Asha Rao', 'asha@example.com', '+919800000001', 'P100')",
        )
        .execute(&pool)
        .await
        .expect("customer");
        sqlx::query(
            "INSERT INTO customer_usage (customer_id, billing_period_start, billing_period_end,
                                         data_used_gb, voice_minutes_used, sms_count_used,
                                         total_bill_amount)
             VALUES ('C-1001', '2026-07-01', '2026-07-31', 1.8, 210, 30, 199.0),
                    ('C-1001', '2026-08-01', '2026-08-31', 6.4, 280, 45, 487.5),
                    ('C-1001', '2026-06-01', '2026-06-30', 1.2, 150, 20, 199.0)",
        )
        .execute(&pool)
        .await
        .expect("usage");
        pool
    }

    #[tokio::test]
    async fn customer_is_found_by_email_phone_or_id() {
        let directory = SqlCustomerDirectory::new(seeded().await);

        for identifier in ["ASHA@example.com", "+919800000001", "C-1001"] {
            let customer =
                directory.find_customer(identifier).await.expect("query").expect("customer exists");
            assert_eq!(customer.name, "Asha Rao", "{identifier}");
        }
        assert!(directory.find_customer("nobody@example.com").await.expect("query").is_none());
    }

    #[tokio::test]
    async fn unlimited_flags_override_stored_limits() {
        let directory = SqlCustomerDirectory::new(seeded().await);

        let plans = directory.service_plans().await.expect("plans");

        let ids: Vec<&str> = plans.iter().map(|plan| plan.plan_id.as_str()).collect();
        assert_eq!(ids, vec!["P100", "P300", "P500"]);
        assert_eq!(plans[0].data_limit_gb, Some(2.0));
        assert_eq!(plans[1].voice_minutes, None);
        assert_eq!(plans[2].data_limit_gb, None);
    }

    #[tokio::test]
    async fn profile_joins_current_plan_and_latest_usage() {
        let directory = SqlCustomerDirectory::new(seeded().await);

        let profile = directory.profile(Some("asha@example.com"), 2).await.expect("profile");

        assert_eq!(profile.customer.as_ref().map(|c| c.id.clone()), Some(CustomerId::new("C-1001")));
        assert_eq!(profile.current_plan.as_ref().map(|plan| plan.name.as_str()), Some("Basic 2GB"));
        assert_eq!(profile.usage.len(), 2);
        assert_eq!(profile.latest_usage().map(|usage| usage.total_bill_amount), Some(487.5));
        assert_eq!(profile.bill_change(), Some(288.5));
        assert_eq!(profile.plans.len(), 3);
    }

    #[tokio::test]
    async fn unknown_customer_gets_catalogue_only() {
        let directory = SqlCustomerDirectory::new(seeded().await);

        let profile = directory.profile(Some("stranger@example.com"), 3).await.expect("profile");

        assert!(profile.customer.is_none());
        assert!(profile.usage.is_empty());
        assert_eq!(profile.plans.len(), 3);
    }
}
