use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_plan_id: Option<String>,
}

/// A tariff from the plan catalogue. `None` allowances are unlimited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub plan_id: String,
    pub name: String,
    pub monthly_cost: f64,
    pub data_limit_gb: Option<f64>,
    pub voice_minutes: Option<i64>,
    pub sms_count: Option<i64>,
}

impl ServicePlan {
    /// Whether this plan's allowances would have absorbed the given period's usage.
    pub fn covers(&self, usage: &UsageRecord) -> bool {
        self.data_limit_gb.map_or(true, |limit| usage.data_used_gb <= limit)
            && self.voice_minutes.map_or(true, |limit| usage.voice_minutes_used <= limit)
            && self.sms_count.map_or(true, |limit| usage.sms_count_used <= limit)
    }

    pub fn allowance_summary(&self) -> String {
        let data = match self.data_limit_gb {
            Some(limit) => format!("{limit}GB data"),
            None => "Unlimited data".to_string(),
        };
        let voice = match self.voice_minutes {
            Some(minutes) => format!("{minutes} min"),
            None => "Unlimited voice".to_string(),
        };
        let sms = match self.sms_count {
            Some(count) => format!("{count} SMS"),
            None => "Unlimited SMS".to_string(),
        };
        format!("{data} | {voice} | {sms}")
    }

    pub fn describe(&self) -> String {
        format!(
            "{} ({}): {:.2}/month | {}",
            self.name,
            self.plan_id,
            self.monthly_cost,
            self.allowance_summary()
        )
    }
}

/// Usage and charges for one billing period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub customer_id: CustomerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub data_used_gb: f64,
    pub voice_minutes_used: i64,
    pub sms_count_used: i64,
    pub total_bill_amount: f64,
}

impl UsageRecord {
    pub fn describe(&self) -> String {
        format!(
            "{} to {}: {} GB data, {} min voice, {} SMS, billed {:.2}",
            self.period_start,
            self.period_end,
            self.data_used_gb,
            self.voice_minutes_used,
            self.sms_count_used,
            self.total_bill_amount
        )
    }
}

/// Account data a backend reasons over. Every part is optional: an unknown
/// customer still sees the plan catalogue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer: Option<Customer>,
    pub current_plan: Option<ServicePlan>,
    /// Most recent billing period first.
    pub usage: Vec<UsageRecord>,
    pub plans: Vec<ServicePlan>,
}

impl CustomerProfile {
    pub fn is_empty(&self) -> bool {
        self.customer.is_none() && self.usage.is_empty() && self.plans.is_empty()
    }

    pub fn latest_usage(&self) -> Option<&UsageRecord> {
        self.usage.first()
    }

    /// Change between the two latest bills, positive when the newest is higher.
    pub fn bill_change(&self) -> Option<f64> {
        match self.usage.as_slice() {
            [latest, previous, ..] => Some(latest.total_bill_amount - previous.total_bill_amount),
            _ => None,
        }
    }

    /// Catalogue plans, other than the current one, that would have covered the
    /// latest period's usage, cheapest first. Without usage every other plan
    /// qualifies.
    pub fn plans_fitting_usage(&self, limit: usize) -> Vec<&ServicePlan> {
        let current_id = self.current_plan.as_ref().map(|plan| plan.plan_id.as_str());
        let mut fitting: Vec<&ServicePlan> = self
            .plans
            .iter()
            .filter(|plan| Some(plan.plan_id.as_str()) != current_id)
            .filter(|plan| self.latest_usage().map_or(true, |usage| plan.covers(usage)))
            .collect();
        fitting.sort_by(|left, right| left.monthly_cost.total_cmp(&right.monthly_cost));
        fitting.truncate(limit);
        fitting
    }

    /// Plain-text rendering handed to language models and used as answer evidence.
    pub fn render(&self) -> String {
        let mut blocks = Vec::new();

        match (&self.customer, &self.current_plan) {
            (Some(customer), Some(plan)) => blocks.push(format!(
                "Customer: {} ({})\nCurrent plan: {}",
                customer.name,
                customer.id,
                plan.describe()
            )),
            (Some(customer), None) => {
                blocks.push(format!("Customer: {} ({})\nCurrent plan: unknown", customer.name, customer.id))
            }
            (None, _) => blocks.push("No customer profile available.".to_string()),
        }

        if self.usage.is_empty() {
            blocks.push("No usage data available.".to_string());
        } else {
            let lines: Vec<String> =
                self.usage.iter().map(|usage| format!("- {}", usage.describe())).collect();
            blocks.push(format!("Billing periods (latest first):\n{}", lines.join("\n")));
        }

        if !self.plans.is_empty() {
            let lines: Vec<String> =
                self.plans.iter().map(|plan| format!("- {}", plan.describe())).collect();
            blocks.push(format!("Available plans:\n{}", lines.join("\n")));
        }

        blocks.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Customer, CustomerId, CustomerProfile, ServicePlan, UsageRecord};

    fn plan(id: &str, cost: f64, data: Option<f64>) -> ServicePlan {
        ServicePlan {
            plan_id: id.to_string(),
            name: format!("Plan {id}"),
            monthly_cost: cost,
            data_limit_gb: data,
            voice_minutes: Some(500),
            sms_count: None,
        }
    }

    fn usage(end_month: u32, data: f64, bill: f64) -> UsageRecord {
        UsageRecord {
            customer_id: CustomerId::new("C1"),
            period_start: NaiveDate::from_ymd_opt(2026, end_month - 1, 1).expect("date"),
            period_end: NaiveDate::from_ymd_opt(2026, end_month, 1).expect("date"),
            data_used_gb: data,
            voice_minutes_used: 320,
            sms_count_used: 40,
            total_bill_amount: bill,
        }
    }

    fn profile() -> CustomerProfile {
        CustomerProfile {
            customer: Some(Customer {
                id: CustomerId::new("C1"),
                name: "Asha Rao".to_string(),
                email: Some("asha@example.com".to_string()),
                phone: None,
                service_plan_id: Some("P1".to_string()),
            }),
            current_plan: Some(plan("P1", 299.0, Some(10.0))),
            usage: vec![usage(6, 18.5, 612.0), usage(5, 9.0, 299.0)],
            plans: vec![
                plan("P1", 299.0, Some(10.0)),
                plan("P3", 699.0, None),
                plan("P2", 449.0, Some(25.0)),
                plan("P0", 149.0, Some(2.0)),
            ],
        }
    }

    #[test]
    fn fitting_plans_cover_latest_usage_cheapest_first() {
        let profile = profile();

        let ids: Vec<&str> =
            profile.plans_fitting_usage(3).iter().map(|plan| plan.plan_id.as_str()).collect();

        assert_eq!(ids, vec!["P2", "P3"]);
    }

    #[test]
    fn bill_change_compares_the_two_latest_periods() {
        assert_eq!(profile().bill_change(), Some(313.0));
        assert_eq!(CustomerProfile::default().bill_change(), None);
    }

    #[test]
    fn render_names_the_customer_usage_and_catalogue() {
        let rendered = profile().render();

        assert!(rendered.contains("Customer: Asha Rao (C1)"));
        assert!(rendered.contains("Current plan: Plan P1 (P1): 299.00/month | 10GB data"));
        assert!(rendered.contains("2026-05-01 to 2026-06-01: 18.5 GB data"));
        assert!(rendered.contains("Plan P3 (P3): 699.00/month | Unlimited data"));
    }

    #[test]
    fn anonymous_profile_still_lists_plans() {
        let profile = CustomerProfile { plans: vec![plan("P0", 149.0, Some(2.0))], ..CustomerProfile::default() };

        assert!(!profile.is_empty());
        assert!(profile.render().starts_with("No customer profile available."));
        assert_eq!(profile.plans_fitting_usage(3).len(), 1);
    }
}
