use async_trait::async_trait;

use telroute_core::domain::answer::Citation;
use telroute_core::domain::customer::{CustomerProfile, ServicePlan, UsageRecord};
use telroute_core::domain::intent::{Intent, ProviderId};
use telroute_core::errors::ProviderFailure;

use super::{CapabilityProvider, PlanOption, ProviderOutput, ProviderRequest, Section};

/// Offline backend answering with canned guidance for its domain.
pub struct GuidanceProvider {
    id: ProviderId,
    domain: Intent,
}

impl GuidanceProvider {
    pub fn new(id: ProviderId, domain: Intent) -> Self {
        Self { id, domain }
    }

    pub fn domain(&self) -> Intent {
        self.domain
    }
}

#[async_trait]
impl CapabilityProvider for GuidanceProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn answer(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
        let output = match self.domain {
            Intent::Billing => billing_guidance(request),
            Intent::Network => network_guidance(request),
            Intent::PlanRecommendation => plan_guidance(request),
            Intent::TechnicalSupport => support_guidance(request),
            Intent::Unknown => {
                return Err(ProviderFailure::Rejected(
                    "no guidance is available for unclassified questions".to_string(),
                ))
            }
        };
        Ok(output)
    }
}

fn known_account(request: &ProviderRequest) -> Option<&CustomerProfile> {
    request.profile.as_ref().filter(|profile| profile.customer.is_some())
}

fn billing_guidance(request: &ProviderRequest) -> ProviderOutput {
    if let Some(output) = known_account(request).and_then(account_billing) {
        return output;
    }

    let account_line = match request.customer_identifier() {
        Some(identifier) => format!("We could not find billing records for {identifier} yet."),
        None => "Sign in so we can look at your specific account.".to_string(),
    };
    ProviderOutput::Structured {
        summary: format!(
            "Most unexpected charges come from one-time fees, usage above your plan \
             allowance, or a pro-rated plan change. {account_line}"
        ),
        details: vec![
            "Compare the billing period on your latest invoice with the previous one.".to_string(),
            "Check the usage section for data, voice or SMS beyond your allowance.".to_string(),
            "Look for one-time charges such as activation, roaming or late fees.".to_string(),
        ],
        citations: vec![Citation::new("billing-faq")
            .with_excerpt("Plan changes mid-cycle are pro-rated on the next invoice.")],
        follow_ups: vec![
            "Would you like an itemised breakdown of your last invoice?".to_string(),
            "Do you want to set up payment reminders before the due date?".to_string(),
        ],
        confidence: None,
    }
}

/// Explains the latest bill from the customer's own usage records.
fn account_billing(profile: &CustomerProfile) -> Option<ProviderOutput> {
    let latest = profile.latest_usage()?;
    let mut summary = format!(
        "Your latest bill, for {} to {}, came to {:.2}.",
        latest.period_start, latest.period_end, latest.total_bill_amount
    );
    match profile.bill_change() {
        Some(change) if change > 0.0 => {
            summary.push_str(&format!(" That is {change:.2} more than the previous period."))
        }
        Some(change) if change < 0.0 => {
            summary.push_str(&format!(" That is {:.2} less than the previous period.", -change))
        }
        Some(_) => summary.push_str(" That matches the previous period."),
        None => {}
    }

    let mut details = Vec::new();
    if let Some(plan) = &profile.current_plan {
        details.push(format!("Your plan {} costs {:.2} per month.", plan.name, plan.monthly_cost));
        details.extend(overages(plan, latest));
    }
    details.push(format!(
        "Usage this period: {} GB data, {} min voice, {} SMS.",
        latest.data_used_gb, latest.voice_minutes_used, latest.sms_count_used
    ));

    let citations =
        profile.usage.iter().map(|usage| Citation::new("customer_usage").with_excerpt(usage.describe())).collect();
    let follow_ups = if profile.plans_fitting_usage(1).is_empty() {
        vec!["Would you like an itemised breakdown of this bill?".to_string()]
    } else {
        vec![
            "Would you like an itemised breakdown of this bill?".to_string(),
            "Shall we suggest a plan that fits your usage better?".to_string(),
        ]
    };

    Some(ProviderOutput::Structured { summary, details, citations, follow_ups, confidence: None })
}

fn overages(plan: &ServicePlan, usage: &UsageRecord) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(limit) = plan.data_limit_gb.filter(|limit| usage.data_used_gb > *limit) {
        lines.push(format!(
            "You used {} GB of data against a {limit} GB allowance; the extra is charged separately.",
            usage.data_used_gb
        ));
    }
    if let Some(limit) = plan.voice_minutes.filter(|limit| usage.voice_minutes_used > *limit) {
        lines.push(format!(
            "You used {} voice minutes against a {limit} minute allowance.",
            usage.voice_minutes_used
        ));
    }
    if let Some(limit) = plan.sms_count.filter(|limit| usage.sms_count_used > *limit) {
        lines.push(format!("You sent {} SMS against a {limit} SMS allowance.", usage.sms_count_used));
    }
    lines
}

fn network_guidance(request: &ProviderRequest) -> ProviderOutput {
    ProviderOutput::Sectioned {
        sections: vec![
            Section {
                title: "Diagnostics".to_string(),
                body: format!(
                    "Reported issue: {}. Likely causes: weak signal in the area, \
                     outdated APN settings, or VoLTE disabled on the device.",
                    request.text.trim()
                ),
                customer_facing: false,
            },
            Section {
                title: "Resolution".to_string(),
                body: "1. Restart your phone and toggle airplane mode on and off.\n\
                       2. Make sure mobile data and VoLTE are enabled in settings.\n\
                       3. Reset network settings if the problem continues.\n\
                       4. If it persists in one location, tell us where so we can check coverage."
                    .to_string(),
                customer_facing: true,
            },
        ],
    }
}

fn plan_guidance(request: &ProviderRequest) -> ProviderOutput {
    match request.profile.as_ref().filter(|profile| !profile.plans.is_empty()) {
        Some(profile) => catalogue_recommendation(profile),
        None => generic_plan_guidance(),
    }
}

/// Ranks catalogue plans that would have covered the latest period, cheapest first.
fn catalogue_recommendation(profile: &CustomerProfile) -> ProviderOutput {
    let fitting = profile.plans_fitting_usage(3);
    let plans = fitting
        .iter()
        .map(|plan| PlanOption {
            name: plan.name.clone(),
            monthly_price: Some(format!("{:.2}", plan.monthly_cost)),
            rationale: plan.allowance_summary(),
        })
        .collect();

    let mut reasoning = Vec::new();
    if let Some(usage) = profile.latest_usage() {
        reasoning.push(format!(
            "Last period you used {} GB data, {} min voice and {} SMS.",
            usage.data_used_gb, usage.voice_minutes_used, usage.sms_count_used
        ));
    }
    if let (Some(current), Some(cheapest)) = (&profile.current_plan, fitting.first()) {
        let difference = cheapest.monthly_cost - current.monthly_cost;
        if difference < 0.0 {
            reasoning.push(format!("{} would save {:.2} per month.", cheapest.name, -difference));
        } else if profile.latest_usage().is_some_and(|usage| !current.covers(usage)) {
            reasoning.push(format!(
                "{} does not cover your usage; moving up costs {:.2} more per month.",
                current.name, difference
            ));
        }
    }

    let current_fits = match (&profile.current_plan, profile.latest_usage()) {
        (Some(current), Some(usage)) => current.covers(usage),
        (current, None) => current.is_some(),
        (None, Some(_)) => false,
    };
    let summary = match (&profile.current_plan, fitting.is_empty()) {
        (Some(current), true) if current_fits => {
            format!("{} already fits your usage; no other plan covers it.", current.name)
        }
        (Some(current), false) => {
            format!("You are on {}. These plans fit how you actually use your line.", current.name)
        }
        (_, true) => "No plan in the catalogue covers that usage.".to_string(),
        (None, false) => "These plans from our catalogue fit your needs.".to_string(),
    };

    ProviderOutput::Recommendation { summary, plans, reasoning }
}

fn generic_plan_guidance() -> ProviderOutput {
    ProviderOutput::Recommendation {
        summary: "Based on typical usage, these plans are the best fit.".to_string(),
        plans: vec![
            PlanOption {
                name: "Unlimited Plus".to_string(),
                monthly_price: Some("$45".to_string()),
                rationale: "Unlimited data for heavy streaming and hotspot use.".to_string(),
            },
            PlanOption {
                name: "Family Share 4".to_string(),
                monthly_price: Some("$120".to_string()),
                rationale: "Four lines sharing a large data pool.".to_string(),
            },
        ],
        reasoning: vec![
            "Staying on a plan you regularly exceed costs more than upgrading.".to_string(),
            "Add-on packs suit occasional overages better than a bigger plan.".to_string(),
        ],
    }
}

fn support_guidance(request: &ProviderRequest) -> ProviderOutput {
    let text = request.text.to_ascii_lowercase();
    let body = if text.contains("esim") {
        "To set up an eSIM, open Settings > Mobile > Add eSIM and scan the QR code from your \
         welcome email. Keep Wi-Fi on during activation."
    } else if text.contains("apn") {
        "Set the APN to `internet`, leave username and password blank, then restart the device."
    } else if text.contains("roaming") {
        "Enable data roaming under Settings > Mobile > Roaming before you travel. \
         Roaming packs can be added from your account page."
    } else if text.contains("volte") {
        "Turn on VoLTE under Settings > Mobile > Voice. If the option is missing, \
         your device may need a software update."
    } else {
        "Here are the general troubleshooting steps: restart the device, make sure its \
         software is up to date, and check the help centre for your device model. \
         If the issue continues, contact support with your device model and a description."
    };
    match known_account(request).and_then(|profile| profile.current_plan.as_ref()) {
        Some(plan) => ProviderOutput::plain(format!(
            "{body}\n\nYour line is on {} ({}).",
            plan.name,
            plan.allowance_summary()
        )),
        None => ProviderOutput::plain(body),
    }
}
