use serde::Serialize;
use telroute_agent::llm::client_from_config;
use telroute_agent::ProviderRegistry;
use telroute_core::config::{AppConfig, LlmProvider, LoadOptions};
use telroute_db::{connect_from_config, migrations};

use crate::commands::{exit, runtime, to_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { exit::CONFIG };

    if json_output {
        return CommandResult::plain(exit_code, to_json(&report));
    }
    CommandResult::plain(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_client(&config));
            checks.push(check_provider_registry(&config));
            checks.push(check_session_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["llm_client", "provider_registry", "session_store"] {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: readiness checks passed (some skipped)".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    if config.llm.provider == LlmProvider::Offline {
        return DoctorCheck::pass("llm_client", "offline mode, guidance providers answer without an llm");
    }

    match client_from_config(&config.llm) {
        Ok(_) => DoctorCheck::pass(
            "llm_client",
            format!("{:?} client configured with model `{}`", config.llm.provider, config.llm.model),
        ),
        Err(error) => DoctorCheck::fail("llm_client", error.to_string()),
    }
}

fn check_provider_registry(config: &AppConfig) -> DoctorCheck {
    // Offline guidance providers cover the same ids as the llm-backed ones.
    let registry = ProviderRegistry::built_in(&config.routing, None);
    let missing = registry.missing_for(&config.routing);
    if missing.is_empty() {
        let ids: Vec<String> = registry.ids().iter().map(ToString::to_string).collect();
        DoctorCheck::pass("provider_registry", format!("providers registered: {}", ids.join(", ")))
    } else {
        let ids: Vec<String> = missing.iter().map(ToString::to_string).collect();
        DoctorCheck::fail("provider_registry", format!("unmapped providers: {}", ids.join(", ")))
    }
}

fn check_session_store(config: &AppConfig) -> DoctorCheck {
    if !config.database.is_required(&config.session) {
        return DoctorCheck::skipped("session_store", "in-memory session store, no database required");
    }

    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => return DoctorCheck::fail("session_store", failure.output),
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| format!("failed to inspect migrations: {error}"))?;
        pool.close().await;
        Ok::<usize, String>(pending)
    });

    match result {
        Ok(0) => DoctorCheck::pass("session_store", format!("connected using `{}`", config.database.url)),
        Ok(pending) => DoctorCheck::fail(
            "session_store",
            format!("{pending} pending migration(s); run `telroute migrate`"),
        ),
        Err(error) => DoctorCheck::fail("session_store", error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
