use std::sync::Arc;

use kopi_agent::{Assistant, HttpLlmClient};
use kopi_core::config::AppConfig;
use kopi_db::fixtures::SeedDataset;
use serde::Serialize;

use crate::commands::{async_runtime, load_config, open_database, CommandResult};

const DEPENDENT_CHECKS: [&str; 4] =
    ["database_connectivity", "seed_dataset", "llm_client", "knowledge_index"];

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

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because a prerequisite check failed".to_string(),
        }
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
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config() {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(runtime_checks(&config));
        }
        Err((_, message, _)) => {
            checks.push(DoctorCheck::fail("config_validation", message));
            checks.extend(DEPENDENT_CHECKS.into_iter().map(DoctorCheck::skipped));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn runtime_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match async_runtime() {
        Ok(runtime) => runtime,
        Err((_, message, _)) => {
            return DEPENDENT_CHECKS
                .into_iter()
                .map(|name| DoctorCheck::fail(name, message.clone()))
                .collect();
        }
    };

    runtime.block_on(async {
        let mut checks = Vec::new();

        let pool = match open_database(config).await {
            Ok(pool) => {
                checks.push(DoctorCheck::pass(
                    "database_connectivity",
                    format!("connected to `{}` and applied migrations", config.database.url),
                ));
                pool
            }
            Err((_, message, _)) => {
                checks.push(DoctorCheck::fail("database_connectivity", message));
                checks.extend(DEPENDENT_CHECKS[1..].iter().copied().map(DoctorCheck::skipped));
                return checks;
            }
        };

        checks.push(match SeedDataset::verify(&pool).await {
            Ok(verification) if verification.all_present => {
                DoctorCheck::pass("seed_dataset", "all seeded outlets and product documents are present")
            }
            Ok(_) => DoctorCheck::fail("seed_dataset", "seed data is missing; run `kopi seed`"),
            Err(error) => DoctorCheck::fail("seed_dataset", error.to_string()),
        });

        match HttpLlmClient::from_config(&config.llm) {
            Ok(client) => {
                checks.push(DoctorCheck::pass(
                    "llm_client",
                    format!("model `{}` at `{}`", client.model(), client.endpoint()),
                ));
                checks.push(match Assistant::assemble(config, pool.clone(), Arc::new(client)).await {
                    Ok(assistant) => DoctorCheck::pass(
                        "knowledge_index",
                        format!("{} passages indexed", assistant.products.len()),
                    ),
                    Err(error) => DoctorCheck::fail("knowledge_index", error.to_string()),
                });
            }
            Err(error) => {
                checks.push(DoctorCheck::fail("llm_client", error.to_string()));
                checks.push(DoctorCheck::skipped("knowledge_index"));
            }
        }

        pool.close().await;
        checks
    })
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
