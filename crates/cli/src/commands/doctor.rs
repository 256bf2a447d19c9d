use poolcalc_core::config::{AppConfig, LoadOptions};
use poolcalc_core::pricing::PriceOverrideTable;
use poolcalc_db::{connect_storage, connect_with_settings, SqlProductSource};
use serde::Serialize;

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

pub fn run(options: LoadOptions, json_output: bool) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_price_overrides(&config));
            checks.extend(check_databases(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["price_overrides", "storage_connectivity", "remote_connectivity"] {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    // Skipped checks do not fail the report once config has loaded.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail)
        && checks.first().is_some_and(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_price_overrides(config: &AppConfig) -> DoctorCheck {
    let Some(path) = &config.engine.price_overrides_path else {
        return DoctorCheck::skipped("price_overrides", "no override table configured");
    };

    match PriceOverrideTable::load(path) {
        Ok(table) => DoctorCheck {
            name: "price_overrides",
            status: CheckStatus::Pass,
            details: format!("loaded {} override(s) from `{}`", table.len(), path.display()),
        },
        Err(error) => {
            DoctorCheck { name: "price_overrides", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_databases(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck { name: "storage_connectivity", status: CheckStatus::Fail, details },
                DoctorCheck::skipped("remote_connectivity", "skipped because runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let storage = match connect_storage(&config.storage).await {
            Ok(pool) => {
                let catalog = SqlProductSource::new(pool.clone()).load_catalog().await;
                pool.close().await;
                match catalog {
                    Ok(catalog) => DoctorCheck {
                        name: "storage_connectivity",
                        status: CheckStatus::Pass,
                        details: format!(
                            "connected using `{}`; {} catalog product(s)",
                            config.storage.url,
                            catalog.len()
                        ),
                    },
                    Err(_) => DoctorCheck {
                        name: "storage_connectivity",
                        status: CheckStatus::Pass,
                        details: format!(
                            "connected using `{}`; schema not migrated yet (run `poolcalc migrate`)",
                            config.storage.url
                        ),
                    },
                }
            }
            Err(error) => DoctorCheck {
                name: "storage_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to connect to storage: {error}"),
            },
        };

        let remote = if !config.remote.enabled {
            DoctorCheck::skipped("remote_connectivity", "remote sync disabled")
        } else {
            match connect_with_settings(
                config.remote_url(),
                config.storage.max_connections,
                config.storage.timeout_secs,
            )
            .await
            {
                Ok(pool) => {
                    pool.close().await;
                    DoctorCheck {
                        name: "remote_connectivity",
                        status: CheckStatus::Pass,
                        details: format!("connected using `{}`", config.remote_url()),
                    }
                }
                Err(error) => DoctorCheck {
                    name: "remote_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to remote store: {error}"),
                },
            }
        };

        vec![storage, remote]
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
