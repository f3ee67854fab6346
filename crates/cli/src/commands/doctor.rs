use std::sync::Arc;

use ocbot_airtable::AirtableClient;
use ocbot_core::config::{AppConfig, LoadOptions, StorageBackend};
use ocbot_core::directory::EVENTS_TABLE;
use ocbot_core::records::{RecordQuery, RecordStore};
use ocbot_db::{
    open_installation_store, InstallationRepository, JsonFileInstallationRepository,
    RepositoryError,
};
use serde::Serialize;

use crate::commands::{
    current_thread_runtime, CommandResult, EXIT_CONFIG, EXIT_CONNECTIVITY, EXIT_OK,
};

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

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Skipped checks do not fail the report; only `Fail` does.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = exit_code_for(&report);

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

fn exit_code_for(report: &DoctorReport) -> u8 {
    let failed = |name: &str| {
        report.checks.iter().any(|check| check.name == name && check.status == CheckStatus::Fail)
    };

    if failed("config_validation") {
        EXIT_CONFIG
    } else if report.overall_status == CheckStatus::Fail {
        EXIT_CONNECTIVITY
    } else {
        EXIT_OK
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match current_thread_runtime() {
                Ok(runtime) => {
                    checks.push(runtime.block_on(check_record_store(&config)));
                    checks.push(runtime.block_on(check_installation_store(&config)));
                }
                Err(error) => {
                    for name in ["record_store_connectivity", "installation_store_readiness"] {
                        checks.push(DoctorCheck {
                            name,
                            status: CheckStatus::Fail,
                            details: format!("failed to initialize async runtime: {error}"),
                        });
                    }
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["record_store_connectivity", "installation_store_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

async fn check_record_store(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "record_store_connectivity";

    let client = match AirtableClient::from_config(&config.airtable) {
        Ok(Some(client)) => client,
        Ok(None) => {
            return DoctorCheck {
                name: NAME,
                status: CheckStatus::Skipped,
                details: "AIRTABLE_API_KEY and AIRTABLE_BASE are not set; lookups will report unavailable"
                    .to_string(),
            };
        }
        Err(error) => {
            return DoctorCheck { name: NAME, status: CheckStatus::Fail, details: error.to_string() };
        }
    };

    let query = RecordQuery::table(EVENTS_TABLE).max_records(1);
    match client.first_page(&query).await {
        Ok(records) => DoctorCheck {
            name: NAME,
            status: CheckStatus::Pass,
            details: format!("`{EVENTS_TABLE}` answered with {} record(s)", records.len()),
        },
        Err(error) => DoctorCheck { name: NAME, status: CheckStatus::Fail, details: error.to_string() },
    }
}

/// Never creates the JSON store; the server does that on start.
async fn check_installation_store(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "installation_store_readiness";

    let opened: Result<Arc<dyn InstallationRepository>, String> = match config.storage.backend() {
        StorageBackend::JsonFile { directory } => {
            match JsonFileInstallationRepository::open_existing(&directory).await {
                Ok(Some(repository)) => Ok(Arc::new(repository)),
                Ok(None) => {
                    return DoctorCheck {
                        name: NAME,
                        status: CheckStatus::Skipped,
                        details: format!(
                            "json_file store `{}` does not exist yet; ocbot-server creates it on start",
                            directory.display()
                        ),
                    };
                }
                Err(error) => Err(error.to_string()),
            }
        }
        _ => open_installation_store(&config.storage).await.map_err(|error| error.to_string()),
    };
    let store = match opened {
        Ok(store) => store,
        Err(details) => return DoctorCheck { name: NAME, status: CheckStatus::Fail, details },
    };

    let result = async {
        store.ping().await?;
        let installations = store.list_installations().await?;
        let pending = store.pending_oauth_states().await?;
        Ok::<_, RepositoryError>((installations.len(), pending))
    }
    .await;
    match result {
        Ok((installations, pending)) => DoctorCheck {
            name: NAME,
            status: CheckStatus::Pass,
            details: format!(
                "{} store ready with {installations} installation(s) and {pending} pending oauth state(s)",
                store.backend_name()
            ),
        },
        Err(error) => DoctorCheck {
            name: NAME,
            status: CheckStatus::Fail,
            details: format!("{} store check failed: {error}", store.backend_name()),
        },
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_output_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Pass,
            summary: "doctor: all readiness checks passed".to_string(),
            checks: vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Pass,
                    details: "ok".to_string(),
                },
                DoctorCheck {
                    name: "record_store_connectivity",
                    status: CheckStatus::Skipped,
                    details: "unset".to_string(),
                },
            ],
        };

        let rendered = render_human(&report);

        assert_eq!(
            rendered,
            "doctor: all readiness checks passed\n- [ok] config_validation: ok\n- [skip] record_store_connectivity: unset"
        );
    }
}
