//! Return orchestration
//!
//! Returns are submitted one at a time against a single snapshot of the
//! loaned-items collection. The platform's read path lags its write path, so
//! successful returns are then confirmed by polling until the returned items
//! drop out of the collection or the retry budget runs out.

use crate::api::{ApiClient, LoanSnapshot};
use crate::config::AgentConfig;
use serde_json::Value;

/// Result of one attempted return
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOutcome {
    pub item_id: String,
    /// `None` when the item was not found in the snapshot
    pub loan_id: Option<Value>,
    pub succeeded: bool,
    pub raw: Option<Value>,
}

impl ReturnOutcome {
    fn skipped(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            loan_id: None,
            succeeded: false,
            raw: None,
        }
    }
}

/// How the confirm loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Every returned item was observed absent
    pub confirmed: bool,
    /// Snapshot fetches made by the loop
    pub checks: u32,
}

/// Everything one orchestrator run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnReport {
    pub outcomes: Vec<ReturnOutcome>,
    /// Present only when at least one return succeeded
    pub confirmation: Option<Confirmation>,
}

impl ReturnReport {
    pub fn succeeded_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| o.item_id.as_str())
            .collect()
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }
}

pub struct ReturnOrchestrator<'a> {
    api: &'a ApiClient,
    config: &'a AgentConfig,
}

impl<'a> ReturnOrchestrator<'a> {
    pub fn new(api: &'a ApiClient, config: &'a AgentConfig) -> Self {
        Self { api, config }
    }

    /// Return every item in `item_ids`, then wait for the platform to agree
    pub async fn run(&self, item_ids: &[String]) -> ReturnReport {
        if item_ids.is_empty() {
            tracing::debug!("Nothing selected to return");
            return ReturnReport::default();
        }

        let Some(snapshot) = self.api.fetch_loaned_items().await else {
            tracing::error!("Loaned items unavailable, {} item(s) not returned", item_ids.len());
            return ReturnReport {
                outcomes: item_ids.iter().map(|id| ReturnOutcome::skipped(id)).collect(),
                confirmation: None,
            };
        };

        let outcomes = self.submit_all(item_ids, &snapshot).await;
        let returned: Vec<String> = outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| o.item_id.clone())
            .collect();

        if returned.is_empty() {
            tracing::error!("No item returned");
            return ReturnReport {
                outcomes,
                confirmation: None,
            };
        }

        tracing::info!("Returned {}/{} item(s), confirming", returned.len(), item_ids.len());
        let confirmation = self.confirm_removed(&returned).await;
        ReturnReport {
            outcomes,
            confirmation: Some(confirmation),
        }
    }

    /// Submit returns strictly in order; one failure does not stop the rest
    pub async fn submit_all(&self, item_ids: &[String], snapshot: &LoanSnapshot) -> Vec<ReturnOutcome> {
        let mut outcomes = Vec::with_capacity(item_ids.len());

        for item_id in item_ids {
            let Some(loan_id) = snapshot.find(item_id).and_then(|item| item.loan_id.clone()) else {
                tracing::error!("Failed to return item, no active loan: item={}", item_id);
                outcomes.push(ReturnOutcome::skipped(item_id));
                continue;
            };

            let response = self.api.submit_return(&loan_id).await;
            let succeeded = response.as_ref().is_some_and(|r| r.success);
            if !succeeded {
                tracing::error!("Failed to return item: item={} loan={}", item_id, loan_id);
            }

            outcomes.push(ReturnOutcome {
                item_id: item_id.clone(),
                loan_id: Some(loan_id),
                succeeded,
                raw: response.map(|r| r.raw),
            });
        }

        outcomes
    }

    /// Poll until none of `returned` is listed, at most `1 + max_confirm_retries` times
    pub async fn confirm_removed(&self, returned: &[String]) -> Confirmation {
        tokio::time::sleep(self.config.first_confirm_delay()).await;

        let max_checks = self.config.max_confirm_checks();
        for check in 1..=max_checks {
            // A failed fetch proves nothing, so it counts as still listed
            let remaining = match self.api.fetch_loaned_items().await {
                Some(snapshot) => returned.iter().filter(|id| snapshot.contains(id)).count(),
                None => returned.len(),
            };
            tracing::debug!(
                "Confirm check {}/{}: {} of {} still listed",
                check,
                max_checks,
                remaining,
                returned.len()
            );

            if remaining == 0 {
                return Confirmation {
                    confirmed: true,
                    checks: check,
                };
            }
            if check < max_checks {
                tokio::time::sleep(self.config.confirm_interval()).await;
            }
        }

        tracing::warn!("Returned items still listed after {} checks", max_checks);
        Confirmation {
            confirmed: false,
            checks: max_checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, succeeded: bool) -> ReturnOutcome {
        ReturnOutcome {
            item_id: id.to_string(),
            loan_id: Some(Value::from(format!("L-{}", id))),
            succeeded,
            raw: None,
        }
    }

    #[test]
    fn test_report_accessors() {
        let report = ReturnReport {
            outcomes: vec![outcome("A", true), outcome("B", false), ReturnOutcome::skipped("C")],
            confirmation: None,
        };
        assert!(report.any_succeeded());
        assert_eq!(report.succeeded_ids(), vec!["A"]);
        assert_eq!(report.failed_count(), 2);
    }

    #[test]
    fn test_empty_report() {
        let report = ReturnReport::default();
        assert!(!report.any_succeeded());
        assert!(report.succeeded_ids().is_empty());
    }

    #[tokio::test]
    async fn test_run_with_nothing_selected_makes_no_calls() {
        // Unroutable endpoint: any request would fail the run
        let api = ApiClient::new(
            reqwest::Client::new(),
            url::Url::parse("http://127.0.0.1:9/hz/mycd/ajax").unwrap(),
            "t",
            100,
        );
        let config = AgentConfig::default();
        let report = ReturnOrchestrator::new(&api, &config).run(&[]).await;
        assert_eq!(report, ReturnReport::default());
    }
}
