//! Stand-ins for the external collaborators spec §1 marks out of scope
//! (data-source connectors, rule evaluation engines, RBAC). The core
//! itself only ever sees the `scanforge_core::capability` traits; this
//! module gives the CLI something concrete to wire at bootstrap so
//! `scanforge submit` works without a real connector fleet behind it.
//! A production deployment swaps these for real implementations without
//! touching `scanforge-core` at all.

use std::collections::HashMap;

use async_trait::async_trait;

use scanforge_core::capability::{
    DataSourceMetadata, DataSourceSvc, Rbac, RuleOutcome, RuleSvc,
};
use scanforge_types::model::ScanRequest;

/// A flat, in-memory data-source catalog loaded from the CLI's config
/// directory (`catalog.toml`, keyed by data source id). Unknown ids
/// still validate and fall back to a generic metadata guess -- this
/// mirrors the estimator's own "absence is not an error" stance (spec
/// §4.1: "if the estimator service returns a hint, replace base values
/// ... clamp to the same bounds").
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct CatalogEntry {
    pub estimated_rows: u64,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

pub struct DemoDataSourceSvc {
    catalog: HashMap<String, CatalogEntry>,
}

impl DemoDataSourceSvc {
    pub fn new(catalog: HashMap<String, CatalogEntry>) -> Self {
        Self { catalog }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }
}

#[async_trait]
impl DataSourceSvc for DemoDataSourceSvc {
    async fn validate(&self, data_source_id: &str) -> anyhow::Result<bool> {
        // An empty catalog accepts anything -- there is nothing to
        // validate against in demo mode.
        Ok(self.catalog.is_empty() || self.catalog.contains_key(data_source_id))
    }

    async fn metadata(&self, data_source_id: &str) -> anyhow::Result<DataSourceMetadata> {
        let entry = self.catalog.get(data_source_id).cloned().unwrap_or(CatalogEntry {
            estimated_rows: 50_000,
            tables: vec!["default".to_string()],
            columns: vec!["col_1".to_string(), "col_2".to_string()],
        });
        Ok(DataSourceMetadata {
            estimated_rows: entry.estimated_rows,
            tables: entry.tables,
            columns: entry.columns,
        })
    }
}

/// Validates any rule id and executes each as an immediate no-op
/// success. A real `RuleSvc` delegates to the rule evaluation engine
/// (spec §1 Non-goals: "Scan rule evaluation internals" is out of
/// scope for the core).
pub struct DemoRuleSvc;

#[async_trait]
impl RuleSvc for DemoRuleSvc {
    async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(rule_ids.to_vec())
    }

    async fn execute_rule(&self, rule_id: &str, _request: &ScanRequest) -> anyhow::Result<RuleOutcome> {
        Ok(RuleOutcome {
            rule_id: rule_id.to_string(),
            succeeded: true,
            error: None,
            output: serde_json::Value::Null,
        })
    }
}

/// A generic role chain, used when no real RBAC integration is wired
/// (spec §6 `RBAC.ResolveApprovers`; spec §4.3 escalation hierarchy falls
/// back to `requester -> manager -> director` for unrecognized workflow
/// types, same fallback `scanforge-core::workflow::approval` uses).
pub struct DemoRbac;

#[async_trait]
impl Rbac for DemoRbac {
    async fn resolve_approvers(
        &self,
        _workflow_type: &str,
        _organization_id: &str,
        current_approver_id: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        let chain = ["requester", "manager", "director"];
        match current_approver_id {
            None => Ok(vec![chain[0].to_string()]),
            Some(current) => {
                let idx = chain.iter().position(|c| *c == current).unwrap_or(0);
                Ok(chain.get(idx + 1..).unwrap_or(&[]).iter().map(|s| s.to_string()).collect())
            }
        }
    }
}

pub fn load_catalog(path: &std::path::Path) -> anyhow::Result<HashMap<String, CatalogEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_catalog_validates_any_data_source() {
        let svc = DemoDataSourceSvc::empty();
        assert!(svc.validate("whatever").await.unwrap());
    }

    #[tokio::test]
    async fn demo_rules_succeed_unconditionally() {
        let svc = DemoRuleSvc;
        assert_eq!(svc.validate(&["r1".to_string()]).await.unwrap(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn rbac_chain_advances_past_current_approver() {
        let rbac = DemoRbac;
        let next = rbac.resolve_approvers("data_classification", "org", Some("manager")).await.unwrap();
        assert_eq!(next, vec!["director".to_string()]);
    }
}
