use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub version: u64,
    pub ruleset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertPolicyRequest {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub name: String,
    pub version: u64,
    pub ruleset: String,
}

impl UpsertPolicyRequest {
    pub fn policy_id(&self) -> String {
        format!("{}:{}", self.tenant_id, self.name)
    }
}

/// What callers ask the evaluator about: the session or job about to be
/// created, plus whatever ruleset the policy store has on file for the
/// caller's policy ID.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput {
    pub tenant_id: String,
    pub action: String,
    pub ruleset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}
