use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use contracts::policy::{Decision, PolicyInput};

/// Pluggable policy evaluator. This crate treats evaluation as an external
/// collaborator per the platform's scope — only the interface and a
/// reference implementation live here; a real deployment can substitute an
/// evaluator backed by whatever policy engine it runs.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, input: &PolicyInput) -> Decision;
}

/// A ruleset, once parsed, is cheap to re-evaluate. `ParsedRuleset` stands
/// in for whatever a real evaluator would compile a ruleset string into
/// (the engine this was modeled on prepares and caches a query per ruleset
/// text the same way).
#[derive(Debug, Clone)]
enum ParsedRuleset {
    AllowAll,
    DenyAll { reason: String },
}

fn parse_ruleset(ruleset: &str) -> ParsedRuleset {
    let trimmed = ruleset.trim();
    if let Some(reason) = trimmed.strip_prefix("deny:") {
        ParsedRuleset::DenyAll {
            reason: reason.trim().to_string(),
        }
    } else {
        ParsedRuleset::AllowAll
    }
}

/// Reference evaluator: understands a tiny ruleset grammar (`allow` or
/// `deny:<reason>`) and caches the parse keyed by the ruleset text.
#[derive(Default)]
pub struct StaticRulesetEvaluator {
    cache: Mutex<HashMap<String, ParsedRuleset>>,
}

impl StaticRulesetEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepared(&self, ruleset: &str) -> ParsedRuleset {
        let mut cache = self.cache.lock().unwrap();
        if let Some(parsed) = cache.get(ruleset) {
            return parsed.clone();
        }
        let parsed = parse_ruleset(ruleset);
        cache.insert(ruleset.to_string(), parsed.clone());
        parsed
    }
}

#[async_trait]
impl Evaluator for StaticRulesetEvaluator {
    async fn evaluate(&self, input: &PolicyInput) -> Decision {
        match self.prepared(&input.ruleset) {
            ParsedRuleset::AllowAll => Decision {
                allowed: true,
                reason: String::new(),
            },
            ParsedRuleset::DenyAll { reason } => Decision {
                allowed: false,
                reason,
            },
        }
    }
}

/// Thin wrapper the session/workflow services depend on: boolean allow,
/// nothing more. Keeps callers from reaching into the evaluator's decision
/// plumbing.
pub struct PolicyEnforcer {
    evaluator: Box<dyn Evaluator>,
}

impl PolicyEnforcer {
    pub fn new(evaluator: Box<dyn Evaluator>) -> Self {
        Self { evaluator }
    }

    pub async fn allow(&self, input: PolicyInput) -> Decision {
        self.evaluator.evaluate(&input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(ruleset: &str) -> PolicyInput {
        PolicyInput {
            tenant_id: "t-1".to_string(),
            action: "session.create".to_string(),
            ruleset: ruleset.to_string(),
        }
    }

    #[tokio::test]
    async fn allow_all_ruleset() {
        let evaluator = StaticRulesetEvaluator::new();
        let decision = evaluator.evaluate(&input("allow")).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn deny_with_reason() {
        let evaluator = StaticRulesetEvaluator::new();
        let decision = evaluator.evaluate(&input("deny: quota exceeded")).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "quota exceeded");
    }

    #[tokio::test]
    async fn cache_reuses_parsed_ruleset() {
        let evaluator = StaticRulesetEvaluator::new();
        evaluator.evaluate(&input("allow")).await;
        assert_eq!(evaluator.cache.lock().unwrap().len(), 1);
        evaluator.evaluate(&input("allow")).await;
        assert_eq!(evaluator.cache.lock().unwrap().len(), 1);
    }
}
