//! Policy evaluation engine.
//!
//! One engine is shared by every request (`Arc<PolicyEngine>`). It enriches
//! the request through the registered attribute providers, loads the tenant's
//! policies through a TTL cache, evaluates the candidates and combines their
//! decisions with the configured algorithm.

use super::attributes::{apply_bags, record_failure, AttributeProvider};
use super::combining::{combine, PolicyDecision};
use super::condition::evaluate_group;
use super::target::{is_candidate, rule_applies};
use crate::cache::{ttl, TtlCache};
use crate::domain::{
    CombiningAlgorithm, Decision, Effect, EvaluationRequest, EvaluationResult, EvaluationTrace,
    Policy, PolicyRule, PolicyTrace, RuleTrace,
};
use crate::error::Result;
use crate::repository::PolicyRepository;
use chrono::Utc;
use metrics::{counter, histogram};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::Span;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub algorithm: CombiningAlgorithm,
    /// TTL of the per-tenant policy list cache.
    pub cache_ttl: Duration,
    pub enable_trace: bool,
    /// Parent span for every event the engine emits.
    pub span: Span,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            algorithm: CombiningAlgorithm::default(),
            cache_ttl: Duration::from_secs(ttl::POLICY_SECS),
            enable_trace: false,
            span: Span::none(),
        }
    }
}

/// Result of evaluating one policy's rules.
struct PolicyOutcome<'a> {
    policy: &'a Policy,
    decision: Decision,
    /// Matched rules in evaluation order (priority descending).
    matched: Vec<&'a PolicyRule>,
    trace: Option<PolicyTrace>,
}

impl PolicyOutcome<'_> {
    /// Highest-priority matched rule whose effect produced the decision.
    fn deciding_rule(&self) -> Option<&PolicyRule> {
        self.matched
            .iter()
            .copied()
            .find(|rule| Decision::from(rule.effect) == self.decision)
    }
}

pub struct PolicyEngine {
    repository: Arc<dyn PolicyRepository>,
    providers: RwLock<Vec<Arc<dyn AttributeProvider>>>,
    algorithm: CombiningAlgorithm,
    cache: TtlCache<Uuid, Arc<Vec<Policy>>>,
    /// Bumped on every invalidation so a load that raced it is not kept.
    generations: Mutex<HashMap<Uuid, u64>>,
    enable_trace: bool,
    span: Span,
}

impl PolicyEngine {
    pub fn new(repository: Arc<dyn PolicyRepository>, config: EngineConfig) -> Self {
        Self {
            repository,
            providers: RwLock::new(Vec::new()),
            algorithm: config.algorithm,
            cache: TtlCache::new("policies", config.cache_ttl),
            generations: Mutex::new(HashMap::new()),
            enable_trace: config.enable_trace,
            span: config.span,
        }
    }

    pub fn algorithm(&self) -> CombiningAlgorithm {
        self.algorithm
    }

    pub fn repository(&self) -> &Arc<dyn PolicyRepository> {
        &self.repository
    }

    /// Appends a provider. Providers run in registration order.
    pub fn register_attribute_provider(&self, provider: Arc<dyn AttributeProvider>) {
        tracing::debug!(parent: &self.span, provider = provider.name(), "Registered attribute provider");
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(provider);
    }

    pub fn provider_count(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Drops the cached policy list of `tenant_id`; the next evaluation for the
    /// tenant reads the store again.
    pub async fn invalidate_cache(&self, tenant_id: Uuid) {
        *self
            .generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tenant_id)
            .or_default() += 1;
        self.cache.invalidate(&tenant_id).await;
    }

    fn generation(&self, tenant_id: Uuid) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tenant_id)
            .copied()
            .unwrap_or_default()
    }

    /// Stops the policy cache sweeper.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    // ==================== Evaluation ====================

    /// Evaluates one request. Degraded situations (store unavailable, no
    /// applicable policy) produce an `indeterminate` or `not_applicable`
    /// result rather than an error.
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult> {
        let started = Instant::now();
        let mut result = EvaluationResult::new(Decision::NotApplicable, Utc::now());

        let request = self.enrich(request).await;

        let policies = match self.load_policies(request.tenant_id).await {
            Ok(policies) => policies,
            Err(e) => {
                tracing::error!(parent: &self.span, tenant_id = %request.tenant_id, error = %e, "Failed to load policies");
                result.decision = Decision::Indeterminate;
                result.reason = format!("failed to load policies: {e}");
                return Ok(self.finish(result, &request, started, 0));
            }
        };

        let mut candidates: Vec<&Policy> = policies
            .iter()
            .filter(|policy| is_candidate(policy, &request))
            .collect();

        if candidates.is_empty() {
            result.reason = "no applicable policies found".to_string();
            return Ok(self.finish(result, &request, started, 0));
        }

        candidates.sort_by_key(|policy| Reverse(policy.priority));

        let outcomes: Vec<PolicyOutcome<'_>> = candidates
            .iter()
            .map(|&policy| self.evaluate_policy(&request, policy))
            .collect();

        let decisions: Vec<PolicyDecision> = outcomes
            .iter()
            .map(|outcome| PolicyDecision {
                policy_id: outcome.policy.id,
                decision: outcome.decision,
                priority: outcome.policy.priority,
                rule_id: outcome.deciding_rule().map(|rule| rule.id.clone()),
            })
            .collect();

        let combined = combine(self.algorithm, &decisions);
        result.decision = combined.decision;
        result.policy_id = combined.policy_id;
        result.rule_id = combined.rule_id;
        result.matched_policies = candidates.iter().map(|policy| policy.id).collect();

        if let Some(deciding) = combined
            .policy_id
            .and_then(|id| outcomes.iter().find(|outcome| outcome.policy.id == id))
        {
            for rule in deciding
                .matched
                .iter()
                .filter(|rule| Decision::from(rule.effect) == combined.decision)
            {
                result.obligations.extend(rule.obligations.iter().cloned());
                result.advice.extend(rule.advice.iter().cloned());
            }
        }

        result.reason = match combined.decision {
            Decision::Allow | Decision::Deny => deciding_name(&outcomes, combined.policy_id)
                .map(|name| format!("decided by policy '{name}'"))
                .unwrap_or_default(),
            Decision::NotApplicable => "no rule conditions matched".to_string(),
            Decision::Indeterminate => "policies did not yield exactly one applicable decision".to_string(),
        };

        if self.enable_trace {
            let applicable_policies = outcomes
                .into_iter()
                .filter_map(|outcome| outcome.trace)
                .collect();
            result.trace = Some(EvaluationTrace {
                request: request.clone(),
                applicable_policies,
                combined_decision: combined.decision,
                algorithm: self.algorithm,
            });
        }

        let evaluated = candidates.len();
        Ok(self.finish(result, &request, started, evaluated))
    }

    /// Evaluates every request independently. A failed item becomes
    /// `indeterminate` and does not affect the others.
    pub async fn evaluate_batch(&self, requests: &[EvaluationRequest]) -> Vec<EvaluationResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = match self.evaluate(request).await {
                Ok(result) => result,
                Err(e) => EvaluationResult::indeterminate(e.to_string()),
            };
            results.push(result);
        }
        results
    }

    async fn enrich(&self, request: &EvaluationRequest) -> EvaluationRequest {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut enriched = request.clone();
        for provider in providers {
            match provider.get_attributes(&enriched).await {
                Ok(bags) => apply_bags(&mut enriched, bags),
                Err(e) => record_failure(&self.span, provider.name(), &e),
            }
        }
        enriched
    }

    async fn load_policies(&self, tenant_id: Uuid) -> Result<Arc<Vec<Policy>>> {
        if let Some(policies) = self.cache.get(&tenant_id).await {
            counter!("abac_policy_cache_total", "result" => "hit").increment(1);
            return Ok(policies);
        }
        counter!("abac_policy_cache_total", "result" => "miss").increment(1);

        let generation = self.generation(tenant_id);
        let policies = Arc::new(self.repository.find_by_tenant_id(tenant_id).await?);
        self.cache.insert(tenant_id, policies.clone()).await;

        // An invalidation during the read may have missed this entry.
        if self.generation(tenant_id) != generation {
            self.cache.invalidate(&tenant_id).await;
        }
        Ok(policies)
    }

    fn evaluate_policy<'a>(
        &self,
        request: &EvaluationRequest,
        policy: &'a Policy,
    ) -> PolicyOutcome<'a> {
        let resource = request.resource_type();
        let action = request.action_name();

        let mut rules: Vec<&PolicyRule> = policy
            .rules
            .iter()
            .filter(|rule| rule_applies(rule, resource, action))
            .collect();
        rules.sort_by_key(|rule| Reverse(rule.priority));

        let mut matched = Vec::new();
        let mut rule_traces = Vec::new();

        for rule in rules {
            let mut lines = Vec::new();
            let is_match = match &rule.conditions {
                None => true,
                // An empty `or` never matches; an empty `and` always does.
                Some(group) => evaluate_group(
                    request,
                    group,
                    if self.enable_trace { Some(&mut lines) } else { None },
                ),
            };

            if self.enable_trace {
                rule_traces.push(RuleTrace {
                    rule_id: rule.id.clone(),
                    effect: rule.effect,
                    decision: if is_match {
                        Decision::from(rule.effect)
                    } else {
                        Decision::NotApplicable
                    },
                    matched: is_match,
                    conditions: lines,
                });
            }

            if is_match {
                matched.push(rule);
            }
        }

        // Rules within a policy always combine deny-overrides.
        let decision = if matched.iter().any(|rule| rule.effect == Effect::Deny) {
            Decision::Deny
        } else if matched.is_empty() {
            Decision::NotApplicable
        } else {
            Decision::Allow
        };

        let trace = self.enable_trace.then(|| PolicyTrace {
            policy_id: policy.id,
            policy_name: policy.name.clone(),
            priority: policy.priority,
            decision,
            rules: rule_traces,
        });

        PolicyOutcome {
            policy,
            decision,
            matched,
            trace,
        }
    }

    fn finish(
        &self,
        mut result: EvaluationResult,
        request: &EvaluationRequest,
        started: Instant,
        policies_evaluated: usize,
    ) -> EvaluationResult {
        let elapsed = started.elapsed();
        result.evaluation_time_us = elapsed.as_micros().try_into().unwrap_or(u64::MAX);

        counter!("abac_evaluations_total", "decision" => result.decision.as_str()).increment(1);
        histogram!("abac_evaluation_duration_seconds").record(elapsed.as_secs_f64());

        tracing::debug!(
            parent: &self.span,
            tenant_id = %request.tenant_id,
            resource = request.resource_type(),
            action = request.action_name(),
            decision = %result.decision,
            policies_evaluated,
            evaluation_time_us = result.evaluation_time_us,
            "ABAC evaluation completed"
        );

        result
    }
}

fn deciding_name(outcomes: &[PolicyOutcome<'_>], policy_id: Option<Uuid>) -> Option<String> {
    let id = policy_id?;
    outcomes
        .iter()
        .find(|outcome| outcome.policy.id == id)
        .map(|outcome| outcome.policy.name.clone())
}
