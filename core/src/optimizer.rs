//! Turns a performance history into a validated candidate policy.
//!
//! `PolicyOptimizer::optimize_agent` calls the LLM, repairs and validates
//! its response, and retries with accumulated error feedback up to
//! `max_retries` times. It does not decide acceptance — that is
//! `PairedComparator`'s job once the candidate has been evaluated.

use serde_json::Value as Json;

use crate::config::{Policy, PolicyConstraints};
use crate::constraints::ConstraintValidator;
use crate::llm::{GenerationContext, LlmClient};

/// One agent's recent accept/reject history, for inclusion in the prompt.
#[derive(Debug, Clone)]
pub struct AgentHistoryEntry {
    pub iteration: usize,
    pub was_accepted: bool,
    pub mean_cost: i64,
}

/// One round trip to the LLM within an `optimize_agent` call, kept so
/// callers can persist a full `LlmInteraction` audit row per attempt.
#[derive(Debug, Clone)]
pub struct LlmAttempt {
    pub instruction: String,
    pub raw_response: Option<Json>,
    pub parsing_error: Option<String>,
}

/// Result of one `optimize_agent` call.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub new_policy: Option<Policy>,
    pub validation_errors: Vec<String>,
    pub attempts: u32,
    pub interactions: Vec<LlmAttempt>,
}

pub struct PolicyOptimizer<'a> {
    llm: &'a dyn LlmClient,
    constraints: &'a PolicyConstraints,
    max_retries: u32,
}

impl<'a> PolicyOptimizer<'a> {
    pub fn new(llm: &'a dyn LlmClient, constraints: &'a PolicyConstraints, max_retries: u32) -> Self {
        Self {
            llm,
            constraints,
            max_retries,
        }
    }

    /// Last `k` entries of `history`, most recent last — the window the
    /// prompt is built from.
    const HISTORY_WINDOW: usize = 3;

    pub async fn optimize_agent(
        &self,
        agent_id: &str,
        current_policy: &Policy,
        current_cost: i64,
        iteration: usize,
        agent_history: &[AgentHistoryEntry],
        best_known_cost: Option<i64>,
    ) -> OptimizationResult {
        let current_policy_json = serde_json::to_value(current_policy)
            .expect("Policy always serializes to JSON");

        let mut accumulated_errors: Vec<String> = Vec::new();
        let mut attempts = 0u32;
        let mut interactions: Vec<LlmAttempt> = Vec::new();

        while attempts < self.max_retries {
            attempts += 1;

            let instruction = self.build_instruction(
                agent_id,
                iteration,
                current_cost,
                agent_history,
                best_known_cost,
                &accumulated_errors,
            );
            let context = GenerationContext {
                agent_id: agent_id.to_string(),
                iteration,
            };

            let raw = match self
                .llm
                .generate_policy(&instruction, &current_policy_json, &context)
                .await
            {
                Ok(raw) => raw,
                Err(err) => {
                    let message = format!("LLM call failed: {err}");
                    interactions.push(LlmAttempt {
                        instruction: instruction.clone(),
                        raw_response: None,
                        parsing_error: Some(message.clone()),
                    });
                    accumulated_errors.push(message);
                    continue;
                }
            };

            let repaired = repair_policy_json(raw.clone(), agent_id, iteration, attempts);
            let candidate: Policy = match serde_json::from_value(repaired) {
                Ok(policy) => policy,
                Err(err) => {
                    let message = format!("response did not match the policy schema: {err}");
                    interactions.push(LlmAttempt {
                        instruction: instruction.clone(),
                        raw_response: Some(raw),
                        parsing_error: Some(message.clone()),
                    });
                    accumulated_errors.push(message);
                    continue;
                }
            };

            let mut attempt_errors = Vec::new();
            if let Err(err) = ConstraintValidator::new(self.constraints).validate(&candidate) {
                attempt_errors.push(err.to_string());
            }
            if let Err(err) = functional_check(&candidate) {
                attempt_errors.push(err);
            }

            if attempt_errors.is_empty() {
                interactions.push(LlmAttempt {
                    instruction,
                    raw_response: Some(raw),
                    parsing_error: None,
                });
                return OptimizationResult {
                    new_policy: Some(candidate),
                    validation_errors: Vec::new(),
                    attempts,
                    interactions,
                };
            }
            interactions.push(LlmAttempt {
                instruction,
                raw_response: Some(raw),
                parsing_error: Some(attempt_errors.join("; ")),
            });
            accumulated_errors.extend(attempt_errors);
        }

        OptimizationResult {
            new_policy: None,
            validation_errors: accumulated_errors,
            attempts,
            interactions,
        }
    }

    fn build_instruction(
        &self,
        agent_id: &str,
        iteration: usize,
        current_cost: i64,
        agent_history: &[AgentHistoryEntry],
        best_known_cost: Option<i64>,
        previous_errors: &[String],
    ) -> String {
        let mut instruction = format!(
            "You are optimizing the cash management policy for agent '{agent_id}' at iteration \
             {iteration}. Its current mean cost is {current_cost} cents."
        );
        if let Some(best) = best_known_cost {
            instruction.push_str(&format!(" The best cost seen for this agent so far is {best} cents."));
        }

        let window_start = agent_history.len().saturating_sub(Self::HISTORY_WINDOW);
        if let Some(recent) = agent_history.get(window_start..) {
            if !recent.is_empty() {
                instruction.push_str(" Recent history: ");
                for entry in recent {
                    instruction.push_str(&format!(
                        "[iter {} {} cost={}] ",
                        entry.iteration,
                        if entry.was_accepted { "accepted" } else { "rejected" },
                        entry.mean_cost
                    ));
                }
            }
        }

        if !previous_errors.is_empty() {
            instruction.push_str(
                " Your previous attempt was rejected for the following reasons; fix them and \
                 respond with corrected JSON only: ",
            );
            instruction.push_str(&previous_errors.join("; "));
        }

        instruction.push_str(
            " Respond with a single JSON object matching the decision-tree policy schema: \
             version, policy_id, parameters, and at least one of payment_tree, bank_tree, \
             strategic_collateral_tree, end_of_tick_collateral_tree. No prose, no markdown.",
        );

        instruction
    }
}

/// Inject missing `version`/`policy_id`/node `node_id`s with deterministic
/// synthetic values, so a response that is structurally almost-right (the
/// common LLM failure mode) doesn't fail schema deserialization outright.
fn repair_policy_json(mut raw: Json, agent_id: &str, iteration: usize, attempt: u32) -> Json {
    let Some(obj) = raw.as_object_mut() else {
        return raw;
    };

    obj.entry("version")
        .or_insert_with(|| Json::String("1.0".to_string()));
    obj.entry("policy_id").or_insert_with(|| {
        Json::String(format!("{agent_id}_iter{iteration}_attempt{attempt}"))
    });
    obj.entry("parameters")
        .or_insert_with(|| Json::Object(Default::default()));

    let mut counter = 0usize;
    for tree_field in [
        "payment_tree",
        "bank_tree",
        "strategic_collateral_tree",
        "end_of_tick_collateral_tree",
    ] {
        if let Some(tree) = obj.get_mut(tree_field) {
            assign_missing_node_ids(tree, agent_id, &mut counter);
        }
    }

    raw
}

fn assign_missing_node_ids(node: &mut Json, agent_id: &str, counter: &mut usize) {
    let Some(obj) = node.as_object_mut() else {
        return;
    };

    if !matches!(obj.get("node_id"), Some(Json::String(s)) if !s.is_empty()) {
        obj.insert(
            "node_id".to_string(),
            Json::String(format!("{agent_id}_n{counter}")),
        );
        *counter += 1;
    }

    if let Some(on_true) = obj.get_mut("on_true") {
        assign_missing_node_ids(on_true, agent_id, counter);
    }
    if let Some(on_false) = obj.get_mut("on_false") {
        assign_missing_node_ids(on_false, agent_id, counter);
    }
}

/// Exercises the policy's tree executor against a synthetic context,
/// catching action/field mismatches the structural simulator validation
/// and our own semantic constraint check both miss (e.g. a well-formed
/// tree that panics or errors on evaluation because of a type mismatch in
/// a compute expression).
fn functional_check(policy: &Policy) -> Result<(), String> {
    use cashsim_engine::orchestrator::CostRates;
    use cashsim_engine::policy::tree::{validate_tree, EvalContext};
    use cashsim_engine::{Agent, SimulationState, Transaction};

    let agent = Agent::new(policy.policy_id.clone(), 1_000_000, 500_000);
    let tx = Transaction::new(
        policy.policy_id.clone(),
        "SYNTHETIC_COUNTERPARTY".to_string(),
        100_000,
        0,
        100,
    );
    let state = SimulationState::new(vec![agent.clone()]);
    let cost_rates = CostRates::default();
    let sample_context = EvalContext::build(&tx, &agent, &state, 0, &cost_rates, 100, 0.8);

    validate_tree(policy, &sample_context).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    })
}
