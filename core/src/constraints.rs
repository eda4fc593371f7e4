//! Policy constraint enforcement.
//!
//! Structural well-formedness of a decision tree (duplicate node ids,
//! depth, dangling field/parameter references) is the simulator's job —
//! `cashsim_engine::policy::tree::validate_tree` already runs the first
//! time a `TreePolicy` is evaluated. `ConstraintValidator` enforces a
//! narrower, game-specific policy: which actions, fields, and parameter
//! ranges an LLM-authored policy is allowed to use for this run, as
//! configured in `PolicyConstraints`.

use std::collections::HashSet;

use cashsim_engine::policy::tree::{ActionType, Expression, TreeNode, Value, ValueOrCompute};

use crate::config::{Policy, PolicyConstraints};
use crate::error::{CoreError, CoreResult};

/// Checks an LLM-produced policy against the constraints configured for a
/// game.
pub struct ConstraintValidator<'a> {
    constraints: &'a PolicyConstraints,
}

impl<'a> ConstraintValidator<'a> {
    pub fn new(constraints: &'a PolicyConstraints) -> Self {
        Self { constraints }
    }

    /// Validate a full policy. Collects every violation rather than
    /// stopping at the first, so a rejected policy can be reported back
    /// to the LLM with complete feedback in one round trip.
    pub fn validate(&self, policy: &Policy) -> CoreResult<()> {
        let mut violations = Vec::new();

        self.check_parameters(policy, &mut violations);

        if let Some(tree) = &policy.payment_tree {
            self.check_tree(
                "payment_tree",
                tree,
                &self.constraints.payment_tree_actions,
                &mut violations,
            );
        }
        if let Some(tree) = &policy.bank_tree {
            self.check_tree("bank_tree", tree, &self.constraints.bank_tree_actions, &mut violations);
        }
        if let Some(tree) = &policy.strategic_collateral_tree {
            self.check_tree(
                "strategic_collateral_tree",
                tree,
                &self.constraints.strategic_collateral_tree_actions,
                &mut violations,
            );
        }
        if let Some(tree) = &policy.end_of_tick_collateral_tree {
            self.check_tree(
                "end_of_tick_collateral_tree",
                tree,
                &self.constraints.end_of_tick_collateral_tree_actions,
                &mut violations,
            );
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(violations.join("; ")))
        }
    }

    fn check_parameters(&self, policy: &Policy, violations: &mut Vec<String>) {
        if self.constraints.allowed_parameters.is_empty() {
            return;
        }
        let bounds: std::collections::HashMap<&str, (f64, f64)> = self
            .constraints
            .allowed_parameters
            .iter()
            .map(|p| (p.name.as_str(), (p.min, p.max)))
            .collect();

        for (name, value) in &policy.parameters {
            match bounds.get(name.as_str()) {
                None => violations.push(format!("parameter '{name}' is not in the allowed set")),
                Some((min, max)) => {
                    if *value < *min || *value > *max {
                        violations.push(format!(
                            "parameter '{name}' = {value} is out of allowed range [{min}, {max}]"
                        ));
                    }
                }
            }
        }
    }

    fn check_tree(
        &self,
        tree_name: &str,
        node: &TreeNode,
        allowed_actions: &[String],
        violations: &mut Vec<String>,
    ) {
        let allowed: HashSet<&str> = allowed_actions.iter().map(String::as_str).collect();
        self.walk(tree_name, node, &allowed, violations);
    }

    fn walk(&self, tree_name: &str, node: &TreeNode, allowed_actions: &HashSet<&str>, violations: &mut Vec<String>) {
        match node {
            TreeNode::Condition {
                condition,
                on_true,
                on_false,
                ..
            } => {
                self.check_expression(condition, violations);
                self.walk(tree_name, on_true, allowed_actions, violations);
                self.walk(tree_name, on_false, allowed_actions, violations);
            }
            TreeNode::Action {
                node_id,
                action,
                parameters,
            } => {
                if !allowed_actions.is_empty() && !allowed_actions.contains(action_name(action)) {
                    let mut allowed_sorted: Vec<&&str> = allowed_actions.iter().collect();
                    allowed_sorted.sort();
                    violations.push(format!(
                        "{tree_name} node '{node_id}' uses action {} which is not allowed; allowed actions are {{{}}}",
                        action_name(action),
                        allowed_sorted.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", "),
                    ));
                }
                if !self.constraints.allowed_fields.is_empty() {
                    for value in parameters.values() {
                        self.check_value_or_compute(value, violations);
                    }
                }
            }
        }
    }

    fn check_expression(&self, expr: &Expression, violations: &mut Vec<String>) {
        if self.constraints.allowed_fields.is_empty() {
            return;
        }
        match expr {
            Expression::Equal { left, right }
            | Expression::NotEqual { left, right }
            | Expression::LessThan { left, right }
            | Expression::LessOrEqual { left, right }
            | Expression::GreaterThan { left, right }
            | Expression::GreaterOrEqual { left, right } => {
                self.check_value(left, violations);
                self.check_value(right, violations);
            }
            Expression::And { conditions } | Expression::Or { conditions } => {
                for c in conditions {
                    self.check_expression(c, violations);
                }
            }
            Expression::Not { condition } => self.check_expression(condition, violations),
        }
    }

    fn check_value(&self, value: &Value, violations: &mut Vec<String>) {
        if let Value::Field { field } = value {
            if !self.constraints.allowed_fields.contains(field) {
                violations.push(format!("field '{field}' is not in the allowed set"));
            }
        }
    }

    fn check_value_or_compute(&self, value: &ValueOrCompute, violations: &mut Vec<String>) {
        if let ValueOrCompute::Field { field } = value {
            if !self.constraints.allowed_fields.contains(field) {
                violations.push(format!("field '{field}' is not in the allowed set"));
            }
        }
    }
}

fn action_name(action: &ActionType) -> &'static str {
    match action {
        ActionType::Release => "Release",
        ActionType::ReleaseWithCredit => "ReleaseWithCredit",
        ActionType::PaceAndRelease => "PaceAndRelease",
        ActionType::Split => "Split",
        ActionType::Hold => "Hold",
        ActionType::Drop => "Drop",
        ActionType::Reprioritize => "Reprioritize",
        ActionType::PostCollateral => "PostCollateral",
        ActionType::WithdrawCollateral => "WithdrawCollateral",
        ActionType::HoldCollateral => "HoldCollateral",
        ActionType::SetReleaseBudget => "SetReleaseBudget",
    }
}
