//! Shared fixtures for the end-to-end seed scenarios.

use std::collections::HashMap;
use std::io::Write;

use cashsim_core::config::{
    ConvergenceCriteria, GameConfig, GameMode, LlmConfig, MonteCarloConfig, OptimizationSchedule,
    OutputConfig, Policy, SampleMethod,
};

pub fn write_two_agent_scenario(dir: &std::path::Path) -> String {
    let path = dir.join("scenario.yaml");
    let yaml = r#"
ticks_per_day: 20
agents:
  - id: BANK_A
    opening_balance: 1000000
    credit_limit: 500000
  - id: BANK_B
    opening_balance: 1000000
    credit_limit: 500000
historical_transactions:
  - sender_id: BANK_A
    receiver_id: BANK_B
    amount: 1500000
    arrival_tick: 0
    deadline_tick: 15
  - sender_id: BANK_B
    receiver_id: BANK_A
    amount: 1500000
    arrival_tick: 1
    deadline_tick: 16
  - sender_id: BANK_A
    receiver_id: BANK_B
    amount: 500000
    arrival_tick: 2
    deadline_tick: 18
"#;
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    path.to_str().unwrap().to_string()
}

pub fn tempfile_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "cashsim-core-itest-{tag}-{}-{}",
        std::process::id(),
        tag.len()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn seed_policy(policy_id: &str) -> Policy {
    Policy {
        version: "1.0".to_string(),
        policy_id: policy_id.to_string(),
        description: None,
        payment_tree: None,
        strategic_collateral_tree: None,
        end_of_tick_collateral_tree: None,
        bank_tree: None,
        parameters: HashMap::new(),
    }
}

pub fn two_agent_config(scenario_path: String) -> GameConfig {
    let mut seed_policies = HashMap::new();
    seed_policies.insert("BANK_A".to_string(), seed_policy("BANK_A"));
    seed_policies.insert("BANK_B".to_string(), seed_policy("BANK_B"));

    GameConfig {
        game_id: "seed-suite".to_string(),
        scenario_path,
        master_seed: 1234,
        mode: GameMode::CampaignLearning,
        optimized_agents: vec!["BANK_A".to_string()],
        seed_policies,
        llm_config: LlmConfig {
            model: "openai:gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_retries: 3,
            timeout_seconds: 30,
            thinking_budget: None,
            reasoning_effort: None,
            fanout_stagger_seconds: 0.0,
        },
        optimization_schedule: OptimizationSchedule::OnSimulationEnd {
            min_remaining_repetitions: 1,
        },
        monte_carlo_config: MonteCarloConfig {
            num_samples: 4,
            sample_method: SampleMethod::Bootstrap,
            evaluation_ticks: 20,
            parallel_workers: 2,
        },
        convergence_criteria: ConvergenceCriteria {
            metric_name: "total_cost".to_string(),
            stability_threshold: 0.05,
            stability_window: 2,
            max_iterations: 3,
            improvement_threshold: 0.0,
        },
        policy_constraints: None,
        output_config: OutputConfig::default(),
    }
}
