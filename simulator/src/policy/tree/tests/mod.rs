mod test_cost_context;
mod test_system_context;
