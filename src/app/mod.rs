pub mod gold_use_case;
pub mod pipeline_runner;
pub mod ports;
pub mod silver_use_case;
