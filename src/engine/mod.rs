pub mod matching;
pub mod orchestrator;
pub mod payment;
pub mod pricing;
