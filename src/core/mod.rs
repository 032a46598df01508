pub mod agent;
pub mod lifecycle;
pub mod orchestrator;
pub mod terminal;
