pub mod orchestrator;
pub mod poller;
pub mod reconcile;
