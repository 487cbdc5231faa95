pub mod changeset;
pub mod config;
pub mod dag;
pub mod errors;
pub mod orchestrator;
pub mod review_config;
pub mod session;
pub mod stage;
pub mod tracker;
pub mod ui;
