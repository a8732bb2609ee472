pub mod audit;
pub mod collab;
pub mod config;
pub mod errors;
pub mod mend_config;
pub mod model;
pub mod oracle;
pub mod orchestrator;
pub mod remediate;
pub mod retry;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;
