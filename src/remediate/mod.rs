//! Remediation stages, leaves first.
//!
//! | Module      | Stage            | Entry point |
//! |-------------|------------------|-------------|
//! | `parser`    | ErrorParser      | `ErrorParser::parse_build_errors` |
//! | `partition` | AgentPartitioner | `AgentPartitioner::create_bug_agents` |
//! | `packages`  | PackageAssessor  | `PackageAssessor::assess_and_install_packages` |
//! | `proposer`  | FixProposer      | `FixProposer::generate_potential_fixes` |
//! | `patch`     | PatchApplicator  | `PatchApplicator::apply_code_patch` |
//!
//! `prompts` holds the oracle prompt templates and response schemas.

pub mod packages;
pub mod parser;
pub mod partition;
pub mod patch;
pub mod prompts;
pub mod proposer;

pub use packages::{PackageAssessment, PackageAssessor};
pub use parser::ErrorParser;
pub use partition::{AgentPartitioner, agents_from_errors, branch_name_for, group_errors_by_file};
pub use patch::{PatchApplicator, number_lines, strip_line_numbers};
pub use proposer::FixProposer;
