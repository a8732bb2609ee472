//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `fix`    | `Fix`            |
//! | `parse`  | `Parse`          |
//! | `config` | `Config`         |
//! | `runs`   | `Runs`           |

pub mod config;
pub mod fix;
pub mod parse;
pub mod runs;

pub use config::cmd_config;
pub use fix::cmd_fix;
pub use parse::cmd_parse;
pub use runs::cmd_runs;
