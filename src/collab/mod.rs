//! External collaborators the pipeline consumes but does not own.
//!
//! | Module    | Trait                 | Default implementation |
//! |-----------|-----------------------|------------------------|
//! | `fs`      | `FileStore`           | `LocalFileStore`       |
//! | `build`   | `BuildRunner`         | `CommandBuildRunner`   |
//! | `install` | `DependencyInstaller` | `CommandInstaller`     |
//! | `vcs`     | `VersionControl`      | `GitVersionControl`    |

pub mod build;
pub mod fs;
pub mod install;
pub mod vcs;

pub use build::{BuildOptions, BuildRunner, CommandBuildRunner};
pub use fs::{FileStore, LocalFileStore, MemoryFileStore};
pub use install::{CommandInstaller, DependencyInstaller, InstallOptions};
pub use vcs::{GitVersionControl, VersionControl};
