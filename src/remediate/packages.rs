//! Missing-dependency detection and installation.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::prompts;
use crate::collab::install::is_safe_package_name;
use crate::collab::{DependencyInstaller, InstallOptions};
use crate::model::ProjectContext;
use crate::oracle::{ReasoningOracle, StructuredRequest, complete_structured};
use crate::retry::{RetryPolicy, with_retry};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAssessment {
    pub needs_npm_install: bool,
    #[serde(default)]
    pub packages_to_install: Vec<String>,
}

pub struct PackageAssessor {
    oracle: Arc<dyn ReasoningOracle>,
    installer: Arc<dyn DependencyInstaller>,
    retry: RetryPolicy,
}

impl PackageAssessor {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        installer: Arc<dyn DependencyInstaller>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            oracle,
            installer,
            retry,
        }
    }

    /// Ask the oracle whether the failure is a missing dependency.
    /// An oracle failure counts as "no".
    pub async fn assess(&self, raw_output: &str) -> PackageAssessment {
        let schema = prompts::packages_schema();
        let prompt = prompts::packages_prompt(raw_output);
        let request = StructuredRequest::new(&prompt, prompts::PACKAGES_SYSTEM_PROMPT, &schema);

        match complete_structured::<PackageAssessment>(self.oracle.as_ref(), &request).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(error = %e, "Package assessment failed; assuming no installs needed");
                PackageAssessment::default()
            }
        }
    }

    /// Install whatever the oracle says is missing, one package at a time.
    /// Returns the packages that were actually installed.
    pub async fn assess_and_install_packages(
        &self,
        raw_output: &str,
        ctx: &ProjectContext,
    ) -> Vec<String> {
        let assessment = self.assess(raw_output).await;
        if !assessment.needs_npm_install {
            return Vec::new();
        }

        let options = InstallOptions {
            project_dir: ctx.root_path.clone(),
            install_command: ctx.build.install_command.clone(),
        };

        let mut installed = Vec::new();
        for package in assessment
            .packages_to_install
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
        {
            if !is_safe_package_name(package) {
                warn!(package, "Skipping suspicious package name");
                continue;
            }

            let installer = self.installer.as_ref();
            let opts = &options;
            let result = with_retry(&self.retry, move |_| async move {
                installer.install(package, opts).await
            })
            .await;

            match result {
                Ok(()) => {
                    info!(package, "Installed missing package");
                    installed.push(package.to_string());
                }
                Err(exhausted) => {
                    warn!(
                        package,
                        attempts = exhausted.attempts,
                        error = %exhausted.last,
                        "Package install failed"
                    );
                }
            }
        }
        installed
    }
}
