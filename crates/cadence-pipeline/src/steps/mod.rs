//! Built-in step handlers, one per [`StepKind`](crate::step::StepKind).

mod artifacts;
mod audit;
mod coverage;
mod environment;
mod install;
mod lint;
mod test;

pub use artifacts::ArtifactsStep;
pub use audit::AuditStep;
pub use coverage::CoverageStep;
pub use environment::EnvironmentStep;
pub use install::InstallStep;
pub use lint::LintStep;
pub use test::TestStep;

use crate::step::StepHandler;

/// The standard seven-step sequence, in execution order.
pub fn default_steps() -> Vec<Box<dyn StepHandler>> {
    vec![
        Box::new(EnvironmentStep),
        Box::new(InstallStep),
        Box::new(AuditStep),
        Box::new(LintStep),
        Box::new(TestStep),
        Box::new(CoverageStep),
        Box::new(ArtifactsStep),
    ]
}
