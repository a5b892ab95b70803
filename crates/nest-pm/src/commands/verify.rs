//! `nest verify`: check a scope against its records

use super::Session;
use crate::installer::VerifyReport;
use crate::registry::PackageRegistry;
use anyhow::Context;
use std::sync::Arc;

/// Report problems in the session's scope, optionally repairing them
pub fn verify_scope(
    session: &Session,
    registry: Arc<dyn PackageRegistry>,
    repair: bool,
) -> anyhow::Result<VerifyReport> {
    let installer = session.installer(registry);
    let report = if repair {
        installer.repair()
    } else {
        installer.verify()
    }
    .with_context(|| format!("Failed to verify the {} scope", session.scope))?;

    if report.is_clean() {
        println!("The {} scope is consistent.", session.scope);
        return Ok(report);
    }

    for package in &report.missing_links {
        println!("  missing link: {}", package);
    }
    for package in &report.missing_store {
        println!("  missing store entry: {}", package);
    }
    for path in &report.dangling {
        println!("  unrecorded entry: {}", path.display());
    }
    if repair {
        println!("Repaired the {} scope.", session.scope);
    } else {
        println!("Run `nest verify --repair` to drop broken records.");
    }
    Ok(report)
}
