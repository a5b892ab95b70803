//! `nest uninstall`

use super::Session;
use crate::registry::PackageRegistry;
use crate::store::InstallRecord;
use anyhow::{bail, Context};
use std::sync::Arc;

/// Remove each of `names` from the session's scope
///
/// Every name is checked against the records first, so an unknown name
/// leaves the scope untouched.
pub fn uninstall_packages(
    session: &Session,
    registry: Arc<dyn PackageRegistry>,
    names: &[String],
) -> anyhow::Result<Vec<InstallRecord>> {
    let installer = session.installer(registry);
    let records = installer.records()?;
    let missing: Vec<&str> = names
        .iter()
        .filter(|name| records.get(name.as_str()).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        bail!(
            "Not installed in the {} scope: {}",
            session.scope,
            missing.join(", ")
        );
    }

    let mut removed = Vec::with_capacity(names.len());
    for name in names {
        let record = installer
            .uninstall(name)
            .with_context(|| format!("Failed to uninstall {}", name))?;
        println!("Removed {} from the {} scope", record.identifier(), session.scope);
        removed.push(record);
    }
    Ok(removed)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::commands::{install_packages, InstallOptions};
    use crate::config::Config;
    use crate::manifest::PackageManifest;
    use crate::registry::MemoryRegistry;
    use crate::resolver::ResolveMode;
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, tempfile::TempDir, Session, Arc<MemoryRegistry>) {
        let home = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let config = Config {
            home: home.path().to_path_buf(),
            registry_url: "memory://".to_string(),
            concurrency: 2,
            lock_timeout: Duration::from_secs(1),
            resolve_mode: ResolveMode::FailFast,
        };
        let session = Session::with_config(config, cwd.path(), false, None);
        let registry = Arc::new(MemoryRegistry::new());
        for name in ["one", "two", "three"] {
            registry
                .publish(PackageManifest::new(name, "1.0.0"), &[])
                .unwrap();
        }
        let options = InstallOptions {
            targets: vec!["one".to_string(), "two".to_string(), "three".to_string()],
            ..InstallOptions::default()
        };
        install_packages(&session, registry.clone(), &options).unwrap();
        (home, cwd, session, registry)
    }

    #[test]
    fn test_uninstall_several() {
        let (_home, _cwd, session, registry) = setup();
        let names = vec!["one".to_string(), "three".to_string()];

        let removed = uninstall_packages(&session, registry.clone(), &names).unwrap();
        assert_eq!(removed.len(), 2);

        let records = session.installer(registry).records().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records.get("two").is_some());
    }

    #[test]
    fn test_unknown_name_removes_nothing() {
        let (_home, _cwd, session, registry) = setup();
        let names = vec!["one".to_string(), "ghost".to_string()];

        let err = uninstall_packages(&session, registry.clone(), &names).unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert_eq!(session.installer(registry).records().unwrap().len(), 3);
    }
}
