//! `nest run`: run a script from the project manifest

use super::Session;
use crate::script::{run_attached, with_args, ScriptContext};
use anyhow::{bail, Context};

/// Run the manifest script `script` with `args` appended
///
/// The script runs in the project root with the scope's bin directory first
/// on `PATH`.
pub fn run_project_script(session: &Session, script: &str, args: &[String]) -> anyhow::Result<()> {
    let Some(project) = &session.project else {
        bail!("No nest.toml found. Run `nest init` to create a project.");
    };
    let manifest = &project.manifest;
    let Some(command) = manifest.script(script) else {
        let available: Vec<&str> = manifest.scripts.keys().map(String::as_str).collect();
        if available.is_empty() {
            bail!("No script '{}': {} defines no scripts", script, manifest.identifier());
        }
        bail!("No script '{}'. Available: {}", script, available.join(", "));
    };

    let version = manifest.package.version.clone();
    let ctx = ScriptContext {
        name: manifest.name(),
        version: &version,
        package_dir: &project.root,
        scope: &session.scope,
    };
    run_attached(script, &with_args(command, args), &ctx)
        .with_context(|| format!("Script '{}' failed", script))
}
