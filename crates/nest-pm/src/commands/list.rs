//! `nest list`

use super::Session;
use crate::store::{RecordSet, RecordStore};
use anyhow::Context;

/// Print the records of the session's scope
pub fn list_packages(session: &Session) -> anyhow::Result<RecordSet> {
    let records = RecordStore::for_scope(&session.scope)
        .load()
        .with_context(|| format!("Failed to read records of the {} scope", session.scope))?;

    if records.is_empty() {
        println!("No packages installed in the {} scope.", session.scope);
        return Ok(records);
    }

    println!("Packages in the {} scope:", session.scope);
    for record in records.iter() {
        match &record.linked_from {
            Some(source) => println!("  {} -> {}", record.identifier(), source.display()),
            None => println!("  {}", record.identifier()),
        }
    }
    Ok(records)
}
