//! Check command: validates a fixture.

use super::fixture::Fixture;
use std::path::Path;

/// Summary of a valid fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Declared types with their stored entity count, sorted by tag.
    pub types: Vec<(String, usize)>,
    /// Stored rows across all join tables.
    pub join_rows: usize,
    /// Eager relation cycles, as type tags.
    pub eager_cycles: Vec<Vec<String>>,
}

/// Validates a fixture and builds its report.
pub fn check(fixture: &Fixture) -> Result<CheckReport, Box<dyn std::error::Error>> {
    let registry = fixture.registry()?;
    let store = fixture.memory_store()?;

    let types = registry
        .iter()
        .map(|schema| (schema.tag().to_string(), store.count(schema.tag())))
        .collect();
    let join_rows = fixture.store.joins.values().map(Vec::len).sum();
    let eager_cycles = registry
        .eager_cycles()
        .into_iter()
        .map(|cycle| cycle.iter().map(ToString::to_string).collect())
        .collect();

    Ok(CheckReport {
        types,
        join_rows,
        eager_cycles,
    })
}

/// Runs the check command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::load(path)?;
    let report = check(&fixture)?;

    println!("Fixture: {}", path.display());
    println!();
    println!("Types:");
    for (tag, count) in &report.types {
        println!("  {tag:<24} {count} entities");
    }
    println!("Join rows: {}", report.join_rows);

    if report.eager_cycles.is_empty() {
        println!("Eager cycles: none");
    } else {
        println!("Eager cycles:");
        for cycle in &report.eager_cycles {
            println!("  {}", cycle.join(" -> "));
        }
    }

    println!();
    println!("✓ Fixture is valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storesync_testkit::{library_declarations, library_store, FixtureDir};

    #[test]
    fn library_report() {
        let (store, _) = library_store();
        let fixture = Fixture {
            types: library_declarations(),
            store: store.snapshot(),
        };
        let report = check(&fixture).unwrap();

        let count = |tag: &str| {
            report
                .types
                .iter()
                .find(|(name, _)| name == tag)
                .map(|(_, count)| *count)
        };
        assert_eq!(report.types.len(), 5);
        assert_eq!(count("Book"), Some(3));
        assert_eq!(count("Note"), Some(2));
        assert_eq!(report.join_rows, 3);
        assert!(report
            .eager_cycles
            .iter()
            .any(|cycle| cycle == &vec!["Category".to_string()]));
    }

    #[test]
    fn run_rejects_broken_fixture() {
        let dir = FixtureDir::new();
        let path = dir.write_json(
            "broken.json",
            &serde_json::json!({"types": [{"tag": "Book", "eager": ["author"]}]}),
        );
        assert!(run(&path).is_err());
    }
}
