//! Apply command: runs one sync request against a fixture.

use super::fixture::Fixture;
use std::error::Error;
use std::path::Path;
use storesync_core::{Actor, EntityId, MemoryStore};
use storesync_protocol::SyncResponse;
use storesync_server::{ServerConfig, SyncServer};

/// Options of the apply command.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// User id of the acting user; anonymous when absent.
    pub actor: Option<u64>,
    /// Indent the printed response.
    pub pretty: bool,
}

/// Result of applying a request.
pub struct Applied {
    /// Response body as sent to a client.
    pub body: Vec<u8>,
    /// Server after the request, holding the post-request store.
    pub server: SyncServer<MemoryStore>,
}

/// Processes a request body against a fixture.
pub fn apply(
    fixture: &Fixture,
    request: &[u8],
    options: &ApplyOptions,
) -> Result<Applied, Box<dyn Error>> {
    let registry = fixture.registry()?;
    let store = fixture.memory_store()?;
    let server = SyncServer::new(ServerConfig::default(), registry, store)?;

    let actor = options
        .actor
        .map_or_else(Actor::anonymous, |id| Actor::user(EntityId(id)));
    let mut body = server.handle_json(actor, request)?;
    if options.pretty {
        body = SyncResponse::decode(&body)?.encode_pretty()?;
    }

    Ok(Applied { body, server })
}

/// Runs the apply command.
pub fn run(
    fixture_path: &Path,
    request_path: &Path,
    options: &ApplyOptions,
    save: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::load(fixture_path)?;
    let request = std::fs::read(request_path)
        .map_err(|err| format!("{}: {err}", request_path.display()))?;

    let applied = apply(&fixture, &request, options)?;
    println!("{}", String::from_utf8_lossy(&applied.body));

    let stats = applied.server.stats();
    tracing::debug!(
        created = stats.created,
        failed = stats.failed,
        "request applied"
    );

    if let Some(out) = save {
        let updated = Fixture {
            types: fixture.types,
            store: applied.server.store().snapshot(),
        };
        updated.save(out)?;
        tracing::info!(path = %out.display(), "fixture saved");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use storesync_testkit::{library_declarations, library_store, FixtureDir};

    fn library_fixture() -> Fixture {
        let (store, _) = library_store();
        Fixture {
            types: library_declarations(),
            store: store.snapshot(),
        }
    }

    fn body(value: Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    #[test]
    fn apply_commits_into_fixture_store() {
        let request = body(json!({
            "commitModels": {
                "tag": {"railsClass": "Tag", "data": [{"cid": "t1", "name": "classic"}]}
            }
        }));
        let applied = apply(&library_fixture(), &request, &ApplyOptions::default()).unwrap();

        let response: Value = serde_json::from_slice(&applied.body).unwrap();
        assert_eq!(response["modelsIds"]["tag"]["t1"], json!(3));
        assert_eq!(applied.server.store().count(&"Tag".into()), 3);
    }

    #[test]
    fn apply_acts_as_given_user() {
        let request = body(json!({"refreshModels": {"note": {"railsClass": "Note", "ids": [1, 2]}}}));
        let options = ApplyOptions {
            actor: Some(2),
            pretty: true,
        };
        let applied = apply(&library_fixture(), &request, &options).unwrap();

        let text = String::from_utf8(applied.body).unwrap();
        assert!(text.contains('\n'));
        let response: Value = serde_json::from_str(&text).unwrap();
        let notes = response["models"]["Note"].as_array().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0]["id"], json!(2));
    }

    #[test]
    fn run_saves_updated_fixture() {
        let dir = FixtureDir::new();
        let fixture_path = dir.write_json("fixture.json", &library_fixture());
        let request_path = dir.write_json(
            "request.json",
            &json!({"destroyModels": {"book": [{"id": 3}]}}),
        );
        let out = dir.path("after.json");

        run(&fixture_path, &request_path, &ApplyOptions::default(), Some(&out)).unwrap();

        let saved = Fixture::load(&out).unwrap();
        let store = saved.memory_store().unwrap();
        assert_eq!(store.count(&"Book".into()), 2);
        assert!(store.join_table("books_tags").iter().all(|(book, _)| *book != EntityId(3)));
    }

    #[test]
    fn malformed_request_fails() {
        let result = apply(&library_fixture(), b"{\"commitModels\": 3}", &ApplyOptions::default());
        assert!(result.is_err());
    }
}
