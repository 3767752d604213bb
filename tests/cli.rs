use std::io::Write;
use std::process::Output;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::NamedTempFile;

const SCHEMA: &str = r#"
[[entities]]
is_company_scoped = true
fulltext_index_name = "note_search"
[entities.model]
label = "Note"
node_variable = "note"
[entities.fields.title]
type = "string"
[entities.fields.dueAt]
type = "datetime"
[entities.relationships.tags]
relationship_label = "TAGGED"
target_label = "Tag"
cardinality = "many"
[[entities.constraints]]
property = "id"
[[entities.indexes]]
name = "note_search"
type = "fulltext"
properties = ["title"]

[[entities]]
[entities.model]
label = "Tag"
node_variable = "tag"
[entities.fields.name]
type = "string"
"#;

fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

fn penumbra(config: &NamedTempFile, args: &[&str]) -> Output {
    Command::cargo_bin("penumbra")
        .expect("binary builds")
        .env("PENUMBRA_CONFIG", config.path())
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("runs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn ddl_lists_constraints_and_indexes() {
    let config = temp_file("");
    let schema = temp_file(SCHEMA);
    let path = schema.path().to_str().expect("utf-8 path");
    let output = penumbra(&config, &["ddl", "--schema", path]);
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains(
        "CREATE CONSTRAINT note_id_unique IF NOT EXISTS FOR (n:Note) REQUIRE n.id IS UNIQUE;"
    ));
    assert!(text.contains(
        "CREATE FULLTEXT INDEX note_search IF NOT EXISTS FOR (n:Note) ON EACH [n.title];"
    ));
}

#[test]
fn explain_find_uses_configured_tenancy() {
    let config = temp_file("[tenancy]\ntenant_label = \"Org\"\nmembership_edge = \"OWNED_BY\"\n");
    let schema = temp_file(SCHEMA);
    let path = schema.path().to_str().expect("utf-8 path");
    let output = penumbra(
        &config,
        &["explain", "--schema", path, "--entity", "Note", "--company", "acme", "--cursor", "26"],
    );
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.starts_with("MATCH (company:Org {id: $companyId})"));
    assert!(text.contains("MATCH (note:Note)-[:OWNED_BY]->(company)"));
    assert!(text.contains("SKIP $cursorSkip LIMIT $cursorLimit"));
    assert!(text.contains("\"companyId\":\"acme\""));
}

#[test]
fn explain_create_prints_precheck_then_write_as_json() {
    let config = temp_file("");
    let schema = temp_file(SCHEMA);
    let path = schema.path().to_str().expect("utf-8 path");
    let output = penumbra(
        &config,
        &[
            "--format",
            "json",
            "explain",
            "--schema",
            path,
            "--entity",
            "Note",
            "--op",
            "create",
            "--id",
            "n1",
            "--params",
            r#"{"title": "hello", "dueAt": "2026-05-01T09:00:00Z", "tags": ["t1"]}"#,
        ],
    );
    assert!(output.status.success(), "{output:?}");
    let queries: Value = serde_json::from_slice(&output.stdout).expect("json output");
    let queries = queries.as_array().expect("array of statements");
    assert_eq!(queries.len(), 2);
    assert!(queries[0]["text"]
        .as_str()
        .is_some_and(|text| text.contains("UNWIND $relatedRefs")));
    let write = queries[1]["text"].as_str().expect("write text");
    assert!(write.contains("CREATE (note:Note {id: $id})"));
    assert!(write.contains("note.dueAt = datetime($dueAt)"));
    assert_eq!(queries[1]["params"]["title"], "hello");
}

#[test]
fn explain_count_drops_pagination() {
    let config = temp_file("");
    let schema = temp_file(SCHEMA);
    let path = schema.path().to_str().expect("utf-8 path");
    let output = penumbra(
        &config,
        &["explain", "--schema", path, "--entity", "Tag", "--op", "count"],
    );
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("RETURN count(DISTINCT tag) AS total"));
    assert!(!text.contains("LIMIT"));
}

#[test]
fn unknown_entity_fails() {
    let config = temp_file("");
    let schema = temp_file(SCHEMA);
    let path = schema.path().to_str().expect("utf-8 path");
    let output = penumbra(&config, &["explain", "--schema", path, "--entity", "Invoice"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no entity 'Invoice'"), "{stderr}");
}

#[test]
fn config_prints_effective_values_without_the_password() {
    let config = temp_file(
        "[connection]\nuri = \"bolt://graph.internal:7687\"\npassword = \"hunter2\"\n\n[pagination]\ndefault_take = 50\n",
    );
    let output = penumbra(&config, &["config"]);
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("bolt://graph.internal:7687"));
    assert!(text.contains("default_take = 50"));
    assert!(!text.contains("hunter2"));
}

#[test]
fn invalid_config_is_reported() {
    let config = temp_file("[pagination]\ndefault_take = 0\n");
    let output = penumbra(&config, &["config"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("default_take"));
}
