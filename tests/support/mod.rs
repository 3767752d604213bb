//! Shared fixtures: a tiny in-memory graph answering the statements the
//! compiler emits for the `Note` entity.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use penumbra::client::{AccessMode, ClientOptions, DriverError, ExecutionClient, Row, ScriptedDriver};
use penumbra::query::{CompiledQuery, CompilerSettings, RequestContext, WriteInput};
use penumbra::repository::EntityRepository;
use penumbra::schema::{EntityDescriptor, FieldDef, FieldType, RelationshipDef};
use serde_json::{json, Map, Value};

pub const NOTE_FIELDS: [&str; 3] = ["body", "priority", "title"];

pub fn note_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("Note", "note")
        .company_scoped()
        .field("title", FieldDef::of(FieldType::String))
        .field("body", FieldDef::of(FieldType::String))
        .field("priority", FieldDef::of(FieldType::Number).with_default(1))
        .relationship(
            "tags",
            RelationshipDef::new("TAGGED", "Tag")
                .many()
                .edge_field("weight", Some(json!(1))),
        )
}

pub fn input(value: Value) -> WriteInput {
    value.as_object().cloned().unwrap_or_default()
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

#[derive(Clone, Debug, Default)]
pub struct Record {
    pub company: String,
    pub props: Map<String, Value>,
    pub tags: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub companies: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub notes: BTreeMap<String, Record>,
    clock: u64,
}

impl MemoryStore {
    fn tick(&mut self) -> String {
        self.clock += 1;
        format!("2026-01-01T00:00:00.{:09}Z", self.clock)
    }

    fn visible(&self, company: Option<&str>) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .notes
            .values()
            .filter(|record| company.map_or(true, |c| record.company == c))
            .collect();
        records.sort_by(|a, b| {
            b.props["updatedAt"]
                .as_str()
                .cmp(&a.props["updatedAt"].as_str())
        });
        records
    }

    fn owned(&self, id: &str, company: Option<&str>) -> bool {
        self.notes
            .get(id)
            .is_some_and(|record| company.map_or(true, |c| record.company == c))
    }

    /// Answers one statement. Anything unrecognised is a query error so
    /// tests notice new statement shapes.
    pub fn answer(&mut self, query: &CompiledQuery, mode: AccessMode) -> Result<Vec<Row>, DriverError> {
        let text = query.text.as_str();
        let params = &query.params;
        let company = params.get("companyId").and_then(Value::as_str);
        let id = params
            .get("id")
            .or_else(|| params.get("searchValue"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        if text.contains("UNWIND $relatedRefs") {
            let refs = params["relatedRefs"].as_array().cloned().unwrap_or_default();
            return Ok(refs
                .iter()
                .map(|r| {
                    let found = r["label"] == "Tag"
                        && r["id"].as_str().is_some_and(|t| self.tags.contains(t));
                    row(json!({"relationship": r["relationship"], "id": r["id"], "label": r["label"], "found": found}))
                })
                .collect());
        }
        if text.contains("AS exists") {
            return Ok(vec![row(json!({"exists": self.notes.contains_key(&id)}))]);
        }
        if text.contains("AS total") {
            return Ok(vec![row(json!({"total": self.visible(company).len()}))]);
        }
        if text.contains("CREATE (note:Note") {
            assert_eq!(mode, AccessMode::Write);
            let Some(company) = company.filter(|c| self.companies.contains(*c)) else {
                return Ok(Vec::new());
            };
            let now = self.tick();
            let mut props = Map::new();
            props.insert("id".into(), json!(id));
            props.insert("createdAt".into(), json!(now));
            props.insert("updatedAt".into(), json!(now));
            for field in NOTE_FIELDS {
                if let Some(value) = params.get(field) {
                    props.insert(field.into(), value.clone());
                }
            }
            let mut record = Record {
                company: company.to_owned(),
                props,
                tags: BTreeMap::new(),
            };
            link_tags(&mut record, params);
            self.notes.insert(id.clone(), record);
            return Ok(vec![row(json!({"id": id}))]);
        }
        if text.contains("DETACH DELETE") {
            if !self.owned(&id, company) {
                return Ok(Vec::new());
            }
            self.notes.remove(&id);
            return Ok(vec![row(json!({"id": id}))]);
        }
        if text.contains("SET note.updatedAt") {
            assert_eq!(mode, AccessMode::Write);
            if !self.owned(&id, company) {
                return Ok(Vec::new());
            }
            let now = self.tick();
            let Some(record) = self.notes.get_mut(&id) else {
                return Ok(Vec::new());
            };
            record.props.insert("updatedAt".into(), json!(now));
            for field in NOTE_FIELDS {
                if let Some(value) = params.get(field) {
                    record.props.insert(field.into(), value.clone());
                } else if text.contains(&format!("note.{field} = NULL")) {
                    record.props.remove(field);
                }
            }
            link_tags(record, params);
            if let Some(Value::Object(updates)) = params.get("tagsEdgePropsUpdate") {
                for (tag, props) in updates {
                    if let (Some(Value::Object(edge)), Value::Object(props)) =
                        (record.tags.get_mut(tag), props)
                    {
                        edge.extend(props.clone());
                    }
                }
            }
            return Ok(vec![row(json!({"id": id}))]);
        }
        if text.contains("RETURN note") {
            assert_eq!(mode, AccessMode::Read);
            if params.contains_key("searchValue") {
                return Ok(self
                    .notes
                    .get(&id)
                    .filter(|record| company.map_or(true, |c| record.company == c))
                    .map(note_row)
                    .into_iter()
                    .collect());
            }
            let skip = params.get("cursorSkip").and_then(Value::as_u64).unwrap_or(0) as usize;
            let limit = params
                .get("cursorLimit")
                .and_then(Value::as_u64)
                .map_or(usize::MAX, |l| l as usize);
            return Ok(self
                .visible(company)
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(note_row)
                .collect());
        }
        Err(DriverError::query(format!("unexpected statement: {text}")))
    }
}

fn link_tags(record: &mut Record, params: &BTreeMap<String, Value>) {
    let Some(ids) = params.get("tags").and_then(Value::as_array) else {
        return;
    };
    let ids: Vec<String> = ids
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();
    record.tags.retain(|tag, _| ids.contains(tag));
    for tag in ids {
        let props = params
            .get("tagsEdgeProps")
            .and_then(|p| p.get(&tag))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let edge = record.tags.entry(tag).or_insert_with(|| json!({}));
        if let (Value::Object(edge), Value::Object(props)) = (edge, props) {
            edge.extend(props);
        }
    }
}

fn note_row(record: &Record) -> Row {
    let tags: Vec<Value> = record.tags.keys().map(|t| json!({"id": t})).collect();
    let edges: Vec<Value> = record
        .tags
        .iter()
        .map(|(t, props)| json!({"relatedId": t, "edgeProps": props}))
        .collect();
    row(json!({
        "note": Value::Object(record.props.clone()),
        "note_tags": tags,
        "note_tags_edges": edges,
    }))
}

pub struct Harness {
    pub store: Arc<Mutex<MemoryStore>>,
    pub driver: ScriptedDriver,
    pub client: Arc<ExecutionClient>,
    pub notes: EntityRepository,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(Mutex::new(MemoryStore::default()));
        {
            let mut state = store.lock();
            state.companies.extend(["c1".to_owned(), "c2".to_owned()]);
            state.tags.extend(["t1", "t2", "t3"].map(str::to_owned));
        }
        let shared = Arc::clone(&store);
        let driver = ScriptedDriver::new(move |query, mode| shared.lock().answer(query, mode));
        let client = Arc::new(ExecutionClient::new(
            Arc::new(driver.clone()),
            ClientOptions::default(),
        ));
        let notes = EntityRepository::new(
            Arc::new(note_descriptor()),
            Arc::clone(&client),
            CompilerSettings::default(),
        );
        Self {
            store,
            driver,
            client,
            notes,
        }
    }

    pub fn writes(&self) -> usize {
        self.driver
            .events()
            .iter()
            .filter(|event| matches!(event, penumbra::client::Event::Run(AccessMode::Write, _)))
            .count()
    }
}

pub fn tenant(company: &str) -> RequestContext {
    RequestContext::tenant(company, "u1")
}
