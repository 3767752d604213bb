//! Constraint and index DDL derived from descriptors.

use crate::schema::descriptor::{EntityDescriptor, IndexDef, IndexKind};

/// Renders `CREATE CONSTRAINT` / `CREATE INDEX` statements for a descriptor.
///
/// Every statement is idempotent (`IF NOT EXISTS`) so startup can replay them.
pub fn statements(descriptor: &EntityDescriptor) -> Vec<String> {
    let label = descriptor.label();
    let var = "n";
    let mut out = Vec::new();
    for constraint in &descriptor.constraints {
        out.push(format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR ({var}:{label}) REQUIRE {var}.{prop} IS UNIQUE",
            name = constraint_name(label, &constraint.property),
            prop = constraint.property,
        ));
    }
    for index in &descriptor.indexes {
        out.push(index_statement(label, var, index));
    }
    out
}

fn constraint_name(label: &str, property: &str) -> String {
    format!("{}_{}_unique", label.to_ascii_lowercase(), property)
}

fn index_statement(label: &str, var: &str, index: &IndexDef) -> String {
    let props = index
        .properties
        .iter()
        .map(|p| format!("{var}.{p}"))
        .collect::<Vec<_>>()
        .join(", ");
    match index.kind {
        IndexKind::Range => format!(
            "CREATE INDEX {name} IF NOT EXISTS FOR ({var}:{label}) ON ({props})",
            name = index.name
        ),
        IndexKind::Fulltext => format!(
            "CREATE FULLTEXT INDEX {name} IF NOT EXISTS FOR ({var}:{label}) ON EACH [{props}]",
            name = index.name
        ),
        IndexKind::Vector => format!(
            "CREATE VECTOR INDEX {name} IF NOT EXISTS FOR ({var}:{label}) ON ({props}) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {dims}, `vector.similarity_function`: '{sim}'}}}}",
            name = index.name,
            dims = index.dimensions.unwrap_or_default(),
            sim = index.similarity.as_deref().unwrap_or("cosine"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::{FieldDef, FieldType};

    #[test]
    fn renders_constraints_and_each_index_kind() {
        let descriptor = EntityDescriptor::new("Chunk", "chunk")
            .field("content", FieldDef::of(FieldType::String))
            .field("position", FieldDef::of(FieldType::Number))
            .field("embedding", FieldDef::of(FieldType::NumberList))
            .fulltext("chunk_content", &["content"])
            .index(IndexDef {
                name: "chunk_position".into(),
                kind: IndexKind::Range,
                properties: vec!["position".into()],
                dimensions: None,
                similarity: None,
            })
            .index(IndexDef {
                name: "chunk_embedding".into(),
                kind: IndexKind::Vector,
                properties: vec!["embedding".into()],
                dimensions: Some(1536),
                similarity: None,
            });
        let ddl = statements(&descriptor);
        assert_eq!(
            ddl[0],
            "CREATE CONSTRAINT chunk_id_unique IF NOT EXISTS FOR (n:Chunk) REQUIRE n.id IS UNIQUE"
        );
        assert_eq!(
            ddl[1],
            "CREATE FULLTEXT INDEX chunk_content IF NOT EXISTS FOR (n:Chunk) ON EACH [n.content]"
        );
        assert_eq!(
            ddl[2],
            "CREATE INDEX chunk_position IF NOT EXISTS FOR (n:Chunk) ON (n.position)"
        );
        assert!(ddl[3].starts_with("CREATE VECTOR INDEX chunk_embedding IF NOT EXISTS"));
        assert!(ddl[3].contains("`vector.dimensions`: 1536"));
        assert!(ddl[3].contains("'cosine'"));
    }
}
