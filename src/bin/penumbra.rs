//! Binary entry point for the Penumbra schema and query CLI.
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use penumbra::{
    config::EngineConfig,
    logging,
    pagination::{count_statement, Cursor},
    query::{
        CompiledQuery, CompilerSettings, FindParams, QueryCompiler, RequestContext, WriteInput,
    },
    schema::{DescriptorRegistry, SchemaFile},
    GraphError,
};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(
    name = "penumbra",
    version,
    about = "Inspect entity schemas and the Cypher they compile to",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", env = "PENUMBRA_CONFIG", help = "Engine config file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "warn", help = "Log filter when RUST_LOG is unset")]
    log_level: String,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print constraint and index statements for every entity in a schema file
    Ddl {
        #[arg(long, value_name = "FILE")]
        schema: PathBuf,
    },
    /// Print the compiled Cypher and parameters for one operation
    Explain(ExplainCmd),
    /// Print the effective configuration
    Config,
    /// Apply schema DDL to the configured database
    #[cfg(feature = "neo4j")]
    Apply {
        #[arg(long, value_name = "FILE")]
        schema: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ExplainCmd {
    #[arg(long, value_name = "FILE")]
    schema: PathBuf,

    #[arg(long, help = "Entity label")]
    entity: String,

    #[arg(long, value_enum, default_value_t = Operation::Find)]
    op: Operation,

    #[arg(long, help = "Entity id for find-by-id and delete")]
    id: Option<String>,

    #[arg(long, help = "Free-text search term")]
    term: Option<String>,

    #[arg(long, help = "Compile as an elevated actor")]
    elevated: bool,

    #[arg(long, default_value = "company-1", help = "Tenant id")]
    company: String,

    #[arg(long, default_value = "user-1", help = "Acting user id")]
    user: String,

    #[arg(long, value_name = "JSON", help = "Write input object")]
    params: Option<String>,

    #[arg(long, help = "Page cursor (offset)")]
    cursor: Option<String>,

    #[arg(long, help = "Page size")]
    take: Option<String>,

    #[arg(long, help = "Drop pagination entirely")]
    fetch_all: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum Operation {
    Find,
    FindById,
    Count,
    Create,
    Put,
    Patch,
    Delete,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init_logging(Some(cli.log_level.as_str()));
    let config = EngineConfig::load(cli.config.clone())?;

    match &cli.command {
        Command::Ddl { schema } => {
            let registry = load_registry(schema)?;
            let statements = registry.ddl();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statements)?),
                OutputFormat::Text => {
                    for statement in statements {
                        println!("{statement};");
                    }
                }
            }
        }
        Command::Explain(cmd) => {
            let queries = explain(cmd, &config)?;
            emit(cli.format, &queries)?;
        }
        Command::Config => match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            OutputFormat::Text => print!("{}", config.to_toml()?),
        },
        #[cfg(feature = "neo4j")]
        Command::Apply { schema } => {
            use std::sync::Arc;

            use penumbra::client::{BoltDriver, ExecutionClient};

            let registry = load_registry(schema)?;
            let driver = BoltDriver::connect(&config.connection).await?;
            let client = ExecutionClient::new(Arc::new(driver), config.client_options());
            let applied = client.apply_schema(&registry).await?;
            println!("applied {applied} statement(s)");
        }
    }
    Ok(())
}

fn load_registry(path: &Path) -> Result<DescriptorRegistry, Box<dyn Error>> {
    Ok(SchemaFile::load(path)?.into_registry()?)
}

fn explain(cmd: &ExplainCmd, config: &EngineConfig) -> Result<Vec<CompiledQuery>, Box<dyn Error>> {
    let registry = load_registry(&cmd.schema)?;
    let descriptor = registry
        .try_get(&cmd.entity)
        .ok_or_else(|| format!("schema declares no entity '{}'", cmd.entity))?;
    let settings = config.compiler_settings();
    let compiler = QueryCompiler::new(descriptor, &settings);
    let ctx = if cmd.elevated {
        RequestContext::elevated(cmd.user.clone())
    } else {
        RequestContext::tenant(cmd.company.clone(), cmd.user.clone())
    };
    let mut params = FindParams::default();
    if let Some(term) = &cmd.term {
        params = params.term(term.clone());
    }
    let id = || {
        cmd.id
            .clone()
            .ok_or_else(|| GraphError::InvalidArgument("--id is required for this operation".into()))
    };

    let queries = match cmd.op {
        Operation::Find | Operation::Count => {
            let statement = compiler.find(&ctx, &params)?;
            if cmd.op == Operation::Count {
                count_statement(&statement)
                    .map(|count| vec![count.render()])
                    .unwrap_or_default()
            } else {
                let cursor = cursor_from(cmd, &settings)?;
                vec![statement.render_window(&cursor.window()?)]
            }
        }
        Operation::FindById => vec![compiler.find_by_id(&ctx, &id()?)?.render()],
        Operation::Delete => vec![compiler.delete(&ctx, &id()?)?.render()],
        Operation::Create | Operation::Put | Operation::Patch => {
            let input = write_input(cmd)?;
            let statements = match cmd.op {
                Operation::Create => compiler.create(&ctx, &input)?,
                Operation::Put => compiler.put(&ctx, &input)?,
                _ => compiler.patch(&ctx, &input)?,
            };
            statements
                .precheck
                .iter()
                .map(|precheck| precheck.render())
                .chain(std::iter::once(statements.write.render()))
                .collect()
        }
    };
    Ok(queries)
}

fn cursor_from(cmd: &ExplainCmd, settings: &CompilerSettings) -> Result<Cursor, GraphError> {
    let mut query = HashMap::new();
    if let Some(cursor) = &cmd.cursor {
        query.insert("cursor".to_owned(), cursor.clone());
    }
    if let Some(take) = &cmd.take {
        query.insert("take".to_owned(), take.clone());
    }
    if cmd.fetch_all {
        query.insert("fetchAll".to_owned(), "true".to_owned());
    }
    Cursor::from_query_with(&query, settings.default_take)
}

fn write_input(cmd: &ExplainCmd) -> Result<WriteInput, Box<dyn Error>> {
    let mut input = match cmd.params.as_deref().map(serde_json::from_str::<Value>) {
        None => WriteInput::new(),
        Some(Ok(Value::Object(map))) => map,
        Some(Ok(_)) => return Err("--params must be a JSON object".into()),
        Some(Err(err)) => return Err(format!("--params is not valid JSON: {err}").into()),
    };
    if let Some(id) = &cmd.id {
        input.insert("id".into(), json!(id));
    }
    Ok(input)
}

fn emit(format: OutputFormat, queries: &[CompiledQuery]) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(queries)?),
        OutputFormat::Text => {
            for (index, query) in queries.iter().enumerate() {
                if index > 0 {
                    println!();
                }
                println!("{}", query.text);
                if !query.params.is_empty() {
                    println!("// params: {}", serde_json::to_string(&query.params)?);
                }
            }
        }
    }
    Ok(())
}
