//! CLI command implementations
//!
//! Each command loads the schema catalog (and optional config), does its
//! work, and answers with a single JSON envelope on stdout. The work
//! itself is a plain function returning the response data so it can be
//! exercised without a terminal.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::config::DslConfig;
use crate::path::{enumerate_paths, resolve};
use crate::pipeline::{replay, Pipeline, UpdatePipeline};
use crate::query::{Filter, Update};
use crate::schema::{SchemaCatalog, SchemaDef, SchemaLoader, SchemaNode};

use super::args::{Command, SchemaArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Schema and settings a command runs against
#[derive(Debug, Clone)]
pub struct Target {
    pub catalog: Arc<SchemaCatalog>,
    pub root: Arc<SchemaNode>,
    pub config: DslConfig,
}

impl Target {
    /// Load the catalog, pick the collection and read the config
    pub fn load(schema: &Path, collection: Option<&str>, config: Option<&Path>) -> CliResult<Self> {
        let catalog = SchemaLoader::load_file(schema)?;
        let root = match collection {
            Some(name) => catalog.get(name)?,
            None => catalog.sole().ok_or_else(|| {
                CliError::schema_error(format!(
                    "catalog has {} collections; pass --collection",
                    catalog.len()
                ))
            })?,
        };
        let config = match config {
            Some(path) => DslConfig::load(path)?,
            None => DslConfig::default(),
        };
        tracing::debug!(
            schema = %schema.display(),
            collection = collection.unwrap_or("<sole>"),
            "target loaded"
        );
        Ok(Self {
            catalog: Arc::new(catalog),
            root,
            config,
        })
    }

    fn from_args(args: &SchemaArgs) -> CliResult<Self> {
        Self::load(&args.schema, args.collection.as_deref(), args.config.as_deref())
    }
}

fn describe_schema(node: &SchemaNode) -> CliResult<Value> {
    Ok(serde_json::to_value(SchemaDef::from_node(node))?)
}

/// Install the stderr log subscriber, filtered by `RUST_LOG`
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    init_logging();
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Paths {
            target,
            placeholders,
        } => respond(|| Ok(paths(&Target::from_args(&target)?, placeholders))),
        Command::Resolve {
            target,
            path,
            placeholders,
            check_in_array,
        } => respond(|| {
            resolve_type(
                &Target::from_args(&target)?,
                &path,
                placeholders,
                check_in_array,
            )
        }),
        Command::CheckFilter { target } => {
            respond(|| check_filter(&Target::from_args(&target)?, read_request()?))
        }
        Command::CheckUpdate { target } => {
            respond(|| check_update(&Target::from_args(&target)?, read_request()?))
        }
        Command::CheckPipeline { target } => {
            respond(|| check_pipeline(&Target::from_args(&target)?, read_request()?))
        }
    }
}

/// Writes the envelope for `work`; failures are reported and returned
fn respond(work: impl FnOnce() -> CliResult<Value>) -> CliResult<()> {
    match work() {
        Ok(data) => write_response(data),
        Err(err) => {
            tracing::debug!(code = err.code_str(), "command rejected");
            write_error(err.code_str(), err.message())?;
            Err(err)
        }
    }
}

/// Every path pattern the collection admits
pub fn paths(target: &Target, placeholders: bool) -> Value {
    let options = target.config.resolve_options().with_placeholders(placeholders);
    let patterns: Vec<String> = enumerate_paths(&target.root, options)
        .iter()
        .map(ToString::to_string)
        .collect();
    json!(patterns)
}

/// Type and presence facts for one path
pub fn resolve_type(
    target: &Target,
    path: &str,
    placeholders: bool,
    check_in_array: bool,
) -> CliResult<Value> {
    let options = target
        .config
        .resolve_options()
        .with_placeholders(placeholders)
        .with_check_in_array(check_in_array);
    let resolved = resolve(&target.root, path, options)?;
    let value_type = resolved.value_type();
    Ok(json!({
        "path": resolved.path().to_string(),
        "type": describe_schema(&value_type)?,
        "display": value_type.to_string(),
        "optional": resolved.is_optional(),
        "nullable": resolved.is_nullable(),
        "inArray": resolved.in_array(),
    }))
}

pub fn check_filter(target: &Target, document: Value) -> CliResult<Value> {
    let filter = Filter::with_config(&target.root, document, &target.config)?;
    Ok(filter.into_document())
}

/// An object is an update document; an array is an update pipeline
pub fn check_update(target: &Target, document: Value) -> CliResult<Value> {
    match document {
        Value::Array(stages) => {
            let update = UpdatePipeline::new(target.root.clone())
                .with_config(target.config.clone())
                .replay(&stages)?;
            Ok(json!({
                "stages": serde_json::to_value(update.build())?,
                "schema": describe_schema(update.schema())?,
            }))
        }
        document => {
            let update = Update::with_config(&target.root, document, &target.config)?;
            Ok(update.into_document())
        }
    }
}

/// Replays the stage list and reports the output schema
pub fn check_pipeline(target: &Target, document: Value) -> CliResult<Value> {
    let Value::Array(stages) = document else {
        return Err(CliError::io_error("Expected a JSON array of stages"));
    };
    let pipeline = Pipeline::new(target.root.clone())
        .with_catalog(target.catalog.clone())
        .with_config(target.config.clone());
    let replayed = replay(&pipeline, &stages)?;
    let schema = describe_schema(replayed.schema())?;
    Ok(json!({
        "stages": serde_json::to_value(replayed.into_stages())?,
        "schema": schema,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn catalog_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let content = json!({"collections": {
            "users": {"type": "object", "fields": {
                "name": {"type": "string"},
                "age": {"type": "int", "optional": true},
                "roles": {"type": "array", "items": {"type": "object", "fields": {
                    "name": {"type": "string"}
                }}}
            }},
            "orders": {"type": "object", "fields": {
                "user": {"type": "string"},
                "amount": {"type": "double"}
            }}
        }});
        file.write_all(content.to_string().as_bytes()).unwrap();
        file
    }

    fn users(file: &NamedTempFile) -> Target {
        Target::load(file.path(), Some("users"), None).unwrap()
    }

    #[test]
    fn test_collection_required_for_multi_catalog() {
        let file = catalog_file();
        let err = Target::load(file.path(), None, None).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_CLI_SCHEMA_ERROR");
        assert!(Target::load(file.path(), Some("missing"), None).is_err());
    }

    #[test]
    fn test_config_file_applies() {
        let file = catalog_file();
        let mut config = NamedTempFile::new().unwrap();
        config.write_all(br#"{"max_path_depth": 1}"#).unwrap();
        let target = Target::load(file.path(), Some("users"), Some(config.path())).unwrap();
        assert_eq!(target.config.max_path_depth, 1);

        let err = resolve_type(&target, "roles.0.name", false, false).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_DEPTH_EXCEEDED");
    }

    #[test]
    fn test_paths_and_resolve() {
        let file = catalog_file();
        let target = users(&file);
        let listed = paths(&target, false);
        assert!(listed.as_array().unwrap().contains(&json!("roles.name")));

        let resolved = resolve_type(&target, "age", false, false).unwrap();
        assert_eq!(resolved["type"]["type"], json!("int"));
        assert_eq!(resolved["optional"], json!(true));

        let err = resolve_type(&target, "nope", false, false).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_UNKNOWN_FIELD");
    }

    #[test]
    fn test_check_commands() {
        let file = catalog_file();
        let target = users(&file);

        let filter = check_filter(&target, json!({"age": {"$gte": 18}})).unwrap();
        assert_eq!(filter, json!({"age": {"$gte": 18}}));
        let err = check_filter(&target, json!({"name": {"$size": 1}})).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_INCOMPATIBLE_OPERATOR");

        assert!(check_update(&target, json!({"$set": {"name": "x"}})).is_ok());
        let piped = check_update(&target, json!([{"$set": {"score": 1}}])).unwrap();
        assert_eq!(piped["stages"], json!([{"$set": {"score": 1}}]));
        let err = check_update(&target, json!([{"$group": {"_id": null}}])).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_STAGE_VALIDATION");
    }

    #[test]
    fn test_check_pipeline() {
        let file = catalog_file();
        let target = users(&file);
        let stages = json!([
            {"$lookup": {"from": "orders", "localField": "name", "foreignField": "user", "as": "orders"}},
            {"$unwind": "$orders"},
            {"$group": {"_id": "$name", "spent": {"$sum": "$orders.amount"}}},
            {"$out": "spending"}
        ]);
        let data = check_pipeline(&target, stages.clone()).unwrap();
        assert_eq!(data["stages"], stages);
        let fields = data["schema"]["fields"].as_object().unwrap();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["_id", "spent"]);

        let err = check_pipeline(&target, json!({"$match": {}})).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_CLI_IO_ERROR");
    }
}
