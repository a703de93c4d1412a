//! Command execution against an [`ErpContext`].

use std::sync::Arc;

use phc_config::{ConfigError, PhcConfig};
use phc_entity::{
    BaseValues, Database, EngineSettings, EntityError, EntityKind, ErpContext, ListQuery,
    TargetPolicy,
};
use phc_fields::FieldValue;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::cli::{Commands, FieldsAction, KindArg};

/// Exit code for rejected input
pub const EXIT_CLIENT_ERROR: i32 = 1;
/// Exit code for a missing entity or field definition
pub const EXIT_NOT_FOUND: i32 = 2;
/// Exit code for everything else
pub const EXIT_SERVER_ERROR: i32 = 3;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    /// A JSON argument did not parse or had the wrong shape
    #[error("invalid --{arg}: {message}")]
    InvalidArgument { arg: &'static str, message: String },

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidArgument { .. } => EXIT_CLIENT_ERROR,
            Self::Entity(e) if e.is_not_found() => EXIT_NOT_FOUND,
            Self::Entity(e) if e.is_client_error() => EXIT_CLIENT_ERROR,
            Self::Entity(_) | Self::Output(_) => EXIT_SERVER_ERROR,
        }
    }

    fn invalid(arg: &'static str, message: impl ToString) -> Self {
        Self::InvalidArgument {
            arg,
            message: message.to_string(),
        }
    }
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Customer => EntityKind::Customer,
            KindArg::Order => EntityKind::Order,
            KindArg::Article => EntityKind::Article,
        }
    }
}

/// Engine settings derived from configuration.
pub fn engine_settings(config: &PhcConfig) -> EngineSettings {
    EngineSettings {
        actor: config.actor.clone(),
        policy: TargetPolicy::from_tables(&config.external_tables),
        ..EngineSettings::default()
    }
}

/// Open the configured database.
pub fn open_context(config: &PhcConfig) -> Result<ErpContext, CliError> {
    let db = Database::open(&config.database.path, config.database.busy_timeout())
        .map_err(CliError::Entity)?;
    Ok(ErpContext::new(Arc::new(db), engine_settings(config)))
}

/// Run one command, returning what to print.
pub fn execute(ctx: &ErpContext, command: Commands) -> Result<Value, CliError> {
    match command {
        Commands::Init => {
            ctx.install()?;
            let tables: Vec<_> = EntityKind::ALL
                .into_iter()
                .flat_map(|kind| {
                    let schema = ctx.service(kind).schema();
                    [
                        schema.table.to_string(),
                        schema.definitions_table.to_string(),
                        schema.values_table.to_string(),
                    ]
                })
                .collect();
            Ok(json!({ "installed": tables }))
        }
        Commands::Fields { action } => match action {
            FieldsAction::List { kind } => {
                let defs = ctx.service(kind.into()).list_field_definitions()?;
                Ok(serde_json::to_value(defs)?)
            }
            FieldsAction::Get { kind, code } => {
                let def = ctx.service(kind.into()).field_definition(&code)?;
                Ok(serde_json::to_value(def)?)
            }
        },
        Commands::Get { kind, id } => {
            let service = ctx.service(kind.into());
            let record = service.get(&service.schema().parse_id(&id))?;
            Ok(serde_json::to_value(record)?)
        }
        Commands::List {
            kind,
            page,
            limit,
            search,
        } => {
            let mut query = ListQuery::new(page, limit);
            if let Some(term) = search {
                query = query.search(term);
            }
            let page = ctx.service(kind.into()).list(&query)?;
            Ok(serde_json::to_value(page)?)
        }
        Commands::Create { kind, base, fields } => {
            let base = parse_base(&base)?;
            let fields = parse_fields(&fields)?;
            let created = ctx.service(kind.into()).create(base, &fields)?;
            Ok(serde_json::to_value(created)?)
        }
        Commands::Update {
            kind,
            id,
            base,
            fields,
        } => {
            let base = base.as_deref().map(parse_base).transpose()?;
            let fields = fields.as_deref().map(parse_fields).transpose()?;
            let service = ctx.service(kind.into());
            let id = service.schema().parse_id(&id);
            service.update(&id, base, fields.as_deref())?;
            Ok(json!({ "updated": id.to_json() }))
        }
    }
}

/// Entity columns from a JSON object.
pub fn parse_base(raw: &str) -> Result<BaseValues, CliError> {
    match serde_json::from_str::<Value>(raw).map_err(|e| CliError::invalid("base", e))? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(CliError::invalid(
            "base",
            format!("expected a JSON object, got {other}"),
        )),
    }
}

/// Custom field values from either a list of `{codigo, tipo, valor}` entries
/// or an object mapping codes to values.
pub fn parse_fields(raw: &str) -> Result<Vec<FieldValue>, CliError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| CliError::invalid("fields", e))?;
    let fields: Vec<FieldValue> = match value {
        Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| CliError::invalid("fields", e))?
        }
        Value::Object(map) => map
            .into_iter()
            .map(|(code, value)| FieldValue::new(code, value))
            .collect(),
        other => {
            return Err(CliError::invalid(
                "fields",
                format!("expected a JSON array or object, got {other}"),
            ))
        }
    };
    debug!(count = fields.len(), "Parsed custom field values");
    Ok(fields)
}
