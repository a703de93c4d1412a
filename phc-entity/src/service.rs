//! Entity Write Orchestrator.
//!
//! An [`EntityService`] drives every operation for one entity kind. A write
//! moves through validation, an IMMEDIATE transaction, the entity's own row,
//! each custom field in submission order, and finally commit. Any failure
//! after the transaction opens rolls the whole write back.

use std::sync::Arc;

use chrono::Local;
use phc_fields::{
    FieldCatalog, FieldDef, FieldRegistry, FieldValue, Identifier, TypedValue, ValidatedField,
    ValidationEngine,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::error::{EntityError, Result, WriteOp};
use crate::external::{ExternalResolver, TargetPolicy};
use crate::generic::GenericStore;
use crate::identity::{IdentityAllocator, PhcSequence};
use crate::key::{display_json, json_to_sql, sql_to_json, EntityKey, KeyValue};
use crate::logging::Pretty;
use crate::record::{
    BaseValues, Created, EntityRecord, EntitySummary, ListQuery, Page, ResolvedField,
};
use crate::schema::{
    EntityKind, EntitySchema, IdSource, CREATED_BY, CREATED_DATE, CREATED_TIME, UPDATED_BY,
    UPDATED_DATE, UPDATED_TIME,
};

/// Actor recorded in audit columns when none is configured
pub const DEFAULT_ACTOR: &str = "web";

/// Settings shared by the services of one database.
#[derive(Clone)]
pub struct EngineSettings {
    pub actor: String,
    pub policy: TargetPolicy,
    pub identity: Arc<dyn IdentityAllocator>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            actor: DEFAULT_ACTOR.to_string(),
            policy: TargetPolicy::allow_any(),
            identity: Arc::new(PhcSequence),
        }
    }
}

impl std::fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSettings")
            .field("actor", &self.actor)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Create, update and read one kind of entity with its custom fields.
pub struct EntityService {
    db: Arc<Database>,
    schema: EntitySchema,
    registry: FieldRegistry,
    settings: EngineSettings,
}

impl EntityService {
    pub fn new(db: Arc<Database>, schema: EntitySchema, settings: EngineSettings) -> Self {
        let registry = schema.registry();
        Self {
            db,
            schema,
            registry,
            settings,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.schema.kind
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Create the entity, definitions and values tables if missing.
    pub fn install(&self) -> Result<()> {
        let conn = self.db.conn();
        conn.execute_batch(&self.schema.create_table_sql())?;
        self.registry.install(&conn)?;
        GenericStore::new(&self.schema).install(&conn)?;
        debug!(kind = %self.kind(), "entity tables installed");
        Ok(())
    }

    /// Active field definitions in registry order.
    pub fn list_field_definitions(&self) -> Result<Vec<FieldDef>> {
        Ok(self.registry.active_definitions(&self.db.conn())?)
    }

    /// The active definition for `code`.
    pub fn field_definition(&self, code: &str) -> Result<FieldDef> {
        Ok(self.registry.definition(&self.db.conn(), code)?)
    }

    /// Create an entity with its base columns and custom fields.
    pub fn create(&self, base: BaseValues, fields: &[FieldValue]) -> Result<Created> {
        let kind = self.kind();
        debug!(%kind, "create requested: {}", Pretty(fields));

        let mut conn = self.db.conn();
        let catalog = self.registry.load(&conn)?;

        let (supplied_id, columns) = self.split_base(base, true)?;
        if let Some(id) = &supplied_id {
            if self.find_key(&conn, id)?.is_some() {
                return Err(EntityError::Conflict {
                    kind,
                    column: self.schema.id_column.to_string(),
                    value: id.to_string(),
                });
            }
        }
        self.check_unique(&conn, &columns, None)?;
        self.check_references(&conn, &columns)?;
        let validated = validate(&catalog, fields)?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| EntityError::write_failed(WriteOp::Create, kind, e.into()))?;

        let outcome = self
            .insert_row(&tx, supplied_id, &columns)
            .and_then(|key| {
                self.write_fields(&tx, &key, &validated)?;
                Ok(key)
            });

        let key = match outcome {
            Ok(key) => key,
            Err(e) => {
                rollback(tx, kind);
                return Err(EntityError::write_failed(WriteOp::Create, kind, e));
            }
        };
        tx.commit()
            .map_err(|e| EntityError::write_failed(WriteOp::Create, kind, e.into()))?;

        let stamp = key.stamp.unwrap_or_default();
        info!(%kind, id = %key.id, %stamp, fields = validated.len(), "entity created");
        Ok(Created { id: key.id, stamp })
    }

    /// Update base columns and/or custom fields of an existing entity.
    pub fn update(
        &self,
        id: &KeyValue,
        base: Option<BaseValues>,
        fields: Option<&[FieldValue]>,
    ) -> Result<()> {
        let kind = self.kind();
        let fields = fields.unwrap_or_default();
        debug!(%kind, %id, "update requested: {}", Pretty(fields));

        let mut conn = self.db.conn();
        let key = self
            .find_key(&conn, id)?
            .ok_or_else(|| EntityError::not_found(kind, id))?;
        let catalog = self.registry.load(&conn)?;

        let (_, columns) = self.split_base(base.unwrap_or_default(), false)?;
        self.check_unique(&conn, &columns, Some(id))?;
        self.check_references(&conn, &columns)?;
        let validated = validate(&catalog, fields)?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| EntityError::write_failed(WriteOp::Update, kind, e.into()))?;

        let outcome = self
            .update_row(&tx, &key, &columns)
            .and_then(|()| self.write_fields(&tx, &key, &validated));
        if let Err(e) = outcome {
            rollback(tx, kind);
            return Err(EntityError::write_failed(WriteOp::Update, kind, e));
        }
        tx.commit()
            .map_err(|e| EntityError::write_failed(WriteOp::Update, kind, e.into()))?;

        info!(%kind, %id, columns = columns.len(), fields = validated.len(), "entity updated");
        Ok(())
    }

    /// The entity's base columns merged with every active custom field.
    pub fn get(&self, id: &KeyValue) -> Result<EntityRecord> {
        let kind = self.kind();
        let conn = self.db.conn();

        let summary = self
            .query_summaries(
                &conn,
                &format!("WHERE {} = ?1", self.schema.id_column.quoted()),
                &[id_to_sql(id)],
            )?
            .into_iter()
            .next()
            .ok_or_else(|| EntityError::not_found(kind, id))?;

        let key = EntityKey::new(summary.id.clone(), summary.stamp.clone());
        let catalog = self.registry.load(&conn)?;
        let fields = self.resolve_fields(&conn, &key, &catalog)?;

        Ok(EntityRecord {
            id: summary.id,
            stamp: summary.stamp,
            base: summary.base,
            fields,
        })
    }

    /// A page of entities, newest id first, optionally filtered by a
    /// substring of any searchable column or the id.
    pub fn list(&self, query: &ListQuery) -> Result<Page<EntitySummary>> {
        let (page, limit) = query.normalized();
        let conn = self.db.conn();

        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let (filter, mut args) = match search {
            Some(term) => {
                let mut clauses: Vec<String> = self
                    .schema
                    .searchable_columns()
                    .map(|c| format!("{} LIKE ?1", c.name.quoted()))
                    .collect();
                clauses.push(format!(
                    "CAST({} AS TEXT) LIKE ?1",
                    self.schema.id_column.quoted()
                ));
                (
                    format!("WHERE ({})", clauses.join(" OR ")),
                    vec![SqlValue::Text(format!("%{term}%"))],
                )
            }
            None => (String::new(), Vec::new()),
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} {filter}", self.schema.table.quoted()),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let n = args.len();
        args.push(SqlValue::Integer(i64::from(limit)));
        args.push(SqlValue::Integer(
            i64::from(page - 1) * i64::from(limit),
        ));
        let items = self.query_summaries(
            &conn,
            &format!(
                "{filter} ORDER BY {} DESC LIMIT ?{} OFFSET ?{}",
                self.schema.id_column.quoted(),
                n + 1,
                n + 2
            ),
            &args,
        )?;

        Ok(Page::new(items, u64::try_from(total).unwrap_or(0), page, limit))
    }

    /// Split submitted base values into the supplied id and writable columns.
    fn split_base(
        &self,
        base: BaseValues,
        creating: bool,
    ) -> Result<(Option<KeyValue>, Vec<(Identifier, Value)>)> {
        let kind = self.kind();
        let mut supplied_id = None;
        let mut columns = Vec::with_capacity(base.len());

        for (name, value) in base {
            let takes_id = creating
                && self.schema.id_source == IdSource::Supplied
                && self.schema.id_column.eq_ignore_case(&name);
            if takes_id {
                supplied_id = supplied_key(&value);
                continue;
            }
            let column = self
                .schema
                .column(&name)
                .ok_or_else(|| EntityError::UnknownColumn {
                    kind,
                    column: name.clone(),
                })?;
            columns.push((column.name.clone(), value));
        }

        if creating && self.schema.id_source == IdSource::Supplied && supplied_id.is_none() {
            return Err(EntityError::MissingKey {
                kind,
                column: self.schema.id_column.to_string(),
            });
        }
        Ok((supplied_id, columns))
    }

    /// Reject values of unique columns already held by another entity.
    fn check_unique(
        &self,
        conn: &Connection,
        columns: &[(Identifier, Value)],
        current: Option<&KeyValue>,
    ) -> Result<()> {
        for (name, value) in columns {
            let unique = self.schema.column(name.as_str()).is_some_and(|c| c.unique);
            if !unique || phc_fields::value::is_blank(value) {
                continue;
            }
            let mut sql = format!(
                "SELECT 1 FROM {} WHERE {} = ?1",
                self.schema.table.quoted(),
                name.quoted()
            );
            let mut args = vec![json_to_sql(value)];
            if let Some(id) = current {
                sql.push_str(&format!(" AND {} <> ?2", self.schema.id_column.quoted()));
                args.push(id_to_sql(id));
            }
            sql.push_str(" LIMIT 1");

            if conn.prepare_cached(&sql)?.exists(params_from_iter(args.iter()))? {
                return Err(EntityError::Conflict {
                    kind: self.kind(),
                    column: name.to_string(),
                    value: display_json(value),
                });
            }
        }
        Ok(())
    }

    /// Reject references to entities that do not exist.
    fn check_references(&self, conn: &Connection, columns: &[(Identifier, Value)]) -> Result<()> {
        for (name, value) in columns {
            let Some(target) = self.schema.column(name.as_str()).and_then(|c| c.references) else {
                continue;
            };
            if phc_fields::value::is_blank(value) {
                continue;
            }
            let referenced = EntitySchema::for_kind(target);
            let exists = conn
                .prepare_cached(&format!(
                    "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
                    referenced.table.quoted(),
                    referenced.id_column.quoted()
                ))?
                .exists([json_to_sql(value)])?;
            if !exists {
                return Err(EntityError::not_found(target, display_json(value)));
            }
        }
        Ok(())
    }

    /// The key of the entity `id`, `None` when no such row exists.
    fn find_key(&self, conn: &Connection, id: &KeyValue) -> Result<Option<EntityKey>> {
        let stamp = conn
            .prepare_cached(&format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                self.schema.stamp_column.quoted(),
                self.schema.table.quoted(),
                self.schema.id_column.quoted()
            ))?
            .query_row([id], |row| row.get::<_, Option<String>>(0))
            .optional()?;
        Ok(stamp.map(|stamp| EntityKey::with_stamp(id.clone(), stamp)))
    }

    fn insert_row(
        &self,
        conn: &Connection,
        supplied_id: Option<KeyValue>,
        columns: &[(Identifier, Value)],
    ) -> Result<EntityKey> {
        let id = match supplied_id {
            Some(id) => id,
            None => self.settings.identity.next_id(conn, &self.schema)?,
        };
        let stamp = self.settings.identity.new_stamp();
        let (date, time) = audit_now();

        let mut names = vec![self.schema.id_column.quoted(), self.schema.stamp_column.quoted()];
        let mut values = vec![id_to_sql(&id), SqlValue::Text(stamp.clone())];
        for (name, value) in columns {
            names.push(name.quoted());
            values.push(json_to_sql(value));
        }
        for (column, value) in [
            (CREATED_DATE, &date),
            (CREATED_TIME, &time),
            (CREATED_BY, &self.settings.actor),
            (UPDATED_DATE, &date),
            (UPDATED_TIME, &time),
            (UPDATED_BY, &self.settings.actor),
        ] {
            names.push(format!("\"{column}\""));
            values.push(SqlValue::Text(value.clone()));
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.schema.table.quoted(),
                names.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
        debug!(kind = %self.kind(), %id, "entity row inserted");
        Ok(EntityKey::new(id, stamp))
    }

    fn update_row(
        &self,
        conn: &Connection,
        key: &EntityKey,
        columns: &[(Identifier, Value)],
    ) -> Result<()> {
        let (date, time) = audit_now();
        let mut assignments = Vec::with_capacity(columns.len() + 3);
        let mut values = Vec::with_capacity(columns.len() + 4);

        for (name, value) in columns {
            values.push(json_to_sql(value));
            assignments.push(format!("{} = ?{}", name.quoted(), values.len()));
        }
        for (column, value) in [
            (UPDATED_DATE, date),
            (UPDATED_TIME, time),
            (UPDATED_BY, self.settings.actor.clone()),
        ] {
            values.push(SqlValue::Text(value));
            assignments.push(format!("\"{column}\" = ?{}", values.len()));
        }
        values.push(id_to_sql(&key.id));

        conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} = ?{}",
                self.schema.table.quoted(),
                assignments.join(", "),
                self.schema.id_column.quoted(),
                values.len()
            ),
            params_from_iter(values.iter()),
        )?;
        Ok(())
    }

    /// Route each validated field to its store.
    fn write_fields(
        &self,
        conn: &Connection,
        key: &EntityKey,
        validated: &[ValidatedField],
    ) -> Result<()> {
        let external = ExternalResolver::new(&self.settings.policy);
        let generic = GenericStore::new(&self.schema);

        for field in validated {
            if field.def.is_generic() {
                generic.write(conn, &key.id, &field.def, &field.value)?;
            } else {
                external.write(conn, key, &field.def, &field.value)?;
            }
        }
        Ok(())
    }

    /// Generic fields, then external fields, each in registry order.
    fn resolve_fields(
        &self,
        conn: &Connection,
        key: &EntityKey,
        catalog: &FieldCatalog,
    ) -> Result<Vec<ResolvedField>> {
        let mut fields = GenericStore::new(&self.schema).read_all(conn, &key.id, catalog)?;

        let external = ExternalResolver::new(&self.settings.policy);
        for def in catalog.external() {
            let value = external.read(conn, key, def).unwrap_or_else(|e| {
                warn!(code = %def.code, error = %e, "external custom field unreadable, reporting null");
                TypedValue::Null
            });
            fields.push(ResolvedField::new(def, value));
        }
        Ok(fields)
    }

    /// Run `SELECT id, stamp, <base columns> FROM table <tail>`.
    fn query_summaries(
        &self,
        conn: &Connection,
        tail: &str,
        args: &[SqlValue],
    ) -> Result<Vec<EntitySummary>> {
        let mut select = vec![self.schema.id_column.quoted(), self.schema.stamp_column.quoted()];
        select.extend(self.schema.columns.iter().map(|c| c.name.quoted()));
        let sql = format!(
            "SELECT {} FROM {} {tail}",
            select.join(", "),
            self.schema.table.quoted()
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let id: SqlValue = row.get(0)?;
            let stamp: Option<String> = row.get(1)?;
            let mut base = BaseValues::with_capacity(self.schema.columns.len());
            for (i, column) in self.schema.columns.iter().enumerate() {
                base.insert(column.name.to_string(), sql_to_json(row.get(i + 2)?));
            }
            Ok((id, stamp.unwrap_or_default(), base))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, stamp, base) = row?;
            let Some(id) = KeyValue::from_sql(id) else {
                warn!(kind = %self.kind(), "skipping entity row with unusable id");
                continue;
            };
            items.push(EntitySummary { id, stamp, base });
        }
        Ok(items)
    }
}

/// One service per entity kind over a shared database.
pub struct ErpContext {
    db: Arc<Database>,
    customers: EntityService,
    orders: EntityService,
    articles: EntityService,
}

impl ErpContext {
    pub fn new(db: Arc<Database>, settings: EngineSettings) -> Self {
        let service = |kind| EntityService::new(db.clone(), EntitySchema::for_kind(kind), settings.clone());
        Self {
            customers: service(EntityKind::Customer),
            orders: service(EntityKind::Order),
            articles: service(EntityKind::Article),
            db,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn customers(&self) -> &EntityService {
        &self.customers
    }

    pub fn orders(&self) -> &EntityService {
        &self.orders
    }

    pub fn articles(&self) -> &EntityService {
        &self.articles
    }

    pub fn service(&self, kind: EntityKind) -> &EntityService {
        match kind {
            EntityKind::Customer => &self.customers,
            EntityKind::Order => &self.orders,
            EntityKind::Article => &self.articles,
        }
    }

    /// Install the tables of every entity kind.
    pub fn install(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            self.service(kind).install()?;
        }
        Ok(())
    }
}

fn validate(catalog: &FieldCatalog, fields: &[FieldValue]) -> Result<Vec<ValidatedField>> {
    let validated = ValidationEngine::for_catalog(catalog).validate_all(catalog, fields)?;
    Ok(validated)
}

fn rollback(tx: rusqlite::Transaction<'_>, kind: EntityKind) {
    match tx.rollback() {
        Ok(()) => debug!(%kind, "write rolled back"),
        Err(e) => warn!(%kind, error = %e, "rollback failed"),
    }
}

fn supplied_key(value: &Value) -> Option<KeyValue> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(KeyValue::Text(s.trim().to_string())),
        Value::Number(n) => Some(KeyValue::Text(n.to_string())),
        _ => None,
    }
}

fn id_to_sql(id: &KeyValue) -> SqlValue {
    match id {
        KeyValue::Int(i) => SqlValue::Integer(*i),
        KeyValue::Text(s) => SqlValue::Text(s.clone()),
    }
}

/// Audit date and time in the host's local clock.
fn audit_now() -> (String, String) {
    let now = Local::now().naive_local();
    (
        now.format("%Y-%m-%d").to_string(),
        now.format("%H:%M:%S").to_string(),
    )
}
