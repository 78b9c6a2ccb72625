//! Relationship composer.
//!
//! A [`Relation`] describes how rows of another table connect to a source row.
//! [`Relation::build`] turns it into a join-based [`StatementModel`]; nothing
//! is executed until the caller runs the query.
//!
//! ```ignore
//! let source = RelationSource::new("users", "id", 5);
//! let articles = Relation::has_many("articles", "user_id");
//! let rows = db.related(&articles, &source)?.order_by("id", "desc").get().await?;
//! // SELECT articles.* FROM articles INNER JOIN users ON articles.user_id = users.id
//! //   WHERE users.id = $1 ORDER BY id DESC
//! ```
//!
//! Tables named by string must be registered in the [`TableRegistry`];
//! typed tables ([`TableMeta`]) and explicit [`TableDescriptor`]s are used as is.

use crate::error::{DbError, DbResult};
use crate::ident::Ident;
use crate::qb::{Filter, Fluent, StatementModel};
use crate::row::Record;
use crate::value::Value;
use std::collections::HashMap;

/// Static description of a table, usually implemented by a model type.
pub trait TableMeta {
    fn table_name() -> &'static str;

    fn primary_key() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[]
    }
}

/// A table known to the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
        }
    }

    pub fn of<T: TableMeta>() -> Self {
        Self {
            name: T::table_name().to_string(),
            primary_key: T::primary_key().to_string(),
            columns: T::columns().iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Tables that relations may refer to by name.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, TableDescriptor>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: TableMeta>(&mut self) {
        self.register_table(TableDescriptor::of::<T>());
    }

    pub fn register_table(&mut self, table: TableDescriptor) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    /// Look up a table by name, failing with [`DbError::UnknownTable`].
    pub fn resolve(&self, name: &str) -> DbResult<&TableDescriptor> {
        self.get(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// How a relation names a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    /// Resolved through the registry when the relation is built.
    Named(String),
    Descriptor(TableDescriptor),
}

impl TableRef {
    pub fn of<T: TableMeta>() -> Self {
        TableRef::Descriptor(TableDescriptor::of::<T>())
    }

    fn resolve(&self, registry: &TableRegistry) -> DbResult<TableDescriptor> {
        match self {
            TableRef::Named(name) => registry.resolve(name).cloned(),
            TableRef::Descriptor(table) => Ok(table.clone()),
        }
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::Named(name.to_string())
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        TableRef::Named(name)
    }
}

impl From<TableDescriptor> for TableRef {
    fn from(table: TableDescriptor) -> Self {
        TableRef::Descriptor(table)
    }
}

/// The row a relation starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSource {
    pub table: String,
    pub key: String,
    pub key_value: Value,
}

impl RelationSource {
    pub fn new(table: impl Into<String>, key: impl Into<String>, key_value: impl Into<Value>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            key_value: key_value.into(),
        }
    }

    /// Take the key value from a fetched row.
    pub fn from_record(table: &str, key: &str, row: &Record) -> DbResult<Self> {
        let value = row
            .get(key)
            .cloned()
            .ok_or_else(|| DbError::decode(key, "relation key missing from source row"))?;
        if value.is_null() {
            return Err(DbError::validation(format!(
                "relation key {key:?} of the source row is NULL"
            )));
        }
        Ok(Self::new(table, key, value))
    }
}

/// A relation from a source row to rows of a target table.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Target rows whose `foreign_key` points at the source's `local_key`.
    HasMany {
        target: TableRef,
        foreign_key: String,
        local_key: Option<String>,
    },
    /// Like [`Relation::HasMany`], at most one row.
    HasOne {
        target: TableRef,
        foreign_key: String,
        local_key: Option<String>,
    },
    /// The target row the source's `foreign_key` points at.
    BelongsTo {
        target: TableRef,
        foreign_key: String,
        owner_key: Option<String>,
    },
    /// Target rows linked through a pivot table.
    BelongsToMany {
        target: TableRef,
        pivot: TableRef,
        /// Pivot column referencing the source key.
        foreign_pivot_key: String,
        /// Pivot column referencing the target key.
        related_pivot_key: String,
    },
    /// Target rows reached through an intermediate table.
    Through {
        target: TableRef,
        through: TableRef,
        /// Column on `through` referencing the source key.
        first_key: String,
        /// Column on `target` referencing the `through` primary key.
        second_key: String,
        many: bool,
    },
}

impl Relation {
    pub fn has_many(target: impl Into<TableRef>, foreign_key: &str) -> Self {
        Relation::HasMany {
            target: target.into(),
            foreign_key: foreign_key.to_string(),
            local_key: None,
        }
    }

    pub fn has_one(target: impl Into<TableRef>, foreign_key: &str) -> Self {
        Relation::HasOne {
            target: target.into(),
            foreign_key: foreign_key.to_string(),
            local_key: None,
        }
    }

    pub fn belongs_to(target: impl Into<TableRef>, foreign_key: &str) -> Self {
        Relation::BelongsTo {
            target: target.into(),
            foreign_key: foreign_key.to_string(),
            owner_key: None,
        }
    }

    pub fn belongs_to_many(
        target: impl Into<TableRef>,
        pivot: impl Into<TableRef>,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> Self {
        Relation::BelongsToMany {
            target: target.into(),
            pivot: pivot.into(),
            foreign_pivot_key: foreign_pivot_key.to_string(),
            related_pivot_key: related_pivot_key.to_string(),
        }
    }

    pub fn has_many_through(
        target: impl Into<TableRef>,
        through: impl Into<TableRef>,
        first_key: &str,
        second_key: &str,
    ) -> Self {
        Relation::Through {
            target: target.into(),
            through: through.into(),
            first_key: first_key.to_string(),
            second_key: second_key.to_string(),
            many: true,
        }
    }

    pub fn has_one_through(
        target: impl Into<TableRef>,
        through: impl Into<TableRef>,
        first_key: &str,
        second_key: &str,
    ) -> Self {
        Relation::Through {
            target: target.into(),
            through: through.into(),
            first_key: first_key.to_string(),
            second_key: second_key.to_string(),
            many: false,
        }
    }

    /// Override the source column a has-many/has-one relation joins on
    /// (defaults to the source key). Other relations are returned unchanged.
    pub fn with_local_key(mut self, key: &str) -> Self {
        if let Relation::HasMany { local_key, .. } | Relation::HasOne { local_key, .. } = &mut self {
            *local_key = Some(key.to_string());
        }
        self
    }

    /// Override the target column a belongs-to relation joins on
    /// (defaults to the target primary key). Other relations are returned unchanged.
    pub fn with_owner_key(mut self, key: &str) -> Self {
        if let Relation::BelongsTo { owner_key, .. } = &mut self {
            *owner_key = Some(key.to_string());
        }
        self
    }

    /// Compose the statement for `source`.
    pub fn build(&self, source: &RelationSource, registry: &TableRegistry) -> DbResult<StatementModel> {
        let src = Ident::parse(&source.table)?.to_sql();
        let src_key = Ident::qualified(&source.table, &source.key)?;
        let value = source.key_value.clone();

        let model = match self {
            Relation::HasMany {
                target,
                foreign_key,
                local_key,
            }
            | Relation::HasOne {
                target,
                foreign_key,
                local_key,
            } => {
                let target = target.resolve(registry)?;
                reject_self_join(&source.table, &target.name)?;
                let local = local_key.as_deref().unwrap_or(&source.key);
                let model = select_all(&target.name)?.join_on(
                    &src,
                    &Ident::qualified(&target.name, foreign_key)?,
                    "=",
                    &Ident::qualified(&source.table, local)?,
                );
                let model = model.where_eq(&src_key, value);
                if matches!(self, Relation::HasOne { .. }) {
                    model.limit(0, 1)
                } else {
                    model
                }
            }
            Relation::BelongsTo {
                target,
                foreign_key,
                owner_key,
            } => {
                let target = target.resolve(registry)?;
                reject_self_join(&source.table, &target.name)?;
                let owner = owner_key.as_deref().unwrap_or(&target.primary_key);
                select_all(&target.name)?
                    .join_on(
                        &src,
                        &Ident::qualified(&source.table, foreign_key)?,
                        "=",
                        &Ident::qualified(&target.name, owner)?,
                    )
                    .where_eq(&src_key, value)
                    .limit(0, 1)
            }
            Relation::BelongsToMany {
                target,
                pivot,
                foreign_pivot_key,
                related_pivot_key,
            } => {
                let target = target.resolve(registry)?;
                let pivot = pivot.resolve(registry)?;
                reject_self_join(&source.table, &target.name)?;
                select_all(&target.name)?
                    .join_on(
                        &Ident::parse(&pivot.name)?.to_sql(),
                        &Ident::qualified(&pivot.name, related_pivot_key)?,
                        "=",
                        &Ident::qualified(&target.name, &target.primary_key)?,
                    )
                    .join_on(
                        &src,
                        &Ident::qualified(&source.table, &source.key)?,
                        "=",
                        &Ident::qualified(&pivot.name, foreign_pivot_key)?,
                    )
                    .where_eq(&Ident::qualified(&pivot.name, foreign_pivot_key)?, value)
            }
            Relation::Through {
                target,
                through,
                first_key,
                second_key,
                many,
            } => {
                let target = target.resolve(registry)?;
                let through = through.resolve(registry)?;
                reject_self_join(&source.table, &target.name)?;
                let model = select_all(&target.name)?
                    .join_on(
                        &Ident::parse(&through.name)?.to_sql(),
                        &Ident::qualified(&through.name, &through.primary_key)?,
                        "=",
                        &Ident::qualified(&target.name, second_key)?,
                    )
                    .join_on(
                        &src,
                        &Ident::qualified(&source.table, &source.key)?,
                        "=",
                        &Ident::qualified(&through.name, first_key)?,
                    )
                    .where_eq(&Ident::qualified(&through.name, first_key)?, value);
                if *many { model } else { model.limit(0, 1) }
            }
        };
        model.validate()?;
        Ok(model)
    }
}

fn select_all(table: &str) -> DbResult<StatementModel> {
    let ident = Ident::parse(table)?.to_sql();
    Ok(StatementModel::new(ident.clone()).select([format!("{ident}.*")]))
}

fn reject_self_join(source: &str, target: &str) -> DbResult<()> {
    if source == target {
        return Err(DbError::validation(format!(
            "relation from {source:?} to itself needs a table alias; build it with the fluent API"
        )));
    }
    Ok(())
}
