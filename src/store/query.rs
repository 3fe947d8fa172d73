use crate::error::PlannerResult;
use crate::store::key::{Key, Kind};
use crate::store::row_key;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

/// Value side of an equality filter on a stored property.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<&Key> for FilterValue {
    fn from(value: &Key) -> Self {
        FilterValue::Text(value.encode())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

/// A query over one entity kind.
///
/// Mirrors the hierarchical datastore query model: restrict by ancestor,
/// add property equality filters, order by a property and limit the
/// result count. Properties are looked up inside the stored JSON document,
/// so field names are the wire names (`Name`, `Word`, `Ingredient`, ...).
#[derive(Debug, Clone)]
pub struct Query {
    kind: Kind,
    ancestor: Option<Key>,
    filters: Vec<(&'static str, FilterValue)>,
    order: Option<&'static str>,
    limit: Option<u32>,
}

impl Query {
    pub fn new(kind: Kind) -> Self {
        Query {
            kind,
            ancestor: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Restricts results to strict descendants of `key`.
    pub fn ancestor(mut self, key: &Key) -> Self {
        self.ancestor = Some(key.clone());
        self
    }

    pub fn filter(mut self, field: &'static str, value: impl Into<FilterValue>) -> Self {
        self.filters.push((field, value.into()));
        self
    }

    pub fn order(mut self, field: &'static str) -> Self {
        self.order = Some(field);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn build(&self, columns: &str) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM entities WHERE kind = "));
        qb.push_bind(self.kind.as_str());

        if let Some(ancestor) = &self.ancestor {
            let path = ancestor.path();
            qb.push(" AND (parent = ");
            qb.push_bind(path.clone());
            qb.push(" OR parent LIKE ");
            qb.push_bind(format!("{path}/%"));
            qb.push(")");
        }

        for (field, value) in &self.filters {
            qb.push(" AND json_extract(data, ");
            qb.push_bind(format!("$.{field}"));
            qb.push(") = ");
            match value {
                FilterValue::Text(text) => qb.push_bind(text.clone()),
                FilterValue::Int(int) => qb.push_bind(*int),
                FilterValue::Bool(flag) => qb.push_bind(*flag),
            };
        }

        match self.order {
            Some(field) => {
                qb.push(" ORDER BY json_extract(data, ");
                qb.push_bind(format!("$.{field}"));
                qb.push("), id");
            }
            None => {
                qb.push(" ORDER BY id");
            }
        }

        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        qb
    }

    /// Runs the query, returning each entity with its key.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        conn: &mut SqliteConnection,
    ) -> PlannerResult<Vec<(Key, T)>> {
        let rows = self
            .build("id, kind, parent, data")
            .build()
            .fetch_all(&mut *conn)
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let key = key_of(&row)?;
            let data: String = row.get("data");
            results.push((key, serde_json::from_str(&data)?));
        }

        Ok(results)
    }

    /// Keys-only variant of [`Query::get_all`].
    pub async fn keys(&self, conn: &mut SqliteConnection) -> PlannerResult<Vec<Key>> {
        let rows = self
            .build("id, kind, parent")
            .build()
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(key_of).collect()
    }
}

fn key_of(row: &SqliteRow) -> PlannerResult<Key> {
    row_key(
        row.get("kind"),
        row.get("id"),
        row.get::<Option<String>, _>("parent").as_deref(),
    )
}
