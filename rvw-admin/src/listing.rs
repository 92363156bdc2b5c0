//! Filtering and sorting shared by list and export endpoints
//!
//! Column names only ever come from `&'static str` whitelists in code; every
//! client-supplied value goes through `push_bind`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};

/// Query parameters common to every list endpoint
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub q: Option<String>,
}

/// A value bound into a filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Real(f64),
    Time(DateTime<Utc>),
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Int(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Real(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Time(v)
    }
}

#[derive(Debug, Clone)]
enum Fragment {
    Sql(String),
    Value(FilterValue),
}

/// AND-ed WHERE conditions built from optional query parameters
#[derive(Debug, Default, Clone)]
pub struct Filters {
    conditions: Vec<Vec<Fragment>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value` when a value is given
    pub fn eq<V: Into<FilterValue>>(self, column: &'static str, value: Option<V>) -> Self {
        self.compare(column, "=", value)
    }

    /// `column >= value` when a value is given
    pub fn at_least<V: Into<FilterValue>>(self, column: &'static str, value: Option<V>) -> Self {
        self.compare(column, ">=", value)
    }

    /// `column <= value` when a value is given
    pub fn at_most<V: Into<FilterValue>>(self, column: &'static str, value: Option<V>) -> Self {
        self.compare(column, "<=", value)
    }

    fn compare<V: Into<FilterValue>>(
        mut self,
        column: &'static str,
        op: &'static str,
        value: Option<V>,
    ) -> Self {
        if let Some(value) = value {
            self.conditions.push(vec![
                Fragment::Sql(format!("{} {} ", column, op)),
                Fragment::Value(value.into()),
            ]);
        }
        self
    }

    /// Timestamp column on or after `from`
    ///
    /// Compared through `datetime()` so rows written with `CURRENT_TIMESTAMP`
    /// and rows written as RFC 3339 order the same way.
    pub fn since(mut self, column: &'static str, from: Option<DateTime<Utc>>) -> Self {
        if let Some(from) = from {
            self.conditions.push(vec![
                Fragment::Sql(format!("datetime({}) >= datetime(", column)),
                Fragment::Value(FilterValue::Time(from)),
                Fragment::Sql(")".to_string()),
            ]);
        }
        self
    }

    /// Timestamp column on or before `to`
    pub fn until(mut self, column: &'static str, to: Option<DateTime<Utc>>) -> Self {
        if let Some(to) = to {
            self.conditions.push(vec![
                Fragment::Sql(format!("datetime({}) <= datetime(", column)),
                Fragment::Value(FilterValue::Time(to)),
                Fragment::Sql(")".to_string()),
            ]);
        }
        self
    }

    /// Case-insensitive substring match over any of `columns`
    pub fn search(mut self, columns: &[&'static str], q: Option<&str>) -> Self {
        let term = match q.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return self,
        };
        let pattern = format!("%{}%", escape_like(term));

        let mut fragments = vec![Fragment::Sql("(".to_string())];
        for (i, column) in columns.iter().enumerate() {
            let prefix = if i == 0 { "" } else { " OR " };
            fragments.push(Fragment::Sql(format!("{}{} LIKE ", prefix, column)));
            fragments.push(Fragment::Value(FilterValue::Text(pattern.clone())));
            fragments.push(Fragment::Sql(" ESCAPE '\\'".to_string()));
        }
        fragments.push(Fragment::Sql(")".to_string()));
        self.conditions.push(fragments);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Append ` WHERE ...` (nothing when there are no conditions)
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            for fragment in condition {
                match fragment {
                    Fragment::Sql(sql) => {
                        qb.push(sql);
                    }
                    Fragment::Value(FilterValue::Text(v)) => {
                        qb.push_bind(v.clone());
                    }
                    Fragment::Value(FilterValue::Int(v)) => {
                        qb.push_bind(*v);
                    }
                    Fragment::Value(FilterValue::Real(v)) => {
                        qb.push_bind(*v);
                    }
                    Fragment::Value(FilterValue::Time(v)) => {
                        qb.push_bind(*v);
                    }
                }
            }
        }
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the ORDER BY clause from client `sort`/`order`
///
/// `sortable[0]` is the default column. Ties break on `id` in the same
/// direction so pages are stable.
pub fn order_clause(
    sort: Option<&str>,
    order: Option<&str>,
    sortable: &[&'static str],
) -> ApiResult<String> {
    let column = match sort.map(str::trim).filter(|s| !s.is_empty()) {
        None => sortable.first().copied().unwrap_or("id"),
        Some(requested) => sortable
            .iter()
            .copied()
            .find(|c| *c == requested)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Cannot sort by '{}'. Allowed: {}",
                    requested,
                    sortable.join(", ")
                ))
            })?,
    };

    let direction = match order.map(|o| o.trim().to_ascii_lowercase()) {
        None => "DESC",
        Some(o) if o.is_empty() || o == "desc" => "DESC",
        Some(o) if o == "asc" => "ASC",
        Some(o) => {
            return Err(ApiError::BadRequest(format!(
                "Invalid order '{}': expected 'asc' or 'desc'",
                o
            )))
        }
    };

    if column == "id" {
        Ok(format!("id {}", direction))
    } else {
        Ok(format!("{} {}, id {}", column, direction, direction))
    }
}

/// Parse a `from`/`to` bound: RFC 3339, or `YYYY-MM-DD` meaning the start
/// (or, with `end_of_day`, the last second) of that UTC day
pub fn parse_time_bound(raw: Option<&str>, end_of_day: bool) -> ApiResult<Option<DateTime<Utc>>> {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(None),
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid date '{}': expected RFC 3339 or YYYY-MM-DD",
            raw
        ))
    })?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| t.and_utc()))
}

/// Count and fetch one page of `table` rows
pub async fn fetch_page<T>(
    db: &SqlitePool,
    table: &'static str,
    filters: &Filters,
    params: &ListParams,
    sortable: &[&'static str],
) -> ApiResult<Page<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let order_by = order_clause(params.sort.as_deref(), params.order.as_deref(), sortable)?;

    let mut count_query = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", table));
    filters.push_where(&mut count_query);
    let total: i64 = count_query.build_query_scalar().fetch_one(db).await?;

    let pagination = calculate_pagination(total, params.page, params.per_page);

    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", table));
    filters.push_where(&mut query);
    query.push(format!(" ORDER BY {} LIMIT ", order_by));
    query.push_bind(pagination.per_page);
    query.push(" OFFSET ");
    query.push_bind(pagination.offset);

    let items = query.build_query_as::<T>().fetch_all(db).await?;

    Ok(Page::new(items, total, pagination))
}

/// Fetch up to `limit` rows of `table`, no pagination
pub async fn fetch_all<T>(
    db: &SqlitePool,
    table: &'static str,
    filters: &Filters,
    order_by: &str,
    limit: i64,
) -> ApiResult<Vec<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", table));
    filters.push_where(&mut query);
    query.push(format!(" ORDER BY {} LIMIT ", order_by));
    query.push_bind(limit);

    Ok(query.build_query_as::<T>().fetch_all(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_clause_defaults_to_first_column_desc() {
        let clause = order_clause(None, None, &["created_at", "name"]).unwrap();
        assert_eq!(clause, "created_at DESC, id DESC");
    }

    #[test]
    fn test_order_clause_rejects_unlisted_column() {
        let err = order_clause(Some("password_hash"), None, &["created_at"]).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let err = order_clause(Some("name; DROP TABLE users"), None, &["name"]).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_order_clause_direction() {
        assert_eq!(
            order_clause(Some("name"), Some("ASC"), &["created_at", "name"]).unwrap(),
            "name ASC, id ASC"
        );
        assert_eq!(order_clause(Some("id"), Some("asc"), &["id"]).unwrap(), "id ASC");
        assert!(order_clause(None, Some("sideways"), &["id"]).is_err());
    }

    #[test]
    fn test_filters_render_bound_placeholders() {
        let filters = Filters::new()
            .eq("status", Some("active"))
            .eq::<i64>("seller_id", None)
            .search(&["name", "email"], Some("  ravi "));
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM users");
        filters.push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM users WHERE status = ? AND (name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_blank_search_adds_nothing() {
        let filters = Filters::new().search(&["name"], Some("   "));
        assert!(filters.is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_parse_time_bound() {
        let start = parse_time_bound(Some("2026-03-01"), false).unwrap().unwrap();
        assert_eq!(start.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        let end = parse_time_bound(Some("2026-03-01"), true).unwrap().unwrap();
        assert_eq!(end.to_rfc3339(), "2026-03-01T23:59:59+00:00");
        let exact = parse_time_bound(Some("2026-03-01T10:00:00+05:30"), false)
            .unwrap()
            .unwrap();
        assert_eq!(exact.to_rfc3339(), "2026-03-01T04:30:00+00:00");
        assert!(parse_time_bound(Some("yesterday"), false).is_err());
        assert!(parse_time_bound(None, false).unwrap().is_none());
    }
}
