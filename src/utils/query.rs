//! Search / filter / sort / pagination building for list endpoints.
//!
//! Every list route funnels its raw query-string map through [`ListQuery`]
//! together with a [`ListSpec`] describing which fields are searchable and
//! which are filterable. Bad input never fails the request: unparsable values
//! fall back to defaults or are dropped.

use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::Collection;
use regex::Regex;
use rocket::futures::TryStreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::Pagination;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static SORT_FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap());

/// Keys consumed by the helper itself and never treated as filters.
const RESERVED: &[&str] = &[
    "q", "page", "limit", "sort", "minPrice", "maxPrice", "minRating", "maxRating",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Id,
    Number,
}

/// Per-resource description of what a list endpoint accepts.
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    pub search_fields: &'static [&'static str],
    pub filters: &'static [(&'static str, FieldKind)],
    /// Field used by `minPrice`/`maxPrice`; `None` disables the range.
    pub price_field: Option<&'static str>,
    /// Field used by `minRating`/`maxRating`; `None` disables the range.
    pub rating_field: Option<&'static str>,
    pub default_sort: &'static str,
}

impl ListSpec {
    pub const fn new(search_fields: &'static [&'static str]) -> Self {
        ListSpec {
            search_fields,
            filters: &[],
            price_field: None,
            rating_field: None,
            default_sort: "-created_at",
        }
    }

    pub const fn filters(mut self, filters: &'static [(&'static str, FieldKind)]) -> Self {
        self.filters = filters;
        self
    }

    pub const fn price_range(mut self, field: &'static str) -> Self {
        self.price_field = Some(field);
        self
    }

    pub const fn rating_range(mut self, field: &'static str) -> Self {
        self.rating_field = Some(field);
        self
    }

    pub const fn default_sort(mut self, sort: &'static str) -> Self {
        self.default_sort = sort;
        self
    }

    fn kind_of(&self, key: &str) -> Option<FieldKind> {
        self.filters
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: Document,
    pub sort: Document,
    pub page: u64,
    pub limit: u64,
}

impl ListQuery {
    /// Builds the final query. `defaults` are role-scoped filters and always
    /// override anything the caller supplied for the same key.
    pub fn from_params(params: &HashMap<String, String>, spec: &ListSpec, defaults: Document) -> Self {
        let page = parse_page(params.get("page").map(String::as_str));
        let limit = parse_limit(params.get("limit").map(String::as_str));

        let mut filter = build_filter_query(params, spec, defaults);
        if let Some(search) = build_search_query(params.get("q").map(String::as_str), spec.search_fields) {
            filter.extend(search);
        }

        let sort = build_sort_query(params.get("sort").map(String::as_str), spec.default_sort);

        ListQuery {
            filter,
            sort,
            page,
            limit,
        }
    }

    /// Plain pagination over a fixed filter, for endpoints without search.
    pub fn paged(params: &HashMap<String, String>, filter: Document, sort: Document) -> Self {
        ListQuery {
            filter,
            sort,
            page: parse_page(params.get("page").map(String::as_str)),
            limit: parse_limit(params.get("limit").map(String::as_str)),
        }
    }

    /// Saturates at `i64::MAX`, the largest skip the server accepts.
    pub fn skip(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64)
    }

    pub fn find_options(&self) -> FindOptions {
        FindOptions::builder()
            .sort(self.sort.clone())
            .skip(self.skip())
            .limit(self.limit as i64)
            .build()
    }
}

pub fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .map(|p| p as u64)
        .unwrap_or(DEFAULT_PAGE)
}

pub fn parse_limit(raw: Option<&str>) -> u64 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(l) if l >= 1 => (l as u64).min(MAX_LIMIT),
        Some(_) => 1,
        None => DEFAULT_LIMIT,
    }
}

/// Trims the keyword and strips everything except word characters and whitespace.
pub fn sanitize_keyword(keyword: &str) -> String {
    NON_WORD.replace_all(keyword.trim(), "").into_owned()
}

pub fn build_search_query(keyword: Option<&str>, fields: &[&str]) -> Option<Document> {
    if fields.is_empty() {
        return None;
    }

    let sanitized = sanitize_keyword(keyword?);
    if sanitized.trim().is_empty() {
        return None;
    }

    let conditions: Vec<Bson> = fields
        .iter()
        .map(|field| Bson::Document(doc! { *field: { "$regex": &sanitized, "$options": "i" } }))
        .collect();

    Some(doc! { "$or": conditions })
}

pub fn build_filter_query(params: &HashMap<String, String>, spec: &ListSpec, defaults: Document) -> Document {
    let mut filter = Document::new();

    if let Some(field) = spec.price_field {
        if let Some(range) = numeric_range(params, "minPrice", "maxPrice") {
            filter.insert(field, range);
        }
    }
    if let Some(field) = spec.rating_field {
        if let Some(range) = numeric_range(params, "minRating", "maxRating") {
            filter.insert(field, range);
        }
    }

    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    for key in keys {
        if RESERVED.contains(&key.as_str()) {
            continue;
        }
        let Some(kind) = spec.kind_of(key) else {
            continue;
        };
        let raw = params[key].trim();
        if raw.is_empty() {
            continue;
        }
        if let Some(value) = coerce(raw, kind) {
            filter.insert(key.as_str(), value);
        }
    }

    filter.extend(defaults);
    filter
}

pub fn build_sort_query(sort: Option<&str>, default_sort: &str) -> Document {
    let parsed = parse_sort(sort.unwrap_or_default());
    if parsed.is_empty() {
        let fallback = parse_sort(default_sort);
        if fallback.is_empty() {
            return doc! { "created_at": -1 };
        }
        return fallback;
    }
    parsed
}

fn parse_sort(raw: &str) -> Document {
    let mut sort = Document::new();
    for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (name, direction) = match field.strip_prefix('-') {
            Some(name) => (name, -1),
            None => (field.strip_prefix('+').unwrap_or(field), 1),
        };
        if SORT_FIELD.is_match(name) {
            sort.insert(name, direction);
        }
    }
    sort
}

fn numeric_range(params: &HashMap<String, String>, min_key: &str, max_key: &str) -> Option<Document> {
    let parse = |key: &str| params.get(key).and_then(|v| v.trim().parse::<f64>().ok()).filter(|v| v.is_finite());

    let mut range = Document::new();
    if let Some(min) = parse(min_key) {
        range.insert("$gte", min);
    }
    if let Some(max) = parse(max_key) {
        range.insert("$lte", max);
    }
    (!range.is_empty()).then_some(range)
}

fn coerce(raw: &str, kind: FieldKind) -> Option<Bson> {
    match kind {
        FieldKind::Text => match raw {
            "true" => Some(Bson::Boolean(true)),
            "false" => Some(Bson::Boolean(false)),
            _ => Some(Bson::String(raw.to_string())),
        },
        FieldKind::Bool => match raw {
            "true" => Some(Bson::Boolean(true)),
            "false" => Some(Bson::Boolean(false)),
            _ => None,
        },
        FieldKind::Id => ObjectId::parse_str(raw).ok().map(Bson::ObjectId),
        FieldKind::Number => raw
            .parse::<i64>()
            .map(Bson::Int64)
            .ok()
            .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(Bson::Double)),
    }
}

/// Runs the query against `collection` and returns the page plus pagination info.
pub async fn paginate<T>(collection: &Collection<T>, query: &ListQuery) -> Result<(Vec<T>, Pagination), mongodb::error::Error>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let total = collection.count_documents(query.filter.clone(), None).await?;
    let items: Vec<T> = collection
        .find(query.filter.clone(), query.find_options())
        .await?
        .try_collect()
        .await?;

    Ok((items, Pagination::new(query.page, query.limit, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: ListSpec = ListSpec::new(&["title", "description"])
        .filters(&[
            ("category", FieldKind::Text),
            ("is_public", FieldKind::Bool),
            ("provider_id", FieldKind::Id),
            ("experience_years", FieldKind::Number),
        ])
        .price_range("base_price")
        .rating_range("rating");

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn sanitize_strips_special_characters() {
        assert_eq!(sanitize_keyword("  paint.*(ing)  "), "painting");
        assert_eq!(sanitize_keyword("$where"), "where");
        assert_eq!(sanitize_keyword("deep clean"), "deep clean");
        assert_eq!(sanitize_keyword("!!!"), "");
    }

    #[test]
    fn search_builds_case_insensitive_or() {
        let search = build_search_query(Some("roof"), &["title", "description"]).unwrap();
        let or = search.get_array("$or").unwrap();
        assert_eq!(or.len(), 2);
        assert_eq!(
            or[0].as_document().unwrap(),
            &doc! { "title": { "$regex": "roof", "$options": "i" } }
        );
    }

    #[test]
    fn search_skips_empty_keywords_and_fields() {
        assert!(build_search_query(None, &["title"]).is_none());
        assert!(build_search_query(Some("  "), &["title"]).is_none());
        assert!(build_search_query(Some("@#!"), &["title"]).is_none());
        assert!(build_search_query(Some("roof"), &[]).is_none());
    }

    #[test]
    fn page_and_limit_are_clamped() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-3")), 1);
        assert_eq!(parse_page(Some("abc")), 1);
        assert_eq!(parse_page(Some("4")), 4);

        assert_eq!(parse_limit(None), 10);
        assert_eq!(parse_limit(Some("abc")), 10);
        assert_eq!(parse_limit(Some("0")), 1);
        assert_eq!(parse_limit(Some("500")), 100);
        assert_eq!(parse_limit(Some("25")), 25);
    }

    #[test]
    fn huge_pages_saturate_the_skip() {
        let params: HashMap<String, String> = [
            ("page".to_string(), i64::MAX.to_string()),
            ("limit".to_string(), "100".to_string()),
        ]
        .into_iter()
        .collect();
        let query = ListQuery::paged(&params, Document::new(), doc! { "created_at": -1 });

        assert_eq!(query.skip(), i64::MAX as u64);
        assert_eq!(query.find_options().skip, Some(i64::MAX as u64));

        let first = ListQuery::paged(&HashMap::new(), Document::new(), doc! { "created_at": -1 });
        assert_eq!(first.skip(), 0);
    }

    #[test]
    fn sort_parses_directions_and_falls_back() {
        assert_eq!(build_sort_query(Some("title,-rating"), "-created_at"), doc! { "title": 1, "rating": -1 });
        assert_eq!(build_sort_query(None, "-created_at"), doc! { "created_at": -1 });
        assert_eq!(build_sort_query(Some(" , "), "-rating"), doc! { "rating": -1 });
        assert_eq!(build_sort_query(Some("$natural"), ""), doc! { "created_at": -1 });
    }

    #[test]
    fn filters_coerce_declared_fields_only() {
        let provider = ObjectId::new();
        let p = params(&[
            ("category", "Painting"),
            ("is_public", "true"),
            ("provider_id", &provider.to_hex()),
            ("experience_years", "3"),
            ("password", "secret"),
            ("$where", "1"),
            ("page", "2"),
        ]);
        let filter = build_filter_query(&p, &SPEC, Document::new());
        assert_eq!(
            filter,
            doc! {
                "category": "Painting",
                "experience_years": 3_i64,
                "is_public": true,
                "provider_id": provider,
            }
        );
    }

    #[test]
    fn unparsable_values_are_ignored() {
        let p = params(&[
            ("is_public", "maybe"),
            ("provider_id", "not-an-id"),
            ("experience_years", "lots"),
            ("category", ""),
            ("minPrice", "cheap"),
        ]);
        assert!(build_filter_query(&p, &SPEC, Document::new()).is_empty());
    }

    #[test]
    fn price_and_rating_ranges() {
        let p = params(&[("minPrice", "10"), ("maxPrice", "50.5"), ("minRating", "4")]);
        let filter = build_filter_query(&p, &SPEC, Document::new());
        assert_eq!(filter.get_document("base_price").unwrap(), &doc! { "$gte": 10.0, "$lte": 50.5 });
        assert_eq!(filter.get_document("rating").unwrap(), &doc! { "$gte": 4.0 });
    }

    #[test]
    fn defaults_override_caller_filters() {
        let mine = ObjectId::new();
        let p = params(&[("provider_id", &ObjectId::new().to_hex())]);
        let filter = build_filter_query(&p, &SPEC, doc! { "provider_id": mine });
        assert_eq!(filter.get_object_id("provider_id").unwrap(), mine);
    }

    #[test]
    fn list_query_combines_everything() {
        let p = params(&[("q", "tile"), ("page", "3"), ("limit", "5"), ("category", "Tiling")]);
        let query = ListQuery::from_params(&p, &SPEC, doc! { "is_public": true });
        assert_eq!(query.page, 3);
        assert_eq!(query.limit, 5);
        assert_eq!(query.skip(), 10);
        assert!(query.filter.contains_key("$or"));
        assert_eq!(query.filter.get_str("category").unwrap(), "Tiling");
        assert!(query.filter.get_bool("is_public").unwrap());
        assert_eq!(query.sort, doc! { "created_at": -1 });
    }
}
