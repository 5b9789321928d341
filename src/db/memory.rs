//! In-memory document store
//!
//! Implements the subset of MongoDB query and update semantics Prism relies
//! on: dotted paths, equality against scalars and arrays, `$ne/$gt/$gte/$lt/
//! $lte/$in/$nin/$exists/$all/$and/$or` filters, `$set/$unset/$inc/$push/
//! $addToSet/$pull/$setOnInsert` updates, multi-key sort, skip and limit.
//!
//! Used for tests and for running without MongoDB in dev mode.

use std::cmp::Ordering;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use dashmap::DashMap;
use tracing::warn;

use super::store::{get_path, DocumentStore, FindOptions, Model};
use crate::types::{PrismError, Result};

/// Collections held as insertion-ordered vectors of raw documents
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<Model, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        warn!("Document store running in memory-only mode (no MongoDB)");
        Self::default()
    }

    /// Number of documents in a collection
    pub fn len(&self, model: Model) -> usize {
        self.collections.get(&model).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, model: Model) -> bool {
        self.len(model) == 0
    }

    /// Copy of a collection ordered by `_id`, for state comparisons
    pub fn snapshot(&self, model: Model) -> Vec<Document> {
        let mut docs = self
            .collections
            .get(&model)
            .map(|c| c.value().clone())
            .unwrap_or_default();
        docs.sort_by(|a, b| {
            let a = a.get("_id").map(|v| v.to_string()).unwrap_or_default();
            let b = b.get("_id").map(|v| v.to_string()).unwrap_or_default();
            a.cmp(&b)
        });
        docs
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, model: Model, mut doc: Document) -> Result<ObjectId> {
        let id = ensure_object_id(&mut doc)?;
        let mut coll = self.collections.entry(model).or_default();
        if coll.iter().any(|d| d.get("_id") == doc.get("_id")) {
            return Err(PrismError::Database(format!(
                "Duplicate key {} in {}",
                id, model
            )));
        }
        coll.push(doc);
        Ok(id)
    }

    async fn insert_many(&self, model: Model, docs: Vec<Document>) -> Result<usize> {
        let count = docs.len();
        for doc in docs {
            self.insert_one(model, doc).await?;
        }
        Ok(count)
    }

    async fn find_one(&self, model: Model, filter: Document) -> Result<Option<Document>> {
        Ok(self
            .collections
            .get(&model)
            .and_then(|coll| coll.iter().find(|d| matches(d, &filter)).cloned()))
    }

    async fn find(
        &self,
        model: Model,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = match self.collections.get(&model) {
            Some(coll) => coll.iter().filter(|d| matches(d, &filter)).cloned().collect(),
            None => return Ok(Vec::new()),
        };

        if let Some(ref sort) = options.sort {
            docs.sort_by(|a, b| compare_for_sort(a, b, sort));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options
            .limit
            .filter(|l| *l != 0)
            .map(|l| l.unsigned_abs() as usize)
            .unwrap_or(usize::MAX);

        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, model: Model, filter: Document) -> Result<u64> {
        Ok(self
            .collections
            .get(&model)
            .map(|coll| coll.iter().filter(|d| matches(d, &filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn find_one_and_update(
        &self,
        model: Model,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let mut coll = self.collections.entry(model).or_default();

        let found = coll.iter().position(|d| matches(d, &filter));
        if let Some(pos) = found {
            let pre_image = coll[pos].clone();
            let mut updated = pre_image.clone();
            apply_update(&mut updated, &update, false)?;
            coll[pos] = updated;
            return Ok(Some(pre_image));
        }

        if upsert {
            let mut created = seed_from_filter(&filter);
            apply_update(&mut created, &update, true)?;
            ensure_object_id(&mut created)?;
            coll.push(created);
        }

        Ok(None)
    }

    async fn update_one(
        &self,
        model: Model,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<u64> {
        let before = self
            .find_one_and_update(model, filter, update, upsert)
            .await?;
        Ok(if before.is_some() || upsert { 1 } else { 0 })
    }

    async fn update_many(&self, model: Model, filter: Document, update: Document) -> Result<u64> {
        let mut coll = self.collections.entry(model).or_default();
        let mut count = 0;
        for doc in coll.iter_mut() {
            if matches(doc, &filter) {
                let mut updated = doc.clone();
                apply_update(&mut updated, &update, false)?;
                *doc = updated;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find_one_and_delete(
        &self,
        model: Model,
        filter: Document,
    ) -> Result<Option<Document>> {
        let mut coll = self.collections.entry(model).or_default();
        let found = coll.iter().position(|d| matches(d, &filter));
        Ok(found.map(|pos| coll.remove(pos)))
    }

    async fn delete_many(&self, model: Model, filter: Document) -> Result<u64> {
        let mut coll = self.collections.entry(model).or_default();
        let before = coll.len();
        coll.retain(|d| !matches(d, &filter));
        Ok((before - coll.len()) as u64)
    }

    async fn distinct(&self, model: Model, field: &str, filter: Document) -> Result<Vec<Bson>> {
        let mut values: Vec<Bson> = Vec::new();
        if let Some(coll) = self.collections.get(&model) {
            for doc in coll.iter().filter(|d| matches(d, &filter)) {
                let candidates = match get_path(doc, field) {
                    Some(Bson::Array(items)) => items.clone(),
                    Some(v) => vec![v.clone()],
                    None => continue,
                };
                for value in candidates {
                    if !values.iter().any(|v| bson_eq(v, &value)) {
                        values.push(value);
                    }
                }
            }
        }
        Ok(values)
    }
}

fn ensure_object_id(doc: &mut Document) -> Result<ObjectId> {
    match doc.get("_id") {
        Some(Bson::ObjectId(id)) => Ok(*id),
        Some(other) => Err(PrismError::Database(format!(
            "Unsupported _id type: {}",
            other
        ))),
        None => {
            let id = ObjectId::new();
            doc.insert("_id", id);
            Ok(id)
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

fn is_operator_doc(value: &Bson) -> bool {
    match value {
        Bson::Document(d) => d.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Whether `doc` satisfies `filter`
pub(crate) fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, cond)| match key.as_str() {
        "$and" => cond.as_array().is_some_and(|clauses| {
            clauses
                .iter()
                .all(|c| c.as_document().is_some_and(|c| matches(doc, c)))
        }),
        "$or" => cond.as_array().is_some_and(|clauses| {
            clauses
                .iter()
                .any(|c| c.as_document().is_some_and(|c| matches(doc, c)))
        }),
        path => value_matches(get_path(doc, path), cond),
    })
}

fn value_matches(value: Option<&Bson>, cond: &Bson) -> bool {
    let Bson::Document(ops) = cond else {
        return eq_match(value, cond);
    };
    if !is_operator_doc(cond) {
        return eq_match(value, cond);
    }

    ops.iter().all(|(op, arg)| match op.as_str() {
        "$eq" => eq_match(value, arg),
        "$ne" => !eq_match(value, arg),
        "$gt" => cmp_match(value, arg, |o| o == Ordering::Greater),
        "$gte" => cmp_match(value, arg, |o| o != Ordering::Less),
        "$lt" => cmp_match(value, arg, |o| o == Ordering::Less),
        "$lte" => cmp_match(value, arg, |o| o != Ordering::Greater),
        "$in" => arg
            .as_array()
            .is_some_and(|options| options.iter().any(|o| eq_match(value, o))),
        "$nin" => !arg
            .as_array()
            .is_some_and(|options| options.iter().any(|o| eq_match(value, o))),
        "$exists" => arg.as_bool().unwrap_or(true) == value.is_some(),
        "$all" => arg
            .as_array()
            .is_some_and(|required| required.iter().all(|r| eq_match(value, r))),
        _ => false,
    })
}

fn eq_match(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) => {
            bson_eq(&Bson::Array(items.clone()), target)
                || items.iter().any(|item| bson_eq(item, target))
        }
        Some(v) => bson_eq(v, target),
    }
}

fn cmp_match(value: Option<&Bson>, arg: &Bson, pred: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, arg).is_some_and(&pred)),
        Some(v) => compare_values(v, arg).is_some_and(pred),
        None => false,
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    compare_values(a, b) == Some(Ordering::Equal) || a == b
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Ordering between two comparable scalars of the same kind
fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// BSON cross-type sort order (missing and null first)
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) => 8,
        Some(_) => 9,
    }
}

fn compare_for_sort(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let descending = as_i64(direction).is_some_and(|d| d < 0);
        let (va, vb) = (get_path(a, path), get_path(b, path));
        let mut ord = type_rank(va).cmp(&type_rank(vb));
        if ord == Ordering::Equal {
            if let (Some(x), Some(y)) = (va, vb) {
                ord = compare_values(x, y).unwrap_or(Ordering::Equal);
            }
        }
        if descending {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// =============================================================================
// Updates
// =============================================================================

fn seed_from_filter(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, value) in filter {
        if !key.starts_with('$') && !is_operator_doc(value) {
            set_path(&mut seed, key, value.clone());
        }
    }
    seed
}

fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn add_numbers(current: Option<&Bson>, delta: &Bson, path: &str) -> Result<Bson> {
    let invalid = || PrismError::Database(format!("$inc on non-numeric field '{}'", path));
    match (current, delta) {
        (None, d) | (Some(Bson::Null), d) => as_f64(d).map(|_| d.clone()).ok_or_else(invalid),
        (Some(Bson::Int32(x)), Bson::Int32(y)) => Ok(x
            .checked_add(*y)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*x as i64 + *y as i64))),
        (Some(x), y) => match (as_i64(x), as_i64(y)) {
            (Some(x), Some(y)) => Ok(Bson::Int64(x + y)),
            _ => match (as_f64(x), as_f64(y)) {
                (Some(x), Some(y)) => Ok(Bson::Double(x + y)),
                _ => Err(invalid()),
            },
        },
    }
}

fn each_items(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(d) if d.contains_key("$each") => d
            .get_array("$each")
            .map(|items| items.clone())
            .unwrap_or_default(),
        other => vec![other.clone()],
    }
}

fn pull_matches(item: &Bson, cond: &Bson) -> bool {
    if is_operator_doc(cond) {
        return value_matches(Some(item), cond);
    }
    match (item, cond) {
        (Bson::Document(item), Bson::Document(cond)) => matches(item, cond),
        _ => bson_eq(item, cond),
    }
}

/// Reject `$`-prefixed field names inside a value an update would store,
/// as MongoDB does
fn check_storable(value: &Bson, path: &str) -> Result<()> {
    match value {
        Bson::Document(fields) => {
            for (key, nested) in fields {
                let nested_path = format!("{}.{}", path, key);
                if key.starts_with('$') {
                    return Err(PrismError::Database(format!(
                        "The dollar ($) prefixed field '{}' in '{}' is not valid for storage",
                        key, nested_path
                    )));
                }
                check_storable(nested, &nested_path)?;
            }
            Ok(())
        }
        Bson::Array(items) => items.iter().try_for_each(|item| check_storable(item, path)),
        _ => Ok(()),
    }
}

/// Apply an operator update document; `inserting` enables `$setOnInsert`
fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> Result<()> {
    for (op, spec) in update {
        let spec = spec.as_document().ok_or_else(|| {
            PrismError::Database(format!("Update operator {} expects a document", op))
        })?;

        for (path, value) in spec {
            match op.as_str() {
                "$set" => {
                    check_storable(value, path)?;
                    set_path(doc, path, value.clone());
                }
                "$setOnInsert" => {
                    if inserting {
                        check_storable(value, path)?;
                        set_path(doc, path, value.clone());
                    }
                }
                "$unset" => unset_path(doc, path),
                "$inc" => {
                    let next = add_numbers(get_path(doc, path), value, path)?;
                    set_path(doc, path, next);
                }
                "$push" | "$addToSet" => {
                    let mut items = match get_path(doc, path) {
                        None | Some(Bson::Null) => Vec::new(),
                        Some(Bson::Array(existing)) => existing.clone(),
                        Some(_) => {
                            return Err(PrismError::Database(format!(
                                "{} on non-array field '{}'",
                                op, path
                            )))
                        }
                    };
                    for item in each_items(value) {
                        check_storable(&item, path)?;
                        if op == "$addToSet" && items.iter().any(|i| bson_eq(i, &item)) {
                            continue;
                        }
                        items.push(item);
                    }
                    set_path(doc, path, Bson::Array(items));
                }
                "$pull" => {
                    if let Some(Bson::Array(existing)) = get_path(doc, path) {
                        let kept: Vec<Bson> = existing
                            .iter()
                            .filter(|item| !pull_matches(item, value))
                            .cloned()
                            .collect();
                        set_path(doc, path, Bson::Array(kept));
                    }
                }
                other => {
                    return Err(PrismError::Database(format!(
                        "Unsupported update operator {}",
                        other
                    )))
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn test_insert_assigns_id_and_rejects_duplicates() {
        let store = MemoryStore::default();
        let id = store
            .insert_one(Model::Post, doc! { "title": "a" })
            .await
            .unwrap();
        let err = store
            .insert_one(Model::Post, doc! { "_id": id, "title": "b" })
            .await;
        assert!(err.is_err());
        assert_eq!(store.len(Model::Post), 1);
    }

    #[tokio::test]
    async fn test_filter_operators() {
        let store = MemoryStore::default();
        for (user, n, tags) in [("alice", 1, vec!["a"]), ("bob", 5, vec!["a", "b"]), ("carol", 9, vec![])] {
            store
                .insert_one(Model::Post, doc! { "author": user, "n": n, "tags": tags })
                .await
                .unwrap();
        }

        let count = |filter: Document| {
            let store = &store;
            async move { store.count(Model::Post, filter).await.unwrap() }
        };

        assert_eq!(count(doc! { "n": { "$gt": 1 } }).await, 2);
        assert_eq!(count(doc! { "n": { "$gte": 1, "$lt": 9 } }).await, 2);
        assert_eq!(count(doc! { "tags": "a" }).await, 2);
        assert_eq!(count(doc! { "tags": { "$all": ["a", "b"] } }).await, 1);
        assert_eq!(count(doc! { "author": { "$in": ["alice", "carol"] } }).await, 2);
        assert_eq!(count(doc! { "author": { "$ne": "alice" } }).await, 2);
        assert_eq!(count(doc! { "missing": { "$exists": false } }).await, 3);
        assert_eq!(count(doc! { "missing": null }).await, 3);
        assert_eq!(
            count(doc! { "$or": [ { "author": "alice" }, { "n": 9 } ] }).await,
            2
        );
    }

    #[tokio::test]
    async fn test_sort_skip_limit() {
        let store = MemoryStore::default();
        for n in [3, 1, 2] {
            store.insert_one(Model::Post, doc! { "n": n }).await.unwrap();
        }
        let docs = store
            .find(
                Model::Post,
                doc! {},
                FindOptions::sorted(doc! { "n": -1 }).with_skip(1).with_limit(5),
            )
            .await
            .unwrap();
        let ns: Vec<i32> = docs.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_pre_image() {
        let store = MemoryStore::default();
        store
            .insert_one(Model::Profile, doc! { "userId": "alice", "stats": { "postsCount": 1 } })
            .await
            .unwrap();

        let before = store
            .find_one_and_update(
                Model::Profile,
                doc! { "userId": "alice" },
                doc! {
                    "$inc": { "stats.postsCount": 1 },
                    "$addToSet": { "leaderIn": "gls" },
                    "$set": { "personal.gls.name": "Alice" },
                },
                false,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(get_path(&before, "stats.postsCount"), Some(&Bson::Int32(1)));

        let after = store
            .find_one(Model::Profile, doc! { "userId": "alice" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(get_path(&after, "stats.postsCount"), Some(&Bson::Int32(2)));
        assert_eq!(after.get_array("leaderIn").unwrap().len(), 1);
        assert_eq!(
            get_path(&after, "personal.gls.name"),
            Some(&Bson::String("Alice".into()))
        );
    }

    #[tokio::test]
    async fn test_upsert_seeds_from_filter() {
        let store = MemoryStore::default();
        let before = store
            .find_one_and_update(
                Model::Hashtag,
                doc! { "communityId": "gls", "tag": "rust" },
                doc! { "$inc": { "count": 1 }, "$setOnInsert": { "firstSeen": 1 } },
                true,
            )
            .await
            .unwrap();
        assert!(before.is_none());

        let created = store
            .find_one(Model::Hashtag, doc! { "tag": "rust" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.get_str("communityId").unwrap(), "gls");
        assert_eq!(created.get_i32("count").unwrap(), 1);
        assert_eq!(created.get_i32("firstSeen").unwrap(), 1);
        assert!(created.get_object_id("_id").is_ok());
    }

    #[tokio::test]
    async fn test_rejects_operator_names_in_stored_values() {
        let store = MemoryStore::default();
        store
            .insert_one(Model::UndoStack, doc! { "blockNum": 1_i64, "stack": [] })
            .await
            .unwrap();
        let err = store
            .update_one(
                Model::UndoStack,
                doc! { "blockNum": 1_i64 },
                doc! { "$push": { "stack": { "inverse": { "$set": { "title": "x" } } } } },
                false,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stack.inverse.$set"));

        let err = store
            .update_one(
                Model::UndoStack,
                doc! { "blockNum": 1_i64 },
                doc! { "$set": { "meta": [ { "$unset": { "a": "" } } ] } },
                false,
            )
            .await;
        assert!(err.is_err());

        store
            .update_one(
                Model::UndoStack,
                doc! { "blockNum": 1_i64 },
                doc! { "$push": { "stack": { "$each": [ { "restore": { "set": { "title": "x" } } } ] } } },
                false,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pull_by_subdocument() {
        let store = MemoryStore::default();
        store
            .insert_one(
                Model::Post,
                doc! { "votes": { "upVotes": [ { "userId": "a", "weight": 1 }, { "userId": "b", "weight": 2 } ] } },
            )
            .await
            .unwrap();
        store
            .update_one(
                Model::Post,
                doc! {},
                doc! { "$pull": { "votes.upVotes": { "userId": "a" } } },
                false,
            )
            .await
            .unwrap();
        let doc = store.find_one(Model::Post, doc! {}).await.unwrap().unwrap();
        let votes = get_path(&doc, "votes.upVotes").unwrap().as_array().unwrap();
        assert_eq!(votes.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_flattens_arrays() {
        let store = MemoryStore::default();
        store.insert_one(Model::Post, doc! { "tags": ["a", "b"] }).await.unwrap();
        store.insert_one(Model::Post, doc! { "tags": ["b", "c"] }).await.unwrap();
        let values = store.distinct(Model::Post, "tags", doc! {}).await.unwrap();
        assert_eq!(values.len(), 3);
    }
}
