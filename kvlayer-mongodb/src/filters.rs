//! Filter, sort and index documents for the `objects` and `search` collections.
//!
//! Every filter starts with `_key` so the compound indices apply.

use std::time::Duration;

use bson::{Document, doc};
use mongodb::{IndexModel, options::IndexOptions};

use kvlayer_core::{
    index::IndexSpec,
    range::ScoreRange,
    schema::{StructureKind, fields, search_fields},
};

/// Every row of a key, whatever its kind.
pub fn key(key: &str) -> Document {
    doc! { fields::KEY: key }
}

/// Every row of a key holding `kind`.
pub fn key_kind(key: &str, kind: StructureKind) -> Document {
    doc! { fields::KEY: key, fields::KIND: kind }
}

/// The row of one member (or hash field).
pub fn member(key: &str, kind: StructureKind, member: &str) -> Document {
    doc! { fields::KEY: key, fields::KIND: kind, fields::VALUE: member }
}

/// The rows of several members.
pub fn members(key: &str, kind: StructureKind, members: &[&str]) -> Document {
    doc! { fields::KEY: key, fields::KIND: kind, fields::VALUE: { "$in": members } }
}

/// Narrows `filter` to rows whose `data` is absent or a whole number, the values
/// an increment accepts.
pub fn holding_integer(mut filter: Document) -> Document {
    let data = format!("${}", fields::DATA);

    filter.insert(
        "$or",
        vec![
            doc! { fields::DATA: { "$exists": false } },
            doc! { fields::DATA: { "$type": ["int", "long"] } },
            doc! {
                "$expr": {
                    "$cond": [
                        { "$eq": [{ "$type": data.as_str() }, "double"] },
                        { "$eq": [data.as_str(), { "$trunc": data.as_str() }] },
                        false,
                    ]
                }
            },
        ],
    );

    filter
}

/// Sorted-set rows whose score lies in `range`. Infinite bounds are left open.
pub fn score_range(key: &str, range: ScoreRange) -> Document {
    let mut filter = key_kind(key, StructureKind::SortedSet);
    let mut bounds = Document::new();

    if range.min.is_finite() {
        bounds.insert("$gte", range.min);
    }
    if range.max.is_finite() {
        bounds.insert("$lte", range.max);
    }
    if !bounds.is_empty() {
        filter.insert(fields::SCORE, bounds);
    }

    filter
}

/// Sorted-set rows ranked before a member with `score` and row id `id`.
pub fn ranked_before(key: &str, score: f64, id: &bson::Bson, descending: bool) -> Document {
    let beyond = if descending { "$gt" } else { "$lt" };
    let mut filter = key_kind(key, StructureKind::SortedSet);

    filter.insert(
        "$or",
        vec![
            doc! { fields::SCORE: { beyond: score } },
            doc! { fields::SCORE: score, "_id": { "$lt": id.clone() } },
        ],
    );

    filter
}

/// Aggregation pipeline drawing one random row matching `filter`.
pub fn sample(filter: Document) -> Vec<Document> {
    vec![
        doc! { "$match": filter },
        doc! { "$sample": { "size": 1 } },
        doc! { "$project": { "_id": 1 } },
    ]
}

/// Score order. Ties keep insertion order in both directions.
pub fn score_order(descending: bool) -> Document {
    let direction = if descending { -1 } else { 1 };

    doc! { fields::SCORE: direction, "_id": 1 }
}

/// List order, or its reverse.
pub fn list_order(reverse: bool) -> Document {
    let direction = if reverse { -1 } else { 1 };

    doc! { fields::SEQ: direction, "_id": direction }
}

/// Counter field of the head (or the tail) of a list.
pub fn sequence_field(tail: bool) -> &'static str {
    if tail { "tail" } else { "head" }
}

/// Update pipeline moving a list's head (or tail) counter one step past both its
/// previous value and `edge`, the `seq` currently at that end. A missing counter
/// starts at `edge`; an empty list starts at 0 for the tail and -1 for the head.
pub fn sequence_step(edge: Option<i64>, tail: bool) -> Vec<Document> {
    let field = sequence_field(tail);
    let current = format!("${}", field);

    let next = if tail {
        doc! { "$add": [{ "$max": [current.as_str(), edge.unwrap_or(-1)] }, 1_i64] }
    } else {
        doc! { "$subtract": [{ "$min": [current.as_str(), edge.unwrap_or(0)] }, 1_i64] }
    };

    vec![doc! { "$set": { field: next } }]
}

/// Insertion order.
pub fn insertion_order() -> Document {
    doc! { "_id": 1 }
}

/// The search entry of one entity.
pub fn search_entry(namespace: &str, id: &str) -> Document {
    doc! { search_fields::KEY: namespace, search_fields::ID: id }
}

/// Text search within a namespace.
pub fn search_text(namespace: &str, term: &str) -> Document {
    doc! { search_fields::KEY: namespace, "$text": { "$search": term } }
}

/// Driver index model for a declaration.
pub fn index_model(spec: &IndexSpec) -> IndexModel {
    IndexModel::builder()
        .keys(spec.keys.clone())
        .options(
            IndexOptions::builder()
                .background(spec.options.background)
                .expire_after(spec.options.expire_after_seconds.map(Duration::from_secs))
                .build()
        )
        .build()
}

#[cfg(test)]
mod tests {
    use bson::Bson;
    use kvlayer_core::index::required_indices;

    use super::*;

    #[test]
    fn open_score_bounds_are_omitted() {
        assert_eq!(
            score_range("z", ScoreRange::all()),
            doc! { "_key": "z", "type": "zset" }
        );
        assert_eq!(
            score_range("z", ScoreRange::at_least(2.0)),
            doc! { "_key": "z", "type": "zset", "score": { "$gte": 2.0 } }
        );
    }

    #[test]
    fn rank_counts_ties_inserted_earlier() {
        let id = Bson::Int32(7);

        assert_eq!(
            ranked_before("z", 1.5, &id, true),
            doc! {
                "_key": "z",
                "type": "zset",
                "$or": [
                    { "score": { "$gt": 1.5 } },
                    { "score": 1.5, "_id": { "$lt": 7 } },
                ],
            }
        );
    }

    #[test]
    fn ties_break_by_insertion_in_both_directions() {
        assert_eq!(score_order(false), doc! { "score": 1, "_id": 1 });
        assert_eq!(score_order(true), doc! { "score": -1, "_id": 1 });
        assert_eq!(list_order(true), doc! { "seq": -1, "_id": -1 });
    }

    #[test]
    fn list_counters_step_past_the_current_edge() {
        assert_eq!(
            sequence_step(Some(4), true),
            vec![doc! { "$set": { "tail": { "$add": [{ "$max": ["$tail", 4_i64] }, 1_i64] } } }]
        );
        assert_eq!(
            sequence_step(None, false),
            vec![doc! { "$set": { "head": { "$subtract": [{ "$min": ["$head", 0_i64] }, 1_i64] } } }]
        );
    }

    #[test]
    fn random_removal_samples_one_row_id() {
        let pipeline = sample(key_kind("online", StructureKind::Set));

        assert_eq!(pipeline[0], doc! { "$match": { "_key": "online", "type": "set" } });
        assert_eq!(pipeline[1], doc! { "$sample": { "size": 1 } });
        assert_eq!(pipeline[2], doc! { "$project": { "_id": 1 } });
    }

    #[test]
    fn hash_fields_are_matched_on_value() {
        assert_eq!(
            member("user:1", StructureKind::Hash, "username"),
            doc! { "_key": "user:1", "type": "hash", "value": "username" }
        );
    }

    #[test]
    fn increments_only_match_whole_numbers() {
        let filter = holding_integer(key_kind("views", StructureKind::String));

        assert_eq!(filter.get_str("_key").unwrap(), "views");
        assert_eq!(
            filter.get_array("$or").unwrap()[1],
            Bson::Document(doc! { "data": { "$type": ["int", "long"] } })
        );
        assert_eq!(
            filter.get_array("$or").unwrap()[2],
            Bson::Document(doc! {
                "$expr": {
                    "$cond": [
                        { "$eq": [{ "$type": "$data" }, "double"] },
                        { "$eq": ["$data", { "$trunc": "$data" }] },
                        false,
                    ]
                }
            })
        );
    }

    #[test]
    fn ttl_index_model_expires_immediately() {
        let [_, _, expiry, text, _] = required_indices();

        let model = index_model(&expiry);
        let options = model.options.unwrap();
        assert_eq!(model.keys, doc! { "expireAt": 1 });
        assert_eq!(options.expire_after, Some(Duration::ZERO));
        assert_eq!(options.background, Some(true));

        let model = index_model(&text);
        assert_eq!(model.keys, doc! { "content": "text" });
        assert_eq!(model.options.unwrap().expire_after, None);
    }
}
