use super::{FilterState, FilterValue, PageSpec, SEARCH_KEY, SortDirection, SortSpec};
use crate::core::{Entity, Value, is_searchable_field};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default predicate: free-text search plus one constraint per filter key.
///
/// Search is a case-insensitive substring test over the text fields that are
/// not ids, timestamps or secrets. Every other active key is matched against
/// the entity field of the same name; all constraints must hold.
pub fn matches_default<E: Entity>(entity: &E, filters: &FilterState) -> bool {
    if let Some(needle) = filters.search_text() {
        if !matches_search(entity, needle) {
            return false;
        }
    }

    filters
        .active_fields()
        .filter(|(key, _)| key.as_str() != SEARCH_KEY)
        .all(|(key, constraint)| match entity.field_value(key) {
            Some(value) => matches_constraint(&value, constraint),
            None => false,
        })
}

fn matches_search<E: Entity>(entity: &E, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    entity
        .fields()
        .iter()
        .filter(|(name, _)| is_searchable_field(name))
        .any(|(_, value)| value.contains_text(&needle))
}

fn matches_constraint(value: &Value, constraint: &FilterValue) -> bool {
    match constraint {
        FilterValue::Any => true,
        FilterValue::Text(text) => {
            let text = text.trim();
            text.is_empty() || value.contains_text(text)
        }
        FilterValue::Equals(expected) => value == expected,
        FilterValue::OneOf(candidates) => {
            candidates.is_empty() || candidates.iter().any(|candidate| candidate == value)
        }
        FilterValue::Range { from, to } => {
            let above = from.as_ref().is_none_or(|from| {
                matches!(value.compare(from), Ok(Ordering::Greater | Ordering::Equal))
            });
            let below = to.as_ref().is_none_or(|to| {
                matches!(value.compare(to), Ok(Ordering::Less | Ordering::Equal))
            });
            !value.is_null() && above && below
        }
    }
}

/// Stable sort; nulls last when ascending, first when descending.
pub fn sort_entities<E: Entity>(entities: &mut [E], sort: &SortSpec) {
    entities.sort_by(|left, right| {
        let left = left.field_value(&sort.field).unwrap_or(Value::Null);
        let right = right.field_value(&sort.field).unwrap_or(Value::Null);
        let ordering = left.sort_cmp(&right);
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Filters with the default predicate, then sorts. Paging is not applied.
pub fn apply_default<E: Entity>(entities: &[E], filters: &FilterState) -> Vec<E> {
    let mut matched: Vec<E> = entities
        .iter()
        .filter(|entity| matches_default(*entity, filters))
        .cloned()
        .collect();
    if let Some(sort) = &filters.sort {
        sort_entities(&mut matched, sort);
    }
    matched
}

pub fn paginate<E: Clone>(entities: &[E], page: Option<PageSpec>) -> Vec<E> {
    match page {
        Some(page) => entities
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect(),
        None => entities.to_vec(),
    }
}

/// Counts entities per distinct value of `key`, most frequent first.
///
/// Entities without the field count under `Value::Null`.
pub fn facet_counts<E: Entity>(entities: &[E], key: &str) -> Vec<(Value, usize)> {
    let mut counts: HashMap<Value, usize> = HashMap::new();
    for entity in entities {
        let value = entity.field_value(key).unwrap_or(Value::Null);
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut counts: Vec<(Value, usize)> = counts.into_iter().collect();
    counts.sort_by(|(left_value, left), (right_value, right)| {
        right.cmp(left).then_with(|| left_value.sort_cmp(right_value))
    });
    counts
}
