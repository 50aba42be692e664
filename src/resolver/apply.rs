//! Provenance-aware candidate application — §4.R.apply / §4.R.applyManual.

use crate::store::models::{ChangeType, MetadataChangeRecord, MetadataFieldState, MetadataSource as ChangeSource};
use crate::store::{Store, StoreResult};

use super::sources::Candidate;

/// One field this module knows how to carry from a [`Candidate`] into the
/// provenance tables. `(field name, candidate value)`.
fn candidate_fields(candidate: &Candidate) -> Vec<(&'static str, Option<String>)> {
    vec![
        ("title", Some(candidate.title.clone())),
        ("author", candidate.author.clone()),
        ("narrator", candidate.narrator.clone()),
        ("publisher", candidate.publisher.clone()),
        ("language", candidate.language.clone()),
        ("isbn10", candidate.isbn10.clone()),
        ("isbn13", candidate.isbn13.clone()),
        ("cover_url", candidate.cover_url.clone()),
        ("audiobook_release_year", candidate.audiobook_release_year.map(|y| y.to_string())),
        ("print_year", candidate.print_year.map(|y| y.to_string())),
    ]
}

/// Applies `candidate` to `book_id`'s provenance rows. `fields`, when
/// non-empty, restricts which fields are written. `change_type` is
/// `Fetch` for the automatic cascade and `UserEdit` for the manual apply
/// endpoint (§4.R.apply vs §4.R.applyManual share this core).
pub fn apply_candidate(
    store: &dyn Store,
    book_id: &str,
    candidate: &Candidate,
    fields: &[String],
    source: ChangeSource,
    change_type: ChangeType,
    now: i64,
) -> StoreResult<Vec<String>> {
    let mut applied = Vec::new();
    let existing = store.get_metadata_field_states(book_id)?;

    for (field, new_value) in candidate_fields(candidate) {
        if !fields.is_empty() && !fields.iter().any(|f| f == field) {
            continue;
        }
        let Some(new_value) = new_value else { continue };
        if new_value.is_empty() {
            continue;
        }

        let mut state = existing
            .iter()
            .find(|s| s.field == field)
            .cloned()
            .unwrap_or_else(|| MetadataFieldState {
                book_id: book_id.to_string(),
                field: field.to_string(),
                file_value: None,
                fetched_value: None,
                stored_value: None,
                override_value: None,
                override_locked: false,
                updated_at: now,
            });

        if state.override_locked {
            continue;
        }

        let prior_effective = state.effective_value().map(str::to_string);

        match source {
            ChangeSource::Fetched => state.fetched_value = Some(new_value.clone()),
            _ => state.stored_value = Some(new_value.clone()),
        }
        state.updated_at = now;
        store.upsert_metadata_field_state(&state)?;

        let new_effective = state.effective_value().map(str::to_string);
        if prior_effective != new_effective {
            store.record_metadata_change(&MetadataChangeRecord {
                book_id: book_id.to_string(),
                field: field.to_string(),
                previous_value: prior_effective,
                new_value: new_effective,
                source,
                change_type,
                changed_at: now,
            })?;
            applied.push(field.to_string());
        }
    }

    Ok(applied)
}
