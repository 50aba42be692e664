//! Author/narrator book graph — §4.B.
//!
//! Authors and narrators are first-class entities with case-insensitive
//! unique names and stable numeric IDs. A combined name such as
//! `"Alice Smith & Bob Jones"` is canonically split into separate entities,
//! with roles and positions assigned in source order.

use crate::store::error::StoreResult;
use crate::store::models::{
    Author, AuthorRole, BookAuthor, BookNarrator, Narrator, NarratorRole,
};
use crate::store::Store;

/// Splits a name joined with `" & "` into its constituent parts, trimming
/// whitespace around each. A name with no `" & "` separator returns a
/// single-element vec unchanged.
pub fn split_joined_names(name: &str) -> Vec<String> {
    name.split(" & ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Resolves a (possibly `&`-joined) author name string into `BookAuthor`
/// junction rows for `book_id`, creating any missing `Author` entities.
/// Position 0 gets role `author`, every later position gets `co_author`.
pub fn resolve_book_authors(
    store: &dyn Store,
    book_id: &str,
    raw_name: &str,
) -> StoreResult<Vec<BookAuthor>> {
    let mut rows = Vec::new();
    for (position, part) in split_joined_names(raw_name).into_iter().enumerate() {
        let author: Author = store.create_author(&part)?;
        rows.push(BookAuthor {
            book_id: book_id.to_owned(),
            author_id: author.id,
            role: if position == 0 { AuthorRole::Author } else { AuthorRole::CoAuthor },
            position: position as u32,
        });
    }
    store.set_book_authors(book_id, &rows)?;
    Ok(rows)
}

/// Resolves a (possibly `&`-joined) narrator name string into
/// `BookNarrator` junction rows, mirroring [`resolve_book_authors`].
pub fn resolve_book_narrators(
    store: &dyn Store,
    book_id: &str,
    raw_name: &str,
) -> StoreResult<Vec<BookNarrator>> {
    let mut rows = Vec::new();
    for (position, part) in split_joined_names(raw_name).into_iter().enumerate() {
        let narrator: Narrator = store.create_narrator(&part)?;
        rows.push(BookNarrator {
            book_id: book_id.to_owned(),
            narrator_id: narrator.id,
            role: if position == 0 { NarratorRole::Narrator } else { NarratorRole::CoNarrator },
            position: position as u32,
        });
    }
    store.set_book_narrators(book_id, &rows)?;
    Ok(rows)
}
