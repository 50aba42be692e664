//! Builds the placeholder value map the template engine expands against,
//! resolving author/series/narrator names through the store.

use std::collections::HashMap;

use crate::store::models::{AuthorRole, Book, NarratorRole};
use crate::store::{Store, StoreResult};

const INVALID_PATH_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub fn build_value_map(store: &dyn Store, book: &Book) -> StoreResult<HashMap<String, String>> {
    let mut values = HashMap::new();

    values.insert("title".to_string(), book.title.clone());
    values.insert("cleantitle".to_string(), clean(&book.title));
    values.insert("titlethe".to_string(), title_the(&book.title));

    let authors = primary_and_rest(store.get_book_authors(&book.id)?, |a| a.position, |a| a.role == AuthorRole::Author);
    if let Some(author_id) = authors.first() {
        if let Some(author) = store.get_author_by_id(author_id.author_id)? {
            insert_name_parts(&mut values, "author", &author.name);
        }
    }

    let narrators = primary_and_rest(store.get_book_narrators(&book.id)?, |n| n.position, |n| n.role == NarratorRole::Narrator);
    if let Some(narrator_id) = narrators.first() {
        if let Some(narrator) = store.get_narrator_by_id(narrator_id.narrator_id)? {
            insert_name_parts(&mut values, "narrator", &narrator.name);
        }
    } else if let Some(narrator) = &book.narrator {
        insert_name_parts(&mut values, "narrator", narrator);
    }

    if let Some(series_id) = book.series_id {
        if let Some(series) = store.get_all_series()?.into_iter().find(|s| s.id == series_id) {
            values.insert("series".to_string(), series.name.clone());
            values.insert("seriestitle".to_string(), title_the(&series.name));
        }
    }
    if let Some(position) = book.series_sequence {
        values.insert("seriesposition".to_string(), format_series_position(position));
    }

    if let Some(y) = book.audiobook_release_year.or(book.print_year) {
        values.insert("year".to_string(), y.to_string());
    }
    if let Some(y) = book.print_year {
        values.insert("publishyear".to_string(), y.to_string());
    }
    if let Some(y) = book.audiobook_release_year {
        values.insert("audiobookreleaseyear".to_string(), y.to_string());
    }
    if let Some(publisher) = &book.publisher {
        values.insert("publisher".to_string(), publisher.clone());
    }
    if let Some(language) = &book.language {
        values.insert("language".to_string(), language.clone());
    }
    if let (Some(codec), Some(bitrate)) = (&book.codec, book.bitrate_kbps) {
        values.insert("quality".to_string(), format!("{codec} {bitrate}kbps"));
    }
    if let Some(duration) = book.duration_sec {
        values.insert("duration".to_string(), format_duration(duration));
    }
    if let Some(size) = book.file_size {
        values.insert("filesize".to_string(), format_filesize(size));
    }
    values.insert("format".to_string(), book.format.extension().to_string());
    let isbn = book.isbn13.clone().or_else(|| book.isbn10.clone());
    if let Some(isbn) = isbn {
        values.insert("isbn".to_string(), isbn);
    }
    if let Some(isbn13) = &book.isbn13 {
        values.insert("isbn13".to_string(), isbn13.clone());
    }
    if let Some(release_group) = &book.release_group {
        values.insert("release_group".to_string(), release_group.clone());
    }

    Ok(values)
}

fn primary_and_rest<T, P, R>(mut rows: Vec<T>, position_of: P, is_primary: R) -> Vec<T>
where
    P: Fn(&T) -> u32,
    R: Fn(&T) -> bool,
{
    rows.sort_by_key(&position_of);
    rows.into_iter().filter(|r| is_primary(r)).take(1).collect()
}

fn insert_name_parts(values: &mut HashMap<String, String>, prefix: &str, full_name: &str) {
    values.insert(prefix.to_string(), full_name.to_string());
    let mut parts = full_name.split_whitespace();
    if let Some(first) = parts.next() {
        values.insert(format!("{prefix}first"), first.to_string());
    }
    if let Some(last) = full_name.split_whitespace().last() {
        values.insert(format!("{prefix}last"), last.to_string());
    }
}

fn clean(value: &str) -> String {
    value.chars().filter(|c| !INVALID_PATH_CHARS.contains(c)).collect::<String>().trim().to_string()
}

/// Moves a leading "The "/"A "/"An " article to a trailing ", The" suffix.
fn title_the(value: &str) -> String {
    for article in ["The ", "A ", "An "] {
        if let Some(rest) = value.strip_prefix(article) {
            let article = article.trim_end();
            return format!("{rest}, {article}");
        }
    }
    value.to_string()
}

fn format_series_position(position: f64) -> String {
    if position.fract() == 0.0 {
        format!("{}", position as i64)
    } else {
        format!("{position}")
    }
}

fn format_duration(seconds: f64) -> String {
    let total_minutes = (seconds / 60.0).round() as u64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    format!("{hours}h{minutes:02}m")
}

fn format_filesize(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    format!("{mb:.1}MB")
}
