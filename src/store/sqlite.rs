//! SQLite-backed `Store` implementation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::error::{StoreError, StoreResult};
use super::models::*;
use super::schema;
use super::trait_def::Store;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_book(data: String) -> StoreResult<Book> {
    Ok(serde_json::from_str(&data)?)
}

/// Renders a serde-tagged enum as the bare string rusqlite needs for a
/// `TEXT` column, e.g. `LibraryState::Organized` -> `"organized"`.
fn tag_str<T: serde::Serialize>(v: T) -> StoreResult<String> {
    match serde_json::to_value(v)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

impl Store for SqliteStore {
    fn create_book(&self, book: &Book) -> StoreResult<()> {
        let conn = self.lock()?;
        let data = serde_json::to_string(book)?;
        conn.execute(
            "INSERT INTO books (id, title, file_path, file_hash, library_state,
                marked_for_deletion, version_group_id, is_primary_version,
                created_at, updated_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                book.id,
                book.title,
                book.file_path,
                book.file_hash,
                tag_str(book.library_state)?,
                book.marked_for_deletion as i64,
                book.version_group_id,
                book.is_primary_version as i64,
                book.created_at,
                book.updated_at,
                data,
            ],
        )?;
        Ok(())
    }

    fn get_book_by_id(&self, id: &str) -> StoreResult<Option<Book>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM books WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        data.map(row_to_book).transpose()
    }

    fn get_book_by_path(&self, path: &str) -> StoreResult<Option<Book>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM books WHERE file_path = ?1", [path], |r| r.get(0))
            .optional()?;
        data.map(row_to_book).transpose()
    }

    fn get_book_by_file_hash(&self, hash: &str) -> StoreResult<Option<Book>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM books WHERE file_hash = ?1", [hash], |r| r.get(0))
            .optional()?;
        data.map(row_to_book).transpose()
    }

    fn get_all_books(&self, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)> {
        let conn = self.lock()?;
        let total: usize = conn.query_row(
            "SELECT COUNT(*) FROM books WHERE marked_for_deletion = 0",
            [],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT data FROM books WHERE marked_for_deletion = 0
             ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let books = stmt
            .query_map(params![limit as i64, offset as i64], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(row_to_book)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((books, total))
    }

    fn search_books(&self, query: &str, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)> {
        let conn = self.lock()?;
        let like = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let total: usize = conn.query_row(
            "SELECT COUNT(*) FROM books WHERE marked_for_deletion = 0 AND title LIKE ?1 ESCAPE '\\'",
            [&like],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT data FROM books WHERE marked_for_deletion = 0 AND title LIKE ?1 ESCAPE '\\'
             ORDER BY title LIMIT ?2 OFFSET ?3",
        )?;
        let books = stmt
            .query_map(params![like, limit as i64, offset as i64], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(row_to_book)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((books, total))
    }

    fn update_book(&self, book: &Book) -> StoreResult<Book> {
        let conn = self.lock()?;
        let prior: Option<String> = conn
            .query_row("SELECT data FROM books WHERE id = ?1", [&book.id], |r| r.get(0))
            .optional()?;
        let prior: Option<Book> = prior.map(|d| serde_json::from_str(&d)).transpose()?;

        let mut updated = book.clone();
        updated.updated_at = now();
        let user_visible_changed = match &prior {
            Some(p) => user_visible_fields_changed(p, &updated),
            None => true,
        };
        if user_visible_changed {
            updated.metadata_updated_at = Some(updated.updated_at);
        } else if let Some(p) = &prior {
            updated.metadata_updated_at = p.metadata_updated_at;
        }
        // last_written_at is never touched here (§4.S contract).
        if let Some(p) = &prior {
            updated.last_written_at = p.last_written_at;
        }

        let data = serde_json::to_string(&updated)?;
        conn.execute(
            "UPDATE books SET title=?2, file_path=?3, file_hash=?4, library_state=?5,
                marked_for_deletion=?6, version_group_id=?7, is_primary_version=?8,
                updated_at=?9, data=?10 WHERE id=?1",
            params![
                updated.id,
                updated.title,
                updated.file_path,
                updated.file_hash,
                tag_str(updated.library_state)?,
                updated.marked_for_deletion as i64,
                updated.version_group_id,
                updated.is_primary_version as i64,
                updated.updated_at,
                data,
            ],
        )?;
        Ok(updated)
    }

    fn soft_delete(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM books WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut book: Book = serde_json::from_str(&data)?;
        book.marked_for_deletion = true;
        book.marked_for_deletion_at = Some(now());
        book.updated_at = now();
        conn.execute(
            "UPDATE books SET marked_for_deletion=1, updated_at=?2, data=?3 WHERE id=?1",
            params![id, book.updated_at, serde_json::to_string(&book)?],
        )?;
        Ok(())
    }

    fn list_soft_deleted_books(&self, older_than: Option<i64>) -> StoreResult<Vec<Book>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM books WHERE marked_for_deletion = 1")?;
        let books = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(row_to_book)
            .collect::<StoreResult<Vec<Book>>>()?;
        Ok(match older_than {
            Some(cutoff) => books
                .into_iter()
                .filter(|b| b.marked_for_deletion_at.map(|t| t < cutoff).unwrap_or(false))
                .collect(),
            None => books,
        })
    }

    fn purge_soft_deleted(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM books WHERE marked_for_deletion = 1", [])?;
        Ok(n)
    }

    fn restore_book(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM books WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut book: Book = serde_json::from_str(&data)?;
        book.marked_for_deletion = false;
        book.marked_for_deletion_at = None;
        book.updated_at = now();
        conn.execute(
            "UPDATE books SET marked_for_deletion=0, updated_at=?2, data=?3 WHERE id=?1",
            params![id, book.updated_at, serde_json::to_string(&book)?],
        )?;
        Ok(())
    }

    fn set_last_written_at(&self, id: &str, t: i64) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM books WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut book: Book = serde_json::from_str(&data)?;
        book.last_written_at = Some(t);
        conn.execute(
            "UPDATE books SET data=?2 WHERE id=?1",
            params![id, serde_json::to_string(&book)?],
        )?;
        Ok(())
    }

    fn list_duplicates(&self) -> StoreResult<Vec<Vec<Book>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT file_hash FROM books WHERE file_hash IS NOT NULL AND marked_for_deletion = 0
             GROUP BY file_hash HAVING COUNT(*) > 1",
        )?;
        let hashes: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        let mut groups = Vec::new();
        for hash in hashes {
            let mut stmt = conn.prepare("SELECT data FROM books WHERE file_hash = ?1")?;
            let books = stmt
                .query_map([&hash], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(row_to_book)
                .collect::<StoreResult<Vec<_>>>()?;
            groups.push(books);
        }
        Ok(groups)
    }

    fn get_author_by_id(&self, id: i64) -> StoreResult<Option<Author>> {
        let conn = self.lock()?;
        conn.query_row("SELECT id, name FROM authors WHERE id = ?1", [id], |r| {
            Ok(Author { id: r.get(0)?, name: r.get(1)? })
        })
        .optional()
        .map_err(Into::into)
    }

    fn get_author_by_name(&self, name: &str) -> StoreResult<Option<Author>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name FROM authors WHERE name_ci = ?1",
            [name.to_lowercase()],
            |r| Ok(Author { id: r.get(0)?, name: r.get(1)? }),
        )
        .optional()
        .map_err(Into::into)
    }

    fn create_author(&self, name: &str) -> StoreResult<Author> {
        let conn = self.lock()?;
        let name_ci = name.to_lowercase();
        conn.execute(
            "INSERT INTO authors (name, name_ci) VALUES (?1, ?2) ON CONFLICT(name_ci) DO NOTHING",
            params![name, name_ci],
        )?;
        conn.query_row(
            "SELECT id, name FROM authors WHERE name_ci = ?1",
            [name_ci],
            |r| Ok(Author { id: r.get(0)?, name: r.get(1)? }),
        )
        .map_err(Into::into)
    }

    fn get_narrator_by_id(&self, id: i64) -> StoreResult<Option<Narrator>> {
        let conn = self.lock()?;
        conn.query_row("SELECT id, name FROM narrators WHERE id = ?1", [id], |r| {
            Ok(Narrator { id: r.get(0)?, name: r.get(1)? })
        })
        .optional()
        .map_err(Into::into)
    }

    fn get_narrator_by_name(&self, name: &str) -> StoreResult<Option<Narrator>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name FROM narrators WHERE name_ci = ?1",
            [name.to_lowercase()],
            |r| Ok(Narrator { id: r.get(0)?, name: r.get(1)? }),
        )
        .optional()
        .map_err(Into::into)
    }

    fn create_narrator(&self, name: &str) -> StoreResult<Narrator> {
        let conn = self.lock()?;
        let name_ci = name.to_lowercase();
        conn.execute(
            "INSERT INTO narrators (name, name_ci) VALUES (?1, ?2) ON CONFLICT(name_ci) DO NOTHING",
            params![name, name_ci],
        )?;
        conn.query_row(
            "SELECT id, name FROM narrators WHERE name_ci = ?1",
            [name_ci],
            |r| Ok(Narrator { id: r.get(0)?, name: r.get(1)? }),
        )
        .map_err(Into::into)
    }

    fn get_all_series(&self) -> StoreResult<Vec<Series>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, author_id FROM series")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Series { id: r.get(0)?, name: r.get(1)?, author_id: r.get(2)? })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    fn get_series_by_name(&self, name: &str) -> StoreResult<Option<Series>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, author_id FROM series WHERE name_ci = ?1",
            [name.to_lowercase()],
            |r| Ok(Series { id: r.get(0)?, name: r.get(1)?, author_id: r.get(2)? }),
        )
        .optional()
        .map_err(Into::into)
    }

    fn create_series(&self, name: &str, author_id: Option<i64>) -> StoreResult<Series> {
        let conn = self.lock()?;
        let name_ci = name.to_lowercase();
        conn.execute(
            "INSERT INTO series (name, name_ci, author_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(name_ci) DO NOTHING",
            params![name, name_ci, author_id],
        )?;
        conn.query_row(
            "SELECT id, name, author_id FROM series WHERE name_ci = ?1",
            [name_ci],
            |r| Ok(Series { id: r.get(0)?, name: r.get(1)?, author_id: r.get(2)? }),
        )
        .map_err(Into::into)
    }

    fn set_book_authors(&self, book_id: &str, authors: &[BookAuthor]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM book_authors WHERE book_id = ?1", [book_id])?;
        for ba in authors {
            tx.execute(
                "INSERT INTO book_authors (book_id, author_id, role, position) VALUES (?1, ?2, ?3, ?4)",
                params![
                    ba.book_id,
                    ba.author_id,
                    tag_str(ba.role)?,
                    ba.position
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_book_authors(&self, book_id: &str) -> StoreResult<Vec<BookAuthor>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT book_id, author_id, role, position FROM book_authors
             WHERE book_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([book_id], |r| {
                let role_str: String = r.get(2)?;
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, role_str, r.get::<_, i64>(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(book_id, author_id, role, position)| {
                Ok(BookAuthor {
                    book_id,
                    author_id,
                    role: serde_json::from_value(serde_json::Value::String(role))?,
                    position: position as u32,
                })
            })
            .collect()
    }

    fn set_book_narrators(&self, book_id: &str, narrators: &[BookNarrator]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM book_narrators WHERE book_id = ?1", [book_id])?;
        for bn in narrators {
            tx.execute(
                "INSERT INTO book_narrators (book_id, narrator_id, role, position) VALUES (?1, ?2, ?3, ?4)",
                params![
                    bn.book_id,
                    bn.narrator_id,
                    tag_str(bn.role)?,
                    bn.position
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_book_narrators(&self, book_id: &str) -> StoreResult<Vec<BookNarrator>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT book_id, narrator_id, role, position FROM book_narrators
             WHERE book_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([book_id], |r| {
                let role_str: String = r.get(2)?;
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, role_str, r.get::<_, i64>(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(book_id, narrator_id, role, position)| {
                Ok(BookNarrator {
                    book_id,
                    narrator_id,
                    role: serde_json::from_value(serde_json::Value::String(role))?,
                    position: position as u32,
                })
            })
            .collect()
    }

    fn create_segment(&self, segment: &BookSegment) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO book_segments (id, book_numeric_id, active, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                segment.id,
                segment.book_numeric_id,
                segment.active as i64,
                serde_json::to_string(segment)?
            ],
        )?;
        Ok(())
    }

    fn list_segments(&self, book_numeric_id: i64) -> StoreResult<Vec<BookSegment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM book_segments WHERE book_numeric_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([book_numeric_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn upsert_metadata_field_state(&self, state: &MetadataFieldState) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO metadata_field_states (book_id, field, updated_at, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(book_id, field) DO UPDATE SET updated_at = excluded.updated_at, data = excluded.data",
            params![state.book_id, state.field, state.updated_at, serde_json::to_string(state)?],
        )?;
        Ok(())
    }

    fn get_metadata_field_states(&self, book_id: &str) -> StoreResult<Vec<MetadataFieldState>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM metadata_field_states WHERE book_id = ?1")?;
        let rows = stmt
            .query_map([book_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn delete_metadata_field_state(&self, book_id: &str, field: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM metadata_field_states WHERE book_id = ?1 AND field = ?2",
            params![book_id, field],
        )?;
        Ok(())
    }

    fn record_metadata_change(&self, record: &MetadataChangeRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM metadata_change_history WHERE book_id = ?1",
            [&record.book_id],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO metadata_change_history (book_id, seq, changed_at, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![record.book_id, seq, record.changed_at, serde_json::to_string(record)?],
        )?;
        Ok(())
    }

    fn get_metadata_change_history(
        &self,
        book_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<MetadataChangeRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM metadata_change_history WHERE book_id = ?1
             ORDER BY changed_at ASC, seq ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![book_id, limit as i64, offset as i64], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn create_operation(&self, op_type: OperationType, priority: Priority) -> StoreResult<Operation> {
        let conn = self.lock()?;
        let op = Operation {
            id: ulid::Ulid::new().to_string(),
            op_type,
            status: OperationStatus::Queued,
            priority,
            progress_current: 0,
            progress_total: 0,
            progress_label: None,
            started_at: None,
            finished_at: None,
            error_message: None,
            aging_boosted_at: None,
            created_at: now(),
            depends_on: Vec::new(),
        };
        conn.execute(
            "INSERT INTO operations (id, op_type, status, priority, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                op.id,
                tag_str(op.op_type)?,
                tag_str(op.status)?,
                op.priority as i64,
                op.created_at,
                serde_json::to_string(&op)?
            ],
        )?;
        Ok(op)
    }

    fn update_operation_status(
        &self,
        id: &str,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> =
            conn.query_row("SELECT data FROM operations WHERE id = ?1", [id], |r| r.get(0)).optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut op: Operation = serde_json::from_str(&data)?;
        if op.status.is_terminal() {
            return Ok(());
        }
        op.status = status;
        op.error_message = error_message.map(str::to_owned);
        if status == OperationStatus::Running && op.started_at.is_none() {
            op.started_at = Some(now());
        }
        if status.is_terminal() {
            op.finished_at = Some(now());
        }
        conn.execute(
            "UPDATE operations SET status=?2, data=?3 WHERE id=?1",
            params![id, tag_str(status)?, serde_json::to_string(&op)?],
        )?;
        Ok(())
    }

    fn update_operation_progress(
        &self,
        id: &str,
        current: u64,
        total: u64,
        label: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> =
            conn.query_row("SELECT data FROM operations WHERE id = ?1", [id], |r| r.get(0)).optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut op: Operation = serde_json::from_str(&data)?;
        if op.status.is_terminal() {
            return Ok(());
        }
        // Monotonically non-decreasing (§3.2 invariant).
        op.progress_current = op.progress_current.max(current);
        op.progress_total = total;
        if let Some(l) = label {
            op.progress_label = Some(l.to_owned());
        }
        conn.execute(
            "UPDATE operations SET data=?2 WHERE id=?1",
            params![id, serde_json::to_string(&op)?],
        )?;
        Ok(())
    }

    fn get_operation(&self, id: &str) -> StoreResult<Option<Operation>> {
        let conn = self.lock()?;
        let data: Option<String> =
            conn.query_row("SELECT data FROM operations WHERE id = ?1", [id], |r| r.get(0)).optional()?;
        data.map(|d| Ok(serde_json::from_str(&d)?)).transpose()
    }

    fn list_operations(&self, status: Option<OperationStatus>) -> StoreResult<Vec<Operation>> {
        let conn = self.lock()?;
        let rows: Vec<String> = match status {
            Some(s) => {
                let mut stmt = conn.prepare("SELECT data FROM operations WHERE status = ?1 ORDER BY created_at")?;
                let rows = stmt.query_map([tag_str(s)?], |r| r.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT data FROM operations ORDER BY created_at")?;
                let rows = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
                rows
            }
        };
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn append_operation_log(&self, entry: &OperationLog) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operation_logs (operation_id, sequence, data) VALUES (?1, ?2, ?3)",
            params![entry.operation_id, entry.sequence, serde_json::to_string(entry)?],
        )?;
        Ok(())
    }

    fn get_operation_logs(&self, operation_id: &str) -> StoreResult<Vec<OperationLog>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM operation_logs WHERE operation_id = ?1 ORDER BY sequence",
        )?;
        let rows = stmt
            .query_map([operation_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn set_operation_aging_boosted(&self, id: &str, boosted_at: i64) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> =
            conn.query_row("SELECT data FROM operations WHERE id = ?1", [id], |r| r.get(0)).optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut op: Operation = serde_json::from_str(&data)?;
        op.aging_boosted_at = Some(boosted_at);
        conn.execute(
            "UPDATE operations SET data=?2 WHERE id=?1",
            params![id, serde_json::to_string(&op)?],
        )?;
        Ok(())
    }

    fn set_operation_priority(&self, id: &str, priority: Priority) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> =
            conn.query_row("SELECT data FROM operations WHERE id = ?1", [id], |r| r.get(0)).optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut op: Operation = serde_json::from_str(&data)?;
        op.priority = priority;
        conn.execute(
            "UPDATE operations SET priority=?2, data=?3 WHERE id=?1",
            params![id, priority as i64, serde_json::to_string(&op)?],
        )?;
        Ok(())
    }

    fn set_operation_depends_on(&self, id: &str, depends_on: &[String]) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> =
            conn.query_row("SELECT data FROM operations WHERE id = ?1", [id], |r| r.get(0)).optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut op: Operation = serde_json::from_str(&data)?;
        op.depends_on = depends_on.to_vec();
        conn.execute("UPDATE operations SET data=?2 WHERE id=?1", params![id, serde_json::to_string(&op)?])?;
        Ok(())
    }

    fn is_hash_blocked(&self, hash: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM blocked_hashes WHERE hash = ?1", [hash], |r| r.get(0))?;
        Ok(count > 0)
    }

    fn add_blocked_hash(&self, entry: &BlockedHash) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO blocked_hashes (hash, reason, created_at) VALUES (?1, ?2, ?3)",
            params![entry.hash, entry.reason, entry.created_at],
        )?;
        Ok(())
    }

    fn list_blocked_hashes(&self) -> StoreResult<Vec<BlockedHash>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT hash, reason, created_at FROM blocked_hashes")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(BlockedHash { hash: r.get(0)?, reason: r.get(1)?, created_at: r.get(2)? })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    fn create_import_path(&self, path: &ImportPath) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO import_paths (id, path, name, enabled, book_count) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![path.id, path.path, path.name, path.enabled as i64, path.book_count as i64],
        )?;
        Ok(())
    }

    fn list_import_paths(&self) -> StoreResult<Vec<ImportPath>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, path, name, enabled, book_count FROM import_paths")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ImportPath {
                    id: r.get(0)?,
                    path: r.get(1)?,
                    name: r.get(2)?,
                    enabled: r.get::<_, i64>(3)? != 0,
                    book_count: r.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    fn set_import_path_book_count(&self, id: &str, count: u64) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE import_paths SET book_count = ?2 WHERE id = ?1",
            params![id, count as i64],
        )?;
        Ok(())
    }

    fn get_itunes_fingerprint(&self, path: &str) -> StoreResult<Option<ITunesLibraryFingerprint>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM itunes_fingerprints WHERE path = ?1", [path], |r| r.get(0))
            .optional()?;
        data.map(|d| Ok(serde_json::from_str(&d)?)).transpose()
    }

    fn put_itunes_fingerprint(&self, fp: &ITunesLibraryFingerprint) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO itunes_fingerprints (path, data) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET data = excluded.data",
            params![fp.path, serde_json::to_string(fp)?],
        )?;
        Ok(())
    }

    fn get_shadow_record(&self, torrent_id: &str) -> StoreResult<Option<ShadowRecord>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM shadow_records WHERE torrent_id = ?1", [torrent_id], |r| r.get(0))
            .optional()?;
        data.map(|d| Ok(serde_json::from_str(&d)?)).transpose()
    }

    fn put_shadow_record(&self, record: &ShadowRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO shadow_records (torrent_id, status, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(torrent_id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![
                record.torrent_id,
                tag_str(record.status)?,
                serde_json::to_string(record)?
            ],
        )?;
        Ok(())
    }

    fn delete_shadow_record(&self, torrent_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM shadow_records WHERE torrent_id = ?1", [torrent_id])?;
        Ok(())
    }

    fn list_shadow_records(&self, status: Option<ShadowStatus>) -> StoreResult<Vec<ShadowRecord>> {
        let conn = self.lock()?;
        let rows: Vec<String> = match status {
            Some(s) => {
                let mut stmt =
                    conn.prepare("SELECT data FROM shadow_records WHERE status = ?1")?;
                let rows = stmt.query_map([tag_str(s)?], |r| r.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT data FROM shadow_records")?;
                let rows = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
                rows
            }
        };
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn create_anthology_review(&self, review: &AnthologyReview) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO anthology_reviews (id, status, created_at, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                review.id,
                tag_str(review.status)?,
                review.created_at,
                serde_json::to_string(review)?
            ],
        )?;
        Ok(())
    }

    fn get_anthology_review(&self, id: &str) -> StoreResult<Option<AnthologyReview>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM anthology_reviews WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        data.map(|d| Ok(serde_json::from_str(&d)?)).transpose()
    }

    fn list_anthology_reviews(&self, status: Option<AnthologyReviewStatus>) -> StoreResult<Vec<AnthologyReview>> {
        let conn = self.lock()?;
        let rows: Vec<String> = match status {
            Some(s) => {
                let mut stmt =
                    conn.prepare("SELECT data FROM anthology_reviews WHERE status = ?1 ORDER BY created_at")?;
                let rows = stmt.query_map([tag_str(s)?], |r| r.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT data FROM anthology_reviews ORDER BY created_at")?;
                let rows = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
                rows
            }
        };
        rows.into_iter().map(|d| Ok(serde_json::from_str(&d)?)).collect()
    }

    fn update_anthology_review_status(&self, id: &str, status: AnthologyReviewStatus) -> StoreResult<()> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM anthology_reviews WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut review: AnthologyReview = serde_json::from_str(&data)?;
        review.status = status;
        conn.execute(
            "UPDATE anthology_reviews SET status=?2, data=?3 WHERE id=?1",
            params![id, tag_str(status)?, serde_json::to_string(&review)?],
        )?;
        Ok(())
    }

    fn resolve_anthology_review(
        &self,
        id: &str,
        resolution: AnthologyResolution,
        mappings: &[AnthologyBookMapping],
    ) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let data: Option<String> = tx
            .query_row("SELECT data FROM anthology_reviews WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        let Some(data) = data else { return Ok(()) };
        let mut review: AnthologyReview = serde_json::from_str(&data)?;
        review.status = AnthologyReviewStatus::Resolved;
        review.resolution = Some(resolution);
        tx.execute(
            "UPDATE anthology_reviews SET status=?2, data=?3 WHERE id=?1",
            params![
                id,
                tag_str(review.status)?,
                serde_json::to_string(&review)?
            ],
        )?;
        for mapping in mappings {
            tx.execute(
                "INSERT INTO anthology_mappings (review_id, contained_book_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(review_id, contained_book_id) DO UPDATE SET data = excluded.data",
                params![mapping.review_id, mapping.contained_book_id, serde_json::to_string(mapping)?],
            )?;
            if resolution == AnthologyResolution::Replaces {
                let book_data: Option<String> = tx
                    .query_row(
                        "SELECT data FROM books WHERE id = ?1",
                        [&mapping.contained_book_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if let Some(book_data) = book_data {
                    let mut book: Book = serde_json::from_str(&book_data)?;
                    book.superseded_by = Some(review.book_id.clone());
                    tx.execute(
                        "UPDATE books SET data=?2 WHERE id=?1",
                        params![book.id, serde_json::to_string(&book)?],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, String::from_utf8_lossy(value).to_string()],
        )?;
        Ok(())
    }

    fn kv_get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let value: Option<String> =
            conn.query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |r| r.get(0)).optional()?;
        Ok(value.map(|v| v.into_bytes()))
    }

    fn kv_delete(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }

    fn kv_iterate_prefix(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        let like = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare("SELECT key, value FROM kv_store WHERE key LIKE ?1 ESCAPE '\\'")?;
        let rows = stmt
            .query_map([&like], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (key, value) in rows {
            f(&key, value.as_bytes())?;
        }
        Ok(())
    }
}

fn user_visible_fields_changed(prior: &Book, updated: &Book) -> bool {
    prior.title != updated.title
        || prior.author_id != updated.author_id
        || prior.series_id != updated.series_id
        || prior.series_sequence != updated.series_sequence
        || prior.narrator != updated.narrator
        || prior.publisher != updated.publisher
        || prior.language != updated.language
        || prior.audiobook_release_year != updated.audiobook_release_year
        || prior.print_year != updated.print_year
        || prior.isbn10 != updated.isbn10
        || prior.isbn13 != updated.isbn13
        || prior.cover_url != updated.cover_url
        || prior.narrators_json != updated.narrators_json
}
