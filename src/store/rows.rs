//! Row <-> domain conversions for `url_queue` and `check_results`.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use crate::record::{CheckResult, RecordStatus, Validity};

use super::error::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// The raw shape of an `url_queue` row, as handed to a caller-supplied
/// record rebuilder (see `spec.md` §6, `crate::queue::Rebuilder`). The
/// queue cannot reconstruct a full domain [`crate::record::UrlRecord`]
/// itself — that requires crawler context this crate doesn't have.
#[derive(Debug, Clone)]
pub struct StoredUrlRow {
    pub id: i64,
    pub url: String,
    pub fingerprint: Option<String>,
    pub parent_url: Option<String>,
    pub base_ref: Option<String>,
    pub recursion_level: u32,
    pub line: i64,
    pub column: i64,
    pub page: i64,
    pub name: String,
    pub extern_info: Option<(bool, bool)>,
    pub url_encoding: Option<String>,
    pub parent_content_type: Option<String>,
    pub status: RecordStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub(super) fn row_from_sqlite(row: &Row<'_>) -> rusqlite::Result<StoredUrlRow> {
    let extern_raw: Option<String> = row.get("extern")?;
    let extern_info = extern_raw.as_deref().and_then(decode_extern);
    let status_raw: String = row.get("status")?;
    let created_raw: String = row.get("created_at")?;
    let updated_raw: Option<String> = row.get("updated_at")?;
    Ok(StoredUrlRow {
        id: row.get("id")?,
        url: row.get("url")?,
        fingerprint: row.get("fingerprint")?,
        parent_url: row.get("parent_url")?,
        base_ref: row.get("base_ref")?,
        recursion_level: row.get("recursion_level")?,
        line: row.get("line")?,
        column: row.get("column_num")?,
        page: row.get("page")?,
        name: row.get("name")?,
        extern_info,
        url_encoding: row.get("url_encoding")?,
        parent_content_type: row.get("parent_content_type")?,
        status: RecordStatus::from_str(&status_raw),
        created_at: parse_timestamp(&created_raw),
        updated_at: updated_raw.as_deref().and_then(parse_timestamp),
    })
}

fn decode_extern(raw: &str) -> Option<(bool, bool)> {
    let parsed: serde_json::Value = serde_json::from_str(raw).ok()?;
    let arr = parsed.as_array()?;
    if arr.len() != 2 {
        return None;
    }
    Some((arr[0].as_bool()?, arr[1].as_bool()?))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(super) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                ..
            },
            _
        )
    )
}

/// Insert-or-replace a `check_results` row. When `placeholder_if_absent`
/// is set, a plain (non-replacing) `INSERT` is used so an existing row
/// (real or placeholder) is left untouched; a conflict is reported as
/// [`StoreError::UniqueConflict`] for the caller to swallow.
pub(super) fn insert_result(
    conn: &Connection,
    fingerprint: &str,
    result: &CheckResult,
    placeholder_if_absent: bool,
) -> Result<()> {
    let valid_sentinel: i64 = match result.valid {
        Validity::Placeholder => -1,
        Validity::Valid(v) => i64::from(v),
    };
    let warnings_json = serde_json::to_string(&result.warnings)?;
    let info_json = serde_json::to_string(&result.info)?;
    let modified = result.modified.map(|dt| dt.to_rfc3339());

    let sql = if placeholder_if_absent {
        "INSERT INTO check_results
            (fingerprint, url, valid, extern, result, warnings, info, name, title,
             parent_url, base_ref, base_url, domain, content_type, size, modified,
             dltime, checktime, line, column_num, page, level, checked_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)"
    } else {
        "INSERT OR REPLACE INTO check_results
            (fingerprint, url, valid, extern, result, warnings, info, name, title,
             parent_url, base_ref, base_url, domain, content_type, size, modified,
             dltime, checktime, line, column_num, page, level, checked_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)"
    };

    let outcome = conn.execute(
        sql,
        rusqlite::params![
            fingerprint,
            result.url,
            valid_sentinel,
            result.extern_flag,
            result.result,
            warnings_json,
            info_json,
            result.name,
            result.title,
            result.parent_url,
            result.base_ref,
            result.base_url,
            result.domain,
            result.content_type,
            result.size,
            modified,
            result.dltime,
            result.checktime,
            result.line,
            result.column,
            result.page,
            result.level,
            result.checked_at.to_rfc3339(),
        ],
    );
    match outcome {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::UniqueConflict),
        Err(e) => Err(e.into()),
    }
}

pub(super) fn get_result(conn: &Connection, fingerprint: &str) -> Result<Option<CheckResult>> {
    let mut stmt = conn.prepare("SELECT * FROM check_results WHERE fingerprint = ?1")?;
    let mut rows = stmt.query(rusqlite::params![fingerprint])?;
    let row = match rows.next()? {
        Some(row) => row,
        None => return Ok(None),
    };
    let valid_sentinel: i64 = row.get("valid")?;
    if valid_sentinel == -1 {
        // Placeholder rows are never surfaced as a completed result.
        return Ok(None);
    }
    let warnings_raw: String = row.get("warnings")?;
    let info_raw: String = row.get("info")?;
    let modified_raw: Option<String> = row.get("modified")?;
    let checked_at_raw: String = row.get("checked_at")?;

    let warnings: Vec<(String, String)> = serde_json::from_str(&warnings_raw)
        .map_err(|e| StoreError::MalformedRow(format!("warnings: {e}")))?;

    Ok(Some(CheckResult {
        url: row.get("url")?,
        valid: Validity::Valid(valid_sentinel != 0),
        extern_flag: row.get("extern")?,
        result: row.get("result")?,
        warnings,
        info: serde_json::from_str(&info_raw)
            .map_err(|e| StoreError::MalformedRow(format!("info: {e}")))?,
        name: row.get("name")?,
        title: row.get("title")?,
        parent_url: row.get("parent_url")?,
        base_ref: row.get("base_ref")?,
        base_url: row.get("base_url")?,
        domain: row.get("domain")?,
        content_type: row.get("content_type")?,
        size: row.get("size")?,
        modified: modified_raw.as_deref().and_then(parse_timestamp),
        dltime: row.get("dltime")?,
        checktime: row.get("checktime")?,
        line: row.get("line")?,
        column: row.get("column_num")?,
        page: row.get("page")?,
        level: row.get("level")?,
        checked_at: parse_timestamp(&checked_at_raw).unwrap_or_else(Utc::now),
    }))
}
