use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use uuid::Uuid;

use super::detections::{
    detections_for_recording, insert_detections, matching_detections_for_recording,
};
use crate::db::{
    connection::Database,
    helpers::{escape_like, parse_datetime, to_i64, to_u64},
    models::{NewRecording, Recording},
};

const RECORDING_COLUMNS: &str =
    "id, filename, path, size_bytes, created_at, duration_secs, notes";

fn row_to_recording(row: &Row) -> Result<Recording> {
    let created_at: String = row.get("created_at")?;
    let size_bytes: i64 = row.get("size_bytes")?;

    Ok(Recording {
        id: row.get("id")?,
        filename: row.get("filename")?,
        path: row.get("path")?,
        size_bytes: to_u64(size_bytes, "size_bytes")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        duration_secs: row.get("duration_secs")?,
        notes: row.get("notes")?,
        detections: Vec::new(),
    })
}

fn query_recordings(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<Recording>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut recordings = Vec::new();
    while let Some(row) = rows.next()? {
        recordings.push(row_to_recording(row)?);
    }
    Ok(recordings)
}

impl Database {
    /// Insert a recording and its detections in one transaction.
    pub async fn insert_recording(&self, recording: NewRecording) -> Result<Recording> {
        self.execute(move |conn| {
            let id = Uuid::new_v4().to_string();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO recordings (id, filename, path, size_bytes, created_at, duration_secs, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    recording.filename,
                    recording.path,
                    to_i64(recording.size_bytes)?,
                    recording.created_at.to_rfc3339(),
                    recording.duration_secs,
                    recording.notes,
                ],
            )?;
            insert_detections(&tx, &id, &recording.detections)?;
            tx.commit()?;

            Ok(Recording {
                id,
                filename: recording.filename,
                path: recording.path,
                size_bytes: recording.size_bytes,
                created_at: recording.created_at,
                duration_secs: recording.duration_secs,
                notes: recording.notes,
                detections: recording.detections,
            })
        })
        .await
    }

    /// All recordings, newest first, each with its full detection timeline.
    pub async fn list_recordings(&self) -> Result<Vec<Recording>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {RECORDING_COLUMNS} FROM recordings ORDER BY created_at DESC, filename DESC"
            );
            let mut recordings = query_recordings(conn, &sql, &[])?;
            for recording in &mut recordings {
                recording.detections = detections_for_recording(conn, &recording.id)?;
            }
            Ok(recordings)
        })
        .await
    }

    pub async fn get_recording_by_filename(&self, filename: &str) -> Result<Option<Recording>> {
        let filename = filename.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {RECORDING_COLUMNS} FROM recordings WHERE filename = ?1");
            let recording = conn
                .query_row(&sql, params![filename], |row| {
                    Ok(row_to_recording(row))
                })
                .optional()?
                .transpose()?;

            match recording {
                Some(mut recording) => {
                    recording.detections = detections_for_recording(conn, &recording.id)?;
                    Ok(Some(recording))
                }
                None => Ok(None),
            }
        })
        .await
    }

    /// Recordings having at least one detection whose text contains `query`.
    /// Each result carries only the matching detections.
    pub async fn search_recordings_by_qr(&self, query: &str) -> Result<Vec<Recording>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", escape_like(query));
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {RECORDING_COLUMNS} FROM recordings
                 WHERE id IN (
                     SELECT recording_id FROM qr_detections WHERE qr_text LIKE ?1 ESCAPE '\\'
                 )
                 ORDER BY created_at DESC, filename DESC"
            );
            let mut recordings = query_recordings(conn, &sql, &[&pattern as &dyn ToSql])?;
            for recording in &mut recordings {
                recording.detections =
                    matching_detections_for_recording(conn, &recording.id, &pattern)?;
            }
            Ok(recordings)
        })
        .await
    }

    /// Returns whether a row was removed. Detections cascade.
    pub async fn delete_recording_by_filename(&self, filename: &str) -> Result<bool> {
        let filename = filename.to_string();
        self.execute(move |conn| {
            let removed = conn.execute(
                "DELETE FROM recordings WHERE filename = ?1",
                params![filename],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    pub async fn update_recording_notes(&self, filename: &str, notes: Option<String>) -> Result<bool> {
        let filename = filename.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE recordings SET notes = ?1 WHERE filename = ?2",
                params![notes, filename],
            )?;
            Ok(updated > 0)
        })
        .await
    }
}
