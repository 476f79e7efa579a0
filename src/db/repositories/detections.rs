use anyhow::Result;
use rusqlite::{params, Connection, Row, Transaction};

use crate::models::{BoundingBox, DetectionEvent};

fn row_to_detection(row: &Row) -> Result<DetectionEvent> {
    Ok(DetectionEvent {
        text: row.get("qr_text")?,
        time: row.get("timestamp")?,
        bounding_box: BoundingBox {
            x: row.get("bbox_x")?,
            y: row.get("bbox_y")?,
            width: row.get("bbox_w")?,
            height: row.get("bbox_h")?,
        },
    })
}

pub(crate) fn insert_detections(
    tx: &Transaction<'_>,
    recording_id: &str,
    detections: &[DetectionEvent],
) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO qr_detections (recording_id, seq, qr_text, timestamp, bbox_x, bbox_y, bbox_w, bbox_h)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for (seq, detection) in detections.iter().enumerate() {
        let bbox = &detection.bounding_box;
        stmt.execute(params![
            recording_id,
            seq as i64,
            detection.text,
            detection.time,
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
        ])?;
    }

    Ok(())
}

pub(crate) fn detections_for_recording(
    conn: &Connection,
    recording_id: &str,
) -> Result<Vec<DetectionEvent>> {
    let mut stmt = conn.prepare(
        "SELECT qr_text, timestamp, bbox_x, bbox_y, bbox_w, bbox_h
         FROM qr_detections
         WHERE recording_id = ?1
         ORDER BY seq ASC",
    )?;
    let mut rows = stmt.query(params![recording_id])?;
    let mut detections = Vec::new();
    while let Some(row) = rows.next()? {
        detections.push(row_to_detection(row)?);
    }
    Ok(detections)
}

/// Detections of one recording whose text contains `pattern` (already
/// LIKE-escaped).
pub(crate) fn matching_detections_for_recording(
    conn: &Connection,
    recording_id: &str,
    pattern: &str,
) -> Result<Vec<DetectionEvent>> {
    let mut stmt = conn.prepare(
        "SELECT qr_text, timestamp, bbox_x, bbox_y, bbox_w, bbox_h
         FROM qr_detections
         WHERE recording_id = ?1 AND qr_text LIKE ?2 ESCAPE '\\'
         ORDER BY seq ASC",
    )?;
    let mut rows = stmt.query(params![recording_id, pattern])?;
    let mut detections = Vec::new();
    while let Some(row) = rows.next()? {
        detections.push(row_to_detection(row)?);
    }
    Ok(detections)
}
