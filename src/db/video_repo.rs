// Video repository - CRUD operations for videos and screenshots tables
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};

use super::{decode_time, encode_time};
use crate::models::{NewVideo, VideoRecord};

const COLUMNS: &str = r#"
    id, directory_id, file_path, file_name, directory,
    duration, resolution, size_mb, contact_sheet_path, is_favorite,
    file_mtime, created_at, updated_at
"#;

fn row_to_video(row: &Row<'_>) -> Result<VideoRecord> {
    let file_mtime: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(VideoRecord {
        id: row.get(0)?,
        directory_id: row.get(1)?,
        file_path: row.get(2)?,
        file_name: row.get(3)?,
        directory: row.get(4)?,
        duration: row.get(5)?,
        resolution: row.get(6)?,
        size_mb: row.get(7)?,
        contact_sheet_path: row.get(8)?,
        is_favorite: row.get::<_, i64>(9)? != 0,
        file_mtime: decode_time(10, &file_mtime)?,
        created_at: decode_time(11, &created_at)?,
        updated_at: decode_time(12, &updated_at)?,
        screenshots: Vec::new(),
    })
}

/// Attach screenshot paths, in sampling order, to loaded videos
fn with_screenshots(conn: &Connection, mut videos: Vec<VideoRecord>) -> Result<Vec<VideoRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT image_path FROM screenshots WHERE video_id = ?1 ORDER BY position",
    )?;
    for video in &mut videos {
        video.screenshots = stmt
            .query_map(params![video.id], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
    }
    Ok(videos)
}

/// Insert a video and its screenshots. Callers wrap this in a transaction so
/// the video never exists without its screenshots.
pub fn insert_video(conn: &Connection, video: &NewVideo) -> Result<i64> {
    let now = encode_time(&Utc::now());
    conn.execute(
        r#"
        INSERT INTO videos (
            directory_id, file_path, file_name, directory,
            duration, resolution, size_mb, contact_sheet_path,
            is_favorite, file_mtime, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10)
        "#,
        params![
            video.directory_id,
            video.file_path,
            video.file_name,
            video.directory,
            video.metadata.duration,
            video.metadata.resolution,
            video.metadata.size_mb,
            video.contact_sheet_path,
            encode_time(&video.file_mtime),
            now,
        ],
    )?;
    let video_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO screenshots (video_id, position, image_path) VALUES (?1, ?2, ?3)",
    )?;
    for (position, path) in video.screenshots.iter().enumerate() {
        stmt.execute(params![video_id, position as i64, path])?;
    }

    Ok(video_id)
}

/// Check whether a video is indexed under this exact path
pub fn video_exists(conn: &Connection, file_path: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM videos WHERE file_path = ?1")?;
    stmt.exists(params![file_path])
}

pub fn get_video(conn: &Connection, id: i64) -> Result<Option<VideoRecord>> {
    let video = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM videos WHERE id = ?1"),
            params![id],
            row_to_video,
        )
        .optional()?;

    match video {
        Some(video) => Ok(with_screenshots(conn, vec![video])?.pop()),
        None => Ok(None),
    }
}

/// All videos owned by a watched directory
pub fn get_videos_in_directory(conn: &Connection, directory_id: i64) -> Result<Vec<VideoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM videos WHERE directory_id = ?1 ORDER BY file_path"
    ))?;
    let videos = stmt
        .query_map(params![directory_id], row_to_video)?
        .collect::<Result<Vec<_>>>()?;
    with_screenshots(conn, videos)
}

/// All videos ordered by file name, optionally favorites only
pub fn get_all_videos(conn: &Connection, favorites_only: bool) -> Result<Vec<VideoRecord>> {
    let filter = if favorites_only { "WHERE is_favorite = 1" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM videos {filter} ORDER BY file_name, file_path"
    ))?;
    let videos = stmt
        .query_map([], row_to_video)?
        .collect::<Result<Vec<_>>>()?;
    with_screenshots(conn, videos)
}

/// Distinct parent directories of indexed videos
pub fn get_video_directories(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT directory FROM videos ORDER BY directory")?;
    let dirs = stmt.query_map([], |row| row.get(0))?;
    dirs.collect()
}

/// Delete a video; its screenshot rows cascade
pub fn delete_video(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
    Ok(())
}

/// Flip the favorite flag. Returns the new value, or None for an unknown id.
pub fn toggle_favorite(conn: &Connection, id: i64) -> Result<Option<bool>> {
    let updated = conn.execute(
        "UPDATE videos SET is_favorite = 1 - is_favorite, updated_at = ?2 WHERE id = ?1",
        params![id, encode_time(&Utc::now())],
    )?;
    if updated == 0 {
        return Ok(None);
    }

    conn.query_row(
        "SELECT is_favorite FROM videos WHERE id = ?1",
        params![id],
        |row| row.get::<_, i64>(0).map(|v| v != 0),
    )
    .optional()
}
