// Watched directory repository - CRUD operations for watched_directories table
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::path::{Path, PathBuf};

use super::{decode_time, encode_time};
use crate::models::WatchedDirectory;

const COLUMNS: &str = "id, directory_path, last_scanned, is_active, created_at";

fn row_to_directory(row: &Row<'_>) -> Result<WatchedDirectory> {
    let path: String = row.get(1)?;
    let last_scanned: Option<String> = row.get(2)?;
    let created_at: String = row.get(4)?;

    Ok(WatchedDirectory {
        id: row.get(0)?,
        directory_path: PathBuf::from(path),
        last_scanned: last_scanned.map(|s| decode_time(2, &s)).transpose()?,
        is_active: row.get::<_, i64>(3)? != 0,
        created_at: decode_time(4, &created_at)?,
    })
}

/// Register a directory
pub fn insert_directory(conn: &Connection, path: &Path) -> Result<WatchedDirectory> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO watched_directories (directory_path, is_active, created_at) VALUES (?1, 1, ?2)",
        params![path.display().to_string(), encode_time(&now)],
    )?;

    Ok(WatchedDirectory {
        id: conn.last_insert_rowid(),
        directory_path: path.to_path_buf(),
        last_scanned: None,
        is_active: true,
        created_at: now,
    })
}

pub fn get_directory(conn: &Connection, id: i64) -> Result<Option<WatchedDirectory>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM watched_directories WHERE id = ?1"),
        params![id],
        row_to_directory,
    )
    .optional()
}

pub fn get_directory_by_path(conn: &Connection, path: &Path) -> Result<Option<WatchedDirectory>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM watched_directories WHERE directory_path = ?1"),
        params![path.display().to_string()],
        row_to_directory,
    )
    .optional()
}

/// All watched directories, ordered by path
pub fn get_all_directories(conn: &Connection) -> Result<Vec<WatchedDirectory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM watched_directories ORDER BY directory_path"
    ))?;
    let dirs = stmt.query_map([], row_to_directory)?;
    dirs.collect()
}

/// Record a completed scan
pub fn mark_scanned(conn: &Connection, id: i64, at: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE watched_directories SET last_scanned = ?2, is_active = 1 WHERE id = ?1",
        params![id, encode_time(at)],
    )?;
    Ok(())
}

pub fn set_directory_active(conn: &Connection, id: i64, active: bool) -> Result<()> {
    conn.execute(
        "UPDATE watched_directories SET is_active = ?2 WHERE id = ?1",
        params![id, active as i64],
    )?;
    Ok(())
}

/// Delete a directory row. Its videos must already be gone.
pub fn delete_directory(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM watched_directories WHERE id = ?1", params![id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn insert_and_lookup_directory() {
        let db = Database::open_in_memory().unwrap();
        let dir = insert_directory(db.conn(), Path::new("/data/videos")).unwrap();

        assert!(dir.is_active);
        assert!(dir.last_scanned.is_none());
        assert_eq!(get_directory(db.conn(), dir.id).unwrap(), Some(dir.clone()));
        assert_eq!(
            get_directory_by_path(db.conn(), Path::new("/data/videos")).unwrap(),
            Some(dir)
        );
        assert!(get_directory_by_path(db.conn(), Path::new("/data/video")).unwrap().is_none());
    }

    #[test]
    fn directory_paths_are_unique() {
        let db = Database::open_in_memory().unwrap();
        insert_directory(db.conn(), Path::new("/data/a")).unwrap();
        assert!(insert_directory(db.conn(), Path::new("/data/a")).is_err());
    }

    #[test]
    fn scan_and_activity_flags_are_persisted() {
        let db = Database::open_in_memory().unwrap();
        let dir = insert_directory(db.conn(), Path::new("/data/a")).unwrap();

        set_directory_active(db.conn(), dir.id, false).unwrap();
        assert!(!get_directory(db.conn(), dir.id).unwrap().unwrap().is_active);

        let at = Utc::now();
        mark_scanned(db.conn(), dir.id, &at).unwrap();
        let reloaded = get_directory(db.conn(), dir.id).unwrap().unwrap();
        assert!(reloaded.is_active);
        assert_eq!(reloaded.last_scanned, Some(at));
    }

    #[test]
    fn list_and_delete_directories() {
        let db = Database::open_in_memory().unwrap();
        let b = insert_directory(db.conn(), Path::new("/data/b")).unwrap();
        insert_directory(db.conn(), Path::new("/data/a")).unwrap();

        let paths: Vec<PathBuf> = get_all_directories(db.conn())
            .unwrap()
            .into_iter()
            .map(|d| d.directory_path)
            .collect();
        assert_eq!(paths, vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")]);

        delete_directory(db.conn(), b.id).unwrap();
        assert_eq!(get_all_directories(db.conn()).unwrap().len(), 1);
    }
}
