use super::models::{
    system_time_from_millis, system_time_to_millis, ImageId, ImageRecord,
};
use super::store::ImageStore;
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_db, Column, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use rusqlite::{functions::FunctionFlags, params, types::Type, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::debug;

/// V 0
const IMAGE_TABLE_V_0: Table = Table {
    name: "image",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("src", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        // Authors live in user.db, no foreign key possible.
        sqlite_column!("author_id", &SqlType::Integer, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("updated", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_image_author_id", "author_id")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[IMAGE_TABLE_V_0],
    migration: None,
}];

const IMAGE_COLUMNS: &str = "id, src, name, author_id, created, updated";

/// SQLite's own `lower()` and `LIKE` only fold ASCII letters.
const UNICODE_LOWER_FN: &str = "unicode_lower";

fn register_unicode_lower(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        UNICODE_LOWER_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
    )
    .context("Failed to register unicode_lower function")?;
    Ok(())
}

/// Lowercases the filter and escapes the LIKE wildcards so it matches as a
/// plain substring of the lowercased name.
fn like_pattern(filter: &str) -> String {
    let mut pattern = String::with_capacity(filter.len() + 2);
    pattern.push('%');
    for c in filter.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn image_from_row(row: &Row) -> rusqlite::Result<ImageRecord> {
    let raw_id: String = row.get(0)?;
    let id = raw_id
        .parse::<ImageId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let author_id: i64 = row.get(3)?;
    Ok(ImageRecord {
        id,
        src: row.get(1)?,
        name: row.get(2)?,
        author_id: author_id as usize,
        created_at: system_time_from_millis(row.get(4)?),
        updated_at: system_time_from_millis(row.get(5)?),
    })
}

#[derive(Clone)]
pub struct SqliteImageStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImageStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_db(db_path, VERSIONED_SCHEMAS)?;
        register_unicode_lower(&conn)?;
        Ok(SqliteImageStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl ImageStore for SqliteImageStore {
    fn find_images(&self, name_filter: Option<&str>) -> Result<Vec<ImageRecord>> {
        let conn = self.conn.lock().unwrap();
        let images = match name_filter {
            Some(filter) => {
                debug!("Searching images with name containing {:?}", filter);
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} WHERE {}(name) LIKE ?1 ESCAPE '\\' ORDER BY rowid",
                    IMAGE_COLUMNS, IMAGE_TABLE_V_0.name, UNICODE_LOWER_FN
                ))?;
                let images = stmt
                    .query_map(params![like_pattern(filter)], image_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                images
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} ORDER BY rowid",
                    IMAGE_COLUMNS, IMAGE_TABLE_V_0.name
                ))?;
                let images = stmt
                    .query_map([], image_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                images
            }
        };
        Ok(images)
    }

    fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE id = ?1",
            IMAGE_COLUMNS, IMAGE_TABLE_V_0.name
        ))?;
        let mut rows = stmt.query_map(params![id.to_string()], image_from_row)?;
        match rows.next() {
            Some(image) => Ok(Some(image?)),
            None => Ok(None),
        }
    }

    fn update_image_name(
        &self,
        id: &ImageId,
        name: &str,
        updated_at: SystemTime,
    ) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let matched = conn
            .execute(
                &format!(
                    "UPDATE {} SET name = ?1, updated = ?2 WHERE id = ?3",
                    IMAGE_TABLE_V_0.name
                ),
                params![name, system_time_to_millis(updated_at), id.to_string()],
            )
            .with_context(|| format!("Failed to rename image {}", id))?;
        Ok(matched)
    }

    fn insert_image(&self, image: &ImageRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                IMAGE_TABLE_V_0.name, IMAGE_COLUMNS
            ),
            params![
                image.id.to_string(),
                image.src,
                image.name,
                image.author_id as i64,
                system_time_to_millis(image.created_at),
                system_time_to_millis(image.updated_at),
            ],
        )
        .with_context(|| format!("Failed to insert image {}", image.id))?;
        Ok(())
    }

    fn get_images_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", IMAGE_TABLE_V_0.name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn image(name: &str, author_id: usize) -> ImageRecord {
        let now = system_time_from_millis(system_time_to_millis(SystemTime::now()));
        ImageRecord {
            id: ImageId::generate(),
            src: format!("/uploads/{}.png", name),
            name: name.to_owned(),
            author_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_store() -> (TempDir, SqliteImageStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteImageStore::new(dir.path().join("catalog.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn persists_images_across_reopen() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("catalog.db");
        let first = image("Sunset", 1);
        {
            let store = SqliteImageStore::new(&db_path).unwrap();
            store.insert_image(&first).unwrap();
        }

        let store = SqliteImageStore::new(&db_path).unwrap();
        assert_eq!(store.get_images_count().unwrap(), 1);
        assert_eq!(store.get_image(&first.id).unwrap(), Some(first));
    }

    #[test]
    fn finds_images_in_insertion_order() {
        let (_dir, store) = new_store();
        let names = ["Zebra", "Apple", "Mango"];
        for name in names {
            store.insert_image(&image(name, 1)).unwrap();
        }

        let found: Vec<String> = store
            .find_images(None)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(found, names);
    }

    #[test]
    fn filters_by_case_insensitive_substring() {
        let (_dir, store) = new_store();
        store.insert_image(&image("Sunset", 1)).unwrap();
        store.insert_image(&image("SUNRISE", 2)).unwrap();
        store.insert_image(&image("Forest", 1)).unwrap();

        let found: Vec<String> = store
            .find_images(Some("sun"))
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(found, vec!["Sunset", "SUNRISE"]);

        assert!(store.find_images(Some("ocean")).unwrap().is_empty());
        assert_eq!(store.find_images(Some("")).unwrap().len(), 3);
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let (_dir, store) = new_store();
        store.insert_image(&image("Été à Paris", 1)).unwrap();
        store.insert_image(&image("ΣΟΦΙΑ", 1)).unwrap();
        store.insert_image(&image("Summer in Rome", 1)).unwrap();

        for filter in ["été", "ÉTÉ", "À pAris"] {
            let found = store.find_images(Some(filter)).unwrap();
            assert_eq!(found.len(), 1, "filter {:?}", filter);
            assert_eq!(found[0].name, "Été à Paris");
        }

        let found = store.find_images(Some("σοφ")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ΣΟΦΙΑ");
    }

    #[test]
    fn wildcards_are_matched_literally() {
        let (_dir, store) = new_store();
        store.insert_image(&image("100% real", 1)).unwrap();
        store.insert_image(&image("1000 real", 1)).unwrap();
        store.insert_image(&image("snake_case", 1)).unwrap();
        store.insert_image(&image("snakeXcase", 1)).unwrap();

        let found = store.find_images(Some("0%")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "100% real");

        let found = store.find_images(Some("e_c")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "snake_case");
    }

    #[test]
    fn renames_and_refreshes_update_time() {
        let (_dir, store) = new_store();
        let original = image("Old", 3);
        store.insert_image(&original).unwrap();

        let later = original.updated_at + Duration::from_secs(60);
        let matched = store.update_image_name(&original.id, "New", later).unwrap();
        assert_eq!(matched, 1);

        let renamed = store.get_image(&original.id).unwrap().unwrap();
        assert_eq!(renamed.name, "New");
        assert_eq!(renamed.updated_at, later);
        assert_eq!(renamed.created_at, original.created_at);
        assert_eq!(renamed.author_id, 3);
        assert_eq!(renamed.src, original.src);
    }

    #[test]
    fn rename_of_missing_image_matches_nothing() {
        let (_dir, store) = new_store();
        let matched = store
            .update_image_name(&ImageId::generate(), "New", SystemTime::now())
            .unwrap();
        assert_eq!(matched, 0);
        assert_eq!(store.get_image(&ImageId::generate()).unwrap(), None);
    }
}
