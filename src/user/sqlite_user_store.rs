use super::auth::{
    AuthToken, AuthTokenValue, CredentialsHasher, UserAuthCredentials,
    UsernamePasswordCredentials,
};
use super::user_store::{UserAuthCredentialsStore, UserAuthTokenStore, UserStore};
use crate::catalog::{AuthorDirectory, AuthorId, AuthorRecord};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};
use tracing::{info, warn};

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
};
const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_value", "value")],
};
const USER_PASSWORD_CREDENTIALS_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_tried", &SqlType::Integer),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[],
};

/// V 1
/// User ids are authors of catalog images, a deleted id must never be handed
/// out again.
const USER_TABLE_V_1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            USER_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            USER_TABLE_V_1,
            AUTH_TOKEN_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_V_0,
        ],
        migration: Some(|conn: &Connection| USER_TABLE_V_1.rebuild(conn)),
    },
];

const NOW_SECONDS: &str = "cast(strftime('%s','now') as int)";

fn system_time_from_column_result(value: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(value.max(0) as u64)
}

fn auth_token_from_row(row: &Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        user_id: row.get::<usize, i64>(0)? as usize,
        value: AuthTokenValue(row.get(1)?),
        created: system_time_from_column_result(row.get(2)?),
        last_used: row
            .get::<usize, Option<i64>>(3)?
            .map(system_time_from_column_result),
    })
}

fn author_from_row(row: &Row) -> rusqlite::Result<AuthorRecord> {
    Ok(AuthorRecord {
        id: row.get::<usize, i64>(0)? as usize,
        username: row.get(1)?,
    })
}

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_db(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, user_handle: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO {} (handle) VALUES (?1)", USER_TABLE_V_1.name),
            params![user_handle],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        let user_id = conn.last_insert_rowid() as usize;
        info!("Created user {} with id {}", user_handle, user_id);
        Ok(user_id)
    }

    fn delete_user(&self, user_id: usize) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", USER_TABLE_V_1.name),
            params![user_id as i64],
        )?;
        Ok(deleted > 0)
    }

    fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let handle = conn
            .query_row(
                &format!("SELECT handle FROM {} WHERE id = ?1", USER_TABLE_V_1.name),
                params![user_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(handle)
    }

    fn get_all_user_handles(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT handle FROM {} ORDER BY id",
            USER_TABLE_V_1.name
        ))?;
        let handles = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(handles)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE handle = ?1", USER_TABLE_V_1.name),
                params![user_handle],
                |row| row.get::<usize, i64>(0),
            )
            .optional()?;
        Ok(id.map(|id| id as usize))
    }
}

impl AuthorDirectory for SqliteUserStore {
    fn get_authors(&self, ids: &[AuthorId]) -> Result<Vec<AuthorRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, handle FROM {} WHERE id IN ({})",
            USER_TABLE_V_1.name, placeholders
        ))?;
        let authors = stmt
            .query_map(params_from_iter(ids.iter().map(|id| *id as i64)), author_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(authors)
    }

    fn get_author(&self, id: AuthorId) -> Result<Option<AuthorRecord>> {
        let conn = self.conn.lock().unwrap();
        let author = conn
            .query_row(
                &format!("SELECT id, handle FROM {} WHERE id = ?1", USER_TABLE_V_1.name),
                params![id as i64],
                author_from_row,
            )
            .optional()?;
        Ok(author)
    }

    fn find_author_by_username(&self, username: &str) -> Result<Option<AuthorRecord>> {
        let conn = self.conn.lock().unwrap();
        let author = conn
            .query_row(
                &format!(
                    "SELECT id, handle FROM {} WHERE handle = ?1",
                    USER_TABLE_V_1.name
                ),
                params![username],
                author_from_row,
            )
            .optional()?;
        Ok(author)
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn get_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let token = conn
            .query_row(
                &format!(
                    "SELECT user_id, value, created, last_used FROM {} WHERE value = ?1",
                    AUTH_TOKEN_TABLE_V_0.name
                ),
                params![value.0],
                auth_token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let token = match self.get_user_auth_token(token)? {
            Some(token) => token,
            None => return Ok(None),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE value = ?1", AUTH_TOKEN_TABLE_V_0.name),
            params![token.value.0],
        )?;
        Ok(Some(token))
    }

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE {} SET last_used = {} WHERE value = ?1",
                AUTH_TOKEN_TABLE_V_0.name, NOW_SECONDS
            ),
            params![token.0],
        )?;
        Ok(())
    }

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (value, user_id) VALUES (?1, ?2)",
                AUTH_TOKEN_TABLE_V_0.name
            ),
            params![token.value.0, token.user_id as i64],
        )?;
        Ok(())
    }

    fn get_all_user_auth_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, value, created, last_used FROM {} WHERE user_id = (SELECT id FROM {} WHERE handle = ?1)",
            AUTH_TOKEN_TABLE_V_0.name, USER_TABLE_V_1.name
        ))?;
        let tokens = stmt
            .query_map(params![user_handle], auth_token_from_row)?
            .collect::<Result<Vec<AuthToken>, _>>()?;
        Ok(tokens)
    }
}

impl UserAuthCredentialsStore for SqliteUserStore {
    fn get_user_auth_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        let user_id = match self.get_user_id(user_handle)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!(
                    "SELECT salt, hash, hasher, created, last_tried, last_used FROM {} WHERE user_id = ?1",
                    USER_PASSWORD_CREDENTIALS_V_0.name
                ),
                params![user_id as i64],
                |row| {
                    Ok((
                        row.get::<usize, String>(0)?,
                        row.get::<usize, String>(1)?,
                        row.get::<usize, String>(2)?,
                        row.get::<usize, i64>(3)?,
                        row.get::<usize, Option<i64>>(4)?,
                        row.get::<usize, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let username_password = match row {
            Some((salt, hash, hasher, created, last_tried, last_used)) => {
                let hasher = match CredentialsHasher::from_str(&hasher) {
                    Ok(hasher) => hasher,
                    Err(err) => {
                        warn!("Ignoring credentials of user {}: {}", user_handle, err);
                        return Ok(Some(UserAuthCredentials {
                            user_id,
                            username_password: None,
                        }));
                    }
                };
                Some(UsernamePasswordCredentials {
                    user_id,
                    salt,
                    hash,
                    hasher,
                    created: system_time_from_column_result(created),
                    last_tried: last_tried.map(system_time_from_column_result),
                    last_used: last_used.map(system_time_from_column_result),
                })
            }
            None => None,
        };

        Ok(Some(UserAuthCredentials {
            user_id,
            username_password,
        }))
    }

    fn update_user_auth_credentials(&self, credentials: UserAuthCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let user_id = credentials.user_id as i64;
        match credentials.username_password.as_ref() {
            Some(password_credentials) => {
                let updated = conn.execute(
                    &format!(
                        "UPDATE {} SET salt = ?1, hash = ?2, hasher = ?3 WHERE user_id = ?4",
                        USER_PASSWORD_CREDENTIALS_V_0.name
                    ),
                    params![
                        password_credentials.salt,
                        password_credentials.hash,
                        password_credentials.hasher.to_string(),
                        user_id
                    ],
                )?;
                if updated == 0 {
                    conn.execute(
                        &format!(
                            "INSERT INTO {} (salt, hash, hasher, user_id) VALUES (?1, ?2, ?3, ?4)",
                            USER_PASSWORD_CREDENTIALS_V_0.name
                        ),
                        params![
                            password_credentials.salt,
                            password_credentials.hash,
                            password_credentials.hasher.to_string(),
                            user_id
                        ],
                    )?;
                }
            }
            None => {
                conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE user_id = ?1",
                        USER_PASSWORD_CREDENTIALS_V_0.name
                    ),
                    params![user_id],
                )?;
            }
        };
        Ok(())
    }

    fn mark_password_tried(&self, user_id: usize, succeeded: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let query = if succeeded {
            format!(
                "UPDATE {} SET last_tried = {now}, last_used = {now} WHERE user_id = ?1",
                USER_PASSWORD_CREDENTIALS_V_0.name,
                now = NOW_SECONDS
            )
        } else {
            format!(
                "UPDATE {} SET last_tried = {} WHERE user_id = ?1",
                USER_PASSWORD_CREDENTIALS_V_0.name, NOW_SECONDS
            )
        };
        conn.execute(&query, params![user_id as i64])?;
        Ok(())
    }
}
