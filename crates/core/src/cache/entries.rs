//! Entry operations on a single named store.
//!
//! A [`CacheHandle`] is what `open` hands back: a store name bound to the
//! database. Every write runs in its own transaction, so an entry is either
//! fully present or absent.

use super::connection::CacheDb;
use crate::Error;
use crate::model::{Request, RequestKey, ResponseSnapshot};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Handle to one named cache store.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    pub(crate) db: CacheDb,
    pub(crate) name: String,
}

/// Listing row for a stored entry (no body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub store: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub size: u64,
    pub stored_at: String,
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `response` under the identity of `request`, replacing any
    /// existing entry.
    ///
    /// Recreates the store if it was deleted after this handle was opened.
    pub async fn put(&self, request: &Request, response: &ResponseSnapshot) -> Result<(), Error> {
        let key = request.key()?;
        let store = self.name.clone();
        let response = response.clone();
        let quota = self.db.quota_bytes;
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &store)?;
                insert_entry(&tx, &store, &key, &response, quota)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(store = %self.name, url = %request.url, "cached response");
        Ok(())
    }

    /// Store a batch of entries all-or-nothing.
    ///
    /// If any entry is rejected (bad method, quota) none of the batch is kept.
    pub async fn put_all(&self, entries: Vec<(Request, ResponseSnapshot)>) -> Result<(), Error> {
        let keyed = entries
            .into_iter()
            .map(|(req, resp)| req.key().map(|key| (key, resp)))
            .collect::<Result<Vec<_>, Error>>()?;
        let count = keyed.len();
        let store = self.name.clone();
        let quota = self.db.quota_bytes;
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &store)?;
                for (key, response) in &keyed {
                    insert_entry(&tx, &store, key, response, quota)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(store = %self.name, count, "cached batch");
        Ok(())
    }

    /// Look up `request` in this store only.
    pub async fn match_request(&self, request: &Request) -> Result<Option<ResponseSnapshot>, Error> {
        let key = request.key()?;
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Option<ResponseSnapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT response_url, status, headers_json, body FROM cache_entries
                     WHERE store = ?1 AND method = ?2 AND url = ?3",
                )?;
                let row = stmt.query_row(params![store, key.method, key.url], RawEntry::from_row);
                match row {
                    Ok(raw) => raw.into_snapshot().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry for `request`. Returns whether one existed.
    pub async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let key = request.key()?;
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE store = ?1 AND method = ?2 AND url = ?3",
                    params![store, key.method, key.url],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Request identities held by this store, in URL order.
    pub async fn keys(&self) -> Result<Vec<RequestKey>, Error> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|e| RequestKey { method: e.method, url: e.url })
            .collect())
    }

    /// Summaries of every entry in this store, in URL order.
    pub async fn entries(&self) -> Result<Vec<EntrySummary>, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<EntrySummary>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT store, method, url, status, LENGTH(body), stored_at FROM cache_entries
                     WHERE store = ?1 ORDER BY url",
                )?;
                let rows = stmt
                    .query_map(params![store], |row| {
                        Ok(EntrySummary {
                            store: row.get(0)?,
                            method: row.get(1)?,
                            url: row.get(2)?,
                            status: row.get(3)?,
                            size: row.get::<_, i64>(4)? as u64,
                            stored_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }
}

/// Row as read from `cache_entries`, before header decoding.
pub(crate) struct RawEntry {
    response_url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl RawEntry {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self { response_url: row.get(0)?, status: row.get(1)?, headers_json: row.get(2)?, body: row.get(3)? })
    }

    pub(crate) fn into_snapshot(self) -> Result<ResponseSnapshot, Error> {
        let headers: Vec<(String, String)> =
            serde_json::from_str(&self.headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        Ok(ResponseSnapshot { url: self.response_url, status: self.status, headers, body: Bytes::from(self.body) })
    }
}

pub(crate) fn ensure_store(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn insert_entry(
    conn: &rusqlite::Connection, store: &str, key: &RequestKey, response: &ResponseSnapshot, quota: Option<u64>,
) -> Result<(), Error> {
    if let Some(quota) = quota {
        let others: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(body)), 0) FROM cache_entries
             WHERE NOT (store = ?1 AND method = ?2 AND url = ?3)",
            params![store, key.method, key.url],
            |row| row.get(0),
        )?;
        let needed = others as u64 + response.body.len() as u64;
        if needed > quota {
            return Err(Error::QuotaExceeded { needed, quota });
        }
    }

    let headers_json = serde_json::to_string(&response.headers).map_err(|e| Error::InvalidInput(e.to_string()))?;
    conn.execute(
        "INSERT INTO cache_entries (store, method, url, response_url, status, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(store, method, url) DO UPDATE SET
             response_url = excluded.response_url,
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             stored_at = excluded.stored_at",
        params![
            store,
            key.method,
            key.url,
            response.url,
            response.status,
            headers_json,
            response.body.as_ref(),
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}
