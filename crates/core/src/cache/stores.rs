//! Store-level operations: open, enumerate, delete, and cross-store lookup.

use super::connection::CacheDb;
use super::entries::{CacheHandle, RawEntry, ensure_store};
use crate::Error;
use crate::model::{Request, ResponseSnapshot};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl CacheDb {
    /// Open the store called `name`, creating it if absent.
    pub async fn open_store(&self, name: &str) -> Result<CacheHandle, Error> {
        let store = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_store(conn, &store) })
            .await
            .map_err(Error::from)?;
        Ok(CacheHandle { db: self.clone(), name: name.to_string() })
    }

    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and every entry in it.
    ///
    /// Returns whether the store existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all known stores, oldest first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY seq")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Look `request` up across every store.
    ///
    /// Stores are searched oldest first and the first hit wins.
    pub async fn match_request(&self, request: &Request) -> Result<Option<ResponseSnapshot>, Error> {
        let key = request.key()?;
        self.conn
            .call(move |conn| -> Result<Option<ResponseSnapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.response_url, e.status, e.headers_json, e.body
                     FROM cache_entries e JOIN cache_stores s ON s.name = e.store
                     WHERE e.method = ?1 AND e.url = ?2
                     ORDER BY s.seq LIMIT 1",
                )?;
                match stmt.query_row(params![key.method, key.url], RawEntry::from_row) {
                    Ok(raw) => raw.into_snapshot().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Look `request` up in the named store only.
    ///
    /// Unlike [`CacheDb::open_store`] this never creates the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotFound`] if no store called `name` exists.
    pub async fn match_in(&self, name: &str, request: &Request) -> Result<Option<ResponseSnapshot>, Error> {
        if !self.has_store(name).await? {
            return Err(Error::StoreNotFound(name.to_string()));
        }
        CacheHandle { db: self.clone(), name: name.to_string() }
            .match_request(request)
            .await
    }

    /// Delete every store whose name is not in `retain`.
    ///
    /// Returns the deleted names.
    pub async fn retain_stores(&self, retain: &[&str]) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.keys().await? {
            if retain.contains(&name.as_str()) {
                continue;
            }
            if self.delete_store(&name).await? {
                tracing::info!(store = %name, "deleted stale cache store");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}
