use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite-backed ingest bookkeeping: payload dedupe and per-series fetch cadence.
pub struct IngestMeta {
    conn: Connection,
}

impl IngestMeta {
    pub fn open_at_root<P: AsRef<Path>>(raw_root: P) -> anyhow::Result<Self> {
        let db_path = raw_root.as_ref().join("ingest_log").join("meta.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS dedupe_index (
                idempotency_key TEXT PRIMARY KEY,
                envelope_id     TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS fetch_cadence (
                series_id        TEXT PRIMARY KEY,
                last_fetched_at  INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn get_envelope_by_idk(&self, idk: &str) -> anyhow::Result<Option<String>> {
        let eid = self
            .conn
            .query_row(
                "SELECT envelope_id FROM dedupe_index WHERE idempotency_key = ?1",
                params![idk],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(eid)
    }

    pub fn put_dedupe_mapping(&self, idk: &str, envelope_id: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO dedupe_index (idempotency_key, envelope_id) VALUES (?1, ?2)",
            params![idk, envelope_id],
        )?;
        Ok(())
    }

    pub fn get_last_fetched_at(&self, series_id: &str) -> anyhow::Result<Option<i64>> {
        let ts = self
            .conn
            .query_row(
                "SELECT last_fetched_at FROM fetch_cadence WHERE series_id = ?1",
                params![series_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(ts)
    }

    pub fn set_last_fetched_at(&self, series_id: &str, ts: i64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO fetch_cadence (series_id, last_fetched_at) VALUES (?1, ?2)
             ON CONFLICT(series_id) DO UPDATE SET last_fetched_at=excluded.last_fetched_at",
            params![series_id, ts],
        )?;
        Ok(())
    }

    /// True when the series may be fetched at `now` (unix seconds)
    pub fn cadence_allows(
        &self,
        series_id: &str,
        now: i64,
        min_interval_secs: i64,
    ) -> anyhow::Result<bool> {
        match self.get_last_fetched_at(series_id)? {
            Some(last) => Ok(now - last >= min_interval_secs),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_blocks_recent_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let meta = IngestMeta::open_at_root(dir.path()).unwrap();
        assert!(meta.cadence_allows("PET.RWTC.D", 1_000, 600).unwrap());
        meta.set_last_fetched_at("PET.RWTC.D", 1_000).unwrap();
        assert!(!meta.cadence_allows("PET.RWTC.D", 1_300, 600).unwrap());
        assert!(meta.cadence_allows("PET.RWTC.D", 1_600, 600).unwrap());
        // other series unaffected
        assert!(meta.cadence_allows("PET.WCESTUS1.W", 1_300, 600).unwrap());
    }

    #[test]
    fn dedupe_mapping_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let meta = IngestMeta::open_at_root(dir.path()).unwrap();
        assert_eq!(meta.get_envelope_by_idk("k").unwrap(), None);
        meta.put_dedupe_mapping("k", "e1").unwrap();
        assert_eq!(meta.get_envelope_by_idk("k").unwrap().as_deref(), Some("e1"));
    }
}
