// Copyright (c) 2025-present
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Component E — the write-ahead operation log, backed by the embedded
//! relational store the directory opens for us (spec.md §6,
//! `control.db`). Every accepted [`Op`] is durably appended here,
//! assigned a monotonically increasing [`OpId`], before it is applied
//! to the in-memory builder segment — the log is the source of truth
//! replayed on crash recovery.

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::file::CONTROL_DB_FILE;
use crate::ids::OpId;
use crate::op::{Op, OpLogEntry};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

pub struct OpLog {
    conn: Mutex<Connection>,
}

impl OpLog {
    /// Opens (creating if necessary) the oplog tables inside `dir`'s
    /// embedded database.
    pub fn open(dir: &dyn Directory) -> Result<Self> {
        let conn = dir.open_database(CONTROL_DB_FILE)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS oplog (
                op_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                op_time INTEGER NOT NULL,
                op_data BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS replication_slots (
                name        TEXT PRIMARY KEY,
                last_op_id  INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Appends `ops` as one batch, each getting the next `OpId` in
    /// sequence. Returns the id assigned to the last op in the batch.
    pub fn write(&self, ops: &[Op], op_time: i64) -> Result<OpId> {
        if ops.is_empty() {
            return Ok(self.get_last_op_id()?);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut last_id = OpId::ZERO;
        {
            let mut stmt =
                tx.prepare("INSERT INTO oplog (op_time, op_data) VALUES (?1, ?2)")?;
            for op in ops {
                let bytes = serde_json::to_vec(op)
                    .map_err(|e| Error::BadRequest(format!("failed to encode op: {e}")))?;
                stmt.execute(params![op_time, bytes])?;
                last_id = OpId(tx.last_insert_rowid() as u64);
            }
        }
        tx.commit()?;
        log::debug!("oplog: wrote {} op(s), last id {last_id}", ops.len());
        Ok(last_id)
    }

    /// Reads up to `limit` entries with `op_id > after`, in ascending
    /// order — the shape a replication client or crash-recovery replay
    /// consumes.
    pub fn read(&self, after: OpId, limit: usize) -> Result<Vec<OpLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT op_id, op_data FROM oplog WHERE op_id > ?1 ORDER BY op_id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after.0 as i64, limit as i64], |row| {
            let op_id: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((op_id, bytes))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (op_id, bytes) = row?;
            let op: Op = serde_json::from_slice(&bytes)
                .map_err(|e| Error::Corrupt(format!("malformed oplog entry: {e}")))?;
            out.push(OpLogEntry {
                op_id: OpId(op_id as u64),
                op,
            });
        }
        Ok(out)
    }

    #[must_use]
    pub fn get_last_op_id(&self) -> Result<OpId> {
        let conn = self.conn.lock();
        let id: i64 = conn.query_row("SELECT COALESCE(MAX(op_id), 0) FROM oplog", [], |row| {
            row.get(0)
        })?;
        Ok(OpId(id as u64))
    }

    /// Drops entries with `op_id <= up_to`, but never past what the
    /// least-advanced replication slot has already consumed.
    pub fn truncate(&self, up_to: OpId) -> Result<()> {
        let conn = self.conn.lock();
        let min_slot: Option<i64> = conn
            .query_row(
                "SELECT MIN(last_op_id) FROM replication_slots",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let cutoff = match min_slot {
            Some(slot_floor) => (up_to.0 as i64).min(slot_floor),
            None => up_to.0 as i64,
        };
        conn.execute("DELETE FROM oplog WHERE op_id <= ?1", params![cutoff])?;
        Ok(())
    }

    pub fn create_slot(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM replication_slots WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::ReplicationSlotExists(name.to_string()));
        }
        let last_op_id: i64 = conn.query_row("SELECT COALESCE(MAX(op_id), 0) FROM oplog", [], |row| {
            row.get(0)
        })?;
        conn.execute(
            "INSERT INTO replication_slots (name, last_op_id) VALUES (?1, ?2)",
            params![name, last_op_id],
        )?;
        Ok(())
    }

    pub fn delete_slot(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM replication_slots WHERE name = ?1", params![name])?;
        if changed == 0 {
            return Err(Error::ReplicationSlotMissing(name.to_string()));
        }
        Ok(())
    }

    pub fn update_slot(&self, name: &str, op_id: OpId) -> Result<()> {
        let conn = self.conn.lock();
        let slot_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM replication_slots WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if !slot_exists {
            return Err(Error::ReplicationSlotMissing(name.to_string()));
        }
        let op_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM oplog WHERE op_id = ?1)",
            params![op_id.0 as i64],
            |row| row.get(0),
        )?;
        if !op_exists {
            return Err(Error::OpDoesNotExist(op_id.0));
        }
        conn.execute(
            "UPDATE replication_slots SET last_op_id = ?1 WHERE name = ?2",
            params![op_id.0 as i64, name],
        )?;
        Ok(())
    }

    pub fn list_slots(&self) -> Result<Vec<(String, OpId)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name, last_op_id FROM replication_slots ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let op_id: i64 = row.get(1)?;
            Ok((name, OpId(op_id as u64)))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ram::RamDirectory;
    use crate::ids::DocId;
    use test_log::test;

    #[test]
    fn write_then_read_back() {
        let dir = RamDirectory::new();
        let log = OpLog::open(&*dir).unwrap();
        let ops = vec![Op::Delete { doc_id: DocId(1) }, Op::Delete { doc_id: DocId(2) }];
        let last = log.write(&ops, 0).unwrap();
        assert_eq!(last, OpId(2));

        let entries = log.read(OpId::ZERO, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].op_id, OpId(1));
        assert_eq!(entries[1].op_id, OpId(2));
    }

    #[test]
    fn truncate_respects_replication_slots() {
        let dir = RamDirectory::new();
        let log = OpLog::open(&*dir).unwrap();
        log.write(&[Op::Delete { doc_id: DocId(1) }], 0).unwrap();
        log.create_slot("replica-a").unwrap();
        log.write(&[Op::Delete { doc_id: DocId(2) }], 0).unwrap();

        // Slot is still parked at op 1; truncating past it must not drop
        // what the slot has not consumed yet.
        log.truncate(OpId(2)).unwrap();
        let entries = log.read(OpId::ZERO, 10).unwrap();
        assert_eq!(entries.len(), 2);

        log.update_slot("replica-a", OpId(2)).unwrap();
        log.truncate(OpId(2)).unwrap();
        let entries = log.read(OpId::ZERO, 10).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn duplicate_slot_errors() {
        let dir = RamDirectory::new();
        let log = OpLog::open(&*dir).unwrap();
        log.create_slot("a").unwrap();
        assert!(matches!(
            log.create_slot("a"),
            Err(Error::ReplicationSlotExists(_))
        ));
    }

    #[test]
    fn update_slot_rejects_unknown_op_id() {
        let dir = RamDirectory::new();
        let log = OpLog::open(&*dir).unwrap();
        log.write(&[Op::Delete { doc_id: DocId(1) }], 0).unwrap();
        log.create_slot("replica-a").unwrap();

        assert!(matches!(
            log.update_slot("replica-a", OpId(99)),
            Err(Error::OpDoesNotExist(99))
        ));
    }

    #[test]
    fn update_slot_rejects_missing_slot() {
        let dir = RamDirectory::new();
        let log = OpLog::open(&*dir).unwrap();
        log.write(&[Op::Delete { doc_id: DocId(1) }], 0).unwrap();

        assert!(matches!(
            log.update_slot("missing", OpId(1)),
            Err(Error::ReplicationSlotMissing(_))
        ));
    }
}
