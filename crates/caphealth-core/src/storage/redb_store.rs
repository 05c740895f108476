//! # redb-backed Health Storage
//!
//! A disk-backed `HealthStore` using the redb embedded database.
//!
//! Every row is encoded with postcard and keyed by its store-assigned `u64`
//! id. Per-table id counters live in the `metadata` table and are advanced in
//! the same write transaction as the rows they number, so a batch insert
//! either lands in full (rows and counter) or not at all.

use crate::store::{HealthStore, rows_for_def};
use crate::{
    AbsenceDetermination, AbsenceId, AppealIntakeLink, AppealLinkId, CapabilityNode,
    CapabilityNodeId, CapabilitySnapshot, CatalogEntry, ComputeQueueEntry, ComputeRun,
    CoverageRequirement, FreezeMarker, FreezeMarkerId, HealthError, HorizonFragilityVector,
    NodeDef, ProgramCapabilityAssignment, ProgramId, ProvenanceId, ProvenanceRecord, QueueId,
    RedundancyDepth, RunId, SnapshotId,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type RowTable = TableDefinition<'static, u64, &'static [u8]>;

const NODES: RowTable = TableDefinition::new("capability_nodes");
const REQUIREMENTS: RowTable = TableDefinition::new("coverage_requirements");
const REDUNDANCY: RowTable = TableDefinition::new("redundancy_depths");
const FRAGILITY: RowTable = TableDefinition::new("horizon_fragility_vectors");
const QUEUE: RowTable = TableDefinition::new("compute_queue");
const RUNS: RowTable = TableDefinition::new("compute_runs");
const PROVENANCE: RowTable = TableDefinition::new("provenance_records");
const FREEZE_MARKERS: RowTable = TableDefinition::new("freeze_markers");
const SNAPSHOTS: RowTable = TableDefinition::new("capability_snapshots");
const ABSENCES: RowTable = TableDefinition::new("absence_determinations");
const APPEALS: RowTable = TableDefinition::new("appeal_intake_links");

const ROW_TABLES: [RowTable; 11] = [
    NODES,
    REQUIREMENTS,
    REDUNDANCY,
    FRAGILITY,
    QUEUE,
    RUNS,
    PROVENANCE,
    FREEZE_MARKERS,
    SNAPSHOTS,
    ABSENCES,
    APPEALS,
];

/// Unique index: (program_id, node_code) -> node id
const NODE_INDEX: TableDefinition<(&str, &str), u64> = TableDefinition::new("node_index");

/// Assignments: (program_id, node_id, assignee) -> serialized assignment
const ASSIGNMENTS: TableDefinition<(&str, u64, &str), &[u8]> =
    TableDefinition::new("program_capability_assignments");

/// Metadata: counter name -> last id handed out
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NODE_COUNTER: &str = "last_node_id";
const QUEUE_COUNTER: &str = "last_queue_id";
const RUN_COUNTER: &str = "last_run_id";
const PROVENANCE_COUNTER: &str = "last_provenance_id";
const FREEZE_COUNTER: &str = "last_freeze_marker_id";
const SNAPSHOT_COUNTER: &str = "last_snapshot_id";
const ABSENCE_COUNTER: &str = "last_absence_id";
const APPEAL_COUNTER: &str = "last_appeal_link_id";

fn storage_err(e: impl std::fmt::Display) -> HealthError {
    HealthError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, HealthError> {
    postcard::to_allocvec(value).map_err(|e| HealthError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HealthError> {
    postcard::from_bytes(bytes).map_err(|e| HealthError::Serialization(e.to_string()))
}

/// Reserve `count` consecutive ids from a counter and return the first one.
fn reserve_ids(txn: &WriteTransaction, counter: &str, count: usize) -> Result<u64, HealthError> {
    let mut meta = txn.open_table(METADATA).map_err(storage_err)?;
    let last = meta
        .get(counter)
        .map_err(storage_err)?
        .map(|v| v.value())
        .unwrap_or(0);
    meta.insert(counter, last.saturating_add(count as u64))
        .map_err(storage_err)?;
    Ok(last.saturating_add(1))
}

/// Overwrite a row that must already exist, inside `txn`.
fn put_existing<T: Serialize>(
    txn: &WriteTransaction,
    table: RowTable,
    id: u64,
    row: &T,
    what: &str,
) -> Result<(), HealthError> {
    let mut table = txn.open_table(table).map_err(storage_err)?;
    let exists = table.get(id).map_err(storage_err)?.is_some();
    if !exists {
        return Err(HealthError::NotFound(format!("{} {}", what, id)));
    }
    let bytes = encode(row)?;
    table.insert(id, bytes.as_slice()).map_err(storage_err)?;
    Ok(())
}

/// A disk-backed health store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a health database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HealthError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            for table in ROW_TABLES {
                let _ = write_txn.open_table(table).map_err(storage_err)?;
            }
            let _ = write_txn.open_table(NODE_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(ASSIGNMENTS).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        Ok(Self { db })
    }

    /// Number of capability nodes across all programs.
    pub fn node_count(&self) -> Result<usize, HealthError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(NODES).map_err(storage_err)?;
        let count = table.len().map_err(storage_err)?;
        Ok(count as usize)
    }

    fn read_rows<T: DeserializeOwned>(&self, table: RowTable) -> Result<Vec<T>, HealthError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }

    fn read_row<T: DeserializeOwned>(
        &self,
        table: RowTable,
        id: u64,
    ) -> Result<Option<T>, HealthError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        match table.get(id).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Append a batch of rows in one transaction, numbering them from `counter`.
    fn insert_rows<T: Serialize>(
        &mut self,
        table: RowTable,
        counter: &str,
        rows: Vec<T>,
        set_id: impl Fn(&mut T, u64),
    ) -> Result<Vec<T>, HealthError> {
        if rows.is_empty() {
            return Ok(rows);
        }

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let first = reserve_ids(&write_txn, counter, rows.len())?;
        let mut stored = Vec::with_capacity(rows.len());
        {
            let mut table = write_txn.open_table(table).map_err(storage_err)?;
            for (offset, mut row) in rows.into_iter().enumerate() {
                let id = first.saturating_add(offset as u64);
                set_id(&mut row, id);
                let bytes = encode(&row)?;
                table.insert(id, bytes.as_slice()).map_err(storage_err)?;
                stored.push(row);
            }
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(stored)
    }

    fn insert_row<T: Serialize>(
        &mut self,
        table: RowTable,
        counter: &str,
        row: T,
        set_id: impl Fn(&mut T, u64),
    ) -> Result<T, HealthError> {
        self.insert_rows(table, counter, vec![row], set_id)?
            .into_iter()
            .next()
            .ok_or_else(|| HealthError::Storage(format!("insert into {} returned no row", counter)))
    }

    fn overwrite_row<T: Serialize>(
        &mut self,
        table: RowTable,
        id: u64,
        row: &T,
        what: &str,
    ) -> Result<(), HealthError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        put_existing(&write_txn, table, id, row, what)?;
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// HEALTHSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl HealthStore for RedbStore {
    fn upsert_catalog(
        &mut self,
        program: &ProgramId,
        defs: &[NodeDef],
    ) -> Result<Vec<CapabilityNodeId>, HealthError> {
        let mut ids = Vec::with_capacity(defs.len());
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            let mut index = write_txn.open_table(NODE_INDEX).map_err(storage_err)?;
            let mut nodes = write_txn.open_table(NODES).map_err(storage_err)?;
            let mut requirements = write_txn.open_table(REQUIREMENTS).map_err(storage_err)?;
            let mut redundancy = write_txn.open_table(REDUNDANCY).map_err(storage_err)?;
            let mut fragility = write_txn.open_table(FRAGILITY).map_err(storage_err)?;

            let mut last_id = meta
                .get(NODE_COUNTER)
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0);

            for def in defs {
                let key = (program.as_str(), def.node_code.as_str());
                let existing = index.get(key).map_err(storage_err)?.map(|v| v.value());
                let id = match existing {
                    Some(id) => id,
                    None => {
                        last_id = last_id.saturating_add(1);
                        index.insert(key, last_id).map_err(storage_err)?;
                        last_id
                    }
                };

                let (node, requirement, depth, vector) =
                    rows_for_def(program, CapabilityNodeId(id), def);
                nodes
                    .insert(id, encode(&node)?.as_slice())
                    .map_err(storage_err)?;
                requirements
                    .insert(id, encode(&requirement)?.as_slice())
                    .map_err(storage_err)?;
                redundancy
                    .insert(id, encode(&depth)?.as_slice())
                    .map_err(storage_err)?;
                fragility
                    .insert(id, encode(&vector)?.as_slice())
                    .map_err(storage_err)?;
                ids.push(CapabilityNodeId(id));
            }

            meta.insert(NODE_COUNTER, last_id).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(ids)
    }

    fn catalog(&self, program: &ProgramId) -> Result<Vec<CatalogEntry>, HealthError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let nodes = read_txn.open_table(NODES).map_err(storage_err)?;
        let requirements = read_txn.open_table(REQUIREMENTS).map_err(storage_err)?;
        let redundancy = read_txn.open_table(REDUNDANCY).map_err(storage_err)?;
        let fragility = read_txn.open_table(FRAGILITY).map_err(storage_err)?;

        let mut entries = Vec::new();
        for entry in nodes.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            let node: CapabilityNode = decode(value.value())?;
            if &node.program_id != program {
                continue;
            }
            let id = key.value();

            let requirement: CoverageRequirement = match requirements.get(id).map_err(storage_err)? {
                Some(bytes) => decode(bytes.value())?,
                None => {
                    return Err(HealthError::Storage(format!(
                        "missing coverage requirement for node {}",
                        id
                    )));
                }
            };
            let depth: RedundancyDepth = match redundancy.get(id).map_err(storage_err)? {
                Some(bytes) => decode(bytes.value())?,
                None => {
                    return Err(HealthError::Storage(format!(
                        "missing redundancy depth for node {}",
                        id
                    )));
                }
            };
            let vector: HorizonFragilityVector = match fragility.get(id).map_err(storage_err)? {
                Some(bytes) => decode(bytes.value())?,
                None => {
                    return Err(HealthError::Storage(format!(
                        "missing fragility vector for node {}",
                        id
                    )));
                }
            };

            entries.push(CatalogEntry {
                node,
                requirement,
                redundancy: depth,
                fragility: vector,
            });
        }
        Ok(entries)
    }

    fn upsert_assignment(
        &mut self,
        assignment: &ProgramCapabilityAssignment,
    ) -> Result<(), HealthError> {
        let node_id = assignment.capability_node_id;
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let nodes = write_txn.open_table(NODES).map_err(storage_err)?;
            let owner = match nodes.get(node_id.0).map_err(storage_err)? {
                Some(bytes) => Some(decode::<CapabilityNode>(bytes.value())?.program_id),
                None => None,
            };
            if owner.as_ref() != Some(&assignment.program_id) {
                return Err(HealthError::NotFound(format!(
                    "capability node {} in program {}",
                    node_id, assignment.program_id
                )));
            }

            let mut table = write_txn.open_table(ASSIGNMENTS).map_err(storage_err)?;
            let bytes = encode(assignment)?;
            table
                .insert(
                    (
                        assignment.program_id.as_str(),
                        node_id.0,
                        assignment.assignee.as_str(),
                    ),
                    bytes.as_slice(),
                )
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn assignments(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<ProgramCapabilityAssignment>, HealthError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(ASSIGNMENTS).map_err(storage_err)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            if key.value().0 != program.as_str() {
                continue;
            }
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }

    fn insert_queue_entry(
        &mut self,
        entry: ComputeQueueEntry,
    ) -> Result<ComputeQueueEntry, HealthError> {
        self.insert_row(QUEUE, QUEUE_COUNTER, entry, |e, id| e.id = QueueId(id))
    }

    fn queue_entry(&self, id: QueueId) -> Result<Option<ComputeQueueEntry>, HealthError> {
        self.read_row(QUEUE, id.0)
    }

    fn update_queue_entry(&mut self, entry: &ComputeQueueEntry) -> Result<(), HealthError> {
        self.overwrite_row(QUEUE, entry.id.0, entry, "queue entry")
    }

    fn begin_run(
        &mut self,
        mut run: ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<ComputeRun, HealthError> {
        // Dropping the transaction on any error aborts both writes.
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        put_existing(&write_txn, QUEUE, entry.id.0, entry, "queue entry")?;
        run.id = RunId(reserve_ids(&write_txn, RUN_COUNTER, 1)?);
        {
            let mut table = write_txn.open_table(RUNS).map_err(storage_err)?;
            let bytes = encode(&run)?;
            table.insert(run.id.0, bytes.as_slice()).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(run)
    }

    fn run(&self, id: RunId) -> Result<Option<ComputeRun>, HealthError> {
        self.read_row(RUNS, id.0)
    }

    fn finish_run(
        &mut self,
        run: &ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<(), HealthError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        put_existing(&write_txn, RUNS, run.id.0, run, "compute run")?;
        put_existing(&write_txn, QUEUE, entry.id.0, entry, "queue entry")?;
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn runs(&self, program: Option<&ProgramId>) -> Result<Vec<ComputeRun>, HealthError> {
        let runs: Vec<ComputeRun> = self.read_rows(RUNS)?;
        Ok(runs
            .into_iter()
            .filter(|r| program.is_none_or(|p| &r.program_id == p))
            .collect())
    }

    fn insert_provenance(
        &mut self,
        record: ProvenanceRecord,
    ) -> Result<ProvenanceRecord, HealthError> {
        self.insert_row(PROVENANCE, PROVENANCE_COUNTER, record, |p, id| {
            p.id = ProvenanceId(id);
        })
    }

    fn provenance_for_run(&self, run: RunId) -> Result<Option<ProvenanceRecord>, HealthError> {
        let records: Vec<ProvenanceRecord> = self.read_rows(PROVENANCE)?;
        Ok(records.into_iter().find(|p| p.run_id == run))
    }

    fn insert_freeze_markers(
        &mut self,
        markers: Vec<FreezeMarker>,
    ) -> Result<Vec<FreezeMarker>, HealthError> {
        self.insert_rows(FREEZE_MARKERS, FREEZE_COUNTER, markers, |m, id| {
            m.id = FreezeMarkerId(id);
        })
    }

    fn freeze_markers_for_run(&self, run: RunId) -> Result<Vec<FreezeMarker>, HealthError> {
        let markers: Vec<FreezeMarker> = self.read_rows(FREEZE_MARKERS)?;
        Ok(markers.into_iter().filter(|m| m.run_id == run).collect())
    }

    fn insert_snapshots(
        &mut self,
        snapshots: Vec<CapabilitySnapshot>,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        self.insert_rows(SNAPSHOTS, SNAPSHOT_COUNTER, snapshots, |s, id| {
            s.id = SnapshotId(id);
        })
    }

    fn snapshots_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        let snapshots: Vec<CapabilitySnapshot> = self.read_rows(SNAPSHOTS)?;
        Ok(snapshots
            .into_iter()
            .filter(|s| s.provenance_id == provenance)
            .collect())
    }

    fn insert_absences(
        &mut self,
        absences: Vec<AbsenceDetermination>,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        self.insert_rows(ABSENCES, ABSENCE_COUNTER, absences, |a, id| {
            a.id = AbsenceId(id);
        })
    }

    fn absences_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        let absences: Vec<AbsenceDetermination> = self.read_rows(ABSENCES)?;
        Ok(absences
            .into_iter()
            .filter(|a| a.provenance_id == provenance)
            .collect())
    }

    fn insert_appeal_links(
        &mut self,
        links: Vec<AppealIntakeLink>,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        self.insert_rows(APPEALS, APPEAL_COUNTER, links, |l, id| {
            l.id = AppealLinkId(id);
        })
    }

    fn appeal_links_for_program(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        let links: Vec<AppealIntakeLink> = self.read_rows(APPEALS)?;
        Ok(links
            .into_iter()
            .filter(|l| &l.program_id == program)
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
