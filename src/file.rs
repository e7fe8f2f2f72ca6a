use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{named_params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use crate::catalog::{QueryCatalog, QueryOp};
use crate::error::{is_unique_violation, LfndbError, ResourceType};
use crate::lineage::LineageManager;
use crate::location::{LocationManager, PendingLocations};
use crate::run::Run;
use crate::store::now_epoch;
use crate::types::{Algorithm, UploadStatus};

/// One tracked output file: identity (id and/or LFN), content descriptors,
/// provenance, replica locations, lineage, and upload status.
///
/// A record is constructed with one side of its identity
/// ([`new`](Self::new) by LFN, [`by_id`](Self::by_id) by id); `load`
/// resolves the other. Every operation that touches storage takes the
/// connection and query catalog explicitly, so a caller-owned transaction
/// bounds all side effects.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    id: Option<i64>,
    lfn: Option<String>,
    size: u64,
    events: u64,
    checksums: BTreeMap<String, String>,
    dataset_path: Option<String>,
    algorithm: Option<Algorithm>,
    runs: BTreeMap<u32, BTreeSet<u32>>,
    locations: BTreeSet<String>,
    status: UploadStatus,
    block_name: Option<String>,
    parent_lfns: BTreeSet<String>,
    parents: Vec<FileRecord>,
}

struct CoreRow {
    id: i64,
    lfn: String,
    size: i64,
    events: i64,
    status: String,
    block_name: Option<String>,
    dataset_path: Option<String>,
    app_name: Option<String>,
    app_ver: Option<String>,
    app_fam: Option<String>,
    pset_hash: Option<String>,
    config_content: Option<String>,
}

fn decode_core(row: &rusqlite::Row<'_>) -> rusqlite::Result<CoreRow> {
    Ok(CoreRow {
        id: row.get(0)?,
        lfn: row.get(1)?,
        size: row.get(2)?,
        events: row.get(3)?,
        status: row.get(4)?,
        block_name: row.get(5)?,
        dataset_path: row.get(6)?,
        app_name: row.get(7)?,
        app_ver: row.get(8)?,
        app_fam: row.get(9)?,
        pset_hash: row.get(10)?,
        config_content: row.get(11)?,
    })
}

impl FileRecord {
    pub fn new(lfn: impl Into<String>) -> Self {
        Self {
            id: None,
            lfn: Some(lfn.into()),
            size: 0,
            events: 0,
            checksums: BTreeMap::new(),
            dataset_path: None,
            algorithm: None,
            runs: BTreeMap::new(),
            locations: BTreeSet::new(),
            status: UploadStatus::NotUploaded,
            block_name: None,
            parent_lfns: BTreeSet::new(),
            parents: Vec::new(),
        }
    }

    pub fn by_id(id: i64) -> Self {
        let mut record = Self::new(String::new());
        record.lfn = None;
        record.id = Some(id);
        record
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn lfn(&self) -> Option<&str> {
        self.lfn.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn checksums(&self) -> &BTreeMap<String, String> {
        &self.checksums
    }

    pub fn dataset_path(&self) -> Option<&str> {
        self.dataset_path.as_deref()
    }

    pub fn algorithm(&self) -> Option<&Algorithm> {
        self.algorithm.as_ref()
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn block_name(&self) -> Option<&str> {
        self.block_name.as_deref()
    }

    pub fn locations(&self) -> &BTreeSet<String> {
        &self.locations
    }

    /// Run provenance, materialized in run-number order.
    pub fn runs(&self) -> Vec<Run> {
        self.runs
            .iter()
            .map(|(number, lumis)| Run::new(*number, lumis.iter().copied()))
            .collect()
    }

    /// Parent records materialized by
    /// [`load_with_parentage`](Self::load_with_parentage). Parent LFNs with
    /// no file row appear only in the LFN view.
    pub fn parents(&self) -> &[FileRecord] {
        &self.parents
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn set_events(&mut self, events: u64) {
        self.events = events;
    }

    pub fn add_checksum(&mut self, kind: impl Into<String>, digest: impl Into<String>) {
        self.checksums.insert(kind.into(), digest.into());
    }

    /// Sets the producing-application tuple. Must be called before `create`.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = Some(algorithm);
    }

    /// Sets the dataset path. Must be called before `create`.
    pub fn set_dataset_path(&mut self, path: impl Into<String>) {
        self.dataset_path = Some(path.into());
    }

    /// Merges run/lumi provenance. Before `create` the merge is in-memory
    /// and persisted by `create`; afterwards the merged rows are written
    /// immediately (idempotent insert).
    pub fn add_run(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
        run: Run,
    ) -> Result<(), LfndbError> {
        self.runs
            .entry(run.number())
            .or_default()
            .extend(run.lumis().iter().copied());
        if let Some(id) = self.id {
            let mut stmt = catalog.prepare(conn, QueryOp::InsertRunLumi)?;
            for lumi in run.lumis() {
                stmt.execute(named_params! {
                    ":file_id": id,
                    ":run": i64::from(run.number()),
                    ":lumi": i64::from(*lumi),
                })?;
            }
        }
        Ok(())
    }

    pub fn add_run_set(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
        runs: impl IntoIterator<Item = Run>,
    ) -> Result<(), LfndbError> {
        for run in runs {
            self.add_run(conn, catalog, run)?;
        }
        Ok(())
    }

    /// Adds replica sites. Persisted immediately once the record exists;
    /// before `create`, held with the record and persisted by `create`.
    pub fn set_location<I>(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
        sites: I,
    ) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let sites: BTreeSet<String> = sites.into_iter().map(Into::into).collect();
        if let Some(id) = self.id {
            LocationManager::new(catalog).attach(conn, id, sites.iter().cloned())?;
        }
        self.locations.extend(sites);
        Ok(())
    }

    /// Persists a deferred location buffer, consuming it.
    pub fn flush_locations(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
        pending: PendingLocations,
    ) -> Result<(), LfndbError> {
        let sites = pending.into_sites();
        if sites.is_empty() {
            return Ok(());
        }
        debug!(count = sites.len(), "flushing pending locations");
        self.set_location(conn, catalog, sites)
    }

    /// Persists the record and everything staged on it (checksums, runs,
    /// locations), assigning and returning the numeric id.
    ///
    /// Fails with `Validation` if the LFN, algorithm, or dataset path is
    /// unset, and with `AlreadyExists` if the LFN is already tracked.
    pub fn create(&mut self, conn: &Connection, catalog: &QueryCatalog) -> Result<i64, LfndbError> {
        let lfn = self.lfn.clone().ok_or_else(|| {
            LfndbError::Validation("cannot create a file record without an lfn".into())
        })?;
        if self.id.is_some() {
            return Err(LfndbError::AlreadyExists {
                resource_type: ResourceType::File,
                resource_id: lfn,
            });
        }
        let algorithm = self.algorithm.clone().ok_or_else(|| {
            LfndbError::Validation(format!("algorithm must be set before creating '{lfn}'"))
        })?;
        let dataset_path = self.dataset_path.clone().ok_or_else(|| {
            LfndbError::Validation(format!("dataset path must be set before creating '{lfn}'"))
        })?;
        if self.exists(conn, catalog)?.is_some() {
            return Err(LfndbError::AlreadyExists {
                resource_type: ResourceType::File,
                resource_id: lfn,
            });
        }
        let dataset_id = resolve_dataset(conn, catalog, &dataset_path)?;
        let algo_id = resolve_algorithm(conn, catalog, &algorithm)?;
        let size = i64::try_from(self.size).map_err(|_| {
            LfndbError::Validation(format!("filesize out of storable range for '{lfn}'"))
        })?;
        let events = i64::try_from(self.events).map_err(|_| {
            LfndbError::Validation(format!("event count out of storable range for '{lfn}'"))
        })?;

        let mut insert = catalog.prepare(conn, QueryOp::InsertFile)?;
        let inserted = insert.execute(named_params! {
            ":lfn": lfn.as_str(),
            ":filesize": size,
            ":event_count": events,
            ":dataset_id": dataset_id,
            ":algo_id": algo_id,
            ":status": self.status.as_str(),
            ":block_name": self.block_name.as_deref(),
            ":created_at": now_epoch(),
        });
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(LfndbError::AlreadyExists {
                    resource_type: ResourceType::File,
                    resource_id: lfn,
                });
            }
            return Err(err.into());
        }
        let id = conn.last_insert_rowid();
        self.id = Some(id);

        let mut checksum = catalog.prepare(conn, QueryOp::InsertChecksum)?;
        for (kind, digest) in &self.checksums {
            checksum.execute(named_params! {
                ":file_id": id,
                ":kind": kind.as_str(),
                ":digest": digest.as_str(),
            })?;
        }
        let mut run_lumi = catalog.prepare(conn, QueryOp::InsertRunLumi)?;
        for (run, lumis) in &self.runs {
            for lumi in lumis {
                run_lumi.execute(named_params! {
                    ":file_id": id,
                    ":run": i64::from(*run),
                    ":lumi": i64::from(*lumi),
                })?;
            }
        }
        if !self.locations.is_empty() {
            LocationManager::new(catalog).attach(conn, id, self.locations.iter().cloned())?;
        }
        debug!(lfn = %lfn, id, "created file record");
        Ok(id)
    }

    /// Removes the record, its descriptor rows, and every lineage edge
    /// incident to its LFN. `NotFound` if no such record exists.
    pub fn delete(&self, conn: &Connection, catalog: &QueryCatalog) -> Result<(), LfndbError> {
        let lfn = match &self.lfn {
            Some(lfn) => lfn.clone(),
            None => {
                let id = self.id.ok_or_else(|| {
                    LfndbError::Validation("file record has neither id nor lfn".into())
                })?;
                let mut stmt = catalog.prepare(conn, QueryOp::GetFileLfn)?;
                stmt.query_row(named_params! { ":id": id }, |row| row.get(0))
                    .optional()?
                    .ok_or_else(|| self.not_found())?
            }
        };
        let mut stmt = catalog.prepare(conn, QueryOp::DeleteFile)?;
        let removed = stmt.execute(named_params! { ":lfn": lfn.as_str() })?;
        if removed == 0 {
            return Err(self.not_found());
        }
        LineageManager::new(catalog).remove_edges(conn, &lfn)?;
        debug!(lfn = %lfn, "deleted file record");
        Ok(())
    }

    /// Returns the numeric id if this record's identity is present in the
    /// currently visible state. Absence is `Ok(None)`, never an error.
    pub fn exists(
        &self,
        conn: &Connection,
        catalog: &QueryCatalog,
    ) -> Result<Option<i64>, LfndbError> {
        if let Some(id) = self.id {
            let mut stmt = catalog.prepare(conn, QueryOp::GetFileLfn)?;
            let found: Option<String> = stmt
                .query_row(named_params! { ":id": id }, |row| row.get(0))
                .optional()?;
            return Ok(found.map(|_| id));
        }
        if let Some(lfn) = self.lfn.as_deref() {
            let mut stmt = catalog.prepare(conn, QueryOp::GetFileId)?;
            let id = stmt
                .query_row(named_params! { ":lfn": lfn }, |row| row.get(0))
                .optional()?;
            return Ok(id);
        }
        Err(LfndbError::Validation(
            "file record has neither id nor lfn".into(),
        ))
    }

    /// Populates every field from storage, by id when known, else by LFN.
    pub fn load(&mut self, conn: &Connection, catalog: &QueryCatalog) -> Result<(), LfndbError> {
        let core = if let Some(id) = self.id {
            let mut stmt = catalog.prepare(conn, QueryOp::GetFileById)?;
            stmt.query_row(named_params! { ":id": id }, decode_core)
                .optional()?
        } else if let Some(lfn) = self.lfn.as_deref() {
            let mut stmt = catalog.prepare(conn, QueryOp::GetFile)?;
            stmt.query_row(named_params! { ":lfn": lfn }, decode_core)
                .optional()?
        } else {
            return Err(LfndbError::Validation(
                "file record has neither id nor lfn".into(),
            ));
        };
        let core = core.ok_or_else(|| self.not_found())?;

        let lfn = core.lfn.clone();
        self.id = Some(core.id);
        self.lfn = Some(core.lfn);
        self.size = u64::try_from(core.size).map_err(|_| {
            LfndbError::Decode(format!("negative filesize stored for '{lfn}'"))
        })?;
        self.events = u64::try_from(core.events).map_err(|_| {
            LfndbError::Decode(format!("negative event count stored for '{lfn}'"))
        })?;
        self.status = core.status.parse()?;
        self.block_name = core.block_name;
        self.dataset_path = core.dataset_path;
        self.algorithm = match (core.app_name, core.app_ver, core.app_fam, core.pset_hash) {
            (Some(name), Some(ver), Some(fam), Some(hash)) => {
                let algorithm = Algorithm::new(name, ver, fam, hash);
                Some(match core.config_content {
                    Some(content) => algorithm.with_config(content),
                    None => algorithm,
                })
            }
            _ => None,
        };

        self.checksums.clear();
        let mut stmt = catalog.prepare(conn, QueryOp::GetChecksums)?;
        let rows = stmt.query_map(named_params! { ":file_id": core.id }, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (kind, digest) = row?;
            self.checksums.insert(kind, digest);
        }

        self.runs.clear();
        let mut stmt = catalog.prepare(conn, QueryOp::GetRunLumis)?;
        let rows = stmt.query_map(named_params! { ":file_id": core.id }, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (run, lumi) = row?;
            let run = u32::try_from(run).map_err(|_| {
                LfndbError::Decode(format!("run number out of range for '{lfn}'"))
            })?;
            let lumi = u32::try_from(lumi).map_err(|_| {
                LfndbError::Decode(format!("lumi number out of range for '{lfn}'"))
            })?;
            self.runs.entry(run).or_default().insert(lumi);
        }

        self.locations = LocationManager::new(catalog).for_file(conn, core.id)?;
        self.parent_lfns = LineageManager::new(catalog).parent_lfns(conn, &lfn)?;
        self.parents.clear();
        Ok(())
    }

    /// [`load`](Self::load), plus the parent records one level deep. Parents
    /// are loaded with plain `load`, so parents of parents stay LFN-only.
    pub fn load_with_parentage(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
    ) -> Result<(), LfndbError> {
        self.load(conn, catalog)?;
        self.parents.clear();
        for parent in self.parent_lfns.clone() {
            let mut record = FileRecord::new(parent);
            if record.exists(conn, catalog)?.is_some() {
                record.load(conn, catalog)?;
                self.parents.push(record);
            }
        }
        Ok(())
    }

    /// Records lineage edges from this file to each parent LFN. The parents
    /// need not be tracked yet. Cycles are rejected with `Validation`.
    pub fn add_parents<I>(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
        parents: I,
    ) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let lfn = self.require_lfn()?.to_string();
        let parents: Vec<String> = parents.into_iter().map(Into::into).collect();
        LineageManager::new(catalog).add_parents(conn, &lfn, parents.iter().cloned())?;
        self.parent_lfns.extend(parents);
        Ok(())
    }

    /// Records lineage edges from each child LFN to this file.
    pub fn add_children<I>(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
        children: I,
    ) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let lfn = self.require_lfn()?.to_string();
        LineageManager::new(catalog).add_children(conn, &lfn, children)
    }

    /// Current parent LFN set, re-read from storage.
    pub fn parent_lfns(
        &mut self,
        conn: &Connection,
        catalog: &QueryCatalog,
    ) -> Result<BTreeSet<String>, LfndbError> {
        let lfn = self.require_lfn()?.to_string();
        let parents = LineageManager::new(catalog).parent_lfns(conn, &lfn)?;
        self.parent_lfns = parents.clone();
        Ok(parents)
    }

    fn require_lfn(&self) -> Result<&str, LfndbError> {
        self.lfn.as_deref().ok_or_else(|| {
            LfndbError::Validation("file record has no lfn; load it by id first".into())
        })
    }

    fn not_found(&self) -> LfndbError {
        let resource_id = match (&self.lfn, self.id) {
            (Some(lfn), _) => lfn.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => String::new(),
        };
        LfndbError::NotFound {
            resource_type: ResourceType::File,
            resource_id,
        }
    }
}

/// Equality covers identity, descriptors, provenance, runs, and locations.
/// Upload status, block membership, and materialized parents are excluded;
/// they track workflow state, not file content.
impl PartialEq for FileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.lfn == other.lfn
            && self.size == other.size
            && self.events == other.events
            && self.checksums == other.checksums
            && self.dataset_path == other.dataset_path
            && self.algorithm == other.algorithm
            && self.runs == other.runs
            && self.locations == other.locations
    }
}

impl Eq for FileRecord {}

fn resolve_dataset(
    conn: &Connection,
    catalog: &QueryCatalog,
    path: &str,
) -> Result<i64, LfndbError> {
    let mut insert = catalog.prepare(conn, QueryOp::InsertDataset)?;
    insert.execute(named_params! { ":path": path })?;
    let mut select = catalog.prepare(conn, QueryOp::GetDatasetId)?;
    let id = select.query_row(named_params! { ":path": path }, |row| row.get(0))?;
    Ok(id)
}

fn resolve_algorithm(
    conn: &Connection,
    catalog: &QueryCatalog,
    algorithm: &Algorithm,
) -> Result<i64, LfndbError> {
    let mut insert = catalog.prepare(conn, QueryOp::InsertAlgo)?;
    insert.execute(named_params! {
        ":app_name": algorithm.app_name.as_str(),
        ":app_ver": algorithm.app_ver.as_str(),
        ":app_fam": algorithm.app_fam.as_str(),
        ":pset_hash": algorithm.pset_hash.as_str(),
        ":config_content": algorithm.config_content.as_deref(),
    })?;
    let mut select = catalog.prepare(conn, QueryOp::GetAlgoId)?;
    let id = select.query_row(
        named_params! {
            ":app_name": algorithm.app_name.as_str(),
            ":app_ver": algorithm.app_ver.as_str(),
            ":app_fam": algorithm.app_fam.as_str(),
            ":pset_hash": algorithm.pset_hash.as_str(),
        },
        |row| row.get(0),
    )?;
    Ok(id)
}
