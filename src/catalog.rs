use rusqlite::{CachedStatement, Connection};

use crate::error::LfndbError;

/// Every query operation the ledger entities invoke, named after the data
/// access object it replaces. `name()` is the stable identifier used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOp {
    InsertFile,
    GetFileId,
    GetFileLfn,
    GetFile,
    GetFileById,
    DeleteFile,
    UpdateFileStatus,
    InsertDataset,
    GetDatasetId,
    InsertAlgo,
    GetAlgoId,
    InsertChecksum,
    GetChecksums,
    InsertRunLumi,
    GetRunLumis,
    AddLocation,
    GetLocationId,
    InsertFileLocation,
    GetFileLocations,
    InsertBlock,
    GetBlockInfo,
    SetBlockStatus,
    SetBlock,
    GetBlock,
    InsertBlockLocation,
    GetBlockLocations,
    InsertHeritage,
    DeleteHeritage,
    GetParents,
    GetChildren,
    GetParentStatus,
    CheckAncestry,
    FindUploadableDatasets,
    FindUploadableFiles,
    FindDatasetAlgos,
    CountFiles,
}

impl QueryOp {
    pub const ALL: &'static [QueryOp] = &[
        QueryOp::InsertFile,
        QueryOp::GetFileId,
        QueryOp::GetFileLfn,
        QueryOp::GetFile,
        QueryOp::GetFileById,
        QueryOp::DeleteFile,
        QueryOp::UpdateFileStatus,
        QueryOp::InsertDataset,
        QueryOp::GetDatasetId,
        QueryOp::InsertAlgo,
        QueryOp::GetAlgoId,
        QueryOp::InsertChecksum,
        QueryOp::GetChecksums,
        QueryOp::InsertRunLumi,
        QueryOp::GetRunLumis,
        QueryOp::AddLocation,
        QueryOp::GetLocationId,
        QueryOp::InsertFileLocation,
        QueryOp::GetFileLocations,
        QueryOp::InsertBlock,
        QueryOp::GetBlockInfo,
        QueryOp::SetBlockStatus,
        QueryOp::SetBlock,
        QueryOp::GetBlock,
        QueryOp::InsertBlockLocation,
        QueryOp::GetBlockLocations,
        QueryOp::InsertHeritage,
        QueryOp::DeleteHeritage,
        QueryOp::GetParents,
        QueryOp::GetChildren,
        QueryOp::GetParentStatus,
        QueryOp::CheckAncestry,
        QueryOp::FindUploadableDatasets,
        QueryOp::FindUploadableFiles,
        QueryOp::FindDatasetAlgos,
        QueryOp::CountFiles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueryOp::InsertFile => "insert_file",
            QueryOp::GetFileId => "get_file_id",
            QueryOp::GetFileLfn => "get_file_lfn",
            QueryOp::GetFile => "get_file",
            QueryOp::GetFileById => "get_file_by_id",
            QueryOp::DeleteFile => "delete_file",
            QueryOp::UpdateFileStatus => "update_file_status",
            QueryOp::InsertDataset => "insert_dataset",
            QueryOp::GetDatasetId => "get_dataset_id",
            QueryOp::InsertAlgo => "insert_algo",
            QueryOp::GetAlgoId => "get_algo_id",
            QueryOp::InsertChecksum => "insert_checksum",
            QueryOp::GetChecksums => "get_checksums",
            QueryOp::InsertRunLumi => "insert_run_lumi",
            QueryOp::GetRunLumis => "get_run_lumis",
            QueryOp::AddLocation => "add_location",
            QueryOp::GetLocationId => "get_location_id",
            QueryOp::InsertFileLocation => "insert_file_location",
            QueryOp::GetFileLocations => "get_file_locations",
            QueryOp::InsertBlock => "insert_block",
            QueryOp::GetBlockInfo => "get_block_info",
            QueryOp::SetBlockStatus => "set_block_status",
            QueryOp::SetBlock => "set_block",
            QueryOp::GetBlock => "get_block",
            QueryOp::InsertBlockLocation => "insert_block_location",
            QueryOp::GetBlockLocations => "get_block_locations",
            QueryOp::InsertHeritage => "insert_heritage",
            QueryOp::DeleteHeritage => "delete_heritage",
            QueryOp::GetParents => "get_parents",
            QueryOp::GetChildren => "get_children",
            QueryOp::GetParentStatus => "get_parent_status",
            QueryOp::CheckAncestry => "check_ancestry",
            QueryOp::FindUploadableDatasets => "find_uploadable_datasets",
            QueryOp::FindUploadableFiles => "find_uploadable_files",
            QueryOp::FindDatasetAlgos => "find_dataset_algos",
            QueryOp::CountFiles => "count_files",
        }
    }
}

/// One implementation per backing store dialect. The dialect is total over
/// [`QueryOp`]; there is no runtime registration and no string lookup.
pub trait QueryDialect {
    fn backend(&self) -> &'static str;
    fn sql(&self, op: QueryOp) -> &'static str;
}

pub struct SqliteDialect;

impl QueryDialect for SqliteDialect {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn sql(&self, op: QueryOp) -> &'static str {
        match op {
            QueryOp::InsertFile => {
                "INSERT INTO file (lfn, filesize, event_count, dataset_id, algo_id, status, block_name, created_at)
                 VALUES (:lfn, :filesize, :event_count, :dataset_id, :algo_id, :status, :block_name, :created_at)"
            }
            QueryOp::GetFileId => "SELECT id FROM file WHERE lfn = :lfn",
            QueryOp::GetFileLfn => "SELECT lfn FROM file WHERE id = :id",
            QueryOp::GetFile => {
                "SELECT f.id, f.lfn, f.filesize, f.event_count, f.status, f.block_name,
                        d.path, a.app_name, a.app_ver, a.app_fam, a.pset_hash, a.config_content
                 FROM file f
                 LEFT JOIN dataset d ON d.id = f.dataset_id
                 LEFT JOIN algorithm a ON a.id = f.algo_id
                 WHERE f.lfn = :lfn"
            }
            QueryOp::GetFileById => {
                "SELECT f.id, f.lfn, f.filesize, f.event_count, f.status, f.block_name,
                        d.path, a.app_name, a.app_ver, a.app_fam, a.pset_hash, a.config_content
                 FROM file f
                 LEFT JOIN dataset d ON d.id = f.dataset_id
                 LEFT JOIN algorithm a ON a.id = f.algo_id
                 WHERE f.id = :id"
            }
            QueryOp::DeleteFile => "DELETE FROM file WHERE lfn = :lfn",
            QueryOp::UpdateFileStatus => "UPDATE file SET status = :status WHERE id = :id",
            QueryOp::InsertDataset => "INSERT OR IGNORE INTO dataset (path) VALUES (:path)",
            QueryOp::GetDatasetId => "SELECT id FROM dataset WHERE path = :path",
            QueryOp::InsertAlgo => {
                "INSERT OR IGNORE INTO algorithm (app_name, app_ver, app_fam, pset_hash, config_content)
                 VALUES (:app_name, :app_ver, :app_fam, :pset_hash, :config_content)"
            }
            QueryOp::GetAlgoId => {
                "SELECT id FROM algorithm
                 WHERE app_name = :app_name AND app_ver = :app_ver
                   AND app_fam = :app_fam AND pset_hash = :pset_hash"
            }
            QueryOp::InsertChecksum => {
                "INSERT INTO file_checksum (file_id, kind, digest)
                 VALUES (:file_id, :kind, :digest)
                 ON CONFLICT (file_id, kind) DO UPDATE SET digest = excluded.digest"
            }
            QueryOp::GetChecksums => {
                "SELECT kind, digest FROM file_checksum WHERE file_id = :file_id ORDER BY kind"
            }
            QueryOp::InsertRunLumi => {
                "INSERT OR IGNORE INTO file_run_lumi (file_id, run, lumi)
                 VALUES (:file_id, :run, :lumi)"
            }
            QueryOp::GetRunLumis => {
                "SELECT run, lumi FROM file_run_lumi WHERE file_id = :file_id ORDER BY run, lumi"
            }
            QueryOp::AddLocation => "INSERT OR IGNORE INTO site (site_name) VALUES (:site_name)",
            QueryOp::GetLocationId => "SELECT id FROM site WHERE site_name = :site_name",
            QueryOp::InsertFileLocation => {
                "INSERT OR IGNORE INTO file_location (file_id, site_id) VALUES (:file_id, :site_id)"
            }
            QueryOp::GetFileLocations => {
                "SELECT s.site_name FROM file_location fl
                 JOIN site s ON s.id = fl.site_id
                 WHERE fl.file_id = :file_id
                 ORDER BY s.site_name"
            }
            QueryOp::InsertBlock => {
                "INSERT OR IGNORE INTO block (block_name, status, created_at)
                 VALUES (:block_name, :status, :created_at)"
            }
            QueryOp::GetBlockInfo => {
                "SELECT block_name, status, created_at FROM block WHERE block_name = :block_name"
            }
            QueryOp::SetBlockStatus => {
                "UPDATE block SET status = :status WHERE block_name = :block_name"
            }
            QueryOp::SetBlock => "UPDATE file SET block_name = :block_name WHERE lfn = :lfn",
            QueryOp::GetBlock => "SELECT block_name FROM file WHERE lfn = :lfn",
            QueryOp::InsertBlockLocation => {
                "INSERT OR IGNORE INTO block_location (block_name, site_id)
                 VALUES (:block_name, :site_id)"
            }
            QueryOp::GetBlockLocations => {
                "SELECT s.site_name FROM block_location bl
                 JOIN site s ON s.id = bl.site_id
                 WHERE bl.block_name = :block_name
                 ORDER BY s.site_name"
            }
            QueryOp::InsertHeritage => {
                "INSERT OR IGNORE INTO file_lineage (child_lfn, parent_lfn)
                 VALUES (:child_lfn, :parent_lfn)"
            }
            QueryOp::DeleteHeritage => {
                "DELETE FROM file_lineage WHERE child_lfn = :lfn OR parent_lfn = :lfn"
            }
            QueryOp::GetParents => {
                "SELECT parent_lfn FROM file_lineage WHERE child_lfn = :child_lfn ORDER BY parent_lfn"
            }
            QueryOp::GetChildren => {
                "SELECT child_lfn FROM file_lineage WHERE parent_lfn = :parent_lfn ORDER BY child_lfn"
            }
            QueryOp::GetParentStatus => {
                "SELECT p.status FROM file_lineage l
                 JOIN file p ON p.lfn = l.parent_lfn
                 WHERE l.child_lfn = :child_lfn
                 ORDER BY p.lfn"
            }
            QueryOp::CheckAncestry => {
                "WITH RECURSIVE ancestry (lfn) AS (
                     SELECT parent_lfn FROM file_lineage WHERE child_lfn = :start
                     UNION
                     SELECT l.parent_lfn FROM file_lineage l JOIN ancestry a ON l.child_lfn = a.lfn
                 )
                 SELECT 1 FROM ancestry WHERE lfn = :target"
            }
            QueryOp::FindUploadableDatasets => {
                "SELECT DISTINCT d.path FROM file f
                 JOIN dataset d ON d.id = f.dataset_id
                 WHERE f.status = :status
                 ORDER BY d.path"
            }
            QueryOp::FindUploadableFiles => {
                "SELECT f.id, f.lfn FROM file f
                 JOIN dataset d ON d.id = f.dataset_id
                 WHERE d.path = :path
                   AND f.status = :pending
                   AND NOT EXISTS (
                       SELECT 1 FROM file_lineage l
                       JOIN file p ON p.lfn = l.parent_lfn
                       WHERE l.child_lfn = f.lfn AND p.status <> :uploaded
                   )
                 ORDER BY f.created_at ASC, f.id ASC
                 LIMIT :max_files"
            }
            QueryOp::FindDatasetAlgos => {
                "SELECT DISTINCT a.app_name, a.app_ver, a.app_fam, a.pset_hash, a.config_content
                 FROM file f
                 JOIN dataset d ON d.id = f.dataset_id
                 JOIN algorithm a ON a.id = f.algo_id
                 WHERE d.path = :path
                 ORDER BY a.app_name, a.app_ver, a.pset_hash"
            }
            QueryOp::CountFiles => "SELECT COUNT(*) FROM file",
        }
    }
}

/// Binds a [`QueryDialect`] once per process and resolves operations to
/// prepared statements on the caller's connection. Statements are cached per
/// connection, so repeated resolution of the same operation is cheap.
pub struct QueryCatalog {
    dialect: Box<dyn QueryDialect + Send + Sync>,
}

impl QueryCatalog {
    pub fn sqlite() -> Self {
        Self {
            dialect: Box::new(SqliteDialect),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.dialect.backend()
    }

    pub fn sql(&self, op: QueryOp) -> &'static str {
        self.dialect.sql(op)
    }

    pub fn prepare<'c>(
        &self,
        conn: &'c Connection,
        op: QueryOp,
    ) -> Result<CachedStatement<'c>, LfndbError> {
        Ok(conn.prepare_cached(self.dialect.sql(op))?)
    }
}
