use rusqlite::{named_params, Connection, OptionalExtension};
use tracing::info;

use crate::catalog::{QueryCatalog, QueryOp};
use crate::error::{LfndbError, ResourceType};
use crate::types::{Algorithm, FileIdent, UploadStatus};

/// Read side of the ledger: the queries an upload orchestrator runs to find
/// work, plus the bulk status transition it applies afterwards.
pub struct DiscoveryQueries<'a> {
    catalog: &'a QueryCatalog,
}

impl<'a> DiscoveryQueries<'a> {
    pub fn new(catalog: &'a QueryCatalog) -> Self {
        Self { catalog }
    }

    /// Dataset paths with at least one file still awaiting upload.
    pub fn uploadable_datasets(&self, conn: &Connection) -> Result<Vec<String>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::FindUploadableDatasets)?;
        let rows = stmt.query_map(
            named_params! { ":status": UploadStatus::NotUploaded.as_str() },
            |row| row.get(0),
        )?;
        let mut datasets = Vec::new();
        for row in rows {
            datasets.push(row?);
        }
        Ok(datasets)
    }

    /// Up to `max_files` files of `dataset` eligible for upload, oldest
    /// first. A file is eligible when its status is `NOTUPLOADED` and no
    /// tracked parent is still short of `UPLOADED`; untracked parent LFNs do
    /// not gate.
    pub fn uploadable_files(
        &self,
        conn: &Connection,
        dataset: &str,
        max_files: u64,
    ) -> Result<Vec<FileIdent>, LfndbError> {
        let limit = i64::try_from(max_files).unwrap_or(i64::MAX);
        let mut stmt = self.catalog.prepare(conn, QueryOp::FindUploadableFiles)?;
        let rows = stmt.query_map(
            named_params! {
                ":path": dataset,
                ":pending": UploadStatus::NotUploaded.as_str(),
                ":uploaded": UploadStatus::Uploaded.as_str(),
                ":max_files": limit,
            },
            |row| {
                Ok(FileIdent {
                    id: row.get(0)?,
                    lfn: row.get(1)?,
                })
            },
        )?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Distinct producing-application tuples used by files of `dataset`.
    pub fn find_algos(&self, conn: &Connection, dataset: &str) -> Result<Vec<Algorithm>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::FindDatasetAlgos)?;
        let rows = stmt.query_map(named_params! { ":path": dataset }, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        let mut algos = Vec::new();
        for row in rows {
            let (app_name, app_ver, app_fam, pset_hash, config_content) = row?;
            let algorithm = Algorithm::new(app_name, app_ver, app_fam, pset_hash);
            algos.push(match config_content {
                Some(content) => algorithm.with_config(content),
                None => algorithm,
            });
        }
        Ok(algos)
    }

    /// Transitions every given file id to `status`. Any unknown id fails the
    /// whole call with `NotFound` before a single row changes, so a caller
    /// rolling back on error keeps the batch all-or-nothing.
    pub fn update_files_status(
        &self,
        conn: &Connection,
        file_ids: impl IntoIterator<Item = i64>,
        status: UploadStatus,
    ) -> Result<(), LfndbError> {
        let ids: Vec<i64> = file_ids.into_iter().collect();
        {
            let mut lookup = self.catalog.prepare(conn, QueryOp::GetFileLfn)?;
            for id in &ids {
                let known: Option<String> = lookup
                    .query_row(named_params! { ":id": *id }, |row| row.get(0))
                    .optional()?;
                if known.is_none() {
                    return Err(LfndbError::NotFound {
                        resource_type: ResourceType::File,
                        resource_id: id.to_string(),
                    });
                }
            }
        }
        let mut update = self.catalog.prepare(conn, QueryOp::UpdateFileStatus)?;
        for id in &ids {
            update.execute(named_params! { ":status": status.as_str(), ":id": *id })?;
        }
        info!(
            count = ids.len(),
            status = status.as_str(),
            "updated file upload status"
        );
        Ok(())
    }

    /// Total tracked files.
    pub fn count_files(&self, conn: &Connection) -> Result<u64, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::CountFiles)?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| LfndbError::Decode("negative file count from store".into()))
    }
}
