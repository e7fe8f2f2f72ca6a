use rusqlite::{named_params, Connection, OptionalExtension};
use tracing::debug;

use crate::catalog::{QueryCatalog, QueryOp};
use crate::error::{LfndbError, ResourceType};
use crate::location::LocationManager;
use crate::store::now_epoch;
use crate::types::{Block, BlockStatus};

/// Groups files into named upload units and tracks block-level status and
/// locations. A block may exist with no member files.
pub struct BlockManager<'a> {
    catalog: &'a QueryCatalog,
}

impl<'a> BlockManager<'a> {
    pub fn new(catalog: &'a QueryCatalog) -> Self {
        Self { catalog }
    }

    /// Assigns `lfn` to `block_name`, creating the block row (status `OPEN`)
    /// if it does not exist yet. `NotFound` if the file is untracked.
    pub fn set_block(
        &self,
        conn: &Connection,
        lfn: &str,
        block_name: &str,
    ) -> Result<(), LfndbError> {
        self.require_file(conn, lfn)?;
        self.ensure_block(conn, block_name, BlockStatus::Open)?;
        let mut stmt = self.catalog.prepare(conn, QueryOp::SetBlock)?;
        stmt.execute(named_params! { ":block_name": block_name, ":lfn": lfn })?;
        debug!(lfn, block = block_name, "assigned file to block");
        Ok(())
    }

    /// Block name the file is assigned to, `None` while unassigned.
    /// `NotFound` if the file is untracked.
    pub fn get_block(&self, conn: &Connection, lfn: &str) -> Result<Option<String>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetBlock)?;
        let row: Option<Option<String>> = stmt
            .query_row(named_params! { ":lfn": lfn }, |row| row.get(0))
            .optional()?;
        match row {
            None => Err(LfndbError::NotFound {
                resource_type: ResourceType::File,
                resource_id: lfn.to_string(),
            }),
            Some(block) => Ok(block),
        }
    }

    /// Creates or updates a block row with the given status and seeds its
    /// location set. Idempotent on the block name.
    pub fn set_block_status<I>(
        &self,
        conn: &Connection,
        block_name: &str,
        sites: I,
        status: BlockStatus,
    ) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ensure_block(conn, block_name, status)?;
        let mut update = self.catalog.prepare(conn, QueryOp::SetBlockStatus)?;
        update.execute(named_params! {
            ":status": status.as_str(),
            ":block_name": block_name,
        })?;
        let locations = LocationManager::new(self.catalog);
        let mut link = self.catalog.prepare(conn, QueryOp::InsertBlockLocation)?;
        for site in sites {
            let site = site.into();
            let site_id = locations.site_id(conn, &site)?;
            link.execute(named_params! { ":block_name": block_name, ":site_id": site_id })?;
        }
        debug!(block = block_name, status = status.as_str(), "set block status");
        Ok(())
    }

    /// Reads a block row back, with its location set. `Ok(None)` when no
    /// block of that name exists.
    pub fn block(&self, conn: &Connection, block_name: &str) -> Result<Option<Block>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetBlockInfo)?;
        let row: Option<(String, String, i64)> = stmt
            .query_row(named_params! { ":block_name": block_name }, |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?;
        let Some((name, status, created_at)) = row else {
            return Ok(None);
        };

        let mut stmt = self.catalog.prepare(conn, QueryOp::GetBlockLocations)?;
        let rows = stmt.query_map(named_params! { ":block_name": block_name }, |row| {
            row.get(0)
        })?;
        let mut locations = std::collections::BTreeSet::new();
        for row in rows {
            locations.insert(row?);
        }

        Ok(Some(Block {
            name,
            status: status.parse()?,
            created_at,
            locations,
        }))
    }

    fn ensure_block(
        &self,
        conn: &Connection,
        block_name: &str,
        status: BlockStatus,
    ) -> Result<(), LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::InsertBlock)?;
        stmt.execute(named_params! {
            ":block_name": block_name,
            ":status": status.as_str(),
            ":created_at": now_epoch(),
        })?;
        Ok(())
    }

    fn require_file(&self, conn: &Connection, lfn: &str) -> Result<i64, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetFileId)?;
        stmt.query_row(named_params! { ":lfn": lfn }, |row| row.get(0))
            .optional()?
            .ok_or_else(|| LfndbError::NotFound {
                resource_type: ResourceType::File,
                resource_id: lfn.to_string(),
            })
    }
}
