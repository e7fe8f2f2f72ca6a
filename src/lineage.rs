use std::collections::BTreeSet;

use rusqlite::{named_params, Connection};
use tracing::debug;

use crate::catalog::{QueryCatalog, QueryOp};
use crate::error::LfndbError;
use crate::types::UploadStatus;

/// Maintains the parent/child derivation relation between files. Edges are
/// keyed by LFN, so an edge may be recorded before either endpoint has a
/// file row; a later create for that LFN attaches to the existing edge.
pub struct LineageManager<'a> {
    catalog: &'a QueryCatalog,
}

impl<'a> LineageManager<'a> {
    pub fn new(catalog: &'a QueryCatalog) -> Self {
        Self { catalog }
    }

    /// Records `parents` as parents of `child_lfn`. Idempotent per edge.
    /// Edges that would close a cycle (self-parentage included) are rejected
    /// before anything is written.
    pub fn add_parents<I>(
        &self,
        conn: &Connection,
        child_lfn: &str,
        parents: I,
    ) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let parents: Vec<String> = parents.into_iter().map(Into::into).collect();
        let mut check = self.catalog.prepare(conn, QueryOp::CheckAncestry)?;
        for parent in &parents {
            if parent == child_lfn {
                return Err(LfndbError::Validation(format!(
                    "file '{child_lfn}' cannot be its own parent"
                )));
            }
            let cyclic = check.exists(named_params! {
                ":start": parent.as_str(),
                ":target": child_lfn,
            })?;
            if cyclic {
                return Err(LfndbError::Validation(format!(
                    "lineage edge '{child_lfn}' -> '{parent}' would close a cycle"
                )));
            }
        }
        let mut insert = self.catalog.prepare(conn, QueryOp::InsertHeritage)?;
        for parent in &parents {
            insert.execute(named_params! {
                ":child_lfn": child_lfn,
                ":parent_lfn": parent.as_str(),
            })?;
            debug!(child = child_lfn, parent = %parent, "recorded lineage edge");
        }
        Ok(())
    }

    /// Records `children` as children of `parent_lfn`, with the same cycle
    /// rejection as [`add_parents`](Self::add_parents).
    pub fn add_children<I>(
        &self,
        conn: &Connection,
        parent_lfn: &str,
        children: I,
    ) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        for child in children {
            let child = child.into();
            self.add_parents(conn, &child, [parent_lfn])?;
        }
        Ok(())
    }

    pub fn parent_lfns(&self, conn: &Connection, lfn: &str) -> Result<BTreeSet<String>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetParents)?;
        let rows = stmt.query_map(named_params! { ":child_lfn": lfn }, |row| row.get(0))?;
        let mut parents = BTreeSet::new();
        for row in rows {
            parents.insert(row?);
        }
        Ok(parents)
    }

    pub fn children(&self, conn: &Connection, lfn: &str) -> Result<BTreeSet<String>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetChildren)?;
        let rows = stmt.query_map(named_params! { ":parent_lfn": lfn }, |row| row.get(0))?;
        let mut children = BTreeSet::new();
        for row in rows {
            children.insert(row?);
        }
        Ok(children)
    }

    /// Upload status of every tracked parent of `lfn`, ordered by parent
    /// LFN. Parents with no file row are not reported.
    pub fn parent_status(
        &self,
        conn: &Connection,
        lfn: &str,
    ) -> Result<Vec<UploadStatus>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetParentStatus)?;
        let rows = stmt.query_map(named_params! { ":child_lfn": lfn }, |row| {
            row.get::<_, String>(0)
        })?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?.parse()?);
        }
        Ok(statuses)
    }

    /// Removes every lineage edge incident to `lfn`, in both directions.
    pub fn remove_edges(&self, conn: &Connection, lfn: &str) -> Result<(), LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::DeleteHeritage)?;
        stmt.execute(named_params! { ":lfn": lfn })?;
        Ok(())
    }
}
