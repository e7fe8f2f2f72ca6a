use std::collections::BTreeSet;

use rusqlite::{named_params, Connection};
use tracing::{debug, warn};

use crate::catalog::{QueryCatalog, QueryOp};
use crate::error::LfndbError;

/// Replica sites accumulated across calls but not yet persisted. The holder
/// must either flush the buffer through the owning file record or discard it
/// deliberately; losing locations is never implicit.
#[must_use = "pending locations must be flushed through a file record or discarded"]
#[derive(Debug, Default)]
pub struct PendingLocations {
    sites: BTreeSet<String>,
}

impl PendingLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I>(&mut self, sites: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.sites.extend(sites.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Drops the buffer without persisting. Logs when replica knowledge is
    /// being thrown away.
    pub fn discard(self) {
        if !self.sites.is_empty() {
            warn!(count = self.sites.len(), "discarding pending locations");
        }
    }

    pub(crate) fn into_sites(self) -> BTreeSet<String> {
        self.sites
    }
}

/// Mutates the replica-site relation between files (or blocks) and the site
/// registry. Attaching to an unknown site registers it first.
pub struct LocationManager<'a> {
    catalog: &'a QueryCatalog,
}

impl<'a> LocationManager<'a> {
    pub fn new(catalog: &'a QueryCatalog) -> Self {
        Self { catalog }
    }

    /// Bulk-registers site identifiers. Idempotent; used by harnesses to
    /// seed topology before any file references the sites.
    pub fn add_sites<I>(&self, conn: &Connection, sites: I) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut stmt = self.catalog.prepare(conn, QueryOp::AddLocation)?;
        for site in sites {
            let site = site.into();
            if site.is_empty() {
                return Err(LfndbError::Validation(
                    "site name must not be empty".into(),
                ));
            }
            stmt.execute(named_params! { ":site_name": site.as_str() })?;
        }
        Ok(())
    }

    /// Links `file_id` to each site, registering unknown sites on the way.
    pub fn attach<I>(&self, conn: &Connection, file_id: i64, sites: I) -> Result<(), LfndbError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut link = self.catalog.prepare(conn, QueryOp::InsertFileLocation)?;
        for site in sites {
            let site = site.into();
            let site_id = self.site_id(conn, &site)?;
            link.execute(named_params! { ":file_id": file_id, ":site_id": site_id })?;
            debug!(file_id, site = %site, "attached replica location");
        }
        Ok(())
    }

    /// Reads the location set of one file back, ordered by site name.
    pub fn for_file(&self, conn: &Connection, file_id: i64) -> Result<BTreeSet<String>, LfndbError> {
        let mut stmt = self.catalog.prepare(conn, QueryOp::GetFileLocations)?;
        let rows = stmt.query_map(named_params! { ":file_id": file_id }, |row| row.get(0))?;
        let mut sites = BTreeSet::new();
        for row in rows {
            sites.insert(row?);
        }
        Ok(sites)
    }

    /// Resolves a site name to its registry id, registering it if unknown.
    pub(crate) fn site_id(&self, conn: &Connection, site: &str) -> Result<i64, LfndbError> {
        if site.is_empty() {
            return Err(LfndbError::Validation(
                "site name must not be empty".into(),
            ));
        }
        let mut register = self.catalog.prepare(conn, QueryOp::AddLocation)?;
        register.execute(named_params! { ":site_name": site })?;
        let mut select = self.catalog.prepare(conn, QueryOp::GetLocationId)?;
        let id = select.query_row(named_params! { ":site_name": site }, |row| row.get(0))?;
        Ok(id)
    }
}
