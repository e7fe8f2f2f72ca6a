use rusqlite::Connection;

use lfndb::{
    bootstrap_schema, open_in_memory, Algorithm, FileRecord, LfndbConfig, LocationManager,
    PendingLocations, QueryCatalog,
};

fn ledger() -> Connection {
    let conn = open_in_memory(&LfndbConfig::default()).expect("open in-memory ledger");
    bootstrap_schema(&conn).expect("bootstrap schema");
    conn
}

fn reco_file(lfn: &str) -> FileRecord {
    let mut record = FileRecord::new(lfn);
    record.set_size(1024);
    record.set_events(10);
    record.set_algorithm(Algorithm::new("cmsRun", "CMSSW_2_1_8", "RECO", "GIBBERISH"));
    record.set_dataset_path("/Cosmics/CRUZET09-PromptReco-v1/RECO");
    record
}

fn loaded_locations(conn: &Connection, catalog: &QueryCatalog, lfn: &str) -> Vec<String> {
    let mut record = FileRecord::new(lfn);
    record.load(conn, catalog).expect("load record");
    record.locations().iter().cloned().collect()
}

/// Test Case 1: Immediate persistence and idempotence
///
/// Once a record exists, set_location persists right away, and adding the
/// same site repeatedly stores it once.
#[test]
fn immediate_location_writes_are_idempotent() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut record = reco_file("/loc/immediate");
    record.create(&conn, &catalog).expect("create");

    record
        .set_location(&conn, &catalog, ["se1.fnal.gov"])
        .expect("first write");
    record
        .set_location(&conn, &catalog, ["se1.fnal.gov"])
        .expect("repeat write");
    assert_eq!(
        loaded_locations(&conn, &catalog, "/loc/immediate"),
        vec!["se1.fnal.gov"],
        "duplicate site must collapse to one row"
    );

    record
        .set_location(&conn, &catalog, ["se1.cern.ch"])
        .expect("second site");
    assert_eq!(
        loaded_locations(&conn, &catalog, "/loc/immediate"),
        vec!["se1.cern.ch", "se1.fnal.gov"]
    );
}

/// Test Case 2: Pre-create staging
///
/// Locations added before create are held with the record and persisted by
/// create in one shot.
#[test]
fn staged_locations_persist_on_create() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut record = reco_file("/loc/staged");
    record
        .set_location(&conn, &catalog, ["se1.fnal.gov", "se1.cern.ch"])
        .expect("stage locations");
    record.create(&conn, &catalog).expect("create");

    assert_eq!(
        loaded_locations(&conn, &catalog, "/loc/staged"),
        vec!["se1.cern.ch", "se1.fnal.gov"]
    );
}

/// Test Case 3: Deferred buffer flush
///
/// A pending-locations token accumulates sites across calls and persists
/// their union exactly once when flushed through the owning record.
#[test]
fn pending_buffer_flushes_the_union() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut record = reco_file("/loc/pending");
    record.create(&conn, &catalog).expect("create");
    record
        .set_location(&conn, &catalog, ["se1.fnal.gov"])
        .expect("immediate site");

    let mut pending = PendingLocations::new();
    pending.add(["se1.cern.ch"]);
    pending.add(["se2.fnal.gov", "se1.cern.ch"]);
    assert_eq!(pending.len(), 2);

    record
        .flush_locations(&conn, &catalog, pending)
        .expect("flush");
    assert_eq!(
        loaded_locations(&conn, &catalog, "/loc/pending"),
        vec!["se1.cern.ch", "se1.fnal.gov", "se2.fnal.gov"]
    );
    assert_eq!(
        record.locations().len(),
        3,
        "flush must fold into the record's own view"
    );
}

/// Test Case 4: Deliberate discard
///
/// Discarding a token persists nothing; data loss is the caller's explicit
/// decision, not a silent drop.
#[test]
fn discarded_buffer_persists_nothing() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut record = reco_file("/loc/discard");
    record.create(&conn, &catalog).expect("create");

    let mut pending = PendingLocations::new();
    pending.add(["se1.cern.ch", "se2.fnal.gov"]);
    pending.discard();

    assert!(
        loaded_locations(&conn, &catalog, "/loc/discard").is_empty(),
        "discarded sites must never reach storage"
    );
}

/// Test Case 5: Site registry
///
/// Sites can be registered in bulk ahead of use, attach registers unknown
/// sites implicitly, and for_file reads the set back by site name.
#[test]
fn registry_seeds_and_implicit_registration() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();
    let locations = LocationManager::new(&catalog);

    locations
        .add_sites(&conn, ["se1.fnal.gov", "se1.cern.ch"])
        .expect("seed topology");
    locations
        .add_sites(&conn, ["se1.fnal.gov"])
        .expect("reseeding is idempotent");

    let mut record = reco_file("/loc/registry");
    let id = record.create(&conn, &catalog).expect("create");

    locations
        .attach(&conn, id, ["se1.fnal.gov", "se3.in2p3.fr"])
        .expect("attach with one unknown site");
    let sites = locations.for_file(&conn, id).expect("read back");
    assert_eq!(
        sites.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["se1.fnal.gov", "se3.in2p3.fr"],
        "unknown site must be registered on the way"
    );

    let err = locations
        .add_sites(&conn, [""])
        .expect_err("empty site name");
    assert_eq!(err.code_str(), "validation");
}
