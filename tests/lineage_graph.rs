use rusqlite::Connection;

use lfndb::{
    bootstrap_schema, open_in_memory, Algorithm, DiscoveryQueries, FileRecord, LfndbConfig,
    LineageManager, QueryCatalog, UploadStatus,
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

/// Test Case 1: Parents declared before they exist
///
/// Lineage edges are keyed by LFN, so a child may declare parents that have
/// no file row yet. Creating those parents later attaches them: the LFN view
/// always shows all declared parents, while the materialized view shows only
/// the tracked ones.
#[test]
fn parents_resolve_lazily_as_they_are_created() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut child = reco_file("/lineage/child");
    child.create(&conn, &catalog).expect("create child");
    child
        .add_parents(
            &conn,
            &catalog,
            ["/lineage/parent/a", "/lineage/parent/b", "/lineage/parent/c"],
        )
        .expect("declare parents");

    let mut loaded = FileRecord::new("/lineage/child");
    loaded
        .load_with_parentage(&conn, &catalog)
        .expect("load with parentage");
    assert_eq!(
        loaded.parent_lfns(&conn, &catalog).expect("lfn view").len(),
        3,
        "all declared parents appear in the LFN view"
    );
    assert!(
        loaded.parents().is_empty(),
        "no parent is tracked yet, so none materializes"
    );

    reco_file("/lineage/parent/a")
        .create(&conn, &catalog)
        .expect("create parent a");
    reco_file("/lineage/parent/b")
        .create(&conn, &catalog)
        .expect("create parent b");

    loaded
        .load_with_parentage(&conn, &catalog)
        .expect("reload with parentage");
    let materialized: Vec<&str> = loaded
        .parents()
        .iter()
        .filter_map(|parent| parent.lfn())
        .collect();
    assert_eq!(
        materialized,
        vec!["/lineage/parent/a", "/lineage/parent/b"],
        "only tracked parents materialize as records"
    );
    assert_eq!(
        loaded.parents()[0].size(),
        1024,
        "materialized parents are fully loaded"
    );
}

/// Test Case 2: Edge idempotence
///
/// Declaring the same parent twice stores one edge.
#[test]
fn duplicate_edges_collapse() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut child = reco_file("/lineage/dup/child");
    child.create(&conn, &catalog).expect("create child");
    child
        .add_parents(&conn, &catalog, ["/lineage/dup/parent"])
        .expect("first declaration");
    child
        .add_parents(&conn, &catalog, ["/lineage/dup/parent"])
        .expect("second declaration");

    let lineage = LineageManager::new(&catalog);
    assert_eq!(
        lineage
            .parent_lfns(&conn, "/lineage/dup/child")
            .expect("parents")
            .len(),
        1
    );
}

/// Test Case 3: Child view
///
/// Edges are readable from the parent side: add_children on a parent makes
/// each child report that parent.
#[test]
fn children_are_queryable_from_the_parent_side() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut parent = reco_file("/lineage/fanout/parent");
    parent.create(&conn, &catalog).expect("create parent");
    parent
        .add_children(
            &conn,
            &catalog,
            ["/lineage/fanout/x", "/lineage/fanout/y"],
        )
        .expect("declare children");

    let lineage = LineageManager::new(&catalog);
    let children = lineage
        .children(&conn, "/lineage/fanout/parent")
        .expect("children");
    assert_eq!(
        children.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["/lineage/fanout/x", "/lineage/fanout/y"]
    );
    assert_eq!(
        lineage
            .parent_lfns(&conn, "/lineage/fanout/x")
            .expect("parents of x")
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
        vec!["/lineage/fanout/parent"]
    );
}

/// Test Case 4: Parent status reporting
///
/// parent_status reports the current upload status of each tracked parent
/// and says nothing about untracked parent LFNs.
#[test]
fn parent_status_reports_only_tracked_parents() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut parent = reco_file("/lineage/status/parent");
    let parent_id = parent.create(&conn, &catalog).expect("create parent");
    let mut child = reco_file("/lineage/status/child");
    child.create(&conn, &catalog).expect("create child");
    child
        .add_parents(
            &conn,
            &catalog,
            ["/lineage/status/parent", "/lineage/status/untracked"],
        )
        .expect("declare parents");

    let lineage = LineageManager::new(&catalog);
    assert_eq!(
        lineage
            .parent_status(&conn, "/lineage/status/child")
            .expect("status"),
        vec![UploadStatus::NotUploaded],
        "one tracked parent, never uploaded"
    );

    DiscoveryQueries::new(&catalog)
        .update_files_status(&conn, [parent_id], UploadStatus::Uploaded)
        .expect("upload parent");
    assert_eq!(
        lineage
            .parent_status(&conn, "/lineage/status/child")
            .expect("status"),
        vec![UploadStatus::Uploaded]
    );
}

/// Test Case 5: Cycle rejection
///
/// Self-parentage and two-node cycles are rejected with a validation error
/// and leave no edge behind.
#[test]
fn cycles_are_rejected_with_no_edge_left_behind() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();
    let lineage = LineageManager::new(&catalog);

    lineage
        .add_parents(&conn, "/cycle/x", ["/cycle/p"])
        .expect("forward edge");

    let err = lineage
        .add_parents(&conn, "/cycle/p", ["/cycle/x"])
        .expect_err("reverse edge closes a cycle");
    assert_eq!(err.code_str(), "validation");
    assert!(
        lineage
            .parent_lfns(&conn, "/cycle/p")
            .expect("parents of p")
            .is_empty(),
        "rejected edge must not be stored"
    );

    let err = lineage
        .add_parents(&conn, "/cycle/x", ["/cycle/x"])
        .expect_err("self-parentage is the degenerate cycle");
    assert_eq!(err.code_str(), "validation");
}

/// Test Case 6: Transitive cycle rejection
///
/// The ancestor walk is transitive: closing a cycle through a chain of
/// intermediate edges is rejected just like a direct one.
#[test]
fn transitive_cycles_are_rejected() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();
    let lineage = LineageManager::new(&catalog);

    lineage
        .add_parents(&conn, "/chain/a", ["/chain/b"])
        .expect("a -> b");
    lineage
        .add_parents(&conn, "/chain/b", ["/chain/c"])
        .expect("b -> c");

    let err = lineage
        .add_parents(&conn, "/chain/c", ["/chain/a"])
        .expect_err("c -> a closes the loop");
    assert_eq!(err.code_str(), "validation");
    assert!(lineage
        .parent_lfns(&conn, "/chain/c")
        .expect("parents of c")
        .is_empty());
}

/// Test Case 7: Delete sweeps incident edges
///
/// Deleting a file removes lineage edges in both directions, so neither its
/// former parents nor its former children still reference it.
#[test]
fn delete_removes_edges_in_both_directions() {
    let conn = ledger();
    let catalog = QueryCatalog::sqlite();

    let mut middle = reco_file("/sweep/middle");
    middle.create(&conn, &catalog).expect("create middle");
    middle
        .add_parents(&conn, &catalog, ["/sweep/parent"])
        .expect("declare parent");
    middle
        .add_children(&conn, &catalog, ["/sweep/child"])
        .expect("declare child");

    middle.delete(&conn, &catalog).expect("delete middle");

    let lineage = LineageManager::new(&catalog);
    assert!(lineage
        .children(&conn, "/sweep/parent")
        .expect("children of parent")
        .is_empty());
    assert!(lineage
        .parent_lfns(&conn, "/sweep/child")
        .expect("parents of child")
        .is_empty());
}
