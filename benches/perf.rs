use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lfndb::{
    bootstrap_schema, open, Algorithm, DiscoveryQueries, FileRecord, LfndbConfig, QueryCatalog,
};
use rusqlite::Connection;
use tempfile::tempdir;

const DATASET: &str = "/Cosmics/CRUZET09-PromptReco-v1/RECO";
const SEEDED_ROWS: i64 = 1_000;

fn seed_lfn(id: i64) -> String {
    format!("/store/bench/seed-{id}.root")
}

fn seed_record(lfn: String) -> FileRecord {
    let mut record = FileRecord::new(lfn);
    record.set_size(1024);
    record.set_events(10);
    record.set_algorithm(Algorithm::new("cmsRun", "CMSSW_2_1_8", "RECO", "GIBBERISH"));
    record.set_dataset_path(DATASET);
    record.add_checksum("adler32", "201");
    record
}

fn seeded_store(config: &LfndbConfig, seed_rows: i64) -> (tempfile::TempDir, Connection) {
    let dir = tempdir().expect("temp");
    let mut conn = open(dir.path().join("ledger.db"), config).expect("open");
    bootstrap_schema(&conn).expect("schema");
    let catalog = QueryCatalog::sqlite();
    let tx = conn.transaction().expect("begin seed");
    for id in 1..=seed_rows {
        let mut record = seed_record(seed_lfn(id));
        record
            .set_location(&tx, &catalog, ["se1.fnal.gov"])
            .expect("seed location");
        record.create(&tx, &catalog).expect("seed file");
    }
    tx.commit().expect("commit seed");
    (dir, conn)
}

fn bench_ledger_hot_paths(c: &mut Criterion) {
    let (_seed_dir, conn) = seeded_store(&LfndbConfig::ephemeral(), SEEDED_ROWS);
    let catalog = QueryCatalog::sqlite();

    let mut next_create_id = SEEDED_ROWS + 1;
    c.bench_function("create_single_file", |b| {
        b.iter(|| {
            let id = black_box(next_create_id);
            next_create_id += 1;
            let mut record = seed_record(format!("/store/bench/fresh-{id}.root"));
            record.create(&conn, &catalog).expect("create");
        })
    });

    let mut next_load_id = 1_i64;
    c.bench_function("load_file_by_lfn", |b| {
        b.iter(|| {
            let id = black_box(next_load_id);
            next_load_id += 1;
            if next_load_id > SEEDED_ROWS {
                next_load_id = 1;
            }
            let mut record = FileRecord::new(seed_lfn(id));
            record.load(&conn, &catalog).expect("load");
        })
    });

    let discovery = DiscoveryQueries::new(&catalog);
    c.bench_function("uploadable_files_limit_100", |b| {
        b.iter(|| {
            let files = discovery
                .uploadable_files(&conn, DATASET, 100)
                .expect("uploadable files");
            black_box(files);
        })
    });

    c.bench_function("uploadable_datasets", |b| {
        b.iter(|| {
            let datasets = discovery
                .uploadable_datasets(&conn)
                .expect("uploadable datasets");
            black_box(datasets);
        })
    });

    let profiles = [
        ("durable", LfndbConfig::durable()),
        ("ephemeral", LfndbConfig::ephemeral()),
    ];
    for (profile_name, profile) in profiles {
        let (_dir, conn) = seeded_store(&profile, 0);
        let catalog = QueryCatalog::sqlite();
        let mut next_id = 1_i64;
        c.bench_function(&format!("create_single_file_{profile_name}"), |b| {
            b.iter(|| {
                let id = black_box(next_id);
                next_id += 1;
                let mut record = seed_record(format!("/store/bench/{profile_name}-{id}.root"));
                record.create(&conn, &catalog).expect("create");
            })
        });
    }
}

fn bench_end_to_end_bootstrap(c: &mut Criterion) {
    c.bench_function("e2e_bootstrap_create_and_load", |b| {
        b.iter(|| {
            let (_dir, conn) = seeded_store(&LfndbConfig::ephemeral(), 0);
            let catalog = QueryCatalog::sqlite();
            let mut record = seed_record(seed_lfn(1));
            record.create(&conn, &catalog).expect("create");
            let mut reread = FileRecord::new(seed_lfn(1));
            reread.load(&conn, &catalog).expect("load");
            black_box(reread);
        })
    });
}

criterion_group!(benches, bench_ledger_hot_paths, bench_end_to_end_bootstrap);
criterion_main!(benches);
