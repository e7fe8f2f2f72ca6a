use std::env;
use std::process;

use lfndb::{
    bootstrap_schema, open, DiscoveryQueries, LfndbConfig, LfndbError, QueryCatalog,
    SCHEMA_VERSION,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        print_usage();
        return Err("expected a command and a ledger path".into());
    }
    let command = args[1].as_str();
    let path = args[2].as_str();

    match command {
        "init" => init(path),
        "count" => count(path),
        "uploadable" => uploadable(path, &args[3..]),
        other => {
            print_usage();
            Err(format!("unknown command '{other}'"))
        }
    }
}

fn init(path: &str) -> Result<(), String> {
    let conn = open_ledger(path)?;
    drop(conn);
    let out = serde_json::json!({
        "path": path,
        "schema_version": SCHEMA_VERSION,
    });
    print_json(&out)
}

fn count(path: &str) -> Result<(), String> {
    let conn = open_ledger(path)?;
    let catalog = QueryCatalog::sqlite();
    let discovery = DiscoveryQueries::new(&catalog);
    let files = discovery.count_files(&conn).map_err(render)?;
    let out = serde_json::json!({ "files": files });
    print_json(&out)
}

fn uploadable(path: &str, flags: &[String]) -> Result<(), String> {
    let max_files: u64 = match parse_flag_value(flags, "--max") {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("--max expects an integer, got '{raw}'"))?,
        None => 100,
    };
    let conn = open_ledger(path)?;
    let catalog = QueryCatalog::sqlite();
    let discovery = DiscoveryQueries::new(&catalog);

    let mut report = Vec::new();
    for dataset in discovery.uploadable_datasets(&conn).map_err(render)? {
        let files = discovery
            .uploadable_files(&conn, &dataset, max_files)
            .map_err(render)?;
        report.push(serde_json::json!({
            "dataset": dataset,
            "files": files,
        }));
    }
    print_json(&serde_json::json!({ "uploadable": report }))
}

fn open_ledger(path: &str) -> Result<rusqlite::Connection, String> {
    let config = LfndbConfig::default();
    let conn = open(path, &config).map_err(render)?;
    bootstrap_schema(&conn).map_err(render)?;
    Ok(conn)
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    let position = args.iter().position(|arg| arg == flag)?;
    args.get(position + 1).cloned()
}

fn print_json(value: &serde_json::Value) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn render(err: LfndbError) -> String {
    format!("{} ({})", err, err.code_str())
}

fn print_usage() {
    eprintln!("usage: lfndb <command> <ledger-path> [flags]");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  init <path>                     create or verify a ledger file");
    eprintln!("  count <path>                    print the tracked file count");
    eprintln!("  uploadable <path> [--max N]     list uploadable datasets and files");
}
