//! Autostub CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use autostub::config::Config;
use autostub::decider::decide_mode;
use autostub::fixture::{FixtureStore, JsonFileStore, SpecFile, FIXTURE_SUFFIX};
use autostub::stub::replay_stubs;

fn usage() {
    eprintln!("Autostub v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: autostub <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  stats <fixtures-dir>               Summarize every fixture file");
    eprintln!("  show <fixture> [title]             List test cases, or one test case's records");
    eprintln!("  mode <config.toml> <spec> <title>  Print whether a test case records or replays");
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autostub=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
        process::exit(1);
    }

    let result = match (args[1].as_str(), &args[2..]) {
        ("stats", [dir]) => stats(Path::new(dir)).await,
        ("show", [fixture]) => show(Path::new(fixture), None).await,
        ("show", [fixture, title]) => show(Path::new(fixture), Some(title)).await,
        ("mode", [config, spec, title]) => mode(Path::new(config), spec, title).await,
        ("stats" | "show" | "mode", _) => {
            usage();
            process::exit(1);
        }
        (command, _) => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'autostub' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn find_fixtures(dir: &Path, found: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            find_fixtures(&path, found)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(FIXTURE_SUFFIX))
        {
            found.push(path);
        }
    }

    Ok(())
}

async fn stats(dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let mut fixtures = Vec::new();
    find_fixtures(dir, &mut fixtures)?;
    fixtures.sort();

    let store = JsonFileStore::new();
    let mut tests = 0;
    let mut records = 0;

    println!("Fixture directory: {}", dir.display());
    println!();
    for path in &fixtures {
        let doc = store.read(path).await?;
        let stubbable = doc
            .iter()
            .flat_map(|(_, rec)| &rec.records)
            .filter(|r| !r.is_get())
            .count();
        let name = path.strip_prefix(dir).unwrap_or(path);

        println!(
            "{}: {} test cases, {} records ({} stubbed on replay)",
            name.display(),
            doc.len(),
            doc.total_records(),
            stubbable
        );
        tests += doc.len();
        records += doc.total_records();
    }

    println!();
    println!(
        "{} fixtures, {} test cases, {} records",
        fixtures.len(),
        tests,
        records
    );
    Ok(())
}

async fn show(fixture: &Path, title: Option<&String>) -> anyhow::Result<()> {
    let doc = JsonFileStore::new().read(fixture).await?;

    let Some(title) = title else {
        for (title, rec) in doc.iter() {
            println!("{title}  [{} records, {}]", rec.records.len(), rec.timestamp);
        }
        return Ok(());
    };

    let Some(rec) = doc.get(title) else {
        bail!("No recording for {title:?} in {}", fixture.display());
    };

    println!("{title} (recorded {})", rec.timestamp);
    for record in &rec.records {
        println!(
            "  {:<6} {:<3} host#{:<2} {}",
            record.method, record.status, record.match_host_index, record.url
        );
    }
    Ok(())
}

async fn mode(config_path: &Path, spec: &str, title: &str) -> anyhow::Result<()> {
    let mut config = Config::from_file(config_path)?;
    config.apply_env()?;

    let spec = SpecFile::new(spec);
    let path = spec.fixture_path(
        &config.fixtures_dir,
        &config.integration_folder,
        &config.spec_suffix,
    )?;

    let store = JsonFileStore::new();
    let mode = decide_mode(&store, config.force_api_recording, &path, title).await?;
    println!("{} ({})", mode.as_str(), path.display());

    if mode.is_replay() {
        let doc = store.read(&path).await?;
        if let Some(rec) = doc.get(title) {
            let plan = replay_stubs(rec, &config.hosts());
            println!(
                "{} stubs, {} GET left live, {} unresolvable",
                plan.stubs.len(),
                plan.skipped_get,
                plan.skipped_unresolved.len()
            );
        }
    }
    Ok(())
}
