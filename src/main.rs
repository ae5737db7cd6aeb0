use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use price_catalog::db::{find_stores_by_name, get_package};
use price_catalog::session::{parse_compact_date, parse_money};
use price_catalog::{
    best_prices, count_prices, delete_price, import_purchases, insert_price, load_csv,
    mark_known_duplicate, prices_for_package, recent_prices, run_checks, setup_database,
    toggle_hide, CatalogConfig, CatalogTable, FilterPredicate, Mark, Origin, SessionContext,
};

const USAGE: &str = "Usage: price-catalog <command>

Commands:
  import <csv>                               Import purchases from CSV
  best [field=value | field~value]... [--highlight ID]
                                             Best-price frontier
  recent [N]                                 Most recently entered prices
  check                                      Run consistency checks
  add --store NAME --package ID --price 1.99 [--date YYYYMMDD] [--origin offline|website]
                                             Record a purchase
  undo                                       Delete the most recent price
  history <package-id>                       Price history of one package
  hide <brand|store|product|package|price> <id>
                                             Toggle the hide flag
  sic <price-id> [--clear]                   Mark a price as a known duplicate";

fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("price_catalog=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = CatalogConfig::load()?;
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    setup_database(&conn)?;

    let rest = &args[2..];
    match args[1].as_str() {
        "import" => run_import(&conn, rest),
        "best" => run_best(&conn, rest),
        "recent" => run_recent(&conn, &config, rest),
        "check" => run_check(&conn),
        "add" => run_add(&conn, rest),
        "undo" => run_undo(&conn),
        "history" => run_history(&conn, rest),
        "hide" => run_hide(&conn, rest),
        "sic" => run_sic(&conn, rest),
        other => {
            eprintln!("❌ Unknown command: {}\n", other);
            println!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn run_import(conn: &Connection, args: &[String]) -> Result<()> {
    let Some(csv_path) = args.first() else {
        bail!("import needs a CSV path");
    };

    println!("📂 Loading CSV...");
    let rows = load_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} purchases from CSV", rows.len());

    println!("\n💾 Inserting purchases...");
    let inserted = import_purchases(conn, &rows)?;
    println!("✓ Inserted {} prices", inserted);
    println!("✓ Database contains {} prices", count_prices(conn)?);

    Ok(())
}

fn run_best(conn: &Connection, args: &[String]) -> Result<()> {
    let mut predicates = Vec::new();
    let mut highlight = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--highlight" {
            let id = iter.next().context("--highlight needs a price id")?;
            highlight = Some(id.parse::<i64>().with_context(|| format!("Invalid price id '{}'", id))?);
        } else {
            predicates.push(FilterPredicate::parse(arg)?);
        }
    }

    let selected = best_prices(conn, Some(&predicates), highlight)?;
    if selected.is_empty() {
        println!("No prices match");
        return Ok(());
    }

    for entry in &selected {
        let obs = &entry.observation;
        let mark = match entry.mark {
            Mark::Highlighted => "▶",
            Mark::CurrentBest => "★",
            Mark::None => " ",
        };
        let folded = if entry.discarded > 0 {
            format!(" (+{} older)", entry.discarded)
        } else {
            String::new()
        };

        println!(
            "{} #{:<5} {}  {:>10}  {:<20} {}{}",
            mark,
            obs.id,
            obs.date,
            entry.rate.to_string(),
            obs.store_name,
            obs.package_description(),
            folded
        );
    }

    Ok(())
}

fn run_recent(conn: &Connection, config: &CatalogConfig, args: &[String]) -> Result<()> {
    let limit = match args.first() {
        Some(n) => n.parse().with_context(|| format!("Invalid count '{}'", n))?,
        None => config.recent_limit,
    };

    for obs in recent_prices(conn, limit)? {
        println!(
            "#{:<5} {}  {:>8.2}  {:<20} {}",
            obs.id,
            obs.date,
            obs.price as f64 / 100.0,
            obs.store_name,
            obs.package_description()
        );
    }

    Ok(())
}

fn run_check(conn: &Connection) -> Result<()> {
    println!("🔍 Checking catalog...");
    let report = run_checks(conn)?;

    for finding in &report.findings {
        println!("  {}", finding);
    }

    println!("\n{}", report.summary());
    if report.is_clean() {
        println!("✅ No issues found");
    }

    Ok(())
}

fn run_add(conn: &Connection, args: &[String]) -> Result<()> {
    let mut store = None;
    let mut package = None;
    let mut price = None;
    let mut session = SessionContext::new();

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .with_context(|| format!("{} needs a value", flag))?;

        match flag.as_str() {
            "--store" => store = Some(value.as_str()),
            "--package" => {
                package = Some(value.parse::<i64>().with_context(|| format!("Invalid package id '{}'", value))?)
            }
            "--price" => price = Some(parse_money(value)?),
            "--date" => session = session.with_date(parse_compact_date(value)?),
            "--origin" => session = session.with_origin(value.parse::<Origin>()?),
            other => bail!("Unknown option: {}", other),
        }
    }

    if let Some(name) = store {
        session = session.with_store(resolve_store(conn, name)?);
    }
    let package = package.context("--package is required")?;
    let price = price.context("--price is required")?;

    let id = insert_price(conn, &session, package, price)?;
    println!("✓ Recorded price #{}", id);

    Ok(())
}

/// Exact name wins; otherwise the pattern must pick out a single store
fn resolve_store(conn: &Connection, name: &str) -> Result<i64> {
    let stores = find_stores_by_name(conn, name)?;

    if let Some(store) = stores.iter().find(|s| s.name == name) {
        return Ok(store.id);
    }

    match stores.as_slice() {
        [store] => Ok(store.id),
        [] => bail!("No store matches '{}'", name),
        _ => {
            let names: Vec<&str> = stores.iter().map(|s| s.name.as_str()).collect();
            bail!("'{}' matches several stores: {}", name, names.join(", "))
        }
    }
}

fn run_undo(conn: &Connection) -> Result<()> {
    let Some(last) = recent_prices(conn, 1)?.into_iter().next() else {
        println!("Nothing to undo");
        return Ok(());
    };

    if delete_price(conn, last.id)? {
        println!(
            "✓ Deleted price #{} ({} at {})",
            last.id,
            last.package_description(),
            last.store_name
        );
    }

    Ok(())
}

fn parse_id(arg: Option<&String>, what: &str) -> Result<i64> {
    let text = arg.with_context(|| format!("{} needs an id", what))?;
    text.parse().with_context(|| format!("Invalid id '{}'", text))
}

fn run_history(conn: &Connection, args: &[String]) -> Result<()> {
    let package_id = parse_id(args.first(), "history")?;
    let Some(package) = get_package(conn, package_id)? else {
        bail!("No package #{}", package_id);
    };

    println!("📈 {}", package.description());
    for obs in prices_for_package(conn, package_id)? {
        let rate = obs.rate()?;
        println!(
            "#{:<5} {}  {:>8.2}  {:>10}  {}",
            obs.id,
            obs.date,
            obs.price as f64 / 100.0,
            rate.to_string(),
            obs.store_name
        );
    }

    Ok(())
}

fn run_hide(conn: &Connection, args: &[String]) -> Result<()> {
    let table = match args.first().map(String::as_str) {
        Some("brand") => CatalogTable::Brands,
        Some("store") => CatalogTable::Stores,
        Some("product") => CatalogTable::Products,
        Some("package") => CatalogTable::Packages,
        Some("price") => CatalogTable::Prices,
        Some(other) => bail!("Unknown table: {}", other),
        None => bail!("hide needs a table and an id"),
    };
    let id = parse_id(args.get(1), "hide")?;

    if !toggle_hide(conn, table, id)? {
        bail!("No {:?} row #{}", table, id);
    }
    println!("✓ Toggled hide on {:?} #{}", table, id);

    Ok(())
}

fn run_sic(conn: &Connection, args: &[String]) -> Result<()> {
    let id = parse_id(args.first(), "sic")?;
    let known = !args.iter().any(|a| a == "--clear");

    if !mark_known_duplicate(conn, id, known)? {
        bail!("No price #{}", id);
    }
    if known {
        println!("✓ Price #{} marked as a known duplicate", id);
    } else {
        println!("✓ Price #{} no longer marked as a known duplicate", id);
    }

    Ok(())
}
