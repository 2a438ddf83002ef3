use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use log::info;

use smart_gate::config::GateConfig;
use smart_gate::plate_number::{PlateNumber, PlateValidator};
use smart_gate::storage::{Database, WhitelistInsert};

/// Inspects and edits the arrival log and the whitelist.
#[derive(Parser, Debug)]
#[command(name = "gate_admin", version)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print listings as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plates allowed through the gate.
    #[command(subcommand)]
    Whitelist(WhitelistCommand),
    /// Logged plate arrivals.
    #[command(subcommand)]
    Arrivals(ArrivalsCommand),
}

#[derive(Subcommand, Debug)]
enum WhitelistCommand {
    List,
    Add { plate: String },
    Rename { id: i64, plate: String },
}

#[derive(Subcommand, Debug)]
enum ArrivalsCommand {
    List {
        /// Only arrivals of this plate.
        #[arg(long)]
        plate: Option<String>,
    },
    Add {
        plate: String,
        /// Arrival time, RFC 3339 or `YYYY-MM-DD HH:MM:SS` in UTC. Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
    Edit {
        id: i64,
        plate: String,
        timestamp: String,
    },
}

fn parse_plate(validator: &PlateValidator, raw: &str) -> Result<PlateNumber> {
    validator
        .parse(raw)
        .ok_or_else(|| anyhow!("'{raw}' is not a valid plate number"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    bail!("'{value}' is not a timestamp")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_whitelist(
    db: &Database,
    validator: &PlateValidator,
    command: WhitelistCommand,
    json: bool,
) -> Result<()> {
    match command {
        WhitelistCommand::List => {
            let entries = db.list_whitelist()?;
            if json {
                return print_json(&entries);
            }
            for entry in entries {
                println!("{:>6}  {}", entry.id, entry.plate_number);
            }
        }
        WhitelistCommand::Add { plate } => {
            let plate = parse_plate(validator, &plate)?;
            match db.insert_whitelist(&plate)? {
                WhitelistInsert::Added(id) => println!("Added {plate} (id {id})"),
                WhitelistInsert::AlreadyPresent => println!("{plate} is already whitelisted"),
            }
        }
        WhitelistCommand::Rename { id, plate } => {
            let plate = parse_plate(validator, &plate)?;
            db.update_whitelist(id, &plate)
                .with_context(|| format!("Failed to rename whitelist entry {id}"))?;
            println!("Whitelist entry {id} is now {plate}");
        }
    }
    Ok(())
}

fn run_arrivals(
    db: &Database,
    validator: &PlateValidator,
    command: ArrivalsCommand,
    json: bool,
) -> Result<()> {
    match command {
        ArrivalsCommand::List { plate } => {
            let arrivals = match plate {
                Some(plate) => db.arrivals_for(&parse_plate(validator, &plate)?)?,
                None => db.list_arrivals()?,
            };
            if json {
                return print_json(&arrivals);
            }
            for arrival in &arrivals {
                println!(
                    "{:>6}  {:<10}  {}",
                    arrival.id,
                    arrival.plate_number,
                    arrival.timestamp.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("{} of {} arrivals", arrivals.len(), db.count_arrivals()?);
        }
        ArrivalsCommand::Add { plate, at } => {
            let plate = parse_plate(validator, &plate)?;
            let at = match at {
                Some(at) => parse_datetime(&at)?,
                None => Utc::now(),
            };
            let id = db.insert_arrival(&plate, at)?;
            println!("Logged arrival {id} for {plate}");
        }
        ArrivalsCommand::Edit {
            id,
            plate,
            timestamp,
        } => {
            let plate = parse_plate(validator, &plate)?;
            let timestamp = parse_datetime(&timestamp)?;
            db.update_arrival(id, &plate, timestamp)
                .with_context(|| format!("Failed to update arrival {id}"))?;
            println!("Arrival {id} updated");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let mut config =
        GateConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    let validator = config.plate_validator()?;

    let db = Database::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;
    info!("Using database {}", config.database_path.display());

    match args.command {
        Command::Whitelist(command) => run_whitelist(&db, &validator, command, args.json),
        Command::Arrivals(command) => run_arrivals(&db, &validator, command, args.json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-01 08:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024-03-01 08:30").unwrap(), expected);
        assert_eq!(parse_datetime("2024-03-01T11:30:00+03:00").unwrap(), expected);
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_cli_parses_nested_subcommands() {
        let args = Args::try_parse_from(["gate_admin", "--json", "whitelist", "add", "444BOP02"])
            .unwrap();
        assert!(args.json);
        assert!(matches!(
            args.command,
            Command::Whitelist(WhitelistCommand::Add { ref plate }) if plate == "444BOP02"
        ));
    }
}
