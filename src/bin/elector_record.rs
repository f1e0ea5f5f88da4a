//! CLI entry point for elector-record: election record export/import tool.

use clap::{Parser, Subcommand};
use lease_elector::serialization::{export_record, import_record, ImportOptions};
use lease_elector::storage::sqlite::DEFAULT_NAMESPACE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "elector-record", about = "Election record export/import tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the election record to JSON
    Export {
        #[arg(long, default_value = "elector.example.yaml")]
        config: PathBuf,
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long, default_value = "-")]
        output: String,
    },
    /// Import an election record from JSON, overwriting the stored one
    Import {
        #[arg(long, default_value = "elector.example.yaml")]
        config: PathBuf,
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long, default_value = "-")]
        input: String,
        /// Drop the leader pointer so the fleet re-elects
        #[arg(long, default_value_t = false)]
        clear_leader: bool,
    },
}

/// Database path and namespace from `storage.sqlite` in the YAML config,
/// with command-line overrides applied.
fn resolve_target(
    config_path: &PathBuf,
    db: Option<String>,
    namespace: Option<String>,
) -> Result<(String, String), Box<dyn std::error::Error>> {
    if let (Some(db), Some(namespace)) = (&db, &namespace) {
        return Ok((db.clone(), namespace.clone()));
    }
    let content = std::fs::read_to_string(config_path)?;
    let raw: serde_yaml::Value = serde_yaml::from_str(&content)?;
    let sqlite = raw.get("storage").and_then(|s| s.get("sqlite"));
    let path = sqlite
        .and_then(|s| s.get("path"))
        .and_then(|p| p.as_str())
        .unwrap_or("./data/election.db");
    let ns = sqlite
        .and_then(|s| s.get("namespace"))
        .and_then(|n| n.as_str())
        .unwrap_or(DEFAULT_NAMESPACE);
    Ok((
        db.unwrap_or_else(|| path.to_string()),
        namespace.unwrap_or_else(|| ns.to_string()),
    ))
}

fn main() {
    let cli = Cli::parse();
    let rc = match cli.command {
        Commands::Export {
            config,
            db,
            namespace,
            output,
        } => run_export(config, db, namespace, output),
        Commands::Import {
            config,
            db,
            namespace,
            input,
            clear_leader,
        } => run_import(config, db, namespace, input, clear_leader),
    };
    std::process::exit(rc);
}

fn run_export(
    config: PathBuf,
    db: Option<String>,
    namespace: Option<String>,
    output: String,
) -> i32 {
    let (db_path, namespace) = match resolve_target(&config, db, namespace) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return 1;
        }
    };

    match export_record(&db_path, &namespace) {
        Ok(result) => {
            if output == "-" {
                println!("{}", result);
            } else {
                if let Err(e) = std::fs::write(&output, format!("{}\n", result)) {
                    eprintln!("Error writing output: {}", e);
                    return 1;
                }
                eprintln!("Exported to {}", output);
            }
            0
        }
        Err(e) => {
            eprintln!("Error exporting: {}", e);
            1
        }
    }
}

fn run_import(
    config: PathBuf,
    db: Option<String>,
    namespace: Option<String>,
    input: String,
    clear_leader: bool,
) -> i32 {
    let (db_path, namespace) = match resolve_target(&config, db, namespace) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return 1;
        }
    };

    let json_str = if input == "-" {
        use std::io::Read;
        let mut buf = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
            eprintln!("Error reading stdin: {}", e);
            return 1;
        }
        buf
    } else {
        match std::fs::read_to_string(&input) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                return 1;
            }
        }
    };

    let opts = ImportOptions { clear_leader };
    match import_record(&db_path, &namespace, &json_str, &opts) {
        Ok(result) => {
            eprintln!(
                "  {}: {} members imported (version {})",
                namespace, result.members, result.version
            );
            for w in &result.warnings {
                eprintln!("  WARNING: {}", w);
            }
            0
        }
        Err(e) => {
            eprintln!("Error importing: {}", e);
            1
        }
    }
}
