#![cfg(not(tarpaulin_include))]

use gene_annotator::auth::FixedUser;
use gene_annotator::cache::GeneCache;
use gene_annotator::config::Config;
use gene_annotator::downloader;
use gene_annotator::error::{AppError, AppResult};
use gene_annotator::gateway::lookup_gateway;
use gene_annotator::import::{self, ImportKind};
use gene_annotator::reconcile::Reconciler;
use gene_annotator::store::open_store;
use gene_annotator::table::{self, TableFilter};

use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

fn usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {program} import <genes|clones> <file> [user-id]");
    eprintln!("  {program} export <file> [search] [user-id]");
    eprintln!("  {program} resolve <symbol>");
    eprintln!("  {program} template <genes|clones>");
}

/// A parsed command line
enum Command {
    Import {
        kind: ImportKind,
        path: String,
        user: FixedUser,
    },
    Export {
        path: String,
        search: Option<String>,
        viewer: Option<Uuid>,
    },
    Resolve {
        symbol: String,
    },
    Template {
        kind: ImportKind,
    },
}

fn parse_command(args: &[String]) -> AppResult<Option<Command>> {
    let command = match (args.first().map(String::as_str), args.len()) {
        (Some("import"), 3 | 4) => Command::Import {
            kind: args[1].parse()?,
            path: args[2].clone(),
            user: FixedUser(parse_user(args.get(3))?),
        },
        (Some("export"), 2..=4) => Command::Export {
            path: args[1].clone(),
            search: args.get(2).filter(|s| !s.is_empty()).cloned(),
            viewer: parse_user(args.get(3))?,
        },
        (Some("resolve"), 2) => Command::Resolve {
            symbol: args[1].clone(),
        },
        (Some("template"), 2) => Command::Template {
            kind: args[1].parse()?,
        },
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn parse_user(arg: Option<&String>) -> AppResult<Option<Uuid>> {
    arg.map(|id| {
        Uuid::parse_str(id)
            .map_err(|e| AppError::InvalidInput(format!("invalid user id '{id}': {e}")))
    })
    .transpose()
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("gene-cli");

    let result = match parse_command(args.get(1..).unwrap_or_default()) {
        Ok(Some(command)) => run(command).await,
        Ok(None) => {
            usage(program);
            return ExitCode::FAILURE;
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for message in e.messages() {
                eprintln!("Error: {message}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> AppResult<()> {
    match command {
        Command::Template { kind } => {
            print!("{}", kind.template());
            Ok(())
        }
        Command::Import { kind, path, user } => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let file = File::open(&path)?;

            let summary = import::import_csv(file, kind, &user, store.as_ref(), |progress| {
                eprint!("\rImporting {kind}... {progress:>3}%");
                let _ = io::stderr().flush();
            })
            .await?;
            eprintln!();

            println!(
                "Successfully imported {} {kind}. {} failed.",
                summary.success_count, summary.fail_count
            );
            for failure in &summary.failures {
                println!("  {failure}");
            }
            Ok(())
        }
        Command::Export {
            path,
            search,
            viewer,
        } => {
            let filter = TableFilter::from_params(search.as_deref(), None, None)?;

            let config = Config::load()?;
            let reconciler = reconciler(&config)?;
            let records = reconciler.records(viewer).await?;
            let rows = filter.apply(table::flatten(&records, config.classification));

            if path.ends_with(".xlsx") {
                #[cfg(feature = "web")]
                fs::write(&path, downloader::to_xlsx(&rows)?)?;
                #[cfg(not(feature = "web"))]
                return Err(AppError::InvalidInput(
                    "XLSX export needs the web feature".to_string(),
                ));
            } else {
                fs::write(&path, downloader::to_csv(&rows)?)?;
            }

            println!("Exported {} rows to {path}", rows.len());
            Ok(())
        }
        Command::Resolve { symbol } => {
            let config = Config::load()?;
            let reconciler = reconciler(&config)?;
            reconciler.cache().refresh(reconciler.store().as_ref()).await?;

            let record = reconciler.resolve(&symbol, None).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}

fn reconciler(config: &Config) -> AppResult<Reconciler> {
    Ok(Reconciler::new(
        open_store(config)?,
        lookup_gateway(config)?,
        Arc::new(GeneCache::new()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn export_takes_an_optional_viewer() {
        let id = Uuid::new_v4();
        let parsed = parse_command(&args(&["export", "out.csv", "", &id.to_string()])).unwrap();
        match parsed {
            Some(Command::Export {
                path,
                search,
                viewer,
            }) => {
                assert_eq!(path, "out.csv");
                assert_eq!(search, None);
                assert_eq!(viewer, Some(id));
            }
            _ => panic!("expected an export command"),
        }

        match parse_command(&args(&["export", "out.csv"])).unwrap() {
            Some(Command::Export { viewer, .. }) => assert_eq!(viewer, None),
            _ => panic!("expected an export command"),
        }
    }

    #[test]
    fn bad_user_id_is_rejected() {
        let err = parse_command(&args(&["export", "out.csv", "brca", "not-a-uuid"]))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(parse_command(&args(&["export"])).unwrap().is_none());
    }
}
