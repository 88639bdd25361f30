use clap::Parser;
use sqljson::ast::ResultRepr;
use sqljson::compile::{GeneratedQuery, compile_query_group};
use sqljson::config::{load_dbmd, load_ddl, load_query_group};
use sqljson::dbmd::DatabaseMetadata;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Generate SQL/JSON queries and result types from query specs.
#[derive(Debug, Parser)]
#[command(name = "sqljson", version)]
struct Args {
    /// Query group spec (.json, .yaml or .yml)
    #[arg(short, long)]
    queries: PathBuf,

    /// Database metadata JSON document
    #[arg(long, conflicts_with = "ddl", required_unless_present = "ddl")]
    dbmd: Option<PathBuf>,

    /// SQL schema dump to read database metadata from
    #[arg(long)]
    ddl: Option<PathBuf>,

    /// Database product of the schema dump: postgres, oracle, generic (default: detect)
    #[arg(long, requires = "ddl")]
    product: Option<String>,

    /// Directory for generated SQL files (default: print to stdout)
    #[arg(short, long)]
    sql_dir: Option<PathBuf>,

    /// Output file for generated result types as JSON
    #[arg(short, long)]
    types_out: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let dbmd = match load_catalog(&args) {
        Ok(dbmd) => dbmd,
        Err(e) => {
            eprintln!("Failed to load database metadata: {}", e);
            process::exit(1);
        }
    };

    let group = match load_query_group(&args.queries) {
        Ok(group) => group,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.queries.display(), e);
            process::exit(1);
        }
    };

    let queries = match compile_query_group(&dbmd, &group) {
        Ok(queries) => queries,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            process::exit(1);
        }
    };

    match &args.sql_dir {
        Some(dir) => {
            if let Err(e) = write_sql_files(dir, &queries) {
                eprintln!("Failed to write SQL files to {}: {}", dir.display(), e);
                process::exit(1);
            }
        }
        None => {
            for query in &queries {
                for (repr, sql) in &query.sqls {
                    println!("-- [{}] {}\n{};\n", query.query_name, repr.as_str(), sql);
                }
            }
        }
    }

    if let Some(path) = &args.types_out {
        let types: Vec<_> = queries
            .iter()
            .filter_map(|q| q.result_type.as_ref().map(|t| (q.query_name.as_str(), t)))
            .collect();
        let json = match serde_json::to_string_pretty(&types) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Failed to serialize result types: {}", e);
                process::exit(1);
            }
        };
        if let Err(e) = fs::write(path, json) {
            eprintln!("Failed to write {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn load_catalog(args: &Args) -> Result<DatabaseMetadata, sqljson::config::LoadError> {
    match (&args.dbmd, &args.ddl) {
        (Some(path), _) => load_dbmd(path),
        (None, Some(path)) => load_ddl(path, args.product.as_deref()),
        (None, None) => unreachable!("clap requires --dbmd or --ddl"),
    }
}

/// One file per query, named `<query>.sql`, or `<query>-<repr>.sql` when the
/// query has several result representations.
fn write_sql_files(dir: &Path, queries: &[GeneratedQuery]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    for query in queries {
        for (repr, sql) in &query.sqls {
            let path = dir.join(sql_file_name(&query.query_name, *repr, query.sqls.len() > 1));
            fs::write(&path, format!("{}\n", sql))?;
            tracing::debug!(path = %path.display(), "wrote sql");
        }
    }
    Ok(())
}

fn sql_file_name(query_name: &str, repr: ResultRepr, qualify: bool) -> String {
    let base: String = query_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if qualify {
        format!("{}-{}.sql", base, repr.as_str().to_lowercase().replace('_', "-"))
    } else {
        format!("{}.sql", base)
    }
}
