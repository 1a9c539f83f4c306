use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mdp_cdn::{CdnProvider, PurgeMode, StaticCdnProvider, StatsRange};
use mdp_model::ObjectKey;
use mdp_optimizer::IdentityCodec;
use mdp_pipeline::{MediaPipeline, PipelineConfig};
use mdp_transfer::{InMemoryStore, LocalDirStore, ObjectStore, DEFAULT_PRESIGN_EXPIRY};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("media-deploy")
        .version(mdp_pipeline::VERSION)
        .about("Optimize, upload and cache-invalidate media assets")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("store-dir")
                .long("store-dir")
                .global(true)
                .default_value("./media-store")
                .value_parser(value_parser!(PathBuf))
                .help("Directory backing the object store"),
        )
        .arg(
            Arg::new("in-memory")
                .long("in-memory")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Use a throwaway in-memory object store"),
        )
        .arg(
            Arg::new("deadline-secs")
                .long("deadline-secs")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Abort the command after this many seconds"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .subcommand(
            Command::new("deploy")
                .about("Deploy a directory tree")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to deploy"),
                )
                .arg(
                    Arg::new("no-optimize")
                        .long("no-optimize")
                        .action(ArgAction::SetTrue)
                        .help("Upload images without re-encoding"),
                ),
        )
        .subcommand(
            Command::new("process")
                .about("Run one file through every pipeline step")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Image to process"),
                )
                .arg(
                    Arg::new("no-thumbnails")
                        .long("no-thumbnails")
                        .action(ArgAction::SetTrue)
                        .help("Skip thumbnail generation"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check that a key is stored and served")
                .arg(Arg::new("key").required(true).help("Object key")),
        )
        .subcommand(
            Command::new("purge")
                .about("Purge paths from the edge cache")
                .arg(
                    Arg::new("paths")
                        .required(true)
                        .num_args(1..)
                        .help("Paths to purge"),
                )
                .arg(
                    Arg::new("wait")
                        .long("wait")
                        .action(ArgAction::SetTrue)
                        .help("Wait for the purge to complete"),
                ),
        )
        .subcommand(
            Command::new("presign")
                .about("Issue a time-limited download URL for a stored key")
                .arg(Arg::new("key").required(true).help("Object key"))
                .arg(
                    Arg::new("expires-secs")
                        .long("expires-secs")
                        .value_parser(value_parser!(u64))
                        .help("URL lifetime in seconds [default: 3600]"),
                ),
        )
        .subcommand(
            Command::new("cache-stats")
                .about("Show edge cache hit rate and traffic")
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_parser(parse_date)
                        .help("First day, YYYY-MM-DD"),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_parser(parse_date)
                        .help("Last day, YYYY-MM-DD [default: today]"),
                ),
        )
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("{raw}: {e}"))
}

fn stats_range(args: &ArgMatches) -> StatsRange {
    let end = args
        .get_one::<NaiveDate>("to")
        .copied()
        .unwrap_or_else(|| Utc::now().date_naive());
    match args.get_one::<NaiveDate>("from") {
        Some(start) => StatsRange::new(*start, end),
        None => StatsRange::ending_on(end),
    }
}

fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn build_pipeline(matches: &ArgMatches) -> Result<MediaPipeline> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let store: Arc<dyn ObjectStore> = if matches.get_flag("in-memory") {
        Arc::new(InMemoryStore::with_buckets([config.pipeline.bucket.as_str()]))
    } else {
        let dir = matches
            .get_one::<PathBuf>("store-dir")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("./media-store"));
        Arc::new(LocalDirStore::new(dir))
    };
    let provider: Arc<dyn CdnProvider> =
        Arc::new(StaticCdnProvider::new(config.cdn.probe_timeout())?);

    Ok(MediaPipeline::new(
        config,
        store,
        provider,
        Arc::new(IdentityCodec),
    ))
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

async fn with_deadline<F, T>(deadline: Option<u64>, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match deadline {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .with_context(|| format!("deadline of {secs}s exceeded")),
        None => Ok(fut.await),
    }
}

async fn run(matches: ArgMatches) -> Result<bool> {
    let pipeline = build_pipeline(&matches)?;
    let deadline = matches.get_one::<u64>("deadline-secs").copied();

    match matches.subcommand() {
        Some(("deploy", args)) => {
            let Some(dir) = args.get_one::<PathBuf>("dir") else {
                bail!("missing directory");
            };
            let optimize = !args.get_flag("no-optimize");
            let report = with_deadline(deadline, pipeline.deploy_tree(dir, optimize)).await?;
            print_json(&report)?;
            Ok(report.success)
        }
        Some(("process", args)) => {
            let Some(file) = args.get_one::<PathBuf>("file") else {
                bail!("missing file");
            };
            let thumbnails = !args.get_flag("no-thumbnails");
            let run =
                with_deadline(deadline, pipeline.process_asset(file, thumbnails, None)).await?;
            print_json(&run)?;
            Ok(run.success())
        }
        Some(("verify", args)) => {
            let Some(raw) = args.get_one::<String>("key") else {
                bail!("missing key");
            };
            let key = ObjectKey::new(raw)?;
            let report = with_deadline(deadline, pipeline.verify_deployment(&key)).await?;
            print_json(&report)?;
            Ok(report.verification_passed)
        }
        Some(("purge", args)) => {
            let paths: Vec<String> = args
                .get_many::<String>("paths")
                .map(|p| p.cloned().collect())
                .unwrap_or_default();
            let wait = args.get_flag("wait");
            let cdn = pipeline.cdn();

            let job = with_deadline(deadline, cdn.request_purge(&paths, PurgeMode::Paths)).await??;
            if wait {
                let outcome = with_deadline(deadline, cdn.wait_with_defaults(&job.id)).await?;
                print_json(&outcome)?;
                Ok(outcome.is_completed())
            } else {
                print_json(&job)?;
                Ok(true)
            }
        }
        Some(("presign", args)) => {
            let Some(raw) = args.get_one::<String>("key") else {
                bail!("missing key");
            };
            let key = ObjectKey::new(raw)?;
            let expires_in = args
                .get_one::<u64>("expires-secs")
                .map_or(DEFAULT_PRESIGN_EXPIRY, |secs| Duration::from_secs(*secs));
            let bucket = &pipeline.config().pipeline.bucket;
            let url = with_deadline(
                deadline,
                pipeline.transfer().presigned_url(bucket, &key, expires_in),
            )
            .await??;
            print_json(&serde_json::json!({
                "key": key.as_str(),
                "url": url,
                "expires_in_secs": expires_in.as_secs(),
            }))?;
            Ok(true)
        }
        Some(("cache-stats", args)) => {
            let range = stats_range(args);
            let stats =
                with_deadline(deadline, pipeline.cdn().cache_statistics(Some(range))).await??;
            print_json(&stats)?;
            Ok(true)
        }
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let log_format = matches
        .get_one::<String>("log-format")
        .map_or("text", String::as_str);
    init_logging(log_format);

    match run(matches).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            tracing::error!("{:#}", err);
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn global_options_parse_after_subcommand() {
        let matches = cli()
            .try_get_matches_from([
                "media-deploy",
                "purge",
                "/a.webp",
                "/b.webp",
                "--wait",
                "--in-memory",
                "--deadline-secs",
                "30",
            ])
            .unwrap();
        assert!(matches.get_flag("in-memory"));
        assert_eq!(matches.get_one::<u64>("deadline-secs"), Some(&30));
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "purge");
        assert_eq!(args.get_many::<String>("paths").unwrap().count(), 2);
        assert!(args.get_flag("wait"));
    }

    #[test]
    fn cache_stats_range_defaults() {
        let matches = cli()
            .try_get_matches_from(["media-deploy", "cache-stats", "--to", "2025-10-28"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let range = stats_range(args);
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 10, 28).unwrap());
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());

        let matches = cli()
            .try_get_matches_from(["media-deploy", "cache-stats", "--from", "2025-09-01"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let range = stats_range(args);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        assert_eq!(range.end, Utc::now().date_naive());

        assert!(cli()
            .try_get_matches_from(["media-deploy", "cache-stats", "--from", "01/09/2025"])
            .is_err());
    }

    #[test]
    fn presign_takes_optional_lifetime() {
        let matches = cli()
            .try_get_matches_from(["media-deploy", "presign", "docs/a.pdf", "--expires-secs", "60"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "presign");
        assert_eq!(args.get_one::<u64>("expires-secs"), Some(&60));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(cli().try_get_matches_from(["media-deploy"]).is_err());
    }
}
