//! `lofter`: upload files and directory trees to object storage.

mod error;
mod logging;
mod upload;

use crate::error::{ErrorKind, Result};
use clap::{Parser, ValueEnum};
use exn::ResultExt;
use lofter_config::{Config, Overwrite, Provider};
use lofter_storage::{LocalObject, LocalOperator};
use lofter_upload::{Job, ObjectFn, Stats};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "lofter", version, about = "Upload files and directory trees to object storage")]
struct Cli {
    /// Profile to load [default: profile.yaml in the user configuration directory]
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Replace objects that already exist at the destination
    #[arg(long, value_enum)]
    overwrite: Option<OverwriteArg>,

    /// Print the object keys an upload would produce, then exit
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Files and directories to upload, on top of those in the profile
    paths: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OverwriteArg {
    Never,
    Always,
}
impl From<OverwriteArg> for Overwrite {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Never => Self::Never,
            OverwriteArg::Always => Self::Always,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match configure(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lofter: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!("lofter: {e}");
        return ExitCode::FAILURE;
    }

    if cli.dry_run {
        for (path, key) in upload::plan(&config).await {
            println!("{} -> {key}", path.display());
        }
        return ExitCode::SUCCESS;
    }

    match execute(Arc::new(config)).await {
        Ok(stats) => {
            summarize(&stats);
            match stats.failed().count {
                0 => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            }
        },
        Err(e) => {
            tracing::error!(error = ?e, "{e}");
            ExitCode::FAILURE
        },
    }
}

/// Load the profile and fold the command line into it.
fn configure(cli: &Cli) -> lofter_config::error::Result<Config> {
    let mut config = Config::load(cli.profile.as_deref())?;
    if let Some(overwrite) = cli.overwrite {
        config.options.overwrite = overwrite.into();
    }
    add_paths(&mut config, &cli.paths);
    config.validate()?;
    Ok(config)
}

/// Sort extra paths into directories and files. Anything that isn't a
/// directory (including paths that don't exist yet) is treated as a file, and
/// fails when its worker scans it.
fn add_paths(config: &mut Config, paths: &[PathBuf]) {
    for path in paths {
        match path.is_dir() {
            true => config.dirs.push(path.clone()),
            false => config.files.push(path.clone()),
        }
    }
}

async fn execute(config: Arc<Config>) -> Result<Stats> {
    match &config.provider {
        Provider::Local(local) => {
            let operator = LocalOperator::new("local", &local.root).or_raise(|| ErrorKind::Operator("local"))?;
            upload::ensure_bucket(&config, &operator).await?;
            let object_fn: ObjectFn<LocalObject> =
                Arc::new(|job: &Job<LocalObject>| LocalObject::new(job.entry().clone(), job.key()));
            Ok(upload::run(Arc::clone(&config), Arc::new(operator), object_fn).await)
        },
        #[cfg(feature = "s3")]
        Provider::S3(s3) => {
            use lofter_storage::{S3Object, S3Operator, TagOptions};

            let mut operator = S3Operator::new(
                "s3",
                &s3.bucket,
                &s3.region,
                s3.endpoint.as_deref(),
                &s3.key_id,
                &s3.key_secret,
            )
            .with_tag_options(TagOptions {
                origin_path: config.tag_options.origin_path,
                checksum_sha256: config.tag_options.checksum_sha256,
            })
            .with_tags(config.tags.clone());
            if let Some(storage_class) = &s3.storage_class {
                operator = operator.with_storage_class(storage_class);
            }
            if let Some(acl) = &s3.acl {
                operator = operator.with_acl(acl);
            }
            upload::ensure_bucket(&config, &operator).await?;
            let object_fn: ObjectFn<S3Object> =
                Arc::new(|job: &Job<S3Object>| S3Object::new(job.entry().clone(), job.key()));
            Ok(upload::run(Arc::clone(&config), Arc::new(operator), object_fn).await)
        },
        #[cfg(not(feature = "s3"))]
        Provider::S3(_) => exn::bail!(ErrorKind::Unavailable("s3")),
    }
}

fn summarize(stats: &Stats) {
    let (objects, skipped, failed) = (stats.objects(), stats.skipped(), stats.failed());
    tracing::info!(
        objects = objects.count,
        skipped = skipped.count,
        failed = failed.count,
        bytes = objects.bytes,
        "Finished"
    );
    println!(
        "{} uploaded ({} bytes), {} skipped ({} bytes), {} failed ({} bytes)",
        objects.count, objects.bytes, skipped.count, skipped.bytes, failed.count, failed.bytes
    );
}
