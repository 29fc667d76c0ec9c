//! Recover a Bedrock world from a timeline database: every chunk is
//! restored to its time point closest to (at or before) a target instant.

mod driver;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::error;

use driver::{recover_entire_database, recover_range, ChunkRect};
use rewind_timeline::{DbOptions, TimelineDb};
use rewind_world::WorldDb;

#[derive(Debug, Parser)]
#[command(name = "rewind-recover", about = "Restore a world from chunk history")]
struct Args {
    /// Path of the timeline database.
    #[arg(long)]
    path: PathBuf,

    /// Path to output the Minecraft world.
    #[arg(long)]
    output: PathBuf,

    /// Worker threads per batch; 0 runs chunks serially.
    #[arg(long, default_value_t = 0)]
    max_concurrent: usize,

    /// Restrict recovery to a chunk rectangle.
    #[arg(long)]
    use_range: bool,

    /// Dimension of the rectangle.
    #[arg(long, default_value_t = 0)]
    range_dimension: i32,

    #[arg(long, default_value_t = 0)]
    range_start_x: i32,

    #[arg(long, default_value_t = 0)]
    range_start_z: i32,

    #[arg(long, default_value_t = 0)]
    range_end_x: i32,

    #[arg(long, default_value_t = 0)]
    range_end_z: i32,

    /// Restore to the world closest to this time (earlier than or equal
    /// to the given unix seconds). Defaults to now.
    #[arg(long)]
    provided_unix_time: Option<i64>,

    /// Chunks whose history starts after the target still contribute
    /// their earliest time point.
    #[arg(long)]
    ensure_exist_one: bool,

    /// Database settings: no grow sync.
    #[arg(long)]
    no_grow_sync: bool,

    /// Database settings: no sync (unsafe).
    #[arg(long)]
    no_sync: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let target_unix_time = args.provided_unix_time.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    });

    let db = match TimelineDb::open(
        &args.path,
        DbOptions {
            no_grow_sync: args.no_grow_sync,
            no_sync: args.no_sync,
        },
    ) {
        Ok(db) => db,
        Err(e) => {
            error!(path = %args.path.display(), error = %e, "cannot open timeline database");
            return ExitCode::FAILURE;
        }
    };

    let world = match WorldDb::open(&args.output) {
        Ok(world) => world,
        Err(e) => {
            error!(path = %args.output.display(), error = %e, "cannot open output world");
            return ExitCode::FAILURE;
        }
    };

    let result = if args.use_range {
        recover_range(
            &db,
            &world,
            ChunkRect {
                dim: args.range_dimension,
                start_x: args.range_start_x,
                start_z: args.range_start_z,
                end_x: args.range_end_x,
                end_z: args.range_end_z,
            },
            target_unix_time,
            args.max_concurrent,
            args.ensure_exist_one,
        )
    } else {
        recover_entire_database(
            &db,
            &world,
            target_unix_time,
            args.max_concurrent,
            args.ensure_exist_one,
        )
    };

    if let Err(e) = result {
        error!(error = %e, "recovery aborted");
        return ExitCode::FAILURE;
    }

    if let Err(e) = world.flush() {
        error!(error = %e, "flushing output world failed");
        return ExitCode::FAILURE;
    }
    if let Err(e) = db.close() {
        error!(error = %e, "closing timeline database failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
