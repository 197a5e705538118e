//! Movedict - Movement dictionary recorder
//!
//! Turns short recordings of a person moving into skeleton-only pose videos
//! and keeps them in a flat dictionary directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use movedict_core::{Config, TranscodeError};
use movedict_pipeline::{
    format_timestamp, NativeBackend, OutputLibrary, TranscodeService, Transcoder,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Movedict - Build a dictionary of pose skeleton clips
#[derive(Parser, Debug)]
#[command(name = "movedict")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file (default: <config dir>/movedict/config.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding finished clips
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Directory where recordings are staged before processing
    #[arg(short, long, global = true)]
    upload_dir: Option<PathBuf>,

    /// Video bitrate in kbps
    #[arg(short, long, global = true)]
    bitrate: Option<u32>,

    /// Pose sidecar executable (default: bundled MediaPipe sidecar)
    #[arg(long, global = true)]
    pose_command: Option<PathBuf>,

    /// Python interpreter for the bundled pose sidecar
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcode recordings into skeleton clips
    Process {
        /// Recorded videos, any container ffmpeg can read
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Name for the clip; empty uses the capture time
        #[arg(short, long, default_value = "")]
        label: String,
    },

    /// List stored clips
    List,

    /// Delete a stored clip
    Delete {
        /// Clip file name, e.g. wave.mp4
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    debug!("movedict v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let library = OutputLibrary::open(&config.output_dir)
        .with_context(|| format!("cannot open output directory {:?}", config.output_dir))?;

    match args.command {
        Command::Process { inputs, label } => process(config, library, inputs, label).await,
        Command::List => {
            let names = library.list()?;
            if names.is_empty() {
                info!("No clips in {:?} yet", library.dir());
            }
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Delete { name } => {
            if library.delete(&name)? {
                info!("Deleted {}", name);
            } else {
                warn!("{} was not in the dictionary", name);
            }
            Ok(())
        }
    }
}

/// Config file first, then command line overrides
fn load_config(args: &Args) -> Result<Config> {
    let file = args.config.clone().or_else(|| {
        dirs::config_dir()
            .map(|dir| dir.join("movedict").join("config.json"))
            .filter(|path| path.is_file())
    });

    let mut config = match file {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_json_file(&path)
                .with_context(|| format!("invalid configuration file {:?}", path))?
        }
        None => Config::new(),
    };

    if let Some(dir) = &args.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(dir) = &args.upload_dir {
        config = config.with_upload_dir(dir);
    }
    if let Some(kbps) = args.bitrate {
        config = config.with_bitrate(kbps);
    }
    if let Some(command) = &args.pose_command {
        config.estimator.command = Some(command.clone());
    }
    if let Some(python) = &args.python {
        config.estimator.python = python.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn process(
    config: Config,
    library: OutputLibrary,
    inputs: Vec<PathBuf>,
    label: String,
) -> Result<()> {
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("cannot create upload directory {:?}", config.upload_dir))?;

    let transcoder = Transcoder::from_config(NativeBackend::from_config(&config), &config);
    let service = TranscodeService::new(transcoder, library);
    let captured = Local::now();

    let jobs = inputs.iter().enumerate().map(|(index, input)| {
        let service = service.clone();
        let upload_dir = config.upload_dir.clone();
        let label = label.clone();
        async move {
            let staged = stage_recording(input, &upload_dir, &captured, index)?;
            debug!("Staged {:?} as {:?}", input, staged);
            Ok::<_, anyhow::Error>(service.process_at(staged, &label, &captured).await)
        }
    });

    let mut failures = 0;
    for (input, outcome) in inputs.iter().zip(join_all(jobs).await) {
        let input = input.display().to_string();
        let reply = match outcome {
            Ok(Ok(clip)) => json!({
                "status": "ok",
                "input": input,
                "filename": clip.filename,
                "frames": clip.report.frames,
            }),
            Ok(Err(e)) => {
                failures += 1;
                json!({ "status": "error", "input": input, "error": e.reason(), "detail": e.to_string() })
            }
            Err(e) => {
                failures += 1;
                json!({ "status": "error", "input": input, "error": failure_reason(&e), "detail": format!("{:#}", e) })
            }
        };
        println!("{}", reply);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} recordings failed", failures, inputs.len());
    }
    Ok(())
}

/// Reason reported for a job that failed before transcoding started
fn failure_reason(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<TranscodeError>()
        .map_or("staging_failed", TranscodeError::reason)
}

/// Copy a recording into the upload directory as `record_<timestamp>.bin`
///
/// The extension is neutral because recordings arrive in whatever container
/// the recorder produced. Later inputs of one batch get an index suffix.
fn stage_recording(
    input: &Path,
    upload_dir: &Path,
    captured: &DateTime<Local>,
    index: usize,
) -> Result<PathBuf> {
    let timestamp = format_timestamp(captured);
    let name = if index == 0 {
        format!("record_{}.bin", timestamp)
    } else {
        format!("record_{}_{}.bin", timestamp, index)
    };
    let staged = upload_dir.join(name);

    // An unreadable recording fails the same way as an undecodable one
    let mut reader = std::fs::File::open(input).map_err(|e| TranscodeError::OpenFailed {
        path: input.to_path_buf(),
        source: e.into(),
    })?;
    let mut writer = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staged)
        .with_context(|| format!("cannot stage recording at {:?}", staged))?;
    std::io::copy(&mut reader, &mut writer)?;
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_recording_is_open_failed() {
        let dir = tempdir().unwrap();
        let err = stage_recording(&dir.path().join("nope.webm"), dir.path(), &Local::now(), 0)
            .unwrap_err();
        assert_eq!(failure_reason(&err), "open_failed");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stage_recording_copies_input() {
        let dir = tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir(&uploads).unwrap();
        let input = dir.path().join("clip.webm");
        std::fs::write(&input, b"webm bytes").unwrap();
        let captured = Local::now();

        let first = stage_recording(&input, &uploads, &captured, 0).unwrap();
        let second = stage_recording(&input, &uploads, &captured, 1).unwrap();
        let timestamp = format_timestamp(&captured);
        assert_eq!(first, uploads.join(format!("record_{}.bin", timestamp)));
        assert_eq!(second, uploads.join(format!("record_{}_1.bin", timestamp)));
        assert_eq!(std::fs::read(&first).unwrap(), b"webm bytes");

        let err = stage_recording(&input, &uploads, &captured, 0).unwrap_err();
        assert_eq!(failure_reason(&err), "staging_failed");
    }
}
