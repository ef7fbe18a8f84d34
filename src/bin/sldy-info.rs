//! Small command-line summary tool for SlideBook 7 containers, usable
//! from a shell wherever the library itself is embedded.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sldy::{emit, Slide};

/// Print a summary of the captures contained in a SlideBook 7 slide.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the slide's `.sldy` or `.sldyz` sentinel file.
    slide: PathBuf,

    /// Also list every file the reader would touch, including pixel data.
    #[arg(long)]
    list_files: bool,

    /// Print the per-capture metadata facts published to a downstream sink.
    #[arg(long)]
    metadata: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let slide = match Slide::open(&args.slide) {
        Ok(slide) => slide,
        Err(err) => {
            eprintln!("failed to open {}: {}", args.slide.display(), err);
            return ExitCode::FAILURE;
        }
    };

    println!("{}", slide);

    if args.metadata {
        for series in 0..slide.num_captures() {
            let capture = slide.capture(series).expect("series in range");
            let metadata = emit::capture_metadata(capture);
            println!(
                "[{}] {:?} pixels, channels={:?}, objective={:?}, voxel_size_um={:?}",
                series, metadata.pixel_type, metadata.channel_names, metadata.objective_name, metadata.voxel_size_um,
            );
            for (t, shape) in emit::capture_rois(capture) {
                println!("  roi @t={}: {:?}", t, shape);
            }
        }
    }

    if args.list_files {
        match slide.used_files(true) {
            Ok(files) => {
                for file in files {
                    println!("{}", file.display());
                }
            }
            Err(err) => {
                eprintln!("failed to enumerate files: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
