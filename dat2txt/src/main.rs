use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{CommandFactory, Parser};
use log::{debug, error, LevelFilter};
use phadat::{convert_file, structs::DatHeader};

#[derive(Parser)]
#[command(version)]
/// Converts PHA .dat spectra to <file>.new.txt, one channel counter per line
pub struct Args {
    #[arg(allow_hyphen_values = true)]
    /// The .dat files to convert, in order
    paths: Vec<PathBuf>,
}

fn print_progress<W: Write>(out: &mut W, path: &Path, header: &DatHeader) {
    if let Err(e) = writeln!(
        out,
        "converting: {:<16}\t{:>4} channels\t{:>4} live seconds",
        path.display().to_string(),
        header.channel_count,
        header.live_time
    ) {
        debug!("progress line for {} lost: {e}", path.display());
    }
}

/// the windows shell hands over wildcards as is, so expand them here
#[cfg(windows)]
fn expand_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut expanded = Vec::with_capacity(paths.len());
    for path in paths {
        let pattern = path.to_string_lossy();
        if !pattern.contains(['*', '?', '[']) {
            expanded.push(path);
            continue;
        }
        match glob::glob(&pattern) {
            Ok(entries) => {
                let before = expanded.len();
                expanded.extend(entries.filter_map(Result::ok));
                // unmatched patterns are passed on, and fail to open
                if expanded.len() == before {
                    expanded.push(path);
                }
            }
            Err(e) => {
                debug!("not expanding {}: {e}", path.display());
                expanded.push(path);
            }
        }
    }
    expanded
}

#[cfg(not(windows))]
fn expand_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths
}

/// Converts every path in order and returns the exit code. Per file failures
/// are logged and never change the exit code, only a missing path list does.
fn run<W: Write>(args: Args, progress: &mut W) -> u8 {
    if args.paths.is_empty() {
        eprintln!("{}", Args::command().render_usage());
        return 1;
    }
    for path in expand_paths(args.paths) {
        match convert_file(&path, |input, header| print_progress(progress, input, header)) {
            Ok(written) => debug!("{}: {written} counters", path.display()),
            Err(e) => error!("{e}"),
        }
    }
    0
}

fn main() -> ExitCode {
    // fixed level, failure diagnostics must not be switched off from outside
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .init();
    let args = Args::parse();
    let stdout = io::stdout();
    ExitCode::from(run(args, &mut stdout.lock()))
}

#[cfg(test)]
mod test {
    use std::{fs, path::PathBuf};

    use clap::Parser;
    use tempfile::tempdir;

    use crate::{run, Args};

    // count 2, gap FFFF, live 16, counters 42 and 100
    const EXAMPLE: [u8; 18] = [
        0x02, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x10, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x64,
        0x00, 0x00, 0x00,
    ];

    #[test]
    pub fn hyphen_paths_are_files() {
        let args = Args::try_parse_from(["dat2txt", "-a.dat", "b.dat", "-c.dat"]).unwrap();
        assert_eq!(
            args.paths,
            vec![
                PathBuf::from("-a.dat"),
                PathBuf::from("b.dat"),
                PathBuf::from("-c.dat")
            ]
        );
    }

    #[test]
    pub fn no_paths_is_an_error() {
        let args = Args::try_parse_from(["dat2txt"]).unwrap();
        let mut progress = Vec::new();
        assert_eq!(run(args, &mut progress), 1);
        assert!(progress.is_empty());
    }

    #[test]
    pub fn batch_continues_in_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.dat");
        let missing = dir.path().join("missing.dat");
        let cut = dir.path().join("cut.dat");
        let last = dir.path().join("last.dat");
        fs::write(&first, EXAMPLE).unwrap();
        fs::write(&cut, &EXAMPLE[..14]).unwrap();
        fs::write(&last, EXAMPLE).unwrap();
        let args = Args {
            paths: vec![first.clone(), missing, cut.clone(), last.clone()],
        };
        let mut progress = Vec::new();
        assert_eq!(run(args, &mut progress), 0);

        let progress = String::from_utf8(progress).unwrap();
        let lines: Vec<&str> = progress.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(&format!("converting: {}", first.display())));
        assert!(lines[1].starts_with(&format!("converting: {}", cut.display())));
        assert!(lines[2].starts_with(&format!("converting: {}", last.display())));
        assert!(lines[2].ends_with("\t   2 channels\t  16 live seconds"));
        assert!(dir.path().join("last.dat.new.txt").exists());
    }

    #[test]
    pub fn broken_progress_output_keeps_going() {
        struct Closed;
        impl std::io::Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.dat");
        let second = dir.path().join("second.dat");
        fs::write(&first, EXAMPLE).unwrap();
        fs::write(&second, EXAMPLE).unwrap();
        let args = Args {
            paths: vec![first, second],
        };
        assert_eq!(run(args, &mut Closed), 0);
        assert!(dir.path().join("first.dat.new.txt").exists());
        assert!(dir.path().join("second.dat.new.txt").exists());
    }
}
