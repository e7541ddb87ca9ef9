use std::env;
use std::fmt::Write as _;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use cssff::settings::Settings;
use cssff::{CssDemoParser, ParseStatus};
use log::{error, info, warn};

const SETTINGS_FILE: &str = "cssff.toml";

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn find_demos(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("failed to read directory {}: {err}", dir.display());
            return Vec::new();
        }
    };

    let mut demos = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, "dem"))
        .collect::<Vec<_>>();
    demos.sort();
    demos
}

/// directory of the executable, where settings and output live by default
fn program_directory() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// typing `q` stops the parse after the current command
fn spawn_abort_listener(abort: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };

            if line.trim().eq_ignore_ascii_case("q") {
                abort.store(true, Ordering::Relaxed);
                break;
            }
        }
    });
}

#[derive(Default)]
struct BatchReport {
    demos: usize,
    parsed: usize,
    failed: Vec<String>,
    warnings: Vec<String>,
    frags: String,
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl BatchReport {
    fn render(&self, aborted: bool, timestamp: u64) -> String {
        let mut out = String::new();
        let _ = write!(out, "cssff batch output at {timestamp}\n\n\n");

        let mut wrote_problems = false;

        if !self.failed.is_empty() {
            out.push_str("DEMOS WITH PARSING ERRORS:\n");
            for (i, failure) in self.failed.iter().enumerate() {
                let _ = writeln!(out, "{}. {failure}", i + 1);
            }
            wrote_problems = true;
        }

        if !self.warnings.is_empty() {
            if wrote_problems {
                out.push('\n');
            }
            out.push_str("DEMOS WITH WARNINGS:\n");
            for (i, warning) in self.warnings.iter().enumerate() {
                let _ = writeln!(out, "{}. {warning}", i + 1);
            }
            wrote_problems = true;
        }

        if wrote_problems {
            out.push_str("\n\nFOUND FRAGS:\n\n");
        }

        if self.frags.is_empty() {
            out.push_str("No frags found\n\n");
        } else {
            out.push_str(&self.frags);
        }

        out.push_str("Batch end");
        if aborted {
            out.push_str(" (process aborted)");
        }
        out.push('\n');

        out
    }

    fn file_name(&self, aborted: bool, timestamp: u64) -> String {
        if aborted {
            format!("_cssff_batch_{timestamp}_aborted.txt")
        } else {
            format!("_cssff_batch_{timestamp}_{}.txt", self.demos)
        }
    }
}

enum Outcome {
    Success,
    Failed(String),
    Aborted,
}

fn parse_demo(
    path: &Path,
    settings: &Arc<Settings>,
    abort: &Arc<AtomicBool>,
    batch: Option<&mut BatchReport>,
) -> Outcome {
    let mut parser = match CssDemoParser::open(path, settings.clone()) {
        Ok(parser) => parser,
        Err(err) => {
            let name = path.display().to_string();
            println!("{name}: fail ({err})");
            if let Some(batch) = batch {
                batch.failed.push(format!("{name} ({err})"));
            }
            return Outcome::Failed(err.to_string());
        }
    };
    parser.set_abort_flag(abort.clone());

    let name = parser.name().to_owned();
    let outcome = match parser.parse() {
        Ok(ParseStatus::Completed) => {
            println!("{name}: success");
            Outcome::Success
        }
        Ok(ParseStatus::Aborted) => {
            println!("{name}: abort");
            Outcome::Aborted
        }
        // truncated recordings tend to break right at the end
        Err(failure) if failure.at_end_of_demo => {
            info!("{name}: ignoring error at the end of the demo ({failure})");
            println!("{name}: success");
            Outcome::Success
        }
        Err(failure) => {
            println!("{name}: fail ({failure})");
            Outcome::Failed(failure.to_string())
        }
    };

    let frags = parser
        .frags()
        .iter()
        .map(|frag| frag.to_string())
        .collect::<String>();

    let warnings = parser.warnings().display(&name).to_string();

    match batch {
        Some(batch) => {
            if let Outcome::Failed(failure) = &outcome {
                batch.failed.push(format!("{name}: {failure}"));
            }

            batch
                .warnings
                .extend(warnings.lines().map(str::to_owned));

            if !frags.is_empty() {
                let kind = if parser.pov.is_pov { "POV" } else { "STV" };
                let _ = write!(batch.frags, "========== {name} ({kind}) ==========\n\n");
                batch.frags.push_str(&frags);
            }
        }
        None => {
            if !warnings.is_empty() {
                println!("\n========== WARNINGS ==========\n");
                print!("{warnings}");
            }

            if frags.is_empty() {
                println!("\nNo frags found with the current settings.\n");
            } else {
                println!("\n========== FOUND FRAGS ==========\n");
                print!("{frags}");

                if settings.dump_to_file_enabled() {
                    dump_frags(path, settings, &frags);
                }
            }
        }
    }

    outcome
}

fn dump_frags(demo: &Path, settings: &Settings, frags: &str) {
    let file_name = demo.with_extension("txt");
    let target = if settings.write_output_to_demo_directory() {
        file_name
    } else {
        match file_name.file_name() {
            Some(name) => program_directory().join(name),
            None => return,
        }
    };

    match fs::write(&target, frags) {
        Ok(()) => println!("Output has been written to {}\n", target.display()),
        Err(err) => error!("failed to write {}: {err}", target.display()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let mut demos = Vec::new();
    let mut settings_path = None;
    let mut batch_dir = None;
    let mut unrecognized_args = false;

    for arg in env::args().skip(1) {
        let path = PathBuf::from(&arg);

        if has_extension(&path, "dem") {
            demos.push(path);
        } else if has_extension(&path, "toml") {
            settings_path = Some(path);
        } else if path.is_dir() {
            batch_dir = Some(path);
        } else {
            warn!("unrecognized argument \"{arg}\"");
            unrecognized_args = true;
        }
    }

    let settings_path = settings_path.or_else(|| {
        let default = program_directory().join(SETTINGS_FILE);
        default.is_file().then_some(default)
    });

    let mut settings = match settings_path {
        Some(path) => Settings::load(&path).unwrap_or_else(|err| {
            error!("{err}, using default settings");
            Settings::default()
        }),
        None => Settings::default(),
    };

    if demos.is_empty() {
        let dir = match &batch_dir {
            Some(dir) => Some(dir.clone()),
            None if settings.batch_processing_enabled() && !unrecognized_args => {
                Some(env::current_dir().unwrap_or_else(|_| program_directory()))
            }
            None => None,
        };

        let Some(dir) = dir else {
            println!("cssff: no demo - pass a demo file or a directory to parse");
            return;
        };

        demos = find_demos(&dir);
        if demos.is_empty() {
            println!("cssff: no demos to parse found in {}", dir.display());
            return;
        }

        if batch_dir.is_some() {
            settings.enable_batch_processing();
        }
    }

    if settings.batch_processing_enabled() && demos.len() <= 1 {
        settings.disable_batch_processing();
    }

    let settings = Arc::new(settings);
    let batch_enabled = settings.batch_processing_enabled();
    let report_dir = batch_dir
        .clone()
        .or_else(|| demos.first().and_then(|d| d.parent().map(Path::to_path_buf)))
        .unwrap_or_else(program_directory);

    let abort = Arc::new(AtomicBool::new(false));
    spawn_abort_listener(abort.clone());

    let mut batch = batch_enabled.then(|| BatchReport {
        demos: demos.len(),
        ..Default::default()
    });

    if batch_enabled {
        println!("cssff: batch processing {} demos...", demos.len());
    }
    println!("Type 'q' and press enter to abort\n");

    let start = Instant::now();
    let mut aborted = false;

    for (i, demo) in demos.iter().enumerate() {
        if batch_enabled {
            print!("Demo {}/{}: ", i + 1, demos.len());
        }

        match parse_demo(demo, &settings, &abort, batch.as_mut()) {
            Outcome::Success => {
                if let Some(batch) = batch.as_mut() {
                    batch.parsed += 1;
                }
            }
            Outcome::Failed(_) => {}
            Outcome::Aborted => {
                aborted = true;
                break;
            }
        }
    }

    let elapsed = start.elapsed().as_secs();
    if elapsed >= 60 {
        println!("\nElapsed time: {} minutes {} seconds\n", elapsed / 60, elapsed % 60);
    } else {
        println!("\nElapsed time: {elapsed} seconds\n");
    }

    if let Some(batch) = batch {
        if aborted {
            println!("Process aborted - {}/{} demos successfully parsed", batch.parsed, batch.demos);
        } else {
            println!("Processing finished - {}/{} demos successfully parsed", batch.parsed, batch.demos);
        }

        let timestamp = unix_timestamp();
        let report = batch.render(aborted, timestamp);
        print!("\n{report}\n");

        let dir = if settings.write_output_to_demo_directory() {
            report_dir
        } else {
            program_directory()
        };
        let target = dir.join(batch.file_name(aborted, timestamp));

        match fs::write(&target, report) {
            Ok(()) => println!("Results have been written to {}", target.display()),
            Err(err) => error!("failed to write results to {}: {err}", target.display()),
        }
    }
}
