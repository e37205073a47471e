use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{CheckArgs, Cli};
use scpecg::{Decoder, encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// Decoded cleanly and re-encoded to the same bytes.
    Pass,
    /// Decoded with diagnostics, or re-encoding normalized the bytes.
    Warn,
    Fail,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

struct Outcome {
    path: PathBuf,
    verdict: Verdict,
    notes: Vec<String>,
}

#[derive(Clone, Copy)]
struct CheckOptions {
    fail_level: log::Level,
    roundtrip: bool,
}

pub fn cmd_check(args: &CheckArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let options = CheckOptions {
        fail_level: cli.fail_level(),
        roundtrip: !args.no_roundtrip,
    };

    let jobs = args
        .jobs
        .or_else(|| thread::available_parallelism().ok().map(usize::from))
        .unwrap_or(1)
        .clamp(1, args.inputs.len().max(1));

    log::info!("Checking {} records with {jobs} workers", args.inputs.len());

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new(args.inputs.len() as u64));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} records ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
            )?);
            Some(pb)
        }
        None => None,
    };

    let (job_tx, job_rx) = mpsc::channel::<PathBuf>();
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel::<Outcome>();

    let workers: Vec<_> = (0..jobs)
        .map(|_| spawn_worker(Arc::clone(&job_rx), result_tx.clone(), options))
        .collect();
    drop(result_tx);

    for input in &args.inputs {
        job_tx.send(input.clone())?;
    }
    drop(job_tx);

    let mut outcomes = Vec::with_capacity(args.inputs.len());
    for outcome in result_rx {
        if let Some(ref pb) = pb {
            pb.set_message(outcome.path.display().to_string());
            pb.inc(1);
        }
        outcomes.push(outcome);
    }

    for worker in workers {
        if worker.join().is_err() {
            anyhow::bail!("check worker panicked");
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    outcomes.sort_by(|a, b| a.path.cmp(&b.path));
    let failed = print_summary(&outcomes);

    if failed > 0 {
        anyhow::bail!("{failed} of {} records failed", outcomes.len());
    }

    Ok(())
}

fn spawn_worker(
    jobs: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    results: mpsc::Sender<Outcome>,
    options: CheckOptions,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            let next = match jobs.lock() {
                Ok(rx) => rx.recv(),
                Err(_) => return,
            };
            let Ok(path) = next else {
                return;
            };

            let outcome = check_file(path, options);
            if results.send(outcome).is_err() {
                return;
            }
        }
    })
}

fn check_file(path: PathBuf, options: CheckOptions) -> Outcome {
    let mut notes = Vec::new();
    let verdict = match check_bytes(&path, options, &mut notes) {
        Ok(verdict) => verdict,
        Err(e) => {
            notes.push(format!("{e:#}"));
            Verdict::Fail
        }
    };

    log::debug!("{}: {verdict}", path.display());

    Outcome {
        path,
        verdict,
        notes,
    }
}

fn check_bytes(path: &Path, options: CheckOptions, notes: &mut Vec<String>) -> Result<Verdict> {
    let bytes = std::fs::read(path)?;

    let mut decoder = Decoder::default();
    decoder.set_fail_level(options.fail_level);
    let record = decoder.decode(&bytes)?;

    let mut verdict = Verdict::Pass;

    for diagnostic in record.diagnostics() {
        notes.push(diagnostic.to_string());
        verdict = Verdict::Warn;
    }

    if !options.roundtrip {
        return Ok(verdict);
    }

    let encoded = encode(&record)?;
    if encoded == bytes {
        return Ok(verdict);
    }

    // Bytes that are not reproduced exactly must at least settle after one pass.
    let again = encode(&decoder.decode(&encoded)?)?;
    if again == encoded {
        notes.push(format!(
            "re-encoding normalized the record ({} -> {} bytes)",
            bytes.len(),
            encoded.len()
        ));
        Ok(Verdict::Warn)
    } else {
        notes.push("re-encoding is not stable".to_string());
        Ok(Verdict::Fail)
    }
}

fn print_summary(outcomes: &[Outcome]) -> usize {
    let count = |v: Verdict| outcomes.iter().filter(|o| o.verdict == v).count();

    for outcome in outcomes {
        println!("{}  {}", outcome.verdict, outcome.path.display());
        for note in &outcome.notes {
            println!("      {note}");
        }
    }

    let failed = count(Verdict::Fail);
    println!();
    println!("Check Summary");
    println!("  Records checked           {}", outcomes.len());
    println!("  Passed                    {}", count(Verdict::Pass));
    println!("  Warnings                  {}", count(Verdict::Warn));
    println!("  Failed                    {failed}");

    failed
}
