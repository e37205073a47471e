use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, ExportArgs, ExportFormat};
use super::report::{RecordReport, lead_names};
use crate::input::InputReader;
use scpecg::Decoder;
use scpecg::structs::rhythm::Waveform;

#[derive(Serialize)]
struct ExportDocument {
    record: RecordReport,
    leads: Vec<LeadSamples>,
}

#[derive(Serialize)]
struct LeadSamples {
    id: u8,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    microvolts: Option<Vec<f64>>,
}

pub fn cmd_export(args: &ExportArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut input = InputReader::new(&args.input)?;
    let bytes = input.read_all()?;

    let mut decoder = Decoder::default();
    decoder.set_fail_level(cli.fail_level());
    let record = decoder.decode(&bytes)?;

    let Some(waveform) = record.waveform() else {
        anyhow::bail!("{} has no decodable rhythm data", args.input.display());
    };

    for lead in waveform.leads().iter().filter(|l| l.error().is_some()) {
        log::warn!("Lead {} is exported as zeros", lead.id());
    }

    let output_path = match &args.output_path {
        Some(path) if path.as_os_str() == "-" => None,
        Some(path) => Some(path.clone()),
        None if input.is_pipe() => None,
        None => Some(args.input.with_extension(args.format.extension())),
    };

    let mut writer: Box<dyn Write> = match &output_path {
        Some(path) => {
            log::info!("Writing {}", path.display());
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let names = lead_names(&record, waveform);

    match args.format {
        ExportFormat::Csv => write_csv(&mut writer, waveform, &names, args.microvolts, multi)?,
        ExportFormat::Yaml => {
            let leads = waveform
                .leads()
                .iter()
                .zip(names)
                .map(|(lead, name)| LeadSamples {
                    id: lead.id(),
                    name,
                    samples: (!args.microvolts).then(|| lead.samples().to_vec()),
                    microvolts: args.microvolts.then(|| {
                        lead.samples()
                            .iter()
                            .map(|&s| waveform.microvolts(s))
                            .collect()
                    }),
                })
                .collect();

            let document = ExportDocument {
                record: RecordReport::new(&record),
                leads,
            };
            serde_yaml_ng::to_writer(&mut writer, &document)?;
        }
    }

    writer.flush()?;

    if let Some(path) = output_path {
        log::info!("Exported {} leads to {}", waveform.leads().len(), path.display());
    }

    Ok(())
}

/// One column per lead. Shorter leads leave their cells empty.
fn write_csv(
    writer: &mut dyn Write,
    waveform: &Waveform,
    names: &[String],
    microvolts: bool,
    multi: Option<&MultiProgress>,
) -> Result<()> {
    let rows = waveform
        .leads()
        .iter()
        .map(|l| l.samples().len())
        .max()
        .unwrap_or(0);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new(rows as u64));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} samples ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
            )?);
            pb.set_message("Exporting");
            Some(pb)
        }
        None => None,
    };

    writeln!(writer, "sample,{}", names.join(","))?;

    let mut line = String::new();
    for row in 0..rows {
        line.clear();
        line.push_str(&row.to_string());
        for lead in waveform.leads() {
            line.push(',');
            if let Some(&sample) = lead.samples().get(row) {
                if microvolts {
                    line.push_str(&format!("{:.3}", waveform.microvolts(sample)));
                } else {
                    line.push_str(&sample.to_string());
                }
            }
        }
        writeln!(writer, "{line}")?;

        if let Some(ref pb) = pb {
            if row % 4096 == 0 {
                pb.set_position(row as u64);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Export complete");
    }

    Ok(())
}
