use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, InfoArgs, ReportFormat};
use super::report::{RecordReport, field_label};
use crate::input::InputReader;
use scpecg::Decoder;
use scpecg::structs::metadata::TAG_TERMINATOR;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing SCP-ECG record: {}", args.input.display());

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Decoding record...");
            Some(pb)
        }
        None => None,
    };

    let bytes = InputReader::new(&args.input)?.read_all()?;

    let mut decoder = Decoder::default();
    decoder.set_fail_level(cli.fail_level());
    let record = decoder.decode(&bytes)?;

    let report = RecordReport::new(&record);

    let print = || -> Result<()> {
        match args.format {
            ReportFormat::Text => {
                display_record(&report, bytes.len());
                display_fields(&record);
                display_rhythm(&report);
                display_diagnostics(&report);
            }
            ReportFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&report)?),
        }
        Ok(())
    };

    match pb {
        Some(pb) => {
            pb.finish_and_clear();
            pb.suspend(print)?;
        }
        None => print()?,
    }

    Ok(())
}

fn display_record(report: &RecordReport, size: usize) {
    println!();
    println!("SCP-ECG Record Information");
    println!("==========================");
    println!();

    println!("Record");
    println!("  Size                      {size} bytes");
    println!("  Declared length           {} bytes", report.length);
    println!(
        "  CRC                       {} ({})",
        report.crc,
        if report.crc_valid { "valid" } else { "mismatch" }
    );
    println!();

    println!("Sections");
    for section in &report.sections {
        let status = match &section.error {
            None => "ok".to_string(),
            Some(e) => format!("invalid: {e}"),
        };
        println!(
            "  {:<4} {:<20} {:>7} bytes  v{:<3} {status}",
            section.id, section.kind, section.length, section.version
        );
    }
    println!();

    if let Some(patient) = &report.patient {
        println!("Patient");
        if let Some(name) = &patient.name {
            println!("  Name                      {name}");
        }
        if let Some(id) = &patient.id {
            println!("  Patient ID                {id}");
        }
        if let Some(dob) = &patient.date_of_birth {
            println!("  Date of birth             {dob}");
        }
        if let Some(age) = patient.age {
            println!("  Age                       {age}");
        }
        if let Some(sex) = &patient.sex {
            println!("  Sex                       {sex}");
        }
        if let Some(acquired) = &patient.acquired {
            println!("  Acquired                  {acquired}");
        }
        println!();
    }
}

fn display_fields(record: &scpecg::Record) {
    let Some(metadata) = record.metadata() else {
        return;
    };

    println!("Metadata Fields");
    for field in metadata.fields.iter().filter(|f| f.tag != TAG_TERMINATOR) {
        println!("  {:<26}{}", field_label(field.tag, &field.value), field.value);
    }
    println!();
}

fn display_rhythm(report: &RecordReport) {
    let Some(rhythm) = &report.rhythm else {
        println!("No rhythm data in the record.");
        println!();
        return;
    };

    println!("Rhythm Data");
    println!("  Compression               {}", rhythm.compression);
    println!("  Difference order          {}", rhythm.difference_order);
    if let Some(rate) = rhythm.sample_rate {
        println!("  Sampling rate             {rate:.1} Hz");
    }
    if let Some(duration) = &rhythm.duration {
        println!("  Duration                  {duration}");
    }
    println!("  Amplitude multiplier      {} nV", rhythm.avm_nv);
    println!("  Number of leads           {}", rhythm.leads.len());
    for lead in &rhythm.leads {
        match &lead.error {
            None => println!("    {:<22}  {} samples", lead.name, lead.samples),
            Some(e) => println!("    {:<22}  {} samples ({e})", lead.name, lead.samples),
        }
    }
    println!();
}

fn display_diagnostics(report: &RecordReport) {
    if report.diagnostics.is_empty() {
        return;
    }

    println!("Diagnostics");
    for diagnostic in &report.diagnostics {
        println!("  {diagnostic}");
    }
    println!();
}
