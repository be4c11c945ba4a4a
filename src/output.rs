use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::Writer;

use crate::error::Result;
use crate::stats::RunSummary;

pub fn write_results(summary: &RunSummary, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)?;

    write_worker_reports(summary, output_dir)?;
    write_summary(summary, output_dir)?;

    Ok(())
}

fn write_worker_reports(summary: &RunSummary, output_dir: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(output_dir.join("workers.csv"))?;
    for report in &summary.reports {
        wtr.serialize(report)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_summary(summary: &RunSummary, output_dir: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(output_dir.join("summary.json"))?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush()?;
    Ok(())
}
