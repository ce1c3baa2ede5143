use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::report::ReportOutput;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(result: &ReportOutput) -> io::Result<()> {
        Self::write_json(&mut io::stdout(), result)
    }

    pub fn write_report(path: &Path, result: &ReportOutput) -> io::Result<()> {
        let mut file = File::create(path)?;
        Self::write_json(&mut file, result)
    }

    fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
