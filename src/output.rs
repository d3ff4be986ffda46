use std::io::{self, Write};

use serde::Serialize;

use crate::app::BatchResult;
use crate::domain::RunMetadata;
use crate::store::QueryResult;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_runs(runs: &[RunMetadata]) -> io::Result<()> {
        Self::print_json(&runs)
    }

    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
