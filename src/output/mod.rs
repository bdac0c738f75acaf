use std::io::{self, Write};

use serde::Serialize;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(json: bool) -> Self {
        let mode = if json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn emit<T: Serialize>(&self, text_line: &str, json_value: &T) -> AppResult<()> {
        self.write_to(&mut io::stdout().lock(), text_line, json_value)
    }

    fn write_to<W: Write, T: Serialize>(
        &self,
        out: &mut W,
        text_line: &str,
        json_value: &T,
    ) -> AppResult<()> {
        match self.mode {
            OutputMode::Text => writeln!(out, "{text_line}")?,
            OutputMode::Json => {
                serde_json::to_writer_pretty(&mut *out, json_value)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }
}
