//! Parsing of `nodetool` free-text output.

use std::str::FromStr;

use crate::CassandraVersion;
use crate::ParseError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadUnit {
    Bytes,
    KB,
    MB,
    GB,
    TB,
}

impl LoadUnit {
    fn parse(unit: &str) -> Option<Self> {
        // nodetool printed decimal-looking "KB" for 1024-based sizes before 4.0,
        // and "KiB" from 4.0 on; both are 1024-based.
        match unit {
            "bytes" | "B" => Some(LoadUnit::Bytes),
            "KB" | "KiB" => Some(LoadUnit::KB),
            "MB" | "MiB" => Some(LoadUnit::MB),
            "GB" | "GiB" => Some(LoadUnit::GB),
            "TB" | "TiB" => Some(LoadUnit::TB),
            _ => None,
        }
    }

    fn multiplier(self) -> f64 {
        match self {
            LoadUnit::Bytes => 1.0,
            LoadUnit::KB => 1024.0,
            LoadUnit::MB => 1024.0 * 1024.0,
            LoadUnit::GB => 1024.0 * 1024.0 * 1024.0,
            LoadUnit::TB => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSize {
    pub value: f64,
    pub unit: LoadUnit,
}

impl LoadSize {
    pub fn bytes(&self) -> u64 {
        (self.value * self.unit.multiplier()).round() as u64
    }
}

/// Extracts the `Load` line of `nodetool info`, e.g. `Load : 1.02 MB`.
pub fn parse_load(info: &str) -> std::result::Result<LoadSize, ParseError> {
    let line = info
        .lines()
        .map(str::trim_start)
        .find(|l| l.starts_with("Load"))
        .ok_or(ParseError::MissingLoadLine)?;

    let mut fields = line.split_whitespace().skip(1).filter(|f| *f != ":");
    let value = fields.next().ok_or_else(|| ParseError::MalformedOutput(line.to_string()))?;
    let unit = fields.next().ok_or_else(|| ParseError::MalformedOutput(line.to_string()))?;

    let value = value
        .trim_start_matches(':')
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            label: "Load".to_string(),
            value: value.to_string(),
        })?;
    let unit = LoadUnit::parse(unit).ok_or_else(|| ParseError::UnexpectedUnit(unit.to_string()))?;

    Ok(LoadSize { value, unit })
}

/// Reads `ReleaseVersion: 3.0.9` from `nodetool version`; a bare version
/// string is accepted too.
pub fn parse_release_version(output: &str) -> std::result::Result<CassandraVersion, ParseError> {
    let Some(line) = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("ReleaseVersion"))
    else {
        return CassandraVersion::from_str(output.trim());
    };
    let (_, version) = line
        .split_once(':')
        .ok_or_else(|| ParseError::MalformedOutput(line.to_string()))?;
    CassandraVersion::from_str(version.trim())
}
