use regex::Regex;

use crate::InfraError;
use crate::Result;

/// Error-log patterns a scenario tolerates; passed explicitly to teardown.
#[derive(Debug, Clone, Default)]
pub struct IgnoredLogPatterns {
    patterns: Vec<Regex>,
}

impl IgnoredLogPatterns {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()).map_err(InfraError::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn with(
        mut self,
        pattern: &str,
    ) -> Result<Self> {
        self.patterns.push(Regex::new(pattern).map_err(InfraError::from)?);
        Ok(self)
    }

    pub fn merge(
        mut self,
        other: &IgnoredLogPatterns,
    ) -> Self {
        self.patterns.extend(other.patterns.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_ignored(
        &self,
        block: &str,
    ) -> bool {
        self.patterns.iter().any(|p| p.is_match(block))
    }

    /// Blocks no pattern matches.
    pub fn unexpected(
        &self,
        blocks: Vec<String>,
    ) -> Vec<String> {
        blocks.into_iter().filter(|b| !self.is_ignored(b)).collect()
    }
}
