use anyhow::{Context, Result};
use std::path::Path;

/// Highest code a 12-bit converter can produce.
pub const ADC_MAX: u16 = 4095;

/// Parse newline-delimited ADC samples, ignoring blank/comment lines.
pub fn parse_sample_series(text: &str) -> Result<Vec<u16>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let value: u16 = trimmed
            .parse()
            .with_context(|| format!("line {} is not an ADC sample: {}", idx + 1, trimmed))?;
        if value > ADC_MAX {
            anyhow::bail!("line {} exceeds the 12-bit ADC range: {}", idx + 1, value);
        }
        out.push(value);
    }
    if out.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(out)
}

/// Read a newline-delimited ADC sample series from disk.
pub fn read_sample_series(path: &Path) -> Result<Vec<u16>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_sample_series(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_samples_and_skips_comments() {
        let parsed = parse_sample_series("# header\n2048\n\n 2050 \n0\n4095\n").unwrap();
        assert_eq!(parsed, vec![2048, 2050, 0, 4095]);
    }

    #[test]
    fn rejects_non_numeric_lines() {
        let err = parse_sample_series("2048\nnope\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn rejects_values_beyond_the_adc_range() {
        let err = parse_sample_series("4096\n").unwrap_err();
        assert!(err.to_string().contains("12-bit"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_sample_series("# only comments\n").is_err());
    }
}
