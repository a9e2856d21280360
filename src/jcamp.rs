//! JCAMP-DX decoding for infrared spectra.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Errors surfaced while decoding a JCAMP-DX document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JcampError {
    /// The `##XFACTOR=` field is absent.
    MissingXFactor,
    /// No data block was found between `##XYDATA=` and `##END=`.
    MissingData,
    /// A token inside a field or data row did not parse as a number.
    InvalidNumber(String),
    /// The data block expanded to zero points.
    EmptySpectrum,
}

impl fmt::Display for JcampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingXFactor => write!(f, "missing ##XFACTOR= field"),
            Self::MissingData => write!(f, "missing ##XYDATA= data block"),
            Self::InvalidNumber(token) => write!(f, "unparsable number {token:?}"),
            Self::EmptySpectrum => write!(f, "data block contains no points"),
        }
    }
}

impl std::error::Error for JcampError {}

/// Decodes one JCAMP-DX document into the wavenumber (cm⁻¹) of its
/// representative peak.
///
/// Each data row holds an x-axis start value followed by intensity readings;
/// successive readings advance the wavenumber by `##XFACTOR=`. Documents
/// measured in transmittance mark an absorption dip as a minimum, so the
/// extremum of interest flips with the `TRANSMITTANCE` marker token.
pub fn peak_wavenumber(jdx: &str) -> Result<i64, JcampError> {
    let x_factor: f64 = capture(jdx, x_factor_pattern())
        .ok_or(JcampError::MissingXFactor)?
        .trim()
        .parse()
        .map_err(|_| JcampError::InvalidNumber(field_preview(jdx, x_factor_pattern())))?;

    let block = capture(jdx, xy_data_pattern()).ok_or(JcampError::MissingData)?;

    let mut points: Vec<(i64, f64)> = Vec::new();
    for line in block.lines() {
        let row = split_row(line)?;
        let Some((&x_start, intensities)) = row.split_first() else {
            continue;
        };
        let x_start = x_start.round();
        for (i, &y) in intensities.iter().enumerate() {
            let wavenumber = (x_start + i as f64 * x_factor).round() as i64;
            points.push((wavenumber, y));
        }
    }

    if points.is_empty() {
        return Err(JcampError::EmptySpectrum);
    }

    // Transmittance dips where absorbance peaks; strict comparisons keep the
    // first point on ties.
    let transmittance = jdx.contains("TRANSMITTANCE");
    let mut best = points[0];
    for &point in &points[1..] {
        let better = if transmittance {
            point.1 < best.1
        } else {
            point.1 > best.1
        };
        if better {
            best = point;
        }
    }
    Ok(best.0)
}

/// Splits one compact data row into numbers.
///
/// Values are separated by whitespace or by a `-` that directly follows a
/// digit; a `-` at the start of a token stays a sign, so negative readings
/// and exponents (`1e-3`) survive.
fn split_row(line: &str) -> Result<Vec<f64>, JcampError> {
    let mut values = Vec::new();
    let mut token = String::new();
    for ch in line.trim().chars() {
        if ch.is_ascii_whitespace() {
            flush(&mut token, &mut values)?;
        } else if ch == '-' && token.ends_with(|c: char| c.is_ascii_digit() || c == '.') {
            flush(&mut token, &mut values)?;
        } else {
            token.push(ch);
        }
    }
    flush(&mut token, &mut values)?;
    Ok(values)
}

fn flush(token: &mut String, values: &mut Vec<f64>) -> Result<(), JcampError> {
    if token.is_empty() {
        return Ok(());
    }
    let value = token
        .parse()
        .map_err(|_| JcampError::InvalidNumber(token.clone()))?;
    values.push(value);
    token.clear();
    Ok(())
}

fn capture<'a>(input: &'a str, pattern: &Regex) -> Option<&'a str> {
    pattern
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|group| group.as_str())
}

fn field_preview(input: &str, pattern: &Regex) -> String {
    capture(input, pattern).unwrap_or_default().trim().to_string()
}

fn x_factor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"##XFACTOR=(.+)").expect("x factor pattern"))
}

fn xy_data_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)##XYDATA=[^\r\n]*\r?\n(.+?)\r?\n##END=").expect("xy data pattern")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jdx(y_units: &str, x_factor: &str, rows: &str) -> String {
        format!(
            "##TITLE=1-Butene\n##JCAMP-DX=4.24\n##YUNITS={y_units}\n##XFACTOR={x_factor}\n##YFACTOR=1\n##XYDATA=(X++(Y..Y))\n{rows}\n##END=\n"
        )
    }

    #[test]
    fn absorbance_peak_is_the_intensity_maximum() {
        let doc = jdx("ABSORBANCE", "2", "1000 5 10 3");
        assert_eq!(peak_wavenumber(&doc).expect("decode"), 1002);
    }

    #[test]
    fn transmittance_peak_is_the_intensity_minimum() {
        let doc = jdx("TRANSMITTANCE", "2", "1000 5 10 3");
        assert_eq!(peak_wavenumber(&doc).expect("decode"), 1004);
    }

    #[test]
    fn minus_delimited_rows_match_space_delimited_rows() {
        let spaced = jdx("ABSORBANCE", "2", "1000 5 10 3");
        let packed = jdx("ABSORBANCE", "2", "1000-5-10-3");
        assert_eq!(
            peak_wavenumber(&packed).expect("decode"),
            peak_wavenumber(&spaced).expect("decode"),
        );
    }

    #[test]
    fn ties_keep_the_first_point() {
        let doc = jdx("ABSORBANCE", "4", "500 7 7 7");
        assert_eq!(peak_wavenumber(&doc).expect("decode"), 500);
    }

    #[test]
    fn x_start_is_rounded_before_expansion() {
        let doc = jdx("ABSORBANCE", "2", "999.6 1 9");
        assert_eq!(peak_wavenumber(&doc).expect("decode"), 1002);
    }

    #[test]
    fn multiple_rows_flatten_in_order() {
        let doc = jdx("ABSORBANCE", "2", "1000 1 2\n2000 8 3");
        assert_eq!(peak_wavenumber(&doc).expect("decode"), 2000);
    }

    #[test]
    fn missing_x_factor_is_rejected() {
        let doc = "##TITLE=x\n##XYDATA=(X++(Y..Y))\n1000 5\n##END=\n";
        assert_eq!(peak_wavenumber(doc), Err(JcampError::MissingXFactor));
    }

    #[test]
    fn missing_data_block_is_rejected() {
        let doc = "##TITLE=x\n##XFACTOR=2\n##END=\n";
        assert_eq!(peak_wavenumber(doc), Err(JcampError::MissingData));
    }

    #[test]
    fn blank_data_rows_yield_an_empty_spectrum() {
        let doc = jdx("ABSORBANCE", "2", "   ");
        assert_eq!(peak_wavenumber(&doc), Err(JcampError::EmptySpectrum));
    }

    #[test]
    fn garbage_tokens_are_invalid_numbers() {
        let doc = jdx("ABSORBANCE", "2", "1000 5 oops");
        assert_eq!(
            peak_wavenumber(&doc),
            Err(JcampError::InvalidNumber("oops".to_string())),
        );
    }

    #[test]
    fn leading_minus_is_a_sign_not_a_delimiter() {
        let row = split_row("-100 2-3").expect("split");
        assert_eq!(row, vec![-100.0, 2.0, 3.0]);
    }
}
