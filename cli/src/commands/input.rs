use std::path::Path;

use tuner_core::api::{ParamMap, SeriesPoint};
use tuner_core::error::CliError;

/// Reads a sales series from a `.json` array or a `date,value` CSV.
pub fn read_series(path: &str) -> Result<Vec<SeriesPoint>, CliError> {
    let expanded = shellexpand::tilde(path).into_owned();
    let path = Path::new(&expanded);
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Input(format!("cannot read {}: {e}", path.display())))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return serde_json::from_str(&text)
            .map_err(|e| CliError::Input(format!("{}: {e}", path.display())));
    }
    parse_csv(&text).map_err(|e| CliError::Input(format!("{}: {e}", path.display())))
}

fn parse_csv(text: &str) -> Result<Vec<SeriesPoint>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    rdr.deserialize().collect()
}

/// Parses repeated `NAME=VALUE` arguments.
pub fn parse_params(raw: &[String]) -> Result<ParamMap, CliError> {
    let mut out = ParamMap::new();
    for item in raw {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| CliError::Input(format!("expected NAME=VALUE, got {item:?}")))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| CliError::Input(format!("{name}: not a number: {value:?}")))?;
        if !value.is_finite() {
            return Err(CliError::Input(format!("{name}: value must be finite")));
        }
        out.insert(name.trim().to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn csv_with_header_is_read() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(f, "date,value\n2024-01-01, 12.5\n2024-01-08,14").unwrap();

        let series = read_series(f.path().to_str().unwrap()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(series[0].value, 12.5);
        assert_eq!(series[1].value, 14.0);
    }

    #[test]
    fn json_array_is_read() {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(f, r#"[{{"date":"2024-03-04","value":3.0}}]"#).unwrap();

        let series = read_series(f.path().to_str().unwrap()).unwrap();
        assert_eq!(series, vec![SeriesPoint::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), 3.0)]);
    }

    #[test]
    fn bad_rows_are_input_errors() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(f, "date,value\nyesterday,4").unwrap();
        assert!(matches!(
            read_series(f.path().to_str().unwrap()),
            Err(CliError::Input(_))
        ));
    }

    #[test]
    fn params_parse_name_value_pairs() {
        let p = parse_params(&["alpha=0.4".into(), " window = 6".into()]).unwrap();
        assert_eq!(p["alpha"], 0.4);
        assert_eq!(p["window"], 6.0);
        assert!(parse_params(&["alpha".into()]).is_err());
        assert!(parse_params(&["alpha=abc".into()]).is_err());
    }
}
