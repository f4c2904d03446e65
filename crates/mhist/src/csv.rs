//! The block line format: `<id>,<timestamp>,<value>\n`, no header, no
//! quoting. Categorical values carrying a separator are rejected at ingest;
//! anything unparseable is skipped at read.

use crate::{
    errors::Error,
    measurement::Measurement,
};

pub fn construct_csv_line(id: u32, measurement: &Measurement) -> Result<Vec<u8>, Error> {
    let value = match measurement {
        // `Display` for f64 is the shortest decimal form that round-trips.
        Measurement::Numerical { value, .. } => value.to_string(),
        Measurement::Categorical { value, .. } => {
            if value.contains(',') || value.contains('\n') {
                return Err(Error::MalformedInput(format!(
                    "categorical value {value:?} contains a separator"
                )));
            }
            value.clone()
        },
    };
    Ok(format!("{},{},{}\n", id, measurement.timestamp(), value).into_bytes())
}

/// Split one replayed line into its columns. `None` for anything other than
/// exactly three columns with a numeric id and timestamp.
pub fn parse_csv_line(line: &str) -> Option<(u32, i64, &str)> {
    let mut columns = line.split(',');
    let id = columns.next()?.parse().ok()?;
    let ts = columns.next()?.parse().ok()?;
    let value = columns.next()?;
    if columns.next().is_some() {
        return None;
    }
    Some((id, ts, value))
}

#[cfg(test)]
mod tests {
    use super::{
        construct_csv_line,
        parse_csv_line,
    };
    use crate::measurement::Measurement;

    #[test]
    fn test_construct_csv_line() {
        let line = construct_csv_line(1, &Measurement::numerical(1000, 42.)).unwrap();
        assert_eq!(line, b"1,1000,42\n");

        let line = construct_csv_line(7, &Measurement::categorical(2000, "heating")).unwrap();
        assert_eq!(line, b"7,2000,heating\n");
    }

    #[test]
    fn test_fractional_values_roundtrip() {
        let line = construct_csv_line(1, &Measurement::numerical(1, 0.1)).unwrap();
        assert_eq!(line, b"1,1,0.1\n");
        let (_, _, value) = parse_csv_line(std::str::from_utf8(&line).unwrap().trim_end()).unwrap();
        assert_eq!(value.parse::<f64>().unwrap(), 0.1);
    }

    #[test]
    fn test_separators_in_categorical_values_are_rejected() {
        assert!(construct_csv_line(1, &Measurement::categorical(1, "a,b")).is_err());
        assert!(construct_csv_line(1, &Measurement::categorical(1, "a\nb")).is_err());
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        assert_eq!(parse_csv_line("1,1000,42"), Some((1, 1000, "42")));
        assert_eq!(parse_csv_line("1,1000"), None);
        assert_eq!(parse_csv_line("1,1000,42,extra"), None);
        assert_eq!(parse_csv_line("x,1000,42"), None);
        assert_eq!(parse_csv_line("1,y,42"), None);
        assert_eq!(parse_csv_line(""), None);
    }
}
