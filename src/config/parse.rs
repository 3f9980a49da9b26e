use std::str::FromStr;

use crate::error::{NetError, Result};

/// Parses a truth value.
///
/// `y, yes, t, true, on, 1` are true and `n, no, f, false, off, 0` are false,
/// case-insensitively. Anything else is rejected.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(NetError::InvalidBool(value.to_string())),
    }
}

/// Parses one numeric option value.
pub fn parse_number<T: FromStr>(option: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| NetError::InvalidNumber {
        option: option.to_string(),
        token: value.to_string(),
    })
}

/// Parses a comma-separated list of numbers.
pub fn parse_number_list<T: FromStr>(option: &str, value: &str) -> Result<Vec<T>> {
    value.split(',').map(|token| parse_number(option, token)).collect()
}

/// Parses a comma-separated list of truth values.
pub fn parse_bool_list(value: &str) -> Result<Vec<bool>> {
    value.split(',').map(parse_bool).collect()
}

/// Parses a comma-separated list of anything with a `FromStr` that already
/// reports a `NetError`.
pub fn parse_list<T>(value: &str) -> Result<Vec<T>>
where
    T: FromStr<Err = NetError>,
{
    value.split(',').map(|token| token.trim().parse()).collect()
}

/// Fails unless `actual` has the same number of entries as the width list.
pub fn expect_len(option: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(NetError::LengthMismatch {
            option: option.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truth_values_are_case_insensitive() {
        for v in ["YES", "On", "1", "t", "True", "y"] {
            assert!(parse_bool(v).unwrap(), "{v}");
        }
        for v in ["no", "OFF", "0", "F", "false", "n"] {
            assert!(!parse_bool(v).unwrap(), "{v}");
        }
    }

    #[test]
    fn bogus_truth_value_is_a_config_error() {
        let err = parse_bool("bogus").unwrap_err();
        assert!(matches!(err, NetError::InvalidBool(ref v) if v == "bogus"));
        assert!(err.is_config());
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn number_lists_trim_tokens() {
        assert_eq!(parse_number_list::<usize>("dnn_lay", "1024, 512 ,1").unwrap(), vec![1024, 512, 1]);
        assert_eq!(parse_number_list::<f64>("dnn_drop", "0.15,0.0").unwrap(), vec![0.15, 0.0]);
    }

    #[test]
    fn bad_number_names_the_option() {
        let err = parse_number_list::<usize>("dnn_lay", "12,x").unwrap_err();
        assert!(matches!(
            err,
            NetError::InvalidNumber { ref option, ref token } if option == "dnn_lay" && token == "x"
        ));
    }
}
