use crate::types::ParamMap;

/// Largest accepted `window` / `season_length`.
pub const MAX_PERIOD: usize = 10_000;

/// Checks one parameter value. Smoothing factors live in (0, 1]; window and
/// season lengths in [1, MAX_PERIOD]; anything else only has to be finite.
pub fn check_parameter(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{name} must be finite"));
    }
    match name {
        "alpha" | "beta" | "gamma" if value <= 0.0 || value > 1.0 => {
            Err(format!("{name} must be in (0, 1], got {value}"))
        }
        "window" | "season_length" if !(1.0..=MAX_PERIOD as f64).contains(&value) => {
            Err(format!("{name} must be in [1, {MAX_PERIOD}], got {value}"))
        }
        _ => Ok(()),
    }
}

pub fn check_parameters(params: &ParamMap) -> Result<(), String> {
    params.iter().try_for_each(|(k, v)| check_parameter(k, *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_per_parameter_kind() {
        assert!(check_parameter("alpha", 0.3).is_ok());
        assert!(check_parameter("alpha", 1.0).is_ok());
        assert!(check_parameter("alpha", 0.0).is_err());
        assert!(check_parameter("gamma", 1.5).is_err());
        assert!(check_parameter("season_length", 52.0).is_ok());
        assert!(check_parameter("season_length", 1e30).is_err());
        assert!(check_parameter("window", 0.0).is_err());
        assert!(check_parameter("damping", -4.0).is_ok());
        assert!(check_parameter("damping", f64::NAN).is_err());
    }
}
