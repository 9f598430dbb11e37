use std::{num::ParseIntError, time::Duration};

/// Same as `poll_interval` but logs and falls back to the default when the env var isn't a number.
pub fn get_poll_interval(units: TimeUnit, env_var_name: &str, default: u64) -> Duration {
    match poll_interval(&units, env_var_name, default) {
        Ok(interval) => interval,
        Err(e) => {
            tracing::warn!("{} must be a valid number ({}), using default of {}", env_var_name, e, default);
            units.duration(default)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn duration(&self, amount: u64) -> Duration {
        match self {
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
        }
    }
}

/// Retrieves the value of the environment variable as a duration.
fn poll_interval(units: &TimeUnit, env_var_name: &str, default: u64) -> Result<Duration, ParseIntError> {
    let polling = match std::env::var(env_var_name) {
        Ok(v) => v.trim().parse::<u64>()?,
        Err(_) => default,
    };
    Ok(units.duration(polling))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_var_uses_default() {
        let d = poll_interval(&TimeUnit::Seconds, "SMAP_TEST_POLL_INTERVAL_UNSET", 7).unwrap();
        assert_eq!(d, Duration::from_secs(7));
    }

    #[test]
    fn test_time_units() {
        assert_eq!(TimeUnit::Milliseconds.duration(250), Duration::from_millis(250));
        assert_eq!(TimeUnit::Seconds.duration(3), Duration::from_secs(3));
    }
}
