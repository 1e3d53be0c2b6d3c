//! Walltime parsing.

use crate::error::{SchedError, SchedResult};

/// Convert an `HH:MM:SS` walltime into whole seconds.
///
/// Hours may have any number of digits; minutes and seconds must be below 60.
/// There is no fallback value: a walltime that does not parse must not reach
/// the scheduler as some other duration.
pub fn to_seconds(walltime: &str) -> SchedResult<u64> {
    let invalid = || SchedError::InvalidWalltime(walltime.to_string());

    let parts: Vec<&str> = walltime.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let mut fields = [0u64; 3];
    for (field, part) in fields.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        *field = part.parse().map_err(|_| invalid())?;
    }

    let [hours, minutes, seconds] = fields;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_seconds() {
        assert_eq!(to_seconds("01:30:00").unwrap(), 5400);
        assert_eq!(to_seconds("00:00:00").unwrap(), 0);
        assert_eq!(to_seconds("00:10:05").unwrap(), 605);
        assert_eq!(to_seconds("1:2:3").unwrap(), 3723);
        assert_eq!(to_seconds("48:00:00").unwrap(), 172_800);
    }

    #[test]
    fn test_malformed_walltime() {
        for bad in [
            "", "90", "01:30", "01:30:00:00", "01:60:00", "01:00:60", "aa:bb:cc", "-1:00:00",
            "01: 30:00", "1h30m",
        ] {
            assert!(
                matches!(to_seconds(bad), Err(SchedError::InvalidWalltime(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }
}
