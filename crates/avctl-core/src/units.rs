//! Conversions between the public addressing/volume scheme and device units.
//!
//! The public API addresses ports from 0 and expresses volume as a 0–100
//! percentage. Kramer devices address ports from 1, and the AFM-20 takes
//! levels in decibels over a fixed range.
//!
//! None of the volume converters clamp. A caller that passes 120% gets a
//! decibel value above the device maximum; range checks belong to the
//! adapters, which reject bad input before any I/O.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A 0-based port index as used by the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u32);

impl Port {
    pub const fn new(index: u32) -> Self {
        Port(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// The 1-based index the device expects.
    pub fn to_device(self) -> u32 {
        self.0 + 1
    }

    /// Convert a 1-based device index back to a public port.
    pub fn from_device(device_index: u32) -> Result<Self> {
        device_index
            .checked_sub(1)
            .map(Port)
            .ok_or_else(|| Error::InvalidParameter(format!("device port {device_index} is not 1-based")))
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_index(s, "port").map(Port)
    }
}

impl From<u32> for Port {
    fn from(index: u32) -> Self {
        Port(index)
    }
}

fn parse_index(s: &str, what: &str) -> Result<u32> {
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|_| Error::InvalidParameter(format!("{what} {s:?} is not an integer")))?;
    if n < 0 {
        return Err(Error::InvalidParameter(format!(
            "{what} {n} must be zero or greater"
        )));
    }
    u32::try_from(n).map_err(|_| Error::InvalidParameter(format!("{what} {n} is out of range")))
}

/// Convert a public 0-based port string to the device's 1-based index.
///
/// Rejects negative and non-numeric input with [`Error::InvalidParameter`].
pub fn port_to_device(port: &str) -> Result<u32> {
    Ok(port.parse::<Port>()?.to_device())
}

/// Convert a 1-based device port string to the public 0-based index.
pub fn port_from_device(port: &str) -> Result<u32> {
    let n = parse_index(port, "device port")?;
    Ok(Port::from_device(n)?.index())
}

/// Linear decibel range a device maps volume percentages onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRange {
    pub min: i32,
    pub max: i32,
}

impl DbRange {
    pub const fn new(min: i32, max: i32) -> Self {
        DbRange { min, max }
    }

    pub fn span(self) -> i32 {
        self.max - self.min
    }
}

/// Decibel range of the AFM-20 analog outputs.
pub const AFM20_DB_RANGE: DbRange = DbRange::new(-100, 15);

/// `db = round(level * span / 100) + min`.
pub fn volume_to_decibel(level: i32, range: DbRange) -> i32 {
    let scaled = (f64::from(level) * f64::from(range.span()) / 100.0).round() as i32;
    scaled + range.min
}

/// `level = round((db - min) * 100 / span)`.
pub fn decibel_to_volume(db: i32, range: DbRange) -> i32 {
    (f64::from(db - range.min) * 100.0 / f64::from(range.span())).round() as i32
}

/// Reject volume levels outside 0–100.
pub fn check_volume(level: i32) -> Result<i32> {
    if (0..=100).contains(&level) {
        Ok(level)
    } else {
        Err(Error::InvalidParameter(format!(
            "volume {level} must be between 0 and 100"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_round_trip() {
        for n in 0..1000u32 {
            let device = port_to_device(&n.to_string()).unwrap();
            assert_eq!(device, n + 1);
            assert_eq!(port_from_device(&device.to_string()).unwrap(), n);
        }
    }

    #[test]
    fn port_rejects_negative() {
        let err = port_to_device("-1").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(err.to_string().contains("zero or greater"));
    }

    #[test]
    fn port_rejects_non_numeric() {
        assert!(matches!(
            port_to_device("two"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(port_to_device(""), Err(Error::InvalidParameter(_))));
        assert!(matches!(
            "1.5".parse::<Port>(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn port_from_device_rejects_zero() {
        assert!(matches!(
            port_from_device("0"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(Port::from_device(0).is_err());
        assert_eq!(Port::from_device(3).unwrap(), Port::new(2));
    }

    #[test]
    fn port_tolerates_whitespace() {
        assert_eq!(" 3 ".parse::<Port>().unwrap(), Port::new(3));
        assert_eq!(port_from_device("4\r\n").unwrap(), 3);
    }

    #[test]
    fn afm20_known_points() {
        assert_eq!(volume_to_decibel(0, AFM20_DB_RANGE), -100);
        assert_eq!(volume_to_decibel(100, AFM20_DB_RANGE), 15);
        assert_eq!(volume_to_decibel(50, AFM20_DB_RANGE), -42);
        assert_eq!(decibel_to_volume(-100, AFM20_DB_RANGE), 0);
        assert_eq!(decibel_to_volume(15, AFM20_DB_RANGE), 100);
        assert_eq!(decibel_to_volume(-50, AFM20_DB_RANGE), 43);
    }

    #[test]
    fn volume_round_trip_within_one() {
        for level in 0..=100 {
            let db = volume_to_decibel(level, AFM20_DB_RANGE);
            let back = decibel_to_volume(db, AFM20_DB_RANGE);
            assert!(
                (back - level).abs() <= 1,
                "level {level} -> {db} dB -> {back}"
            );
        }
    }

    #[test]
    fn volume_conversion_does_not_clamp() {
        assert_eq!(volume_to_decibel(200, AFM20_DB_RANGE), 130);
        assert_eq!(volume_to_decibel(-10, AFM20_DB_RANGE), -112);
        assert_eq!(decibel_to_volume(-123, AFM20_DB_RANGE), -20);
    }

    #[test]
    fn check_volume_bounds() {
        assert_eq!(check_volume(0).unwrap(), 0);
        assert_eq!(check_volume(100).unwrap(), 100);
        assert!(matches!(check_volume(101), Err(Error::InvalidParameter(_))));
        assert!(matches!(check_volume(-1), Err(Error::InvalidParameter(_))));
    }
}
