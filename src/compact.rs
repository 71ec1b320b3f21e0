//! Parsing of the compact wire format on the consumer side.
//!
//! A line that does not parse is skipped by the caller; the rest of its batch
//! is still used.

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

/// Position of the embedded record timestamp in a compact line
pub const TIMESTAMP_FIELD: usize = 1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompactParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown compact subtype '{0}'")]
    UnknownSubtype(String),
    #[error("subtype {subtype} expects {expected} fields, got {actual}")]
    FieldCount {
        subtype: u8,
        expected: usize,
        actual: usize,
    },
    #[error("missing timestamp field")]
    MissingTimestamp,
    #[error("invalid {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// One compact line, typed by its leading subtype number
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompactMessage {
    /// Subtype 1
    Identification {
        timestamp: i64,
        hex_ident: String,
        callsign: String,
    },
    /// Subtype 2
    SurfacePosition {
        timestamp: i64,
        hex_ident: String,
        altitude: i64,
        latitude: f64,
        longitude: f64,
        on_ground: String,
    },
    /// Subtype 3
    AirbornePosition {
        timestamp: i64,
        hex_ident: String,
        altitude: i64,
        latitude: f64,
        longitude: f64,
        on_ground: String,
    },
    /// Subtype 4
    Velocity {
        timestamp: i64,
        hex_ident: String,
        ground_speed: f64,
        track: f64,
        vertical_rate: i64,
    },
    /// Subtype 5
    Altitude {
        timestamp: i64,
        hex_ident: String,
        altitude: i64,
        on_ground: String,
    },
    /// Subtype 6
    Squawk {
        timestamp: i64,
        hex_ident: String,
        altitude: i64,
        squawk: String,
    },
}

impl CompactMessage {
    pub fn subtype(&self) -> u8 {
        match self {
            Self::Identification { .. } => 1,
            Self::SurfacePosition { .. } => 2,
            Self::AirbornePosition { .. } => 3,
            Self::Velocity { .. } => 4,
            Self::Altitude { .. } => 5,
            Self::Squawk { .. } => 6,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Identification { timestamp, .. }
            | Self::SurfacePosition { timestamp, .. }
            | Self::AirbornePosition { timestamp, .. }
            | Self::Velocity { timestamp, .. }
            | Self::Altitude { timestamp, .. }
            | Self::Squawk { timestamp, .. } => *timestamp,
        }
    }
}

fn expected_fields(subtype: u8) -> usize {
    match subtype {
        1 => 4,
        2 | 3 => 7,
        4 => 6,
        _ => 5,
    }
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, CompactParseError> {
    value
        .parse()
        .map_err(|_| CompactParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

impl FromStr for CompactMessage {
    type Err = CompactParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line.is_empty() {
            return Err(CompactParseError::Empty);
        }

        let fields: Vec<&str> = line.split(',').collect();
        let subtype: u8 = match fields[0] {
            "1" => 1,
            "2" => 2,
            "3" => 3,
            "4" => 4,
            "5" => 5,
            "6" => 6,
            other => return Err(CompactParseError::UnknownSubtype(other.to_string())),
        };

        let expected = expected_fields(subtype);
        if fields.len() != expected {
            return Err(CompactParseError::FieldCount {
                subtype,
                expected,
                actual: fields.len(),
            });
        }

        let timestamp: i64 = number("timestamp", fields[1])?;
        let hex_ident = fields[2].to_string();

        let message = match subtype {
            1 => Self::Identification {
                timestamp,
                hex_ident,
                callsign: fields[3].to_string(),
            },
            2 | 3 => {
                let altitude: i64 = number("altitude", fields[3])?;
                let latitude: f64 = number("latitude", fields[4])?;
                let longitude: f64 = number("longitude", fields[5])?;
                let on_ground = fields[6].to_string();
                if subtype == 2 {
                    Self::SurfacePosition {
                        timestamp,
                        hex_ident,
                        altitude,
                        latitude,
                        longitude,
                        on_ground,
                    }
                } else {
                    Self::AirbornePosition {
                        timestamp,
                        hex_ident,
                        altitude,
                        latitude,
                        longitude,
                        on_ground,
                    }
                }
            }
            4 => Self::Velocity {
                timestamp,
                hex_ident,
                ground_speed: number("ground speed", fields[3])?,
                track: number("track", fields[4])?,
                vertical_rate: number("vertical rate", fields[5])?,
            },
            5 => Self::Altitude {
                timestamp,
                hex_ident,
                altitude: number("altitude", fields[3])?,
                on_ground: fields[4].to_string(),
            },
            _ => Self::Squawk {
                timestamp,
                hex_ident,
                altitude: number("altitude", fields[3])?,
                squawk: fields[4].to_string(),
            },
        };

        Ok(message)
    }
}

/// Read the embedded epoch-millisecond timestamp from a compact line without
/// validating the rest of it
pub fn embedded_timestamp(line: &str) -> Result<i64, CompactParseError> {
    let field = line
        .split(',')
        .nth(TIMESTAMP_FIELD)
        .ok_or(CompactParseError::MissingTimestamp)?;
    number("timestamp", field.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_subtype() {
        let cases = [
            ("1,1710081000000,4CA2D6,EZY12AB", 1),
            ("2,1710081000000,4CA2D6,0,53.35380,-2.27494,-1", 2),
            ("3,1710081000000,4CA2D6,37000,53.12346,-2.50000,0", 3),
            ("4,1710081000000,4CA2D6,451.3,179.0,-1088", 4),
            ("5,1710081000000,4CA2D6,36975,0", 5),
            ("6,1710081000000,4CA2D6,36975,7541", 6),
        ];

        for (line, subtype) in cases {
            let message: CompactMessage = line.parse().unwrap();
            assert_eq!(message.subtype(), subtype, "line: {line}");
            assert_eq!(message.timestamp(), 1710081000000);
        }
    }

    #[test]
    fn test_parse_velocity_fields() {
        let message: CompactMessage = "4,1710081000000,4CA2D6,451.3,179.0,-1088".parse().unwrap();
        assert_eq!(
            message,
            CompactMessage::Velocity {
                timestamp: 1710081000000,
                hex_ident: "4CA2D6".to_string(),
                ground_speed: 451.3,
                track: 179.0,
                vertical_rate: -1088,
            }
        );
    }

    #[test]
    fn test_rejects_unknown_subtype() {
        assert_eq!(
            "7,1710081000000,4CA2D6,36975".parse::<CompactMessage>(),
            Err(CompactParseError::UnknownSubtype("7".to_string()))
        );
        assert_eq!("".parse::<CompactMessage>(), Err(CompactParseError::Empty));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let err = "5,1710081000000,4CA2D6".parse::<CompactMessage>().unwrap_err();
        assert_eq!(
            err,
            CompactParseError::FieldCount {
                subtype: 5,
                expected: 5,
                actual: 3
            }
        );
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert!("3,soon,4CA2D6,37000,53.1,-2.5,0".parse::<CompactMessage>().is_err());
        assert!("3,1710081000000,4CA2D6,high,53.1,-2.5,0".parse::<CompactMessage>().is_err());
    }

    #[test]
    fn test_embedded_timestamp() {
        assert_eq!(embedded_timestamp("5,1710081000000,4CA2D6,36975,0"), Ok(1710081000000));
        assert_eq!(embedded_timestamp("5"), Err(CompactParseError::MissingTimestamp));
        assert!(embedded_timestamp("5,,4CA2D6").is_err());
    }

    #[test]
    fn test_json_shape() {
        let message: CompactMessage = "6,1710081000000,4CA2D6,36975,7541".parse().unwrap();
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "squawk");
        assert_eq!(json["hex_ident"], "4CA2D6");
        assert_eq!(json["squawk"], "7541");
        assert_eq!(json["altitude"], 36975);
    }
}
