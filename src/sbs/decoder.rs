use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;
use tracing::{debug, warn};

/// Field separator used by the BaseStation protocol
pub const FIELD_SEPARATOR: char = ',';

/// Layout of the generated date and time fields once joined with a `T`;
/// the fraction must be exactly three digits
const TIMESTAMP_LAYOUT: &str = "%Y/%m/%dT%H:%M:%S.%3f";

/// Number of fields every message carries (type through generated time)
pub const COMMON_FIELD_COUNT: usize = 8;
/// ID messages: common fields, logged date/time, call sign
pub const CALLSIGN_FIELD_COUNT: usize = 11;
/// Full MSG layout through the on-ground flag
pub const FULL_FIELD_COUNT: usize = 22;

// Positional indexes within a split line
const IDX_MESSAGE_TYPE: usize = 0;
const IDX_TRANSMISSION_TYPE: usize = 1;
const IDX_SESSION_ID: usize = 2;
const IDX_AIRCRAFT_ID: usize = 3;
const IDX_HEX_IDENT: usize = 4;
const IDX_FLIGHT_ID: usize = 5;
const IDX_DATE_GENERATED: usize = 6;
const IDX_TIME_GENERATED: usize = 7;
const IDX_CALLSIGN: usize = 10;
const IDX_ALTITUDE: usize = 11;
const IDX_GROUND_SPEED: usize = 12;
const IDX_TRACK: usize = 13;
const IDX_LATITUDE: usize = 14;
const IDX_LONGITUDE: usize = 15;
const IDX_VERTICAL_RATE: usize = 16;
const IDX_SQUAWK: usize = 17;
const IDX_ALERT: usize = 18;
const IDX_EMERGENCY: usize = 19;
const IDX_SPI: usize = 20;
const IDX_ON_GROUND: usize = 21;

/// BaseStation message families
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageType {
    /// New aircraft seen
    Air,
    /// Identification change
    Id,
    /// Aircraft status change
    Sta,
    /// Transmission message carrying one of the MSG subtypes
    Msg,
    /// Any prefix outside the four families above (SEL, CLK, garbage)
    #[default]
    Unknown,
}

impl MessageType {
    fn from_field(field: &str) -> Self {
        match field {
            "AIR" => Self::Air,
            "ID" => Self::Id,
            "STA" => Self::Sta,
            "MSG" => Self::Msg,
            _ => Self::Unknown,
        }
    }

    /// Field count a complete message of this family carries
    pub fn expected_field_count(&self) -> usize {
        match self {
            Self::Msg => FULL_FIELD_COUNT,
            Self::Id => CALLSIGN_FIELD_COUNT,
            Self::Air | Self::Sta | Self::Unknown => COMMON_FIELD_COUNT,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Air => write!(f, "AIR"),
            Self::Id => write!(f, "ID"),
            Self::Sta => write!(f, "STA"),
            Self::Msg => write!(f, "MSG"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Which extras a line carries, keyed by its field count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    /// Only the eight common fields (or fewer)
    Common,
    /// Common fields plus the call sign
    WithCallsign,
    /// Every field through the on-ground flag
    Full,
}

impl FieldLayout {
    pub fn for_field_count(count: usize) -> Self {
        match count {
            CALLSIGN_FIELD_COUNT => Self::WithCallsign,
            FULL_FIELD_COUNT => Self::Full,
            _ => Self::Common,
        }
    }
}

/// Whether every field of a record decoded cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStatus {
    #[default]
    Ok,
    Error,
}

/// A single field that failed to decode
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("invalid integer in {field}: '{value}' ({source})")]
    Integer {
        field: &'static str,
        value: String,
        source: ParseIntError,
    },
    #[error("invalid number in {field}: '{value}' ({source})")]
    Float {
        field: &'static str,
        value: String,
        source: ParseFloatError,
    },
    #[error("invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },
    #[error("truncated {message_type} message: expected {expected} fields, got {actual}")]
    Truncated {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },
}

/// One decoded BaseStation line
///
/// Numeric fields that are empty or fail to parse are left at zero. Either case
/// counts as a failure: the first one is kept in `error_message` and flips
/// `status` to `Error`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SbsRecord {
    pub status: RecordStatus,
    pub error_message: Option<String>,
    pub message_type: MessageType,
    /// MSG subtype as sent on the wire ("1".."8"), empty for other families
    pub transmission_type: String,
    pub session_id: String,
    pub aircraft_id: String,
    /// ICAO 24-bit address in hex
    pub hex_ident: String,
    pub flight_id: String,
    /// Generated time in UTC epoch milliseconds, 0 when unparseable
    pub timestamp_millis: i64,
    pub callsign: String,
    /// Feet
    pub altitude: i64,
    /// Knots
    pub ground_speed: f64,
    /// Degrees
    pub track: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Feet per minute
    pub vertical_rate: i64,
    pub squawk: String,
    pub alert: String,
    pub emergency: String,
    pub spi: String,
    pub on_ground: String,
}

impl SbsRecord {
    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }

    /// Generated time as a UTC instant
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_millis).unwrap_or_default()
    }

    fn record_error(&mut self, error: FieldError) {
        debug!("SBS field error on {}: {}", self.hex_ident, error);
        metrics::counter!("sbs.fields.parse_error_total").increment(1);

        if self.status == RecordStatus::Ok {
            self.status = RecordStatus::Error;
            self.error_message = Some(error.to_string());
        }
    }

    fn parse_i64(&mut self, field: &'static str, value: &str) -> i64 {
        let value = value.trim();
        match value.parse::<i64>() {
            Ok(parsed) => parsed,
            Err(source) => {
                self.record_error(FieldError::Integer {
                    field,
                    value: value.to_string(),
                    source,
                });
                0
            }
        }
    }

    fn parse_f64(&mut self, field: &'static str, value: &str) -> f64 {
        let value = value.trim();
        match value.parse::<f64>() {
            Ok(parsed) => parsed,
            Err(source) => {
                self.record_error(FieldError::Float {
                    field,
                    value: value.to_string(),
                    source,
                });
                0.0
            }
        }
    }
}

/// Convert the generated date and time fields into UTC epoch milliseconds
pub fn parse_timestamp_millis(date: &str, time: &str) -> Result<i64, FieldError> {
    let joined = format!("{}T{}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&joined, TIMESTAMP_LAYOUT)
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|e| FieldError::Timestamp {
            value: joined,
            reason: e.to_string(),
        })
}

/// Decode a raw frame, replacing any invalid UTF-8
pub fn decode_frame(frame: &[u8]) -> SbsRecord {
    decode_line(&String::from_utf8_lossy(frame))
}

/// Decode one BaseStation line.
///
/// Never fails: short lines yield whatever common fields are present and a
/// `Truncated` error status, bad numbers are zeroed and noted.
///
/// Example: `MSG,3,1,1,4CA2D6,1,2024/03/10,14:30:00.000,2024/03/10,14:30:00.000,,37000,,,53.12345,-2.54321,,,0,0,0,0`
pub fn decode_line(line: &str) -> SbsRecord {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    let field = |index: usize| fields.get(index).copied().unwrap_or_default();

    let mut record = SbsRecord {
        message_type: MessageType::from_field(field(IDX_MESSAGE_TYPE)),
        transmission_type: field(IDX_TRANSMISSION_TYPE).to_string(),
        session_id: field(IDX_SESSION_ID).to_string(),
        aircraft_id: field(IDX_AIRCRAFT_ID).to_string(),
        hex_ident: field(IDX_HEX_IDENT).to_string(),
        flight_id: field(IDX_FLIGHT_ID).to_string(),
        ..Default::default()
    };

    let expected = record.message_type.expected_field_count();
    if fields.len() < expected {
        record.record_error(FieldError::Truncated {
            message_type: record.message_type.clone(),
            expected,
            actual: fields.len(),
        });
    }

    if fields.len() >= COMMON_FIELD_COUNT {
        record.timestamp_millis =
            match parse_timestamp_millis(field(IDX_DATE_GENERATED), field(IDX_TIME_GENERATED)) {
                Ok(millis) => millis,
                Err(e) => {
                    warn!("Error parsing record time: {}", e);
                    record.record_error(e);
                    0
                }
            };
    }

    match FieldLayout::for_field_count(fields.len()) {
        FieldLayout::Common => {}
        FieldLayout::WithCallsign => {
            record.callsign = field(IDX_CALLSIGN).trim().to_string();
        }
        FieldLayout::Full => {
            record.callsign = field(IDX_CALLSIGN).trim().to_string();
            record.altitude = record.parse_i64("altitude", field(IDX_ALTITUDE));
            record.ground_speed = record.parse_f64("ground speed", field(IDX_GROUND_SPEED));
            record.track = record.parse_f64("track", field(IDX_TRACK));
            record.latitude = record.parse_f64("latitude", field(IDX_LATITUDE));
            record.longitude = record.parse_f64("longitude", field(IDX_LONGITUDE));
            record.vertical_rate = record.parse_i64("vertical rate", field(IDX_VERTICAL_RATE));
            record.squawk = field(IDX_SQUAWK).to_string();
            record.alert = field(IDX_ALERT).to_string();
            record.emergency = field(IDX_EMERGENCY).to_string();
            record.spi = field(IDX_SPI).to_string();
            record.on_ground = field(IDX_ON_GROUND).to_string();
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_identification_message() {
        let line = "MSG,1,111,11111,738065,111111,2008/11/28,23:48:18.611,2008/11/28,23:53:19.161,RYR1427,,,,,,,,,,,0";
        let record = decode_line(line);

        // Empty altitude is the first failing numeric field
        assert_eq!(record.status, RecordStatus::Error);
        assert!(record.error_message.as_deref().unwrap().contains("altitude"));
        assert_eq!(record.message_type, MessageType::Msg);
        assert_eq!(record.transmission_type, "1");
        assert_eq!(record.session_id, "111");
        assert_eq!(record.aircraft_id, "11111");
        assert_eq!(record.hex_ident, "738065");
        assert_eq!(record.flight_id, "111111");
        assert_eq!(record.timestamp_millis, 1227916098611);
        assert_eq!(record.callsign, "RYR1427");
        assert_eq!(record.on_ground, "0");
    }

    #[test]
    fn test_decode_full_position_message() {
        let line = "MSG,3,1,1,4BB268,1,2023/06/01,12:34:56.789,2023/06/01,12:34:56.789,UAL123,35000,450.5,90.25,37.6213,-122.3790,-1000,1234,0,0,0,-1";
        let record = decode_line(line);

        assert!(record.is_ok());
        assert_eq!(record.timestamp_millis, 1685622896789);
        assert_eq!(record.callsign, "UAL123");
        assert_eq!(record.altitude, 35000);
        assert_eq!(record.ground_speed, 450.5);
        assert_eq!(record.track, 90.25);
        assert_eq!(record.latitude, 37.6213);
        assert_eq!(record.longitude, -122.3790);
        assert_eq!(record.vertical_rate, -1000);
        assert_eq!(record.squawk, "1234");
        assert_eq!(record.alert, "0");
        assert_eq!(record.emergency, "0");
        assert_eq!(record.spi, "0");
        assert_eq!(record.on_ground, "-1");
    }

    #[test]
    fn test_empty_numeric_fields_are_zeroed_and_flag_error() {
        let line = "MSG,3,1,1,4CA2D6,1,2024/03/10,14:30:00.000,2024/03/10,14:30:00.000,,37000,,,53.1,-2.5,,,0,0,0,0";
        let record = decode_line(line);

        assert_eq!(record.status, RecordStatus::Error);
        let message = record.error_message.as_deref().unwrap();
        assert!(message.contains("ground speed"), "got: {message}");
        assert_eq!(record.timestamp_millis, 1710081000000);
        assert_eq!(record.altitude, 37000);
        assert_eq!(record.ground_speed, 0.0);
        assert_eq!(record.track, 0.0);
        assert_eq!(record.latitude, 53.1);
        assert_eq!(record.longitude, -2.5);
        assert_eq!(record.vertical_rate, 0);
        assert_eq!(record.alert, "0");
    }

    #[test]
    fn test_velocity_message_with_empty_position_is_error() {
        let line = "MSG,4,1,1,738065,1,2008/11/28,23:48:18.611,2008/11/28,23:53:19.161,,,420,179,,,-64,,,,,0";
        let record = decode_line(line);

        assert_eq!(record.status, RecordStatus::Error);
        assert_eq!(record.altitude, 0);
        assert_eq!(record.ground_speed, 420.0);
        assert_eq!(record.track, 179.0);
        assert_eq!(record.latitude, 0.0);
        assert_eq!(record.vertical_rate, -64);
    }

    #[test]
    fn test_malformed_numbers_keep_first_error_and_continue() {
        let line = "MSG,3,1,1,738065,1,2008/11/28,23:48:18.611,2008/11/28,23:53:19.161,,FL350,,,abc,1.02826,,,0,0,0,0";
        let record = decode_line(line);

        assert_eq!(record.status, RecordStatus::Error);
        let message = record.error_message.as_deref().unwrap();
        assert!(message.contains("altitude"), "got: {message}");
        assert!(message.contains("FL350"));

        // Later fields still decode
        assert_eq!(record.altitude, 0);
        assert_eq!(record.latitude, 0.0);
        assert_eq!(record.longitude, 1.02826);
        assert_eq!(record.on_ground, "0");
    }

    #[test]
    fn test_id_message_with_callsign_layout() {
        let line = "ID,,111,11111,4CA2D6,111111,2024/03/10,14:30:00.000,2024/03/10,14:30:00.000,EZY12AB";
        let record = decode_line(line);

        assert!(record.is_ok());
        assert_eq!(record.message_type, MessageType::Id);
        assert_eq!(record.callsign, "EZY12AB");
        assert_eq!(record.timestamp_millis, 1710081000000);
    }

    #[test]
    fn test_short_msg_line_keeps_common_fields() {
        let line = "MSG,3,1,1,738065,1,2008/11/28,23:48:18.611,2008/11/28,23:53:19.161,,36000";
        let record = decode_line(line);

        assert_eq!(record.status, RecordStatus::Error);
        assert!(
            record
                .error_message
                .as_deref()
                .unwrap()
                .contains("expected 22 fields, got 12")
        );
        assert_eq!(record.hex_ident, "738065");
        assert_eq!(record.timestamp_millis, 1227916098611);
        assert_eq!(record.altitude, 0);
        assert_eq!(record.callsign, "");
    }

    #[test]
    fn test_line_shorter_than_common_prefix_does_not_panic() {
        let record = decode_line("MSG,3,1");

        assert_eq!(record.status, RecordStatus::Error);
        assert_eq!(record.message_type, MessageType::Msg);
        assert_eq!(record.transmission_type, "3");
        assert_eq!(record.hex_ident, "");
        assert_eq!(record.timestamp_millis, 0);
    }

    #[test]
    fn test_unparseable_timestamp_yields_epoch_sentinel() {
        let line = "STA,,5,179,400AE7,10103,not-a-date,14:30:00.000";
        let record = decode_line(line);

        assert_eq!(record.message_type, MessageType::Sta);
        assert_eq!(record.timestamp_millis, 0);
        assert_eq!(record.timestamp(), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(record.status, RecordStatus::Error);
        assert!(record.error_message.unwrap().contains("not-a-date"));
    }

    #[test]
    fn test_unknown_prefix() {
        let record = decode_line("CLK,,,,,,2024/03/10,14:30:00.000");
        assert_eq!(record.message_type, MessageType::Unknown);
        assert!(record.is_ok());
    }

    #[test]
    fn test_decode_frame_replaces_invalid_utf8() {
        let record = decode_frame(b"MSG,5,1,1,\xff4CA2D6,1,2024/03/10,14:30:00.000");
        assert_eq!(record.message_type, MessageType::Msg);
        assert!(record.hex_ident.ends_with("4CA2D6"));
    }

    #[test]
    fn test_field_layout_table() {
        assert_eq!(FieldLayout::for_field_count(22), FieldLayout::Full);
        assert_eq!(FieldLayout::for_field_count(11), FieldLayout::WithCallsign);
        assert_eq!(FieldLayout::for_field_count(8), FieldLayout::Common);
        assert_eq!(FieldLayout::for_field_count(23), FieldLayout::Common);
        assert_eq!(FieldLayout::for_field_count(0), FieldLayout::Common);
    }

    #[test]
    fn test_parse_timestamp_millis() {
        assert_eq!(
            parse_timestamp_millis("2024/03/10", "14:59:59.999").unwrap(),
            1710082799999
        );
        assert!(parse_timestamp_millis("2024-03-10", "14:59:59.999").is_err());

        // Fraction must be exactly three digits
        assert!(parse_timestamp_millis("2024/03/10", "14:30:00").is_err());
        assert!(parse_timestamp_millis("2024/03/10", "14:30:00.5").is_err());
        assert!(parse_timestamp_millis("2024/03/10", "14:30:00.123456").is_err());
    }

    #[test]
    fn test_timestamp_without_millis_yields_sentinel() {
        let record = decode_line("AIR,,333,1,4CA2D6,10101,2024/03/10,14:30:00");

        assert_eq!(record.status, RecordStatus::Error);
        assert_eq!(record.timestamp_millis, 0);
    }
}
