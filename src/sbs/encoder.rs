//! Compact re-encoding of decoded SBS records.
//!
//! Only MSG subtypes 1-6 are forwarded downstream. Each becomes a short
//! comma-separated line led by its subtype number:
//!
//! ```text
//! 1,<ts>,<hex>,<callsign>
//! 2,<ts>,<hex>,<altitude>,<lat>,<lon>,<on_ground>
//! 3,<ts>,<hex>,<altitude>,<lat>,<lon>,<on_ground>
//! 4,<ts>,<hex>,<speed>,<track>,<vertical_rate>
//! 5,<ts>,<hex>,<altitude>,<on_ground>
//! 6,<ts>,<hex>,<altitude>,<squawk>
//! ```

use crate::sbs::decoder::{MessageType, SbsRecord};

/// Encode a record into its compact line.
///
/// AIR, ID and STA messages, and MSG subtypes 7 and 8, carry nothing the
/// downstream consumers use and produce `None`.
pub fn encode_record(record: &SbsRecord) -> Option<String> {
    if record.message_type != MessageType::Msg {
        return None;
    }

    let ts = record.timestamp_millis;
    let hex = &record.hex_ident;

    let line = match record.transmission_type.as_str() {
        "1" => format!("1,{},{},{}", ts, hex, record.callsign),
        subtype @ ("2" | "3") => format!(
            "{},{},{},{},{:.5},{:.5},{}",
            subtype, ts, hex, record.altitude, record.latitude, record.longitude, record.on_ground
        ),
        "4" => format!(
            "4,{},{},{:.1},{:.1},{}",
            ts, hex, record.ground_speed, record.track, record.vertical_rate
        ),
        "5" => format!("5,{},{},{},{}", ts, hex, record.altitude, record.on_ground),
        "6" => format!("6,{},{},{},{}", ts, hex, record.altitude, record.squawk),
        _ => return None,
    };

    Some(line)
}

/// Decode then encode a raw line in one step
pub fn encode_line(line: &str) -> Option<String> {
    encode_record(&crate::sbs::decoder::decode_line(line))
}
