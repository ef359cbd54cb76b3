//! Small stateless helpers shared by the session store and the clock-sync
//! application layer: a byte checksum for the session persistence blob, and
//! GPS/Unix time conversion for the `DeviceTimeAns` MAC command.

/// Simple additive checksum used to guard the session persistence blob
/// against bit rot / partial writes. Not cryptographic.
pub fn checksum(bytes: &[u8]) -> u8 {
    let mut sum: u32 = 0xff;
    for &b in bytes {
        sum += b as u32;
    }
    (sum % 256) as u8
}

/// GPS epoch (1980-01-06T00:00:00Z) to Unix epoch offset, minus the 18
/// leap seconds accumulated since, as used by the LoRaWAN DeviceTimeAns /
/// clock-sync extension. This is a fixed constant, not a live leap-second
/// table: it matches the offset valid at the time of writing and will
/// drift if further leap seconds are introduced.
const GPS_UNIX_OFFSET: i64 = 315_964_800 - 18;

/// Converts a GPS time-of-week-free GPS second count to Unix time.
pub fn gps_to_unix(gps_seconds: u32) -> i64 {
    gps_seconds as i64 + GPS_UNIX_OFFSET
}

/// Converts Unix time back to the GPS second count used on the wire.
pub fn unix_to_gps(unix_seconds: i64) -> u32 {
    (unix_seconds - GPS_UNIX_OFFSET) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_reference_value() {
        assert_eq!(checksum(&[]), 0xff);
        assert_eq!(checksum(&[1, 2, 3]), (0xffu32 + 1 + 2 + 3) as u8);
    }

    #[test]
    fn gps_unix_roundtrip() {
        let gps = 1_234_567_890u32;
        let unix = gps_to_unix(gps);
        assert_eq!(unix_to_gps(unix), gps);
    }
}
