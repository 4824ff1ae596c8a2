//! Minimal SNTP v4 client packet handling (RFC 4330).

pub const NTP_SERVER: &str = "pool.ntp.org";
pub const NTP_PORT: u16 = 123;
pub const PACKET_LEN: usize = 48;
pub const MAX_ATTEMPTS: usize = 10;
pub const RETRY_DELAY_MS: u64 = 2000;

/// Seconds from 1900-01-01 (NTP era 0) to 1970-01-01.
const UNIX_OFFSET: u64 = 2_208_988_800;

const VERSION: u8 = 4;
const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const LI_ALARM: u8 = 3;
const TRANSMIT_OFFSET: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NtpError {
    Truncated(usize),
    NotServerReply(u8),
    /// Stratum 0: the server asked us to back off.
    KissOfDeath,
    Unsynchronized,
    ZeroTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NtpTime {
    pub unix_secs: u64,
    pub micros: u32,
}

impl NtpTime {
    pub fn unix_millis(&self) -> u64 {
        self.unix_secs * 1000 + u64::from(self.micros / 1000)
    }
}

/// Client request: LI 0, version 4, mode 3, everything else zero.
pub fn request() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = (VERSION << 3) | MODE_CLIENT;
    packet
}

/// Extracts the server transmit timestamp.
pub fn parse_response(packet: &[u8]) -> Result<NtpTime, NtpError> {
    if packet.len() < PACKET_LEN {
        return Err(NtpError::Truncated(packet.len()));
    }
    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER {
        return Err(NtpError::NotServerReply(mode));
    }
    if packet[0] >> 6 == LI_ALARM {
        return Err(NtpError::Unsynchronized);
    }
    if packet[1] == 0 {
        return Err(NtpError::KissOfDeath);
    }

    let t = &packet[TRANSMIT_OFFSET..PACKET_LEN];
    let secs = u32::from_be_bytes([t[0], t[1], t[2], t[3]]);
    let frac = u32::from_be_bytes([t[4], t[5], t[6], t[7]]);
    if secs == 0 && frac == 0 {
        return Err(NtpError::ZeroTimestamp);
    }

    // Values below the 1970 offset belong to era 1 (from 2036-02-07).
    let secs = u64::from(secs);
    let unix_secs = if secs >= UNIX_OFFSET {
        secs - UNIX_OFFSET
    } else {
        secs + (1u64 << 32) - UNIX_OFFSET
    };
    let micros = ((u64::from(frac) * 1_000_000) >> 32) as u32;
    Ok(NtpTime { unix_secs, micros })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(secs: u32, frac: u32) -> [u8; PACKET_LEN] {
        let mut p = [0u8; PACKET_LEN];
        p[0] = (VERSION << 3) | MODE_SERVER;
        p[1] = 2;
        p[40..44].copy_from_slice(&secs.to_be_bytes());
        p[44..48].copy_from_slice(&frac.to_be_bytes());
        p
    }

    #[test]
    fn request_header() {
        let packet = request();
        assert_eq!(packet[0], 0x23);
        assert!(packet[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn decodes_transmit_timestamp() {
        // 2024-01-01T00:00:00.5Z
        let secs = (1_704_067_200u64 + UNIX_OFFSET) as u32;
        let time = parse_response(&reply(secs, 0x8000_0000)).unwrap();
        assert_eq!(time.unix_secs, 1_704_067_200);
        assert_eq!(time.micros, 500_000);
        assert_eq!(time.unix_millis(), 1_704_067_200_500);
    }

    #[test]
    fn wraps_into_era_one() {
        // 2040-01-01T00:00:00Z
        let unix = 2_208_988_800u64;
        let secs = (unix + UNIX_OFFSET - (1u64 << 32)) as u32;
        assert_eq!(parse_response(&reply(secs, 0)).unwrap().unix_secs, unix);
    }

    #[test]
    fn rejects_short_and_foreign_packets() {
        assert_eq!(parse_response(&[0u8; 47]), Err(NtpError::Truncated(47)));

        let mut p = reply(1, 0);
        p[0] = (VERSION << 3) | MODE_CLIENT;
        assert_eq!(parse_response(&p), Err(NtpError::NotServerReply(3)));
    }

    #[test]
    fn rejects_kiss_of_death_and_alarm() {
        let mut p = reply(3_900_000_000, 0);
        p[1] = 0;
        assert_eq!(parse_response(&p), Err(NtpError::KissOfDeath));

        let mut p = reply(3_900_000_000, 0);
        p[0] |= LI_ALARM << 6;
        assert_eq!(parse_response(&p), Err(NtpError::Unsynchronized));
    }

    #[test]
    fn rejects_zero_timestamp() {
        assert_eq!(parse_response(&reply(0, 0)), Err(NtpError::ZeroTimestamp));
    }
}
