use log::{debug, trace};
use rand::rngs::OsRng;
use rand::TryRngCore;
use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH};
use thiserror::Error;
use uuid::{Builder, ContextV1, ContextV7, Timestamp, Uuid};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown UUID version {0}, supported values are 1, 4, 6, 7")]
    InvalidVersion(u8),
    #[error("Entropy source unavailable")]
    Entropy(#[source] rand::rand_core::OsError),
    #[error("System clock is set before the Unix epoch")]
    Clock(#[source] SystemTimeError),
    #[error("Failed to write UUID")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidVersion {
    V1,
    V4,
    V6,
    V7,
}

impl UuidVersion {
    pub fn number(self) -> u8 {
        match self {
            UuidVersion::V1 => 1,
            UuidVersion::V4 => 4,
            UuidVersion::V6 => 6,
            UuidVersion::V7 => 7,
        }
    }
}

impl TryFrom<u8> for UuidVersion {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version {
            1 => Ok(UuidVersion::V1),
            4 => Ok(UuidVersion::V4),
            6 => Ok(UuidVersion::V6),
            7 => Ok(UuidVersion::V7),
            other => Err(Error::InvalidVersion(other)),
        }
    }
}

impl fmt::Display for UuidVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UUIDv{}", self.number())
    }
}

/// Per-process generation state.
///
/// v1 and v6 share a node id (the interface MAC address, or a random one when
/// none is available) and a 14-bit clock sequence counter.
/// v7 keeps its own counter so ids created within one millisecond still sort.
pub struct Generator {
    node_id: [u8; 6],
    context: ContextV1,
    context_v7: ContextV7,
}

impl Generator {
    /// Uses the hardware address as node id and seeds the clock sequence from
    /// the OS entropy source.
    pub fn new() -> Result<Self, Error> {
        let hardware = match mac_address::get_mac_address() {
            Ok(mac) => mac.map(|mac| mac.bytes()),
            Err(err) => {
                debug!("no hardware address for node id: {}", err);
                None
            }
        };
        let node_id = resolve_node_id(hardware)?;

        let clock_seq = OsRng.try_next_u32().map_err(Error::Entropy)? as u16;
        trace!("node id {:02x?}, clock sequence {}", node_id, clock_seq);

        Ok(Self::with_node(node_id, clock_seq))
    }

    pub fn with_node(node_id: [u8; 6], clock_seq: u16) -> Self {
        Self {
            node_id,
            context: ContextV1::new(clock_seq),
            context_v7: ContextV7::new(),
        }
    }

    pub fn generate(&self, version: UuidVersion) -> Result<Uuid, Error> {
        let uuid = match version {
            UuidVersion::V1 => {
                let now = unix_now()?;
                let ts = Timestamp::from_unix(&self.context, now.as_secs(), now.subsec_nanos());
                Uuid::new_v1(ts, &self.node_id)
            }
            UuidVersion::V4 => {
                let mut bytes = [0u8; 16];
                OsRng.try_fill_bytes(&mut bytes).map_err(Error::Entropy)?;
                Builder::from_random_bytes(bytes).into_uuid()
            }
            UuidVersion::V6 => {
                let now = unix_now()?;
                let ts = Timestamp::from_unix(&self.context, now.as_secs(), now.subsec_nanos());
                Uuid::new_v6(ts, &self.node_id)
            }
            UuidVersion::V7 => {
                let now = unix_now()?;
                let ts =
                    Timestamp::from_unix(&self.context_v7, now.as_secs(), now.subsec_nanos());
                Uuid::new_v7(ts)
            }
        };

        Ok(uuid)
    }

    /// Writes `count` ids, one per line, each as soon as it is generated.
    ///
    /// Lines written before a failure are left in `out`.
    pub fn write_uuids<W: Write>(
        &self,
        out: &mut W,
        version: UuidVersion,
        count: u64,
    ) -> Result<(), Error> {
        debug!("generating {} {}(s)", count, version);

        for _ in 0..count {
            let uuid = self.generate(version)?;
            writeln!(out, "{}", uuid.hyphenated())?;
        }

        Ok(())
    }
}

/// Keeps a usable hardware address, otherwise draws a random node id.
fn resolve_node_id(hardware: Option<[u8; 6]>) -> Result<[u8; 6], Error> {
    match hardware {
        Some(node_id) if node_id != [0u8; 6] => Ok(node_id),
        _ => {
            let mut node_id = [0u8; 6];
            OsRng.try_fill_bytes(&mut node_id).map_err(Error::Entropy)?;
            // Random node ids must carry the multicast bit (RFC 4122 4.5).
            node_id[0] |= 0x01;
            Ok(node_id)
        }
    }
}

fn unix_now() -> Result<Duration, Error> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(Error::Clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Variant;

    const NODE: [u8; 6] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab];

    fn generate_lines(generator: &Generator, version: UuidVersion, count: u64) -> Vec<String> {
        let mut out = Vec::new();
        generator.write_uuids(&mut out, version, count).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn every_version_writes_canonical_lines() {
        let generator = Generator::new().unwrap();

        for version in [
            UuidVersion::V1,
            UuidVersion::V4,
            UuidVersion::V6,
            UuidVersion::V7,
        ] {
            let lines = generate_lines(&generator, version, 25);
            assert_eq!(lines.len(), 25);

            for line in &lines {
                assert_eq!(line.len(), 36, "{}", line);
                for (i, c) in line.char_indices() {
                    if [8, 13, 18, 23].contains(&i) {
                        assert_eq!(c, '-', "{}", line);
                    } else {
                        assert!(matches!(c, '0'..='9' | 'a'..='f'), "{}", line);
                    }
                }

                let uuid = Uuid::parse_str(line).unwrap();
                assert_eq!(uuid.get_version_num(), version.number() as usize);
                assert_eq!(uuid.get_variant(), Variant::RFC4122);
            }
        }
    }

    #[test]
    fn zero_count_writes_nothing() {
        let mut out = Vec::new();
        Generator::new()
            .unwrap()
            .write_uuids(&mut out, UuidVersion::V4, 0)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn v4_ids_are_unique_and_all_free_bits_vary() {
        let generator = Generator::new().unwrap();
        let mut seen = HashSet::new();
        let mut all_or = 0u128;
        let mut all_and = u128::MAX;

        for _ in 0..10_000 {
            let value = generator.generate(UuidVersion::V4).unwrap().as_u128();
            assert!(seen.insert(value));
            all_or |= value;
            all_and &= value;
        }

        let fixed = (0xfu128 << 76) | (0x3u128 << 62);
        assert_eq!((all_or & !all_and) & !fixed, !fixed);
    }

    #[test]
    fn v6_ids_sort_in_generation_order() {
        let generator = Generator::with_node(NODE, 0);
        let lines = generate_lines(&generator, UuidVersion::V6, 1_000);

        for pair in lines.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn v7_ids_sort_in_generation_order() {
        let generator = Generator::with_node(NODE, 0);
        let lines = generate_lines(&generator, UuidVersion::V7, 1_000);

        for pair in lines.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn time_based_ids_carry_node_and_timestamp() {
        let generator = Generator::with_node(NODE, 0);

        for version in [UuidVersion::V1, UuidVersion::V6] {
            let uuid = generator.generate(version).unwrap();
            assert_eq!(&uuid.as_bytes()[10..], &NODE);

            let (secs, _) = uuid.get_timestamp().unwrap().to_unix();
            let now = unix_now().unwrap().as_secs();
            assert!(now.abs_diff(secs) < 60);
        }
    }

    #[test]
    fn hardware_node_id_is_used_unchanged() {
        let mac = [0x02, 0x42, 0xac, 0x11, 0x00, 0x02];
        assert_eq!(resolve_node_id(Some(mac)).unwrap(), mac);
        assert_eq!(Generator::with_node(mac, 0).node_id, mac);
    }

    #[test]
    fn missing_hardware_address_falls_back_to_random_multicast_node() {
        for hardware in [None, Some([0u8; 6])] {
            let node_id = resolve_node_id(hardware).unwrap();
            assert_eq!(node_id[0] & 0x01, 0x01);
        }

        let first = resolve_node_id(None).unwrap();
        let second = resolve_node_id(None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn generator_node_id_matches_host() {
        let generator = Generator::new().unwrap();
        match mac_address::get_mac_address() {
            Ok(Some(mac)) if mac.bytes() != [0u8; 6] => {
                assert_eq!(generator.node_id, mac.bytes())
            }
            _ => assert_eq!(generator.node_id[0] & 0x01, 0x01),
        }
    }

    #[test]
    fn version_numbers_round_trip() {
        for n in [1u8, 4, 6, 7] {
            assert_eq!(UuidVersion::try_from(n).unwrap().number(), n);
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = UuidVersion::try_from(5).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(5)));
        assert_eq!(
            err.to_string(),
            "Unknown UUID version 5, supported values are 1, 4, 6, 7"
        );
    }

    struct FailAfterLines {
        written: Vec<u8>,
        lines: usize,
    }

    impl Write for FailAfterLines {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let done = self.written.iter().filter(|&&b| b == b'\n').count();
            if done >= self.lines {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn keeps_lines_written_before_a_failure() {
        let generator = Generator::new().unwrap();
        let mut out = FailAfterLines {
            written: Vec::new(),
            lines: 2,
        };

        let err = generator
            .write_uuids(&mut out, UuidVersion::V7, 5)
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(String::from_utf8(out.written).unwrap().lines().count(), 2);
    }
}
