// CLASSIFICATION: COMMUNITY
// Filename: uevent.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Kernel uevent datagram decoding.
//!
//! A netlink uevent is a run of NUL-terminated `KEY=VALUE` strings. The
//! decoder keeps the last occurrence of every recognised key and ignores
//! everything else, including `SEQNUM` and the `action@devpath` header the
//! kernel prepends.

use log::debug;

/// Upper bound on a received datagram. Anything this long or longer is
/// treated as truncated and discarded by the receive path.
pub const UEVENT_MSG_LEN: usize = 1024;

/// Sentinel for an absent numeric field.
pub const NO_NUMBER: i32 = -1;

/// One decoded hotplug notification.
///
/// String fields the kernel did not send are empty rather than absent so
/// that prefix comparisons downstream never need a special case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uevent {
    pub action: String,
    pub path: String,
    pub subsystem: String,
    pub firmware: String,
    pub partition_name: Option<String>,
    pub partition_num: i32,
    pub device_name: Option<String>,
    pub modalias: Option<String>,
    pub country: String,
    pub major: i32,
    pub minor: i32,
}

impl Default for Uevent {
    fn default() -> Self {
        Self {
            action: String::new(),
            path: String::new(),
            subsystem: String::new(),
            firmware: String::new(),
            partition_name: None,
            partition_num: NO_NUMBER,
            device_name: None,
            modalias: None,
            country: String::new(),
            major: NO_NUMBER,
            minor: NO_NUMBER,
        }
    }
}

impl Uevent {
    /// True when the event carries both device numbers.
    pub fn is_device_node(&self) -> bool {
        self.major >= 0 && self.minor >= 0
    }

    pub fn is_action(&self, action: &str) -> bool {
        self.action == action
    }
}

/// Recognised keys.
enum Field {
    Action,
    DevPath,
    Subsystem,
    Firmware,
    Major,
    Minor,
    PartN,
    PartName,
    DevName,
    Country,
    ModAlias,
}

impl Field {
    fn from_key(key: &[u8]) -> Option<Self> {
        Some(match key {
            b"ACTION" => Field::Action,
            b"DEVPATH" => Field::DevPath,
            b"SUBSYSTEM" => Field::Subsystem,
            b"FIRMWARE" => Field::Firmware,
            b"MAJOR" => Field::Major,
            b"MINOR" => Field::Minor,
            b"PARTN" => Field::PartN,
            b"PARTNAME" => Field::PartName,
            b"DEVNAME" => Field::DevName,
            b"COUNTRY" => Field::Country,
            b"MODALIAS" => Field::ModAlias,
            _ => return None,
        })
    }
}

/// Decode a raw datagram. Decoding stops at the first empty string.
pub fn parse(msg: &[u8]) -> Uevent {
    let mut event = Uevent::default();

    for entry in msg.split(|b| *b == 0) {
        if entry.is_empty() {
            break;
        }
        let Some(eq) = entry.iter().position(|b| *b == b'=') else {
            continue;
        };
        let Some(field) = Field::from_key(&entry[..eq]) else {
            continue;
        };
        let raw = &entry[eq + 1..];
        let value = || String::from_utf8_lossy(raw).into_owned();
        match field {
            Field::Action => event.action = value(),
            Field::DevPath => event.path = value(),
            Field::Subsystem => event.subsystem = value(),
            Field::Firmware => event.firmware = value(),
            Field::Major => event.major = atoi(raw),
            Field::Minor => event.minor = atoi(raw),
            Field::PartN => event.partition_num = atoi(raw),
            Field::PartName => event.partition_name = Some(value()),
            Field::DevName => event.device_name = Some(value()),
            Field::Country => event.country = value(),
            Field::ModAlias => event.modalias = Some(value()),
        }
    }

    debug!(
        "event {{ '{}', '{}', '{}', '{}', {}, {}, '{}' }}",
        event.action,
        event.path,
        event.subsystem,
        event.firmware,
        event.major,
        event.minor,
        event.country
    );
    event
}

/// Permissive integer parse: leading whitespace, optional sign, then as many
/// digits as are present. Malformed input yields 0 and out of range values
/// wrap, the same contract as C `atoi`.
pub fn atoi(raw: &[u8]) -> i32 {
    let mut rest = raw;
    while let [b, tail @ ..] = rest {
        if b.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }
    let negative = match rest.first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };
    let mut value: i32 = 0;
    for b in rest.iter().take_while(|b| b.is_ascii_digit()) {
        value = value.wrapping_mul(10).wrapping_add(i32::from(b - b'0'));
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}
