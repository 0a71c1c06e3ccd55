pub const DEFAULT_PAIRING_FILE: &str = "pair.json";
pub const DEFAULT_DISCOVERY_PORT: u16 = 49152;
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 5;

// Frames are length-prefixed JSON; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;
pub const MAX_DATAGRAM_LEN: usize = 2048;

// HID usage pages
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
pub const USAGE_PAGE_KEYBOARD: u16 = 0x07;
pub const USAGE_PAGE_CONSUMER: u16 = 0x0C;

pub const LONG_PRESS_HOLD_MS: u64 = 1000;

// Keyboard usages for the digit keys, in '0', '1' .. '9' order.
pub const DIGIT_SCAN_CODES: [u16; 10] = [
    0x027, 0x01E, 0x01F, 0x020, 0x021, 0x022, 0x023, 0x024, 0x025, 0x026,
];

// Handshake labels
pub const PAIR_SETUP_INFO: &[u8] = b"atv-pair-setup";
pub const PAIR_VERIFY_LABEL: &[u8] = b"atv-pair-verify";
pub const CONNECT_VERIFY_LABEL: &[u8] = b"atv-connect-verify";
pub const SECRET_LEN: usize = 32;
pub const CLIENT_ID_LEN: usize = 8;
