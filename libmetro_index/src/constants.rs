// Bunches
/// Maximum number of electrons (or photons) a single bunch may hold
pub const BUNCH_CAPACITY: usize = 50;

// Words
/// Size of a packed decoded word (tag, arg1, arg2, arg3)
pub const WORD_SIZE: usize = 8;
/// Size of a raw HPTDC group mode word
pub const RAW_WORD_SIZE: usize = 4;
/// Tag given to raw words which match no known definition
pub const UNKNOWN_WORD_TAG: [u8; 2] = *b"??";

// ASCII logs
/// Maximum length of a single line (including the terminator) in an ASCII log
pub const MAX_LINE_LENGTH: usize = 8192;
pub const SCAN_MARKER: &str = "#Scan";
pub const STEP_MARKER: &str = "#Step";
pub const ATTRIBUTE_PREFIX: &str = "# ";
pub const ATTRIBUTE_SEPARATOR: &str = ": ";

// HPTDC files
pub const HPTDC_MAGIC: &[u8; 5] = b"HPTDC";
pub const HPTDC_DATA_TAG: &[u8; 4] = b"DATA";
/// Header size of a new style header without extra bytes before the DATA tag
pub const HPTDC_HEADER_FIXED_SIZE: i32 = 32;
/// Anything larger than this is taken as an indication of an old style header
pub const HPTDC_MAX_HEADER_SIZE: i32 = 4096;
/// Length of the ascii step value in a step table entry
pub const STEP_VALUE_LENGTH: usize = 32;
/// Size of a single hit record in HITS mode
pub const HIT_SIZE: usize = 16;
/// The first scan marker is searched for in this many bytes after the magic code
pub const MARKER_SEARCH_WINDOW: usize = 2048;
pub const GROUP_SCAN_MARKER: &[u8] = b"\x00\x00\x00\x00\xa0\x00\x00\x00";
pub const GROUP_STEP_MARKER: &[u8] = b"\x00\x00\x00\x00\xb0\x00\x00\x00";
pub const HIT_SCAN_MARKER: &[u8] =
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\xa0\x00\x00\x00\x00\x00\x00";
pub const HIT_STEP_MARKER: &[u8] =
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\xb0\x00\x00\x00\x00\x00\x00";
