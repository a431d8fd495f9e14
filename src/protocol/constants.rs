//! Wire constants of the STEP protocol
//!
//! Field names and enumerated values are stable and case-sensitive.

/// Default TCP port of a STEP server
pub const DEFAULT_PORT: u16 = 1379;

/// Advisory packet size, used for buffer sizing only
pub const MAX_PACKET_SIZE: usize = 20480;

/// Hard ceiling on a single frame (both length fields summed)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the two big-endian length fields preceding every frame
pub const FRAME_HEADER_LEN: usize = 8;

/// Status code of a successful response
pub const STATUS_OK: i64 = 200;
pub const STATUS_BAD_REQUEST: i64 = 400;
pub const STATUS_UNAUTHORIZED: i64 = 401;
pub const STATUS_NOT_FOUND: i64 = 404;
pub const STATUS_INTERNAL_ERROR: i64 = 500;

pub const FIELD_OPERATION: &str = "operation";
pub const FIELD_DIRECTION: &str = "direction";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_USERNAME: &str = "username";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_TOKEN: &str = "token";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_STATUS_MSG: &str = "status_msg";
pub const FIELD_KEY: &str = "key";
pub const FIELD_SIZE: &str = "size";
pub const FIELD_TOTAL_BLOCK: &str = "total_block";
pub const FIELD_BLOCK_SIZE: &str = "block_size";
pub const FIELD_BLOCK_INDEX: &str = "block_index";
pub const FIELD_MD5: &str = "md5";

// vim: ts=4
