//! Middleware priority constants. Lower runs first.

pub const FIRST: u32 = 10;
pub const NORMAL: u32 = 1000;
pub const LAST: u32 = 1990;
