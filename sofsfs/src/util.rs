// SPDX-License-Identifier: MIT

use time::OffsetDateTime;

/// Current wall clock, as whole seconds since the UNIX epoch, clamped to
/// the 32-bit range of the on-disk timestamp fields.
pub fn unix_now() -> u32 {
    let secs = OffsetDateTime::now_utc().unix_timestamp();
    secs.clamp(0, u32::MAX as i64) as u32
}
