/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Milliseconds in one minute
pub const MINUTE_MS: i64 = 60_000;

/// Milliseconds in one day
pub const DAY_MS: i64 = 24 * 60 * MINUTE_MS;

/// Add a number of minutes to a millisecond timestamp.
pub fn add_minutes(ts: i64, minutes: i64) -> i64 {
    ts.saturating_add(minutes.saturating_mul(MINUTE_MS))
}

/// Generate a Snowflake-style i64, used for order numbers.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms)
///
/// Collisions inside one millisecond are possible; callers that need
/// uniqueness must check an index (see the order-number index in storage).
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}
