/// Lua script for decrementing a fixed-window counter
///
/// Runs atomically in Redis, so a concurrent caller can never observe the
/// counter between the zero check and the decrement. `DECRBY` keeps the key's
/// TTL, so the window is never extended.
///
/// A stored value above the current capacity is lowered to it in the same
/// `DECRBY`, so a record written under a larger quota cannot over-admit.
///
/// KEYS[1] = the rate limit key
/// ARGV[1] = window duration (milliseconds), applied only if the key has no expiry
/// ARGV[2] = capacity
///
/// Returns: [status, remaining, ttl_ms]
///   status  -1 = missing, 0 = exhausted, 1 = decremented
///   ttl_ms  -1 when unknown
pub const DECREMENT_IF_POSITIVE_SCRIPT: &str = r#"
local key = KEYS[1]
local window = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])

local current = redis.call('GET', key)
if not current then
    return {-1, 0, -1}
end

local stored = tonumber(current)
if not stored then
    return redis.error_reply('rate limit record is not an integer')
end

local ttl = redis.call('PTTL', key)
if ttl == -1 then
    -- No expiry set, set it now
    redis.call('PEXPIRE', key, window)
    ttl = window
end

local count = math.min(stored, capacity)
if count <= 0 then
    return {0, 0, ttl}
end

local remaining = redis.call('DECRBY', key, stored - count + 1)
return {1, remaining, ttl}
"#;
