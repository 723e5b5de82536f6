//! Proof-of-work difficulty target
//!
//! Difficulty is an integer `d`: a block hash read as a 256-bit big-endian
//! integer is valid iff it is at most `2^(256 - d)`. All functions here are
//! pure and stateless.

/// Big-endian bytes of the target `2^(256 - difficulty)`.
///
/// `difficulty == 0` saturates to all-ones (every hash passes) since `2^256`
/// does not fit in 256 bits; anything above 256 collapses the target to the
/// single hash `0`.
pub fn target(difficulty: u32) -> [u8; 32] {
    if difficulty == 0 {
        return [0xff; 32];
    }
    let mut target = [0u8; 32];
    if difficulty > 256 {
        return target;
    }
    // Set the single bit at position 256 - difficulty (LSB = position 0).
    let bit = 256 - difficulty;
    target[31 - (bit / 8) as usize] = 1 << (bit % 8);
    target
}

/// Returns `true` if a 64-char hex hash satisfies the difficulty predicate.
///
/// Big-endian byte arrays compare lexicographically the same way the
/// underlying integers compare, so no big-integer arithmetic is needed.
/// Hashes that fail to decode to 32 bytes never pass.
pub fn meets_target(hash_hex: &str, difficulty: u32) -> bool {
    let Ok(bytes) = hex::decode(hash_hex) else {
        return false;
    };
    if bytes.len() != 32 {
        return false;
    }
    bytes.as_slice() <= target(difficulty).as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_a_power_of_two() {
        // difficulty 8 -> 2^248 -> leading byte 0x01.
        let t = target(8);
        assert_eq!(t[0], 0x01);
        assert!(t[1..].iter().all(|&b| b == 0));

        // difficulty 12 -> 2^244 -> second byte 0x10.
        let t = target(12);
        assert_eq!(t[0], 0x00);
        assert_eq!(t[1], 0x10);
        assert!(t[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_boundary_hashes() {
        // Exactly the target passes; one above fails.
        let on_target = format!("01{}", "00".repeat(31));
        assert!(meets_target(&on_target, 8));

        let above = format!("01{}01", "00".repeat(30));
        assert!(!meets_target(&above, 8));

        let below = format!("00{}", "ff".repeat(31));
        assert!(meets_target(&below, 8));
    }

    #[test]
    fn test_difficulty_zero_accepts_everything() {
        assert!(meets_target(&"ff".repeat(32), 0));
    }

    #[test]
    fn test_difficulty_256_accepts_only_tiny_hashes() {
        assert!(meets_target(&"00".repeat(32), 256));
        let one = format!("{}01", "00".repeat(31));
        assert!(meets_target(&one, 256));
        let two = format!("{}02", "00".repeat(31));
        assert!(!meets_target(&two, 256));
    }

    #[test]
    fn test_malformed_hashes_never_pass() {
        assert!(!meets_target("zz", 0));
        assert!(!meets_target("abcd", 8));
    }
}
