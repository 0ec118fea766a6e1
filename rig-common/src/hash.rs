//! Joint name hashing
//!
//! Joints and animation tracks are identified by the ELF hash of the
//! lower-cased joint name. Modern skeleton and animation files store only
//! the hash, so the same function must be used everywhere a name is turned
//! into an identifier.

/// ELF hash of `name`, case-insensitive (ASCII lower-casing)
pub fn elf_hash(name: &str) -> u32 {
    let mut h: u32 = 0;
    for byte in name.bytes() {
        h = (h << 4).wrapping_add(byte.to_ascii_lowercase() as u32);
        let high = h & 0xF000_0000;
        if high != 0 {
            h ^= high >> 24;
        }
        h &= !high;
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_name() {
        assert_eq!(elf_hash(""), 0);
    }

    #[test]
    fn test_short_name_is_packed_nibbles() {
        // With fewer than 7 characters no high nibble is ever folded back
        let expected = ((b'r' as u32) << 12)
            + ((b'o' as u32) << 8)
            + ((b'o' as u32) << 4)
            + (b't' as u32);
        assert_eq!(elf_hash("root"), expected);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(elf_hash("Pelvis"), elf_hash("pelvis"));
        assert_eq!(elf_hash("L_UpperArm"), elf_hash("l_upperarm"));
        assert_ne!(elf_hash("L_UpperArm"), elf_hash("R_UpperArm"));
    }

    #[test]
    fn test_high_bits_cleared() {
        let h = elf_hash("buffbone_glb_channel_loc_really_long_name");
        assert_eq!(h & 0xF000_0000, 0);
    }
}
