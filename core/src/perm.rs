//! The 4-bit permission word: `[ownerR ownerW otherR otherW]`, two bits per
//! class, `R = 0b10`, `W = 0b01`.

const READ: u8 = 0b10;
const WRITE: u8 = 0b01;

fn owner_bits(mode: u8) -> u8 {
    (mode >> 2) & 0b11
}

fn other_bits(mode: u8) -> u8 {
    mode & 0b11
}

/// Whether `uid` may read an inode owned by `owner_uid` with mode `mode`.
pub fn can_read(mode: u8, owner_uid: u16, uid: u16) -> bool {
    let bits = if uid == owner_uid { owner_bits(mode) } else { other_bits(mode) };
    bits & READ != 0
}

/// Whether `uid` may write an inode owned by `owner_uid` with mode `mode`.
pub fn can_write(mode: u8, owner_uid: u16, uid: u16) -> bool {
    let bits = if uid == owner_uid { owner_bits(mode) } else { other_bits(mode) };
    bits & WRITE != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_rw_others_none() {
        let mode = 0b1100;
        assert!(can_read(mode, 7, 7));
        assert!(can_write(mode, 7, 7));
        assert!(!can_read(mode, 7, 8));
        assert!(!can_write(mode, 7, 8));
    }

    #[test]
    fn others_read_only() {
        let mode = 0b0010;
        assert!(can_read(mode, 7, 8));
        assert!(!can_write(mode, 7, 8));
    }
}
