//! An in-memory block store, for tests and for exercising `core` without a
//! running disk service.

use crate::{error::Result, Block, BlockDevice, BSIZE};

/// A flat `Vec<Block>` pretending to be a disk of `ncyl * nsec` blocks.
pub struct MemBlockDevice {
    ncyl: u32,
    nsec: u32,
    blocks: Vec<Block>,
}

impl MemBlockDevice {
    /// Creates a device with the given geometry, all blocks zeroed.
    pub fn new(ncyl: u32, nsec: u32) -> Self {
        let total = (ncyl as usize) * (nsec as usize);
        Self {
            ncyl,
            nsec,
            blocks: vec![[0u8; BSIZE]; total],
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn binfo(&mut self) -> Result<(u32, u32)> {
        Ok((self.ncyl, self.nsec))
    }

    fn bread(&mut self, bno: u32) -> Result<Block> {
        Ok(self.blocks[bno as usize])
    }

    fn bwrite(&mut self, bno: u32, data: &Block) -> Result<()> {
        self.blocks[bno as usize] = *data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_after_write() {
        let mut dev = MemBlockDevice::new(4, 16);
        let mut block = [0u8; BSIZE];
        block[0] = 0xaa;
        dev.bwrite(5, &block).unwrap();
        assert_eq!(dev.bread(5).unwrap(), block);
        assert_eq!(dev.bread(0).unwrap(), [0u8; BSIZE]);
    }

    #[test]
    fn binfo_reports_configured_geometry() {
        let mut dev = MemBlockDevice::new(8, 32);
        assert_eq!(dev.binfo().unwrap(), (8, 32));
    }
}
