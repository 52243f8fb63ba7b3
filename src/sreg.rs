/// Status Register 1
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusRegister1(pub u8);

impl StatusRegister1 {
    /// Get BUSY (write in progress) bit.
    pub fn get_busy(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }

    /// Get WEL (write enable latch) bit.
    pub fn get_wel(&self) -> bool {
        self.0 & 0b0000_0010 != 0
    }

    /// Get (BP0, BP1, BP2) bits.
    pub fn get_block_protect(&self) -> (bool, bool, bool) {
        let bp = (self.0 & 0b0001_1100) >> 2;
        (bp & 0b001 != 0, bp & 0b010 != 0, bp & 0b100 != 0)
    }

    /// Check whether every bit of `mask` is set.
    ///
    /// Used for parts which keep their quad enable bit in status register 1.
    pub fn has_bits(&self, mask: u8) -> bool {
        mask != 0 && self.0 & mask == mask
    }
}

/// Status Register 2
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusRegister2(pub u8);

impl StatusRegister2 {
    /// Get QE (quad enable) bit, at its most common position.
    pub fn get_qe(&self) -> bool {
        self.0 & 0b0000_0010 != 0
    }

    /// Get SUS (erase/program suspended) bit.
    pub fn get_suspended(&self) -> bool {
        self.0 & 0b1000_0000 != 0
    }

    /// Check whether every bit of `mask` is set.
    pub fn has_bits(&self, mask: u8) -> bool {
        mask != 0 && self.0 & mask == mask
    }
}

#[test]
fn test_status_bits() {
    let s1 = StatusRegister1(0b0001_0011);
    assert!(s1.get_busy());
    assert!(s1.get_wel());
    assert_eq!(s1.get_block_protect(), (false, false, true));
    assert!(s1.has_bits(0x02));
    assert!(!s1.has_bits(0x40));
    assert!(!s1.has_bits(0x00));

    let s2 = StatusRegister2(0x82);
    assert!(s2.get_suspended());
    assert!(s2.get_qe());
    assert!(!StatusRegister2(0x02).get_suspended());
}
