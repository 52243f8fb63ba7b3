//! Catalog of supported QSPI flash parts.
//!
//! Each part is described by a `FlashDevice`, keyed by its JEDEC ID triplet.
//! Behavioural differences between vendors are encoded as flags on the
//! descriptor rather than as separate types.

use crate::id::JedecId;

/// Static description of a supported flash part.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashDevice {
    /// Part number, for diagnostics.
    pub name: &'static str,

    pub manufacturer_id: u8,
    pub memory_type: u8,
    pub capacity: u8,

    /// Total capacity in bytes.
    pub total_size: u32,

    /// Time from power-up until the part accepts commands.
    pub start_up_time_us: u32,

    /// Fastest bus clock the part accepts, in MHz.
    pub max_clock_speed_mhz: u8,

    /// Bit which enables quad I/O, or 0 if quad mode does not apply.
    pub quad_enable_bit_mask: u8,

    /// Quad enable bit and all relevant status live in status register 1.
    pub single_status_byte: bool,

    /// Status register 2 is written with its own command (0x31) rather than
    /// as the second byte of a status register 1 write.
    pub write_status_register_split: bool,

    /// Part powers up with block protection that must be cleared.
    pub has_sector_protection: bool,
}

/// How the quad enable bit is written for a given part.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuadEnableWrite {
    /// Write one byte with the Write Status Register 2 command.
    Split,
    /// Write one byte with the Write Status Register 1 command.
    SingleByte,
    /// Write status registers 1 and 2 together with the Write Status Register 1 command.
    Combined,
}

impl QuadEnableWrite {
    /// Two byte status image for a quad enable write: status register 1
    /// cleared, then the quad enable mask.
    pub fn status_image(mask: u8) -> [u8; 2] {
        [0x00, mask]
    }

    /// The part of `image` which is actually sent.
    pub fn payload(self, image: &[u8; 2]) -> &[u8] {
        match self {
            QuadEnableWrite::Split | QuadEnableWrite::SingleByte => &image[1..],
            QuadEnableWrite::Combined => &image[..],
        }
    }
}

impl FlashDevice {
    pub fn jedec_id(&self) -> JedecId {
        JedecId::new(self.manufacturer_id, self.memory_type, self.capacity)
    }

    pub fn matches(&self, id: &JedecId) -> bool {
        self.manufacturer_id == id.manufacturer_id
            && self.memory_type == id.memory_type
            && self.capacity == id.capacity
    }

    /// Select the status write used to set the quad enable bit.
    ///
    /// Returns None if the part has no quad enable bit.
    pub fn quad_enable_write(&self) -> Option<QuadEnableWrite> {
        if self.quad_enable_bit_mask == 0 {
            None
        } else if self.write_status_register_split {
            Some(QuadEnableWrite::Split)
        } else if self.single_status_byte {
            Some(QuadEnableWrite::SingleByte)
        } else {
            Some(QuadEnableWrite::Combined)
        }
    }
}

pub const GD25Q16C: FlashDevice = FlashDevice {
    name: "GD25Q16C",
    manufacturer_id: 0xC8,
    memory_type: 0x40,
    capacity: 0x15,
    total_size: 1 << 21,
    start_up_time_us: 5000,
    max_clock_speed_mhz: 104,
    quad_enable_bit_mask: 0x02,
    single_status_byte: false,
    write_status_register_split: false,
    has_sector_protection: false,
};

pub const GD25Q64C: FlashDevice = FlashDevice {
    name: "GD25Q64C",
    manufacturer_id: 0xC8,
    memory_type: 0x40,
    capacity: 0x17,
    total_size: 1 << 23,
    start_up_time_us: 5000,
    max_clock_speed_mhz: 104,
    quad_enable_bit_mask: 0x02,
    single_status_byte: false,
    write_status_register_split: true,
    has_sector_protection: false,
};

pub const S25FL116K: FlashDevice = FlashDevice {
    name: "S25FL116K",
    manufacturer_id: 0x01,
    memory_type: 0x40,
    capacity: 0x15,
    total_size: 1 << 21,
    start_up_time_us: 10000,
    max_clock_speed_mhz: 108,
    quad_enable_bit_mask: 0x02,
    single_status_byte: false,
    write_status_register_split: false,
    has_sector_protection: false,
};

/// Shares its JEDEC ID with the S25FL116K, so is only reachable from custom catalogs.
pub const S25FL216K: FlashDevice = FlashDevice {
    name: "S25FL216K",
    manufacturer_id: 0x01,
    memory_type: 0x40,
    capacity: 0x15,
    total_size: 1 << 21,
    start_up_time_us: 10000,
    max_clock_speed_mhz: 65,
    quad_enable_bit_mask: 0x00,
    single_status_byte: false,
    write_status_register_split: false,
    has_sector_protection: false,
};

pub const W25Q16FW: FlashDevice = FlashDevice {
    name: "W25Q16FW",
    manufacturer_id: 0xEF,
    memory_type: 0x60,
    capacity: 0x15,
    total_size: 1 << 21,
    start_up_time_us: 5000,
    max_clock_speed_mhz: 133,
    quad_enable_bit_mask: 0x02,
    single_status_byte: false,
    write_status_register_split: false,
    has_sector_protection: false,
};

pub const W25Q32BV: FlashDevice = FlashDevice {
    name: "W25Q32BV",
    manufacturer_id: 0xEF,
    memory_type: 0x60,
    capacity: 0x16,
    total_size: 1 << 22,
    start_up_time_us: 10000,
    max_clock_speed_mhz: 104,
    quad_enable_bit_mask: 0x02,
    single_status_byte: false,
    write_status_register_split: false,
    has_sector_protection: false,
};

pub const W25Q64JV_IQ: FlashDevice = FlashDevice {
    name: "W25Q64JV-IQ",
    manufacturer_id: 0xEF,
    memory_type: 0x40,
    capacity: 0x17,
    total_size: 1 << 23,
    start_up_time_us: 5000,
    max_clock_speed_mhz: 133,
    quad_enable_bit_mask: 0x02,
    single_status_byte: false,
    write_status_register_split: false,
    has_sector_protection: false,
};

pub const MX25R6435F: FlashDevice = FlashDevice {
    name: "MX25R6435F",
    manufacturer_id: 0xC2,
    memory_type: 0x28,
    capacity: 0x17,
    total_size: 1 << 23,
    start_up_time_us: 5000,
    // Low power mode; high performance mode is not enabled by this driver.
    max_clock_speed_mhz: 8,
    quad_enable_bit_mask: 0x40,
    single_status_byte: true,
    write_status_register_split: false,
    has_sector_protection: false,
};

/// All parts recognised by default, in lookup order.
pub static DEVICES: [FlashDevice; 8] = [
    GD25Q16C, GD25Q64C,
    S25FL116K, S25FL216K,
    W25Q16FW, W25Q32BV, W25Q64JV_IQ,
    MX25R6435F,
];

/// Find the first entry of `table` matching `id`.
pub fn find(table: &'static [FlashDevice], id: &JedecId) -> Option<&'static FlashDevice> {
    table.iter().find(|dev| dev.matches(id))
}

/// Find the first entry of the default catalog matching `id`.
pub fn lookup(id: &JedecId) -> Option<&'static FlashDevice> {
    find(&DEVICES, id)
}

#[test]
fn test_lookup_every_entry() {
    for dev in DEVICES.iter() {
        let found = lookup(&dev.jedec_id()).unwrap();
        assert!(found.matches(&dev.jedec_id()));
    }
    assert_eq!(lookup(&JedecId::new(0xC8, 0x40, 0x15)).unwrap().name, "GD25Q16C");
    assert_eq!(lookup(&JedecId::new(0xC2, 0x28, 0x17)).unwrap().name, "MX25R6435F");
}

#[test]
fn test_lookup_first_match_wins() {
    let found = lookup(&S25FL216K.jedec_id()).unwrap();
    assert_eq!(found.name, "S25FL116K");
    assert!(core::ptr::eq(found, &DEVICES[2]));
}

#[test]
fn test_lookup_miss() {
    assert!(lookup(&JedecId::new(0xC8, 0x40, 0x16)).is_none());
    assert!(lookup(&JedecId::new(0xFF, 0xFF, 0xFF)).is_none());
    assert!(lookup(&JedecId::new(0x00, 0x00, 0x00)).is_none());
    static EMPTY: [FlashDevice; 0] = [];
    assert!(find(&EMPTY, &GD25Q16C.jedec_id()).is_none());
}

#[test]
fn test_quad_enable_write_selection() {
    assert_eq!(GD25Q16C.quad_enable_write(), Some(QuadEnableWrite::Combined));
    assert_eq!(GD25Q64C.quad_enable_write(), Some(QuadEnableWrite::Split));
    assert_eq!(MX25R6435F.quad_enable_write(), Some(QuadEnableWrite::SingleByte));
    assert_eq!(S25FL216K.quad_enable_write(), None);

    // The split flag takes precedence over the single byte flag.
    let both = FlashDevice { write_status_register_split: true, single_status_byte: true, ..GD25Q16C };
    assert_eq!(both.quad_enable_write(), Some(QuadEnableWrite::Split));

    let image = QuadEnableWrite::status_image(0x02);
    assert_eq!(QuadEnableWrite::Combined.payload(&image), &[0x00, 0x02]);
    assert_eq!(QuadEnableWrite::Split.payload(&image), &[0x02]);
    let image = QuadEnableWrite::status_image(0x40);
    assert_eq!(QuadEnableWrite::SingleByte.payload(&image), &[0x40]);
}
