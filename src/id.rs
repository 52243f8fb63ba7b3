/// Store the JEDEC ID read off a QSPI flash memory.
///
/// The three bytes are returned by the 0x9F command, in order:
/// manufacturer ID, memory type, and capacity code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JedecId {
    pub manufacturer_id: u8,
    pub memory_type: u8,
    pub capacity: u8,
}

impl JedecId {
    pub fn new(manufacturer_id: u8, memory_type: u8, capacity: u8) -> Self {
        JedecId { manufacturer_id, memory_type, capacity }
    }

    pub fn from_bytes(data: [u8; 3]) -> Self {
        JedecId::new(data[0], data[1], data[2])
    }

    /// Pack the ID into the low 24 bits of a u32, manufacturer ID first.
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes([0, self.manufacturer_id, self.memory_type, self.capacity])
    }

    /// Look up a manufacturer name from the JEDEC ID.
    ///
    /// Only bank 0 codes are considered, as no continuation codes are read.
    #[cfg(feature = "std")]
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        match jep106::JEP106Code::new(0, self.manufacturer_id & 0x7F).get() {
            Some(mfn) if mfn == "NEXCOM" => Some("Winbond/NEXCOM"),
            // GigaDevice flash doesn't use a continuation code, so 0xC8 appears as Apple Computer.
            Some(mfn) if mfn == "Apple Computer" => Some("Apple Computer/GigaDevice Semiconductor"),
            Some(mfn) => Some(mfn),
            None => None,
        }
    }

    /// True if the bus returned all-0s or all-1s, which usually means no device.
    pub fn is_blank(&self) -> bool {
        matches!(self.to_u32(), 0x00_0000 | 0xFF_FFFF)
    }
}

impl core::fmt::Display for JedecId {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Manufacturer 0x{:02X}", self.manufacturer_id)?;
        #[cfg(feature = "std")]
        {
            if let Some(mfn) = self.manufacturer_name() {
                write!(f, " ({})", mfn)?;
            }
        }
        write!(f, ", Memory Type 0x{:02X}, Capacity 0x{:02X}", self.memory_type, self.capacity)
    }
}

#[test]
fn test_jedec_id_packing() {
    let id = JedecId::from_bytes([0xC8, 0x40, 0x15]);
    assert_eq!(id.to_u32(), 0x00C8_4015);
    assert!(!id.is_blank());
    assert!(JedecId::new(0xFF, 0xFF, 0xFF).is_blank());
    assert!(JedecId::new(0, 0, 0).is_blank());
}

#[cfg(feature = "std")]
#[test]
fn test_jedec_id_display() {
    let id = JedecId::new(0xEF, 0x40, 0x17);
    let s = id.to_string();
    assert!(s.starts_with("Manufacturer 0xEF"));
    assert!(s.ends_with("Memory Type 0x40, Capacity 0x17"));
}
