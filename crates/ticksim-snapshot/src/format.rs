pub const CHECKPOINT_MAGIC: &[u8; 8] = b"TSIMEVQ1";
pub const CHECKPOINT_VERSION_V1: u16 = 1;
pub const CHECKPOINT_ENDIANNESS_LITTLE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(pub u32);

impl SectionId {
    pub const META: SectionId = SectionId(1);
    /// One per timeline (event queue).
    pub const TIMELINE: SectionId = SectionId(2);

    pub fn name(self) -> Option<&'static str> {
        match self {
            SectionId::META => Some("META"),
            SectionId::TIMELINE => Some("TIMELINE"),
            _ => None,
        }
    }
}

impl core::fmt::Display for SectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{name}({})", self.0)
        } else {
            write!(f, "SectionId({})", self.0)
        }
    }
}
