use core::fmt::{Debug, Formatter};
use embedded_can::Id;

/// Classic CAN frame as delivered by the bus driver
#[derive(Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// The ID of the frame
    pub id: Id,
    /// The payload of the frame
    pub data: heapless::Vec<u8, { Self::MAX_LEN }>,
}

impl CanFrame {
    pub const MAX_LEN: usize = 8;

    /// Wrap an already encoded CAN frame, `None` if the payload is too long
    pub fn from_encoded(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Some(Self {
            id: id.into(),
            data: heapless::Vec::from_slice(data).ok()?,
        })
    }

    /// Raw identifier of a standard (11 bit) frame, `None` for extended frames
    pub fn standard_id(&self) -> Option<u16> {
        match self.id {
            Id::Standard(id) => Some(id.as_raw()),
            Id::Extended(_) => None,
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for CanFrame {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        use embedded_can::{ExtendedId, StandardId};

        let raw: u32 = if u.arbitrary::<bool>()? {
            // bias towards the module chains so routing is actually exercised
            u.int_in_range(0x4E0..=0x4FF)?
        } else {
            u.int_in_range(0..=0x1FFF_FFFF)?
        };
        let id = if raw <= 0x7FF {
            StandardId::new(raw as u16).map(Id::Standard)
        } else {
            ExtendedId::new(raw).map(Id::Extended)
        }
        .ok_or(arbitrary::Error::IncorrectFormat)?;
        let len = u.int_in_range(0..=Self::MAX_LEN)?;
        let mut data = heapless::Vec::new();
        for _ in 0..len {
            data.push(u.arbitrary()?)
                .map_err(|_| arbitrary::Error::IncorrectFormat)?;
        }
        Ok(Self { id, data })
    }
}

impl Debug for CanFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.id {
            Id::Extended(id) => write!(f, "CanFrame {{ id: {:#010X}, data: [", id.as_raw())?,
            Id::Standard(id) => write!(f, "CanFrame {{ id: {:#06X}, data: [", id.as_raw())?,
        }
        for (index, byte) in self.data.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{byte:#04X}")?;
        }
        f.write_str("] }")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        let data: &[u8] = &self.data;
        match self.id {
            Id::Extended(id) => defmt::write!(
                fmt,
                "CanFrame {{ id: {=u32:#010X}, data: {=[u8]:#04X} }}",
                id.as_raw(),
                data
            ),
            Id::Standard(id) => defmt::write!(
                fmt,
                "CanFrame {{ id: {=u16:#06X}, data: {=[u8]:#04X} }}",
                id.as_raw(),
                data
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use embedded_can::{ExtendedId, StandardId};
    use std::format;

    fn ext(id: u32, data: &[u8]) -> CanFrame {
        CanFrame::from_encoded(ExtendedId::new(id).unwrap(), data).unwrap()
    }

    fn std(id: u16, data: &[u8]) -> CanFrame {
        CanFrame::from_encoded(StandardId::new(id).unwrap(), data).unwrap()
    }

    #[test]
    fn debug_formats_nicely() {
        let debug = format!("{:?}", ext(0x4F0, &[]));
        assert!(debug == "CanFrame { id: 0x000004F0, data: [] }");

        let debug = format!("{:?}", std(0x4F2, &[0x03, 0x05, 0x9A, 0x99]));
        assert!(debug == "CanFrame { id: 0x04F2, data: [0x03, 0x05, 0x9A, 0x99] }");
    }

    #[test]
    fn identifier_kinds() {
        assert!(std(0x4F1, &[]).standard_id() == Some(0x4F1));
        assert!(!std(0x4F1, &[]).is_extended());
        assert!(ext(0x4F1, &[]).standard_id().is_none());
        assert!(ext(0x4F1, &[]).is_extended());
    }

    #[test]
    fn payload_longer_than_classic_can_is_rejected() {
        let id = StandardId::new(0x4F0).unwrap();
        assert!(CanFrame::from_encoded(id, &[0; 8]).is_some());
        assert!(CanFrame::from_encoded(id, &[0; 9]).is_none());
    }
}
