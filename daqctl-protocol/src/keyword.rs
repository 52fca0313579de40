use std::fmt::Display;

use crate::{chain::DatagramChain, chain::ChainReader, error::ReadError, wire::Wire};

/// Identifier of a configuration keyword.
///
/// Keywords name configuration blocks and parameters, module types and
/// enumerated parameter values. Only the id travels on the wire; ids that are
/// not in the built-in table are still carried and displayed by number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Keyword(u16);

macro_rules! keywords {
    ($($name:ident = $id:literal,)*) => {
        impl Keyword {
            $(pub const $name: Keyword = Keyword($id);)*

            const TABLE: &'static [(Keyword, &'static str)] = &[
                $((Keyword::$name, stringify!($name)),)*
            ];
        }
    };
}

keywords! {
    CRATE = 1,
    TAGS = 2,
    BARRIER = 3,
    ADDRESS = 4,
    THRESHOLD = 5,
    GATE_DELAY = 6,
    GATE_WIDTH = 7,
    CHANNEL_ENABLE = 8,
    RANGE = 9,
    BLT_MODE = 10,
    TIMEOUT = 11,
    DEADTIME_RELEASE = 12,
    SFP = 13,
    CARD = 14,
    CAEN_V775 = 100,
    CAEN_V785 = 101,
    CAEN_V792 = 102,
    CAEN_V1190 = 103,
    MESYTEC_MADC32 = 120,
    MESYTEC_MQDC32 = 121,
    MESYTEC_MTDC32 = 122,
    GSI_VULOM = 140,
    GSI_TAMEX = 141,
    GSI_FEBEX = 142,
    GSI_SIDEREM = 143,
    GSI_PEX = 144,
    NOBLT = 200,
    BLT = 201,
    MBLT = 202,
    AUTO = 203,
    TRUE = 204,
    FALSE = 205,
}

impl Keyword {
    pub const fn new(id: u16) -> Keyword {
        Keyword(id)
    }

    pub fn id(&self) -> u16 {
        self.0
    }

    /// Name from the built-in keyword table.
    pub fn name(&self) -> Option<&'static str> {
        Self::TABLE
            .iter()
            .find(|(keyword, _)| keyword == self)
            .map(|(_, name)| *name)
    }

    /// Looks up a keyword by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Keyword> {
        Self::TABLE
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(keyword, _)| *keyword)
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "KW#{}", self.0),
        }
    }
}

impl Wire for Keyword {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(2, |p| p.pack_u16(self.0));
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        Ok(Keyword(reader.begin_record()?.unpack_u16()?))
    }
}

#[test]
fn keyword_names() {
    assert_eq!(Keyword::MESYTEC_MADC32.name(), Some("MESYTEC_MADC32"));
    assert_eq!(Keyword::from_name("gate_width"), Some(Keyword::GATE_WIDTH));
    assert_eq!(Keyword::from_name("no_such_keyword"), None);
    assert_eq!(Keyword::new(9999).to_string(), "KW#9999");
}
