//! Configuration trees as they travel between server and client.
//!
//! A tree is packed depth-first. Each node is one record
//!
//! ```text
//! [kind: u8][name: u16][touched: u8][scalar count: u32][child count: u32]
//! ```
//!
//! followed by one record per scalar and then the children, in order:
//!
//! ```text
//! [tag: u8][vector index: u32][tag specific payload]
//! ```
use std::fmt::Display;

use crate::{
    chain::{ChainReader, DatagramChain},
    error::ReadError,
    keyword::Keyword,
    wire::{Wire, bool_from_u8, clamp_str, str_size},
};

/// The value part of a configuration scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Double { value: f64, unit: String },
    Int32 { value: i32, unit: String },
    Keyword(Keyword),
    Range { first: i32, last: i32 },
    String(String),
}

impl ScalarValue {
    const TAG_DOUBLE: u8 = 1;
    const TAG_INT32: u8 = 2;
    const TAG_KEYWORD: u8 = 3;
    const TAG_RANGE: u8 = 4;
    const TAG_STRING: u8 = 5;

    fn tag(&self) -> u8 {
        match self {
            ScalarValue::Double { .. } => Self::TAG_DOUBLE,
            ScalarValue::Int32 { .. } => Self::TAG_INT32,
            ScalarValue::Keyword(_) => Self::TAG_KEYWORD,
            ScalarValue::Range { .. } => Self::TAG_RANGE,
            ScalarValue::String(_) => Self::TAG_STRING,
        }
    }

    fn packed_size(&self) -> usize {
        match self {
            ScalarValue::Double { unit, .. } => 8 + str_size(unit),
            ScalarValue::Int32 { unit, .. } => 4 + str_size(unit),
            ScalarValue::Keyword(_) => 2,
            ScalarValue::Range { .. } => 8,
            ScalarValue::String(value) => str_size(value),
        }
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Double { value, unit } => write!(f, "{}{}", value, unit),
            ScalarValue::Int32 { value, unit } => write!(f, "{}{}", value, unit),
            ScalarValue::Keyword(keyword) => write!(f, "{}", keyword),
            ScalarValue::Range { first, last } => write!(f, "{}..{}", first, last),
            ScalarValue::String(value) => write!(f, "\"{}\"", value),
        }
    }
}

/// One atomic configuration value.
/// Array-valued parameters carry one scalar per element, told apart by `vector_index`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigScalar {
    pub vector_index: u32,
    pub value: ScalarValue,
}

impl ConfigScalar {
    pub fn new(value: ScalarValue) -> ConfigScalar {
        ConfigScalar {
            vector_index: 0,
            value,
        }
    }

    pub fn at(vector_index: u32, value: ScalarValue) -> ConfigScalar {
        ConfigScalar {
            vector_index,
            value,
        }
    }
}

impl Wire for ConfigScalar {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(1 + 4 + self.value.packed_size(), |p| {
            p.pack_u8(self.value.tag());
            p.pack_u32(self.vector_index);
            match &self.value {
                ScalarValue::Double { value, unit } => {
                    p.pack_f64(*value);
                    p.pack_str(clamp_str(unit));
                }
                ScalarValue::Int32 { value, unit } => {
                    p.pack_i32(*value);
                    p.pack_str(clamp_str(unit));
                }
                ScalarValue::Keyword(keyword) => p.pack_u16(keyword.id()),
                ScalarValue::Range { first, last } => {
                    p.pack_i32(*first);
                    p.pack_i32(*last);
                }
                ScalarValue::String(value) => p.pack_str(clamp_str(value)),
            }
        });
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let tag = record.unpack_u8()?;
        let vector_index = record.unpack_u32()?;
        let value = match tag {
            ScalarValue::TAG_DOUBLE => ScalarValue::Double {
                value: record.unpack_f64()?,
                unit: record.unpack_string()?,
            },
            ScalarValue::TAG_INT32 => ScalarValue::Int32 {
                value: record.unpack_i32()?,
                unit: record.unpack_string()?,
            },
            ScalarValue::TAG_KEYWORD => ScalarValue::Keyword(Keyword::new(record.unpack_u16()?)),
            ScalarValue::TAG_RANGE => ScalarValue::Range {
                first: record.unpack_i32()?,
                last: record.unpack_i32()?,
            },
            ScalarValue::TAG_STRING => ScalarValue::String(record.unpack_string()?),
            tag => {
                return Err(ReadError::InvalidTag {
                    field: "scalar",
                    tag,
                });
            }
        };
        Ok(ConfigScalar {
            vector_index,
            value,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// A named block such as `CRATE("Main") { ... }`.
    Block,
    /// A parameter assignment such as `gate_width = 100 ns`.
    Param,
}

impl NodeKind {
    fn to_u8(self) -> u8 {
        match self {
            NodeKind::Block => 1,
            NodeKind::Param => 2,
        }
    }

    fn from_u8(value: u8) -> Result<NodeKind, ReadError> {
        match value {
            1 => Ok(NodeKind::Block),
            2 => Ok(NodeKind::Param),
            tag => Err(ReadError::InvalidTag {
                field: "node kind",
                tag,
            }),
        }
    }
}

/// A node of the hierarchical configuration tree.
///
/// `touched` means the node or one of its descendants differs from its default.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigNode {
    pub kind: NodeKind,
    pub name: Keyword,
    pub touched: bool,
    pub scalars: Vec<ConfigScalar>,
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn block(name: Keyword) -> ConfigNode {
        ConfigNode {
            kind: NodeKind::Block,
            name,
            touched: false,
            scalars: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn param(name: Keyword) -> ConfigNode {
        ConfigNode {
            kind: NodeKind::Param,
            ..ConfigNode::block(name)
        }
    }

    pub fn with_scalar(mut self, value: ScalarValue) -> Self {
        let vector_index = self.scalars.len() as u32;
        self.scalars.push(ConfigScalar::at(vector_index, value));
        self
    }

    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    /// Marks this node as differing from its default.
    pub fn set(mut self) -> Self {
        self.touched = true;
        self
    }

    pub fn child(&self, name: Keyword) -> Option<&ConfigNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ConfigNode::node_count).sum::<usize>()
    }

    /// Propagates `touched` from descendants up to this node.
    /// Returns the resulting flag of this node.
    pub fn bubble_touched(&mut self) -> bool {
        let mut any_child = false;
        for child in &mut self.children {
            any_child |= child.bubble_touched();
        }
        self.touched |= any_child;
        self.touched
    }

    /// Drops every subtree that is entirely at its defaults.
    ///
    /// Expects `touched` to be bubbled up already.
    pub fn prune_untouched(self) -> Option<ConfigNode> {
        if !self.touched {
            return None;
        }
        let ConfigNode {
            kind,
            name,
            touched,
            scalars,
            children,
        } = self;
        Some(ConfigNode {
            kind,
            name,
            touched,
            scalars,
            children: children
                .into_iter()
                .filter_map(ConfigNode::prune_untouched)
                .collect(),
        })
    }
}

impl Wire for ConfigNode {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(1 + 2 + 1 + 4 + 4, |p| {
            p.pack_u8(self.kind.to_u8());
            p.pack_u16(self.name.id());
            p.pack_u8(self.touched as u8);
            p.pack_u32(self.scalars.len() as u32);
            p.pack_u32(self.children.len() as u32);
        });
        for scalar in &self.scalars {
            scalar.pack(chain);
        }
        for child in &self.children {
            child.pack(chain);
        }
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let record = reader.begin_record()?;
        let kind = NodeKind::from_u8(record.unpack_u8()?)?;
        let name = Keyword::new(record.unpack_u16()?);
        let touched = bool_from_u8("touched", record.unpack_u8()?)?;
        let scalar_count = record.unpack_u32()?;
        let child_count = record.unpack_u32()?;

        let mut scalars = Vec::new();
        for _ in 0..scalar_count {
            scalars.push(ConfigScalar::unpack(reader)?);
        }
        let mut children = Vec::new();
        for _ in 0..child_count {
            children.push(ConfigNode::unpack(reader)?);
        }
        Ok(ConfigNode {
            kind,
            name,
            touched,
            scalars,
            children,
        })
    }
}
