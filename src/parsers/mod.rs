//! Source message parsers

pub mod hl7v2;

pub use hl7v2::{
    builtin_mapping, Hl7Field, Hl7Message, Hl7Segment, Hl7v2Parser, Separators,
    HL7V2_SOURCE_SYSTEM,
};
