//! Capability blocks: the header line and the register properties nested under it.

use crate::ast::{Capability, Property, Value};
use crate::errors::{Error, FieldError};
use crate::flags::parse_flags;
use crate::lexer::TokenNode;
use crate::parser::parse_capability_header;

/// How the comma-separated bits of a register line are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `MaxPayload 256 bytes, PhantFunc 0, ...` followed by flags.
    Device,
    /// `Port #5, Speed 8GT/s, Width x1, ...` followed by flags.
    Link,
    /// Flags only.
    Flags,
}

macro_rules! registers {
    ($($name:ident => $layout:ident),* $(,)?) => {
        /// A known capability register label.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Register {
            $($name),*
        }

        impl Register {
            /// Look up the register printed with `label`.
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $(stringify!($name) => Some(Register::$name),)*
                    _ => None,
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $(Register::$name => stringify!($name)),*
                }
            }

            fn layout(self) -> Layout {
                match self {
                    $(Register::$name => Layout::$layout),*
                }
            }
        }
    };
}

registers! {
    DevCap => Device,
    DevCtl => Device,
    DevSta => Flags,
    DevCap2 => Flags,
    DevCtl2 => Flags,
    DevSta2 => Flags,
    LnkCap => Link,
    LnkCtl => Link,
    LnkSta => Link,
    LnkCap2 => Flags,
    LnkCtl2 => Flags,
    LnkSta2 => Flags,
    LnkCtl3 => Flags,
    IOVCap => Flags,
    IOVCtl => Flags,
    IOVSta => Flags,
    ACSCap => Flags,
    ACSCtl => Flags,
    ACSSta => Flags,
    RootCmd => Flags,
    RootCap => Flags,
    RootCtl => Flags,
    RootSta => Flags,
    AERCap => Flags,
    AERCtl => Flags,
    AERSta => Flags,
    UECap => Flags,
    UECtl => Flags,
    UESta => Flags,
    UEMsk => Flags,
    UESvrt => Flags,
    CEMsk => Flags,
    CESta => Flags,
    Flags => Flags,
    Status => Flags,
    AtomicOpsCap => Flags,
    AtomicOpsCtl => Flags,
    AtomicOpsSta => Flags,
    PME => Flags,
}

/// Build a capability from its header token and nested register lines.
pub(crate) fn capability(node: &TokenNode) -> Result<Capability, Error> {
    let header = node.token();
    let mut capability = parse_capability_header(&header.text).map_err(|e| e.at(header.line))?;

    if let TokenNode::Group(_, children) = node {
        for child in children {
            let property = property(&child.flatten()).map_err(|e| e.at(child.token().line))?;

            match capability
                .properties
                .iter_mut()
                .find(|p| p.name == property.name)
            {
                Some(existing) => *existing = property,
                None => capability.properties.push(property),
            }
        }
    }

    Ok(capability)
}

/// Parse a `Register: bit, bit, ...` line. Lines without a label are kept whole.
fn property(text: &str) -> Result<Property, FieldError> {
    let Some((name, value)) = text.split_once(": ") else {
        return Ok(Property {
            name: text.trim_end().to_string(),
            register: None,
            entries: Vec::new(),
        });
    };

    let mut property = Property {
        name: name.to_string(),
        register: Register::from_label(name),
        entries: Vec::new(),
    };

    for bit in value.split(", ").map(str::trim).filter(|b| !b.is_empty()) {
        entry(&mut property, bit)?;
    }

    Ok(property)
}

fn entry(property: &mut Property, bit: &str) -> Result<(), FieldError> {
    // `DevCtl2: Completion Timeout: 50us to 50ms, ...`
    if let Some((key, value)) = bit.split_once(": ") {
        let value = match Register::from_label(key) {
            Some(_) => Value::Flags(parse_flags(key, value)?),
            None => Value::Str(value.to_string()),
        };
        property.set(key, Some(value));
        return Ok(());
    }

    match property.register.map(Register::layout) {
        Some(Layout::Device) => device_entry(property, bit),
        Some(Layout::Link) => link_entry(property, bit),
        Some(Layout::Flags) => merge_flags(property, bit),
        None => {
            property.set(bit, None);
            Ok(())
        }
    }
}

fn device_entry(property: &mut Property, bit: &str) -> Result<(), FieldError> {
    if let Some(size) = bit.strip_prefix("MaxPayload ") {
        let size = bytes(&property.name, bit, size)?;
        property.set("MaxPayload", Some(Value::Int(size)));
    } else if let Some(size) = bit.strip_prefix("MaxReadReq ") {
        let size = bytes(&property.name, bit, size)?;
        property.set("MaxReadReq", Some(Value::Int(size)));
    } else if let Some(phantom) = bit.strip_prefix("PhantFunc ") {
        property.set("PhantFunc", Some(Value::Str(phantom.to_string())));
    } else if bit.starts_with("Latency L0s") || bit.starts_with("L1 ") {
        property.set(bit, None);
    } else {
        merge_flags(property, bit)?;
    }

    Ok(())
}

fn link_entry(property: &mut Property, bit: &str) -> Result<(), FieldError> {
    if let Some(port) = bit.strip_prefix("Port #") {
        let port = port
            .parse()
            .map_err(|_| FieldError::format(&property.name, bit))?;
        property.set("Port #", Some(Value::Int(port)));
    } else if let Some(speed) = bit.strip_prefix("Speed ") {
        property.set("Speed", Some(Value::Str(speed.to_string())));
    } else if let Some(latency) = bit.strip_prefix("Exit Latency ") {
        property.set("Exit Latency", Some(Value::Str(latency.to_string())));
    } else if let Some(width) = bit.strip_prefix("Width ") {
        property.set("Width", Some(Value::Str(width.to_string())));
    } else if let Some(size) = bit.strip_prefix("RCB ") {
        let size = bytes(&property.name, bit, size)?;
        property.set("RCB", Some(Value::Int(size)));
    } else {
        merge_flags(property, bit)?;
    }

    Ok(())
}

/// Parse the flags in `bit` and add them to the property's own entries.
fn merge_flags(property: &mut Property, bit: &str) -> Result<(), FieldError> {
    for flag in &parse_flags(&property.name, bit)? {
        if property.get(&flag.name).is_some() {
            return Err(FieldError::DuplicateFlag {
                field: property.name.clone(),
                flag: flag.name.clone(),
            });
        }
        property.set(&flag.name, Some(flag.value.clone().into()));
    }

    Ok(())
}

/// `256 bytes`
fn bytes(field: &str, bit: &str, text: &str) -> Result<u64, FieldError> {
    text.strip_suffix(" bytes")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| FieldError::format(field, bit))
}
