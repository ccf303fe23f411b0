//! Assembly of typed device records from token trees.

use crate::ast::*;
use crate::capability::capability;
use crate::errors::{Error, FieldError};
use crate::flags::parse_flags;
use crate::lexer::{Block, TokenNode};
use crate::parser::{parse_bridge_region, parse_expansion_rom, parse_region};

/// Top-level fields whose value is a flag set.
const FLAG_FIELDS: &[&str] = &["Control", "Status", "BridgeCtl", "Secondary status"];

/// Printed instead of the capability list when configuration space is not readable.
const ACCESS_DENIED: &str = "<access denied>";

/// Turn one device block into a [`Device`].
pub(crate) fn assemble(block: &Block) -> Result<Device, Error> {
    let mut device = Device {
        header: block.header.text.trim_end().to_string(),
        ..Default::default()
    };

    for node in &block.body {
        let token = node.token();
        let text = token.text.trim_end();
        let line = token.line;

        if let Some(rest) = text.strip_prefix("Capabilities: ") {
            if rest == ACCESS_DENIED {
                device.set_field("Capabilities", FieldValue::Str(rest.to_string()));
            } else {
                device.capabilities.push(capability(node)?);
            }
            continue;
        }

        if let TokenNode::Group(..) = node {
            return Err(Error::format(line, "unexpected nested fields", text));
        }

        if text.starts_with("Region ") {
            device
                .regions
                .push(parse_region(text).map_err(|e| e.at(line))?);
        } else if text.starts_with("Expansion ROM: ") {
            device.expansion_rom = Some(parse_expansion_rom(text).map_err(|e| e.at(line))?);
        } else if text.contains(" behind bridge: ") {
            device
                .bridge_regions
                .push(parse_bridge_region(text).map_err(|e| e.at(line))?);
        } else {
            let (name, value) = text
                .split_once(": ")
                .ok_or_else(|| Error::format(line, "malformed field", text))?;
            let value = field_value(name, value).map_err(|e| e.at(line))?;
            device.set_field(name, value);
        }
    }

    tracing::trace!(
        address = device.address(),
        fields = device.fields.len(),
        capabilities = device.capabilities.len(),
        regions = device.regions.len(),
        "assembled device"
    );

    Ok(device)
}

fn field_value(name: &str, value: &str) -> Result<FieldValue, FieldError> {
    let items = value
        .contains(',')
        .then(|| value.split(',').map(str::trim).collect::<Vec<_>>());

    if FLAG_FIELDS.contains(&name) {
        let flags = match &items {
            Some(items) => parse_flags(name, &items.join(" "))?,
            None => parse_flags(name, value)?,
        };
        return Ok(FieldValue::Flags(flags));
    }

    Ok(match items {
        Some(items) => FieldValue::List(items.into_iter().map(String::from).collect()),
        None => FieldValue::Str(value.to_string()),
    })
}

impl Device {
    /// The address ranges this device claims, in the order they were reported.
    ///
    /// Disabled claims, withheld addresses, unsized regions and inverted bridge
    /// windows are left out.
    pub fn ranges(&self) -> Vec<AddressRange> {
        let address = self.address();
        let range = |space, start, end, what: String| AddressRange {
            space,
            start,
            end,
            label: format!("{address} {what}"),
        };

        let regions = self.regions.iter().filter(|r| !r.disabled).filter_map(|r| {
            Some(range(
                r.kind,
                r.base?,
                r.end()?,
                format!("Region {}", r.index),
            ))
        });

        let windows = self
            .bridge_regions
            .iter()
            .filter(|w| !w.disabled && w.start <= w.end)
            .map(|w| {
                let what = match (w.kind, w.prefetchable) {
                    (AddressSpace::Io, _) => "I/O behind bridge",
                    (AddressSpace::Memory, true) => "Memory behind bridge",
                    (AddressSpace::Memory, false) => "Prefetchable memory behind bridge",
                };
                range(w.kind, w.start, w.end, what.to_string())
            });

        let rom = self
            .expansion_rom
            .iter()
            .filter(|rom| !rom.disabled)
            .filter_map(|rom| {
                Some(range(
                    AddressSpace::Memory,
                    rom.base?,
                    rom.end()?,
                    "Expansion ROM".to_string(),
                ))
            });

        regions.chain(windows).chain(rom).collect()
    }
}
