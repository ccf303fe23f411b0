//! Flag sets, the packed `Name+ Other- Key=value` notation used by most registers.

use std::borrow::Cow;

use crate::ast::{Flag, FlagSet, FlagValue};
use crate::errors::FieldError;

/// A textual rewrite turning a multi-word setting into a single `Key=value` token.
struct Rewrite {
    from: &'static str,
    to: &'static str,
    /// Restrict the rewrite to fields with this name.
    only_in: Option<&'static str>,
}

impl Rewrite {
    const fn new(from: &'static str, to: &'static str) -> Self {
        Self {
            from,
            to,
            only_in: None,
        }
    }

    const fn only_in(field: &'static str, from: &'static str, to: &'static str) -> Self {
        Self {
            from,
            to,
            only_in: Some(field),
        }
    }

    fn applies_to(&self, field: &str) -> bool {
        self.only_in.map_or(true, |only| only == field)
    }
}

const REWRITES: &[Rewrite] = &[
    // `OBFF Not Supported`, `ASPM not supported`
    Rewrite::new(" Not Supported", "=Unsupported"),
    Rewrite::new(" not supported", "=Unsupported"),
    // `OBFF Disabled`
    Rewrite::new(" Disabled", "=Disabled"),
    // `OBFF Via message`
    Rewrite::new(" Via ", "=Via-"),
    // `PME ReqID 0000`
    Rewrite::new("PME ReqID ", "PME-ReqID="),
    Rewrite::new("SlotPowerLimit ", "SlotPowerLimit="),
    // `FirstFatal- NonFatalMsg- FatalMsg- IntMsg 0`
    Rewrite::new("IntMsg ", "IntMsg="),
    // Power states: `Status: D0 NoSoftRst+ PME-Enable- DSel=0 DScale=0 PME-`
    Rewrite::only_in("Status", "D0 ", "D0+ "),
    Rewrite::only_in("Status", "D3 ", "D3+ "),
];

/// Parse a whitespace-separated flag list belonging to `field`.
///
/// ```
/// use lspci_parser::{flags::parse_flags, FlagValue};
///
/// let flags = parse_flags("Control", "I/O+ Mem+ BusMaster+ SpecCycle- MemWINV-").unwrap();
/// assert_eq!(flags.len(), 5);
/// assert_eq!(flags.get("SpecCycle"), Some(&FlagValue::Bool(false)));
/// ```
pub fn parse_flags(field: &str, text: &str) -> Result<FlagSet, FieldError> {
    if text.contains(", ") || text.contains(": ") {
        return Err(FieldError::format(field, text));
    }

    let text = REWRITES
        .iter()
        .filter(|rewrite| rewrite.applies_to(field))
        .fold(aspm(field, text)?, |text, rewrite| {
            if text.contains(rewrite.from) {
                Cow::Owned(text.replace(rewrite.from, rewrite.to))
            } else {
                text
            }
        });

    let mut flags = FlagSet::default();
    for word in text.split_whitespace() {
        let flag = flag(word).ok_or_else(|| FieldError::format(field, &text))?;
        flags.insert(field, flag)?;
    }

    Ok(flags)
}

/// `ASPM L0s L1` becomes `ASPM=L0s,L1`. The whole text must be the ASPM setting.
fn aspm<'t>(field: &str, text: &'t str) -> Result<Cow<'t, str>, FieldError> {
    if !text.contains("ASPM ") {
        return Ok(Cow::Borrowed(text));
    }

    let mut words = text.split(' ');
    match words.next() {
        Some("ASPM") => Ok(Cow::Owned(format!(
            "ASPM={}",
            words.collect::<Vec<_>>().join(",")
        ))),
        _ => Err(FieldError::format(field, text)),
    }
}

/// Parse a single `Name+`, `Name-` or `Key=value` token.
fn flag(word: &str) -> Option<Flag> {
    let (name, value) = match word.split_once('=') {
        Some((name, value)) => (name, FlagValue::from(value)),
        None => match word.strip_suffix('+') {
            Some(name) => (name, FlagValue::Bool(true)),
            None => (word.strip_suffix('-')?, FlagValue::Bool(false)),
        },
    };

    (!name.is_empty()).then(|| Flag {
        name: name.to_string(),
        value,
    })
}

impl FlagSet {
    /// Add a flag, refusing names that are already present.
    pub(crate) fn insert(&mut self, field: &str, flag: Flag) -> Result<(), FieldError> {
        if self.get(&flag.name).is_some() {
            return Err(FieldError::DuplicateFlag {
                field: field.to_string(),
                flag: flag.name,
            });
        }

        self.0.push(flag);
        Ok(())
    }
}
