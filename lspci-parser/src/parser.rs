use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, digit1, hex_digit1, one_of, space0, space1},
    combinator::{all_consuming, map, map_opt, opt, recognize, rest, value, verify},
    error::ParseError,
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish,
};

use crate::ast::*;
use crate::errors::FieldError;

type Input<'a> = &'a str;

type IResult<'a, T, E> = nom::IResult<Input<'a>, T, E>;

type Error<'a> = nom::error::Error<Input<'a>>;

/// Parse a `Region <n>: ...` line.
pub fn parse_region(s: &str) -> Result<Region, FieldError> {
    all_consuming(region::<Error>)(s.trim_end())
        .finish()
        .map(|(_, region)| region)
        .map_err(|_| FieldError::InvalidRegion {
            text: s.to_string(),
        })
}

/// Parse a `[Prefetchable ]<Memory|I/O> behind bridge: ...` line.
pub fn parse_bridge_region(s: &str) -> Result<BridgeRegion, FieldError> {
    all_consuming(bridge_region::<Error>)(s.trim_end())
        .finish()
        .map(|(_, region)| region)
        .map_err(|_| FieldError::format("bridge window", s))
}

/// Parse an `Expansion ROM: ...` line.
pub fn parse_expansion_rom(s: &str) -> Result<ExpansionRom, FieldError> {
    all_consuming(expansion_rom::<Error>)(s.trim_end())
        .finish()
        .map(|(_, rom)| rom)
        .map_err(|_| FieldError::format("Expansion ROM", s))
}

/// Parse the header line of a capability block.
///
/// The returned capability has no properties yet.
pub fn parse_capability_header(s: &str) -> Result<Capability, FieldError> {
    all_consuming(capability_header::<Error>)(s.trim_end())
        .finish()
        .map(|(_, cap)| cap)
        .map_err(|_| FieldError::format("Capabilities", s))
}

/// Parse a size such as `256`, `8K` or `2G` into a number of bytes.
pub fn parse_size(s: &str) -> Result<u64, FieldError> {
    all_consuming(size::<Error>)(s)
        .finish()
        .map(|(_, size)| size)
        .map_err(|_| FieldError::format("size", s))
}

/// Parse a region line.
fn region<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Region, E> {
    let memory = map(
        preceded(
            tag("Memory at "),
            pair(address, preceded(space1, memory_attributes)),
        ),
        |(base, (width, prefetchable))| (AddressSpace::Memory, base, width, Some(prefetchable)),
    );
    let io = map(preceded(tag("I/O ports at "), address), |base| {
        (AddressSpace::Io, base, None, None)
    });

    map(
        tuple((
            delimited(tag("Region "), dec_u8, tag(": ")),
            alt((memory, io)),
            region_tags,
        )),
        |(index, (kind, base, width, prefetchable), tags)| Region {
            kind,
            index,
            base,
            size: tags.size,
            width,
            disabled: tags.disabled,
            is_virtual: tags.is_virtual,
            prefetchable,
        },
    )(input)
}

/// Parse the parenthesized attributes of a memory region, e.g. `(64-bit, prefetchable)`.
///
/// Memory types that are not expressed in bits (`low-1M`, `type 3`) have an unknown width.
fn memory_attributes<'a, E: ParseError<Input<'a>>>(
    input: Input<'a>,
) -> IResult<'a, (Option<u8>, bool), E> {
    let width = alt((
        map(terminated(dec_u8, tag("-bit")), Some),
        value(None, tag("low-1M")),
        value(None, recognize(pair(tag("type "), digit1))),
    ));

    delimited(
        char('('),
        pair(terminated(width, alt((tag(", "), tag(" ")))), prefetchable),
        char(')'),
    )(input)
}

/// Recognize `prefetchable` or `non-prefetchable`.
fn prefetchable<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, bool, E> {
    alt((
        value(false, tag("non-prefetchable")),
        value(true, tag("prefetchable")),
    ))(input)
}

/// Bracketed annotations following a region or ROM address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RegionTags {
    size: Option<u64>,
    disabled: bool,
    is_virtual: bool,
}

#[derive(Debug, Clone, Copy)]
enum RegionTag {
    Size(u64),
    Disabled,
    Virtual,
}

/// Parse any combination of `[virtual]`, `[disabled]` and `[size=...]`.
fn region_tags<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, RegionTags, E> {
    let annotation = alt((
        map(size_tag, RegionTag::Size),
        value(RegionTag::Disabled, tag("[disabled]")),
        value(RegionTag::Virtual, tag("[virtual]")),
    ));

    map(many0(preceded(space1, annotation)), |annotations| {
        annotations
            .into_iter()
            .fold(RegionTags::default(), |mut tags, annotation| {
                match annotation {
                    RegionTag::Size(size) => tags.size = Some(size),
                    RegionTag::Disabled => tags.disabled = true,
                    RegionTag::Virtual => tags.is_virtual = true,
                }
                tags
            })
    })(input)
}

/// Parse a bridge window line.
///
/// Windows without the `Prefetchable` prefix are reported as prefetchable, and
/// prefixed ones as not prefetchable.
fn bridge_region<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, BridgeRegion, E> {
    let kind = alt((
        value(
            (AddressSpace::Memory, false),
            pair(tag("Prefetchable "), tag_no_case("memory")),
        ),
        value((AddressSpace::Memory, true), tag_no_case("memory")),
        value((AddressSpace::Io, true), tag("I/O")),
    ));

    map(
        tuple((
            terminated(kind, tag(" behind bridge: ")),
            hex_u64,
            preceded(char('-'), hex_u64),
            opt(preceded(space1, tag("[disabled]"))),
            opt(preceded(space1, size_tag)),
            opt(preceded(space1, delimited(char('['), dec_u8, tag("-bit]")))),
        )),
        |((kind, prefetchable), start, end, disabled, size, width)| BridgeRegion {
            kind,
            prefetchable,
            start,
            end,
            size,
            disabled: disabled.is_some(),
            width,
        },
    )(input)
}

/// Parse an expansion ROM line, after normalization turned `at` into a colon.
fn expansion_rom<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, ExpansionRom, E> {
    map(
        preceded(tag("Expansion ROM: "), pair(address, region_tags)),
        |(base, tags)| ExpansionRom {
            base,
            size: tags.size,
            disabled: tags.disabled,
            is_virtual: tags.is_virtual,
        },
    )(input)
}

enum Trailer<'a> {
    Vendor(VendorInfo),
    Text(Input<'a>),
}

/// Parse a capability header line.
fn capability_header<'a, E: ParseError<Input<'a>>>(
    input: Input<'a>,
) -> IResult<'a, Capability, E> {
    let id = map_opt(hex_digit1, |s| u16::from_str_radix(s, 16).ok());
    let version = preceded(tag(" v"), dec_u8);

    // A vendor trailer that does not parse must not be mistaken for a plain name.
    let trailer = alt((
        map(vendor_info, Trailer::Vendor),
        map(
            verify(rest, |s: &str| !s.starts_with("Vendor Specific Information")),
            Trailer::Text,
        ),
    ));

    map(
        tuple((
            preceded(tag("Capabilities: ["), id),
            terminated(opt(version), char(']')),
            preceded(space0, trailer),
        )),
        |(id, version, trailer)| {
            let (name, vendor, types) = match trailer {
                Trailer::Vendor(vendor) => ("Unknown".to_string(), Some(vendor), None),
                Trailer::Text(text) if text.contains(", ") => (
                    "Unknown".to_string(),
                    None,
                    Some(text.split(", ").map(String::from).collect()),
                ),
                Trailer::Text(text) => (text.to_string(), None, None),
            };

            Capability {
                id,
                version,
                name,
                vendor,
                types,
                properties: Vec::new(),
            }
        },
    )(input)
}

/// Parse `Vendor Specific Information: [ID=<hex> ][Rev=<hex> ]Len=<hex>[ <?>]`.
fn vendor_info<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, VendorInfo, E> {
    map(
        tuple((
            tag("Vendor Specific Information:"),
            opt(preceded(space1, key_hex("ID="))),
            opt(preceded(space1, key_hex("Rev="))),
            preceded(space1, key_hex("Len=")),
            opt(preceded(space1, tag("<?>"))),
        )),
        |(_, id, rev, len, _)| VendorInfo { id, rev, len },
    )(input)
}

/// Return a parser for a `<key><hex>` pair.
fn key_hex<'a, E: ParseError<Input<'a>>>(
    key: &'static str,
) -> impl FnMut(Input<'a>) -> IResult<'a, u16, E> {
    preceded(
        tag(key),
        map_opt(hex_digit1, |s| u16::from_str_radix(s, 16).ok()),
    )
}

/* === Low-level syntax parsers === */

/// Parse a `[size=<n><unit>]` annotation.
fn size_tag<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, u64, E> {
    delimited(tag("[size="), size, char(']'))(input)
}

/// Parse a size with an optional binary unit suffix.
fn size<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, u64, E> {
    let unit = map(one_of("KMGTkmgt"), |u: char| match u.to_ascii_uppercase() {
        'K' => 1,
        'M' => 2,
        'G' => 3,
        _ => 4,
    });

    map_opt(pair(dec_u64, opt(unit)), |(n, exp)| {
        n.checked_mul(1024u64.pow(exp.unwrap_or(0)))
    })(input)
}

/// Parse an address, or one of the placeholders printed when it is withheld.
fn address<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Option<u64>, E> {
    alt((
        map(hex_u64, Some),
        value(None, alt((tag("<ignored>"), tag("<unassigned>")))),
    ))(input)
}

/// Parse an unsigned integer number in base 16, without prefix.
fn hex_u64<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, u64, E> {
    map_opt(hex_digit1, |s| u64::from_str_radix(s, 16).ok())(input)
}

/// Parse an unsigned integer number in base 10.
fn dec_u64<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, u64, E> {
    map_opt(digit1, |s: Input<'a>| s.parse().ok())(input)
}

/// Parse a small unsigned integer number in base 10.
fn dec_u8<'a, E: ParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, u8, E> {
    map_opt(digit1, |s: Input<'a>| s.parse().ok())(input)
}

/* === Unit Tests === */

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(index: u8, base: u64, size: u64, width: u8, prefetchable: bool) -> Region {
        Region {
            kind: AddressSpace::Memory,
            index,
            base: Some(base),
            size: Some(size),
            width: Some(width),
            disabled: false,
            is_virtual: false,
            prefetchable: Some(prefetchable),
        }
    }

    fn io(index: u8, base: u64, size: u64) -> Region {
        Region {
            kind: AddressSpace::Io,
            index,
            base: Some(base),
            size: Some(size),
            width: None,
            disabled: false,
            is_virtual: false,
            prefetchable: None,
        }
    }

    #[test]
    fn parse_sizes() {
        for (input, expected) in [
            ("8K", 8192),
            ("256", 256),
            ("512M", 536_870_912),
            ("2G", 2_147_483_648),
            ("10", 10),
            ("1T", 1_099_511_627_776),
            ("4k", 4096),
        ] {
            assert_eq!(parse_size(input), Ok(expected), "{input}");
        }

        for input in ["", "K", "8X", "-1", "99999999999T"] {
            assert!(parse_size(input).is_err(), "{input}");
        }
    }

    #[test]
    fn parse_regions() {
        for (input, expected) in [
            (
                "Region 0: Memory at 90334000 (32-bit, non-prefetchable) [size=8K]",
                memory(0, 0x9033_4000, 8192, 32, false),
            ),
            (
                "Region 1: Memory at 90339000 (32-bit non-prefetchable) [size=256]",
                memory(1, 0x9033_9000, 256, 32, false),
            ),
            (
                "Region 0: Memory at f9000000 (64-bit prefetchable) [size=8M]",
                memory(0, 0xf900_0000, 8 << 20, 64, true),
            ),
            (
                "Region 3: Memory at fb800000 (64-bit, prefetchable) [size=32K]",
                memory(3, 0xfb80_0000, 32 << 10, 64, true),
            ),
            (
                "Region 5: Memory at 90200000 (32-bit non-prefetchable) [size=512K]",
                memory(5, 0x9020_0000, 512 << 10, 32, false),
            ),
            ("Region 2: I/O ports at 3050 [size=8]", io(2, 0x3050, 8)),
            ("Region 3: I/O ports at 3040 [size=4]", io(3, 0x3040, 4)),
            ("Region 4: I/O ports at 3000 [size=32]", io(4, 0x3000, 32)),
        ] {
            assert_eq!(parse_region(input), Ok(expected), "{input}");
        }
    }

    #[test]
    fn parse_region_annotations() {
        let region = parse_region(
            "Region 0: Memory at f0000000 (32-bit, non-prefetchable) [disabled] [size=16M]",
        )
        .unwrap();
        assert_eq!(region.base, Some(0xf000_0000));
        assert_eq!(region.size, Some(16_777_216));
        assert_eq!(region.width, Some(32));
        assert_eq!(region.prefetchable, Some(false));
        assert!(region.disabled);
        assert!(!region.is_virtual);
        assert_eq!(region.end(), Some(0xf0ff_ffff));

        let region = parse_region(
            "Region 0: Memory at 00000000c8800000 (64-bit prefetchable) [virtual] [size=16K]",
        )
        .unwrap();
        assert_eq!(region.base, Some(0xc880_0000));
        assert!(region.is_virtual);
        assert!(!region.disabled);

        let region =
            parse_region("Region 1: Memory at <ignored> (32-bit non-prefetchable)").unwrap();
        assert_eq!(region.base, None);
        assert_eq!(region.size, None);
        assert_eq!(region.end(), None);

        let region =
            parse_region("Region 4: Memory at 000c0000 (low-1M non-prefetchable) [size=128K]")
                .unwrap();
        assert_eq!(region.width, None);
        assert_eq!(region.prefetchable, Some(false));

        let region = parse_region("Region 5: I/O ports at <unassigned> [disabled]").unwrap();
        assert_eq!(region.kind, AddressSpace::Io);
        assert_eq!(region.base, None);
        assert!(region.disabled);
    }

    #[test]
    fn reject_invalid_regions() {
        for input in [
            "Region 0: Memory at zz000000 (32-bit non-prefetchable)",
            "Region 0: Memory at 90334000",
            "Region: I/O ports at 3050 [size=8]",
            "Region 2: I/O ports at 3050 [size=8] trailing",
            "Region 2: Flash at 3050",
        ] {
            assert_eq!(
                parse_region(input),
                Err(FieldError::InvalidRegion {
                    text: input.to_string()
                }),
                "{input}"
            );
        }
    }

    #[test]
    fn parse_bridge_regions() {
        for (input, expected) in [
            (
                "Memory behind bridge: d0900000-d09fffff [size=1M] [32-bit]",
                BridgeRegion {
                    kind: AddressSpace::Memory,
                    prefetchable: true,
                    start: 0xd090_0000,
                    end: 0xd09f_ffff,
                    size: Some(1 << 20),
                    disabled: false,
                    width: Some(32),
                },
            ),
            (
                "Prefetchable memory behind bridge: 0000380000000000-00003800001fffff [size=2M] [64-bit]",
                BridgeRegion {
                    kind: AddressSpace::Memory,
                    prefetchable: false,
                    start: 0x3800_0000_0000,
                    end: 0x3800_001f_ffff,
                    size: Some(2 << 20),
                    disabled: false,
                    width: Some(64),
                },
            ),
            (
                "I/O behind bridge: 0000f000-00000fff [disabled] [16-bit]",
                BridgeRegion {
                    kind: AddressSpace::Io,
                    prefetchable: true,
                    start: 0xf000,
                    end: 0xfff,
                    size: None,
                    disabled: true,
                    width: Some(16),
                },
            ),
            (
                "Memory behind bridge: fff00000-000fffff",
                BridgeRegion {
                    kind: AddressSpace::Memory,
                    prefetchable: true,
                    start: 0xfff0_0000,
                    end: 0x000f_ffff,
                    size: None,
                    disabled: false,
                    width: None,
                },
            ),
        ] {
            assert_eq!(parse_bridge_region(input), Ok(expected), "{input}");
        }

        assert!(parse_bridge_region("Memory behind bridge: [disabled]").is_err());
        assert!(parse_bridge_region("Cache behind bridge: 0-1").is_err());
    }

    #[test]
    fn parse_expansion_roms() {
        assert_eq!(
            parse_expansion_rom("Expansion ROM: d0800000 [disabled] [size=256K]"),
            Ok(ExpansionRom {
                base: Some(0xd080_0000),
                size: Some(256 << 10),
                disabled: true,
                is_virtual: false,
            })
        );
        assert_eq!(
            parse_expansion_rom("Expansion ROM: 000c0000 [virtual] [disabled] [size=128K]")
                .map(|rom| (rom.end(), rom.is_virtual)),
            Ok((Some(0x000d_ffff), true))
        );
        assert!(parse_expansion_rom("Expansion ROM: [disabled]").is_err());
    }

    #[test]
    fn parse_capability_headers() {
        for (input, expected) in [
            (
                "Capabilities: [160 v1] Single Root I/O Virtualization (SR-IOV)",
                Capability {
                    id: 0x160,
                    version: Some(1),
                    name: "Single Root I/O Virtualization (SR-IOV)".into(),
                    vendor: None,
                    types: None,
                    properties: vec![],
                },
            ),
            (
                "Capabilities: [40] Express (v2) Root Port (Slot-), MSI 00",
                Capability {
                    id: 0x40,
                    version: None,
                    name: "Unknown".into(),
                    vendor: None,
                    types: Some(vec!["Express (v2) Root Port (Slot-)".into(), "MSI 00".into()]),
                    properties: vec![],
                },
            ),
            (
                "Capabilities: [300 v1] Vendor Specific Information: ID=0008 Rev=0 Len=038 <?>",
                Capability {
                    id: 0x300,
                    version: Some(1),
                    name: "Unknown".into(),
                    vendor: Some(VendorInfo {
                        id: Some(8),
                        rev: Some(0),
                        len: 0x38,
                    }),
                    types: None,
                    properties: vec![],
                },
            ),
            (
                "Capabilities: [1a0 v1] Transaction Processing Hints, Device specific mode supported, Steering table in TPH capability structure",
                Capability {
                    id: 0x1a0,
                    version: Some(1),
                    name: "Unknown".into(),
                    vendor: None,
                    types: Some(vec![
                        "Transaction Processing Hints".into(),
                        "Device specific mode supported".into(),
                        "Steering table in TPH capability structure".into(),
                    ]),
                    properties: vec![],
                },
            ),
            (
                "Capabilities: [c8] Vendor Specific Information: Len=14 <?>",
                Capability {
                    id: 0xc8,
                    version: None,
                    name: "Unknown".into(),
                    vendor: Some(VendorInfo {
                        id: None,
                        rev: None,
                        len: 0x14,
                    }),
                    types: None,
                    properties: vec![],
                },
            ),
            (
                "Capabilities: [e0] Vendor Specific Information: ID=0001 Rev=1 Len=010",
                Capability {
                    id: 0xe0,
                    version: None,
                    name: "Unknown".into(),
                    vendor: Some(VendorInfo {
                        id: Some(1),
                        rev: Some(1),
                        len: 0x10,
                    }),
                    types: None,
                    properties: vec![],
                },
            ),
            (
                "Capabilities: [50] MSI: Enable+ Count=1/1 Maskable- 64bit+",
                Capability {
                    id: 0x50,
                    version: None,
                    name: "MSI: Enable+ Count=1/1 Maskable- 64bit+".into(),
                    vendor: None,
                    types: None,
                    properties: vec![],
                },
            ),
        ] {
            assert_eq!(parse_capability_header(input), Ok(expected), "{input}");
        }

        for input in [
            "Capabilities: <access denied>",
            "Capabilities: [xyz] Power Management version 3",
            "Capabilities: [40 v] Express",
        ] {
            assert!(parse_capability_header(input).is_err(), "{input}");
        }

        // A vendor trailer without `Len=` is an error, not a capability name.
        for input in [
            "Capabilities: [e0] Vendor Specific Information: ID=0001 Rev=1",
            "Capabilities: [e0 v1] Vendor Specific Information: Intel Capabilities v1",
        ] {
            assert_eq!(
                parse_capability_header(input),
                Err(FieldError::format("Capabilities", input)),
                "{input}"
            );
        }
    }
}
