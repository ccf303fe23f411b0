//! Parser for the verbose device listing printed by `lspci -vvv`.
//!
//! The report goes through four stages: [`normalize`] smooths over the formatting
//! quirks of `lspci`, [`lexer::tokenize`] splits the text into per-device trees of
//! logical fields, the grammars in [`parser`] and [`flags`] type each field, and the
//! device assembler puts the pieces together. The address ranges claimed by all
//! devices are finally arranged into a [`RangeForest`] per address space.
//!
//! ```
//! let report = lspci_parser::from_str(
//!     "00:1f.3 Audio device: Intel Corporation Device a348 (rev 10)\n\
//!      \tControl: I/O- Mem+ BusMaster+\n\
//!      \tRegion 0: Memory at 90330000 (64-bit, non-prefetchable) [size=16K]\n",
//! )
//! .unwrap();
//!
//! assert_eq!(report.devices.len(), 1);
//! assert_eq!(report.memory.roots()[0].start, 0x9033_0000);
//! ```

pub mod ast;
mod capability;
mod device;
mod errors;
pub mod flags;
mod forest;
pub mod lexer;
mod normalize;
pub mod parser;

pub use ast::*;
pub use capability::Register;
pub use errors::{Error, FieldError};
pub use forest::{RangeForest, RangeNode, Walk};
pub use normalize::normalize;

/// Parse a report into its devices, without building the range forests.
pub fn parse_devices(s: &str) -> Result<Vec<Device>, Error> {
    lexer::tokenize(&normalize(s))?
        .iter()
        .map(device::assemble)
        .collect()
}

/// Parse a report.
pub fn from_str(s: &str) -> Result<Report, Error> {
    let devices = parse_devices(s)?;
    let memory = RangeForest::collect(&devices, AddressSpace::Memory)?;
    let io = RangeForest::collect(&devices, AddressSpace::Io)?;

    tracing::debug!(
        devices = devices.len(),
        memory_ranges = memory.walk().count(),
        io_ranges = io.walk().count(),
        "parsed report"
    );

    Ok(Report {
        devices,
        memory,
        io,
    })
}
