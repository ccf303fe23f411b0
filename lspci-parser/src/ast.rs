use crate::capability::Register;

/// A fully parsed `lspci -vvv` report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub devices: Vec<Device>,
    pub memory: crate::RangeForest,
    pub io: crate::RangeForest,
}

impl Report {
    /// Look up a device by its bus address (e.g. `00:1f.3`).
    pub fn device(&self, address: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.address() == address)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Device {
    /// The unindented first line of the device block.
    pub header: String,
    pub fields: Vec<Field>,
    pub capabilities: Vec<Capability>,
    pub regions: Vec<Region>,
    pub bridge_regions: Vec<BridgeRegion>,
    pub expansion_rom: Option<ExpansionRom>,
}

impl Device {
    /// The bus address, i.e. the first word of the header line.
    pub fn address(&self) -> &str {
        self.header.split_whitespace().next().unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Insert a field, replacing the value of an existing field of the same name.
    pub(crate) fn set_field(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field {
                name: name.to_string(),
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    List(Vec<String>),
    Flags(FlagSet),
}

/// A set of named flags, e.g. `I/O+ Mem- DEVSEL=fast`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlagSet(pub(crate) Vec<Flag>);

impl FlagSet {
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.0.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a FlagSet {
    type Item = &'a Flag;
    type IntoIter = std::slice::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub value: FlagValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Bool(bool),
    Str(String),
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::Str(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub id: u16,
    pub version: Option<u8>,
    pub name: String,
    pub vendor: Option<VendorInfo>,
    pub types: Option<Vec<String>>,
    pub properties: Vec<Property>,
}

impl Capability {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorInfo {
    pub id: Option<u16>,
    pub rev: Option<u16>,
    pub len: u16,
}

/// One register line inside a capability block, e.g. `DevCap: MaxPayload 256 bytes, ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub register: Option<Register>,
    pub entries: Vec<Entry>,
}

impl Property {
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn set(&mut self, name: &str, value: Option<Value>) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.value = value,
            None => self.entries.push(Entry {
                name: name.to_string(),
                value,
            }),
        }
    }
}

/// A sub-value of a property. Unrecognized text is kept as the entry name with no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(u64),
    Str(String),
    Flags(FlagSet),
}

impl From<FlagValue> for Value {
    fn from(v: FlagValue) -> Self {
        match v {
            FlagValue::Bool(b) => Value::Bool(b),
            FlagValue::Str(s) => Value::Str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressSpace {
    Memory,
    Io,
}

/// A base address register as reported in a `Region <n>:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub kind: AddressSpace,
    pub index: u8,
    /// `None` when the address is withheld (`<ignored>` or `<unassigned>`).
    pub base: Option<u64>,
    pub size: Option<u64>,
    pub width: Option<u8>,
    pub disabled: bool,
    pub is_virtual: bool,
    pub prefetchable: Option<bool>,
}

impl Region {
    /// Last address covered by the region, inclusive.
    pub fn end(&self) -> Option<u64> {
        last_address(self.base?, self.size?)
    }
}

/// A window forwarded by a PCI-to-PCI bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeRegion {
    pub kind: AddressSpace,
    pub prefetchable: bool,
    pub start: u64,
    pub end: u64,
    pub size: Option<u64>,
    pub disabled: bool,
    pub width: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionRom {
    pub base: Option<u64>,
    pub size: Option<u64>,
    pub disabled: bool,
    pub is_virtual: bool,
}

impl ExpansionRom {
    pub fn end(&self) -> Option<u64> {
        last_address(self.base?, self.size?)
    }
}

/// An address range claimed by a device, as fed to the range forest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressRange {
    pub space: AddressSpace,
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    /// The owning device and the kind of claim, e.g. `00:1c.0 Memory behind bridge`.
    pub label: String,
}

fn last_address(base: u64, size: u64) -> Option<u64> {
    base.checked_add(size.checked_sub(1)?)
}
