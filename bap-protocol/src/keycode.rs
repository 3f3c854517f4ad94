//! Abstract key-code model: a 64-bit packed representation of a command
//! or symbolic keystroke, independent of any one driver's own encoding.
//!
//! Layout of the 64-bit value:
//!
//! ```text
//!  bit  63 ..................... 32 31 .. 24 23 .. 16 15 ....... 0
//!       [            flags            ][  type ][  group  ][ arg  ]
//! ```

use crate::error::{BapError, Result};

/// The `type` field (bits 31..24). Only two values are recognized; any
/// other byte is an invalid key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// An abstract command understood by the server's command processor.
    Cmd,
    /// A key symbol from a keyboard-like keyspace, including a reserved
    /// Unicode subrange.
    Sym,
}

impl KeyType {
    const CMD_BYTE: u8 = 0x00;
    const SYM_BYTE: u8 = 0x01;

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            Self::CMD_BYTE => Some(KeyType::Cmd),
            Self::SYM_BYTE => Some(KeyType::Sym),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            KeyType::Cmd => Self::CMD_BYTE,
            KeyType::Sym => Self::SYM_BYTE,
        }
    }
}

/// Additive flag bits (within the 32-bit flags field). Any combination may
/// modify a base code.
pub mod flags {
    pub const MOD_SHIFT: u32 = 1 << 0;
    pub const MOD_CONTROL: u32 = 1 << 1;
    pub const MOD_META: u32 = 1 << 2;
    pub const MOD_UPPER: u32 = 1 << 3;
    pub const ROUTING: u32 = 1 << 4;
    pub const TOGGLE_ON: u32 = 1 << 5;
    pub const TOGGLE_OFF: u32 = 1 << 6;
    pub const LINE_SCALED: u32 = 1 << 7;
    pub const KBD_EMUL_HINT1: u32 = 1 << 8;
    pub const KBD_EMUL_HINT2: u32 = 1 << 9;
    pub const KBD_EMUL_HINT3: u32 = 1 << 10;

    pub const ALL: u32 = MOD_SHIFT
        | MOD_CONTROL
        | MOD_META
        | MOD_UPPER
        | ROUTING
        | TOGGLE_ON
        | TOGGLE_OFF
        | LINE_SCALED
        | KBD_EMUL_HINT1
        | KBD_EMUL_HINT2
        | KBD_EMUL_HINT3;

    /// Names of every set bit, in ascending bit order.
    pub fn names(bits: u32) -> Vec<&'static str> {
        let table: &[(u32, &str)] = &[
            (MOD_SHIFT, "shift"),
            (MOD_CONTROL, "control"),
            (MOD_META, "meta"),
            (MOD_UPPER, "upper"),
            (ROUTING, "routing"),
            (TOGGLE_ON, "toggle-on"),
            (TOGGLE_OFF, "toggle-off"),
            (LINE_SCALED, "line-scaled"),
            (KBD_EMUL_HINT1, "kbd-emul-1"),
            (KBD_EMUL_HINT2, "kbd-emul-2"),
            (KBD_EMUL_HINT3, "kbd-emul-3"),
        ];
        table
            .iter()
            .filter(|(bit, _)| bits & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Command families: the high nybble of the `group` byte for `CMD` codes.
/// Family `SIMPLE` carries no argument; every other family takes a 16-bit
/// argument, reflected in `argument_width`.
pub mod cmd_family {
    pub const SIMPLE: u8 = 0x0;
    pub const ROUTING: u8 = 0x1;
    pub const PASS_THROUGH: u8 = 0x2;
    pub const GOTO_LINE: u8 = 0x3;
}

/// The `group` byte value that marks a `SYM` code as occupying the reserved
/// Unicode subrange: symbols in this page denote Unicode code points
/// directly rather than driver-specific symbol indices.
pub const SYM_UNICODE_PAGE: u8 = 0x01;

/// The ASCII page: `SYM` codes with `group == 0` and `argument <= 0x7F`
/// correspond directly to character input.
pub const SYM_ASCII_PAGE: u8 = 0x00;

/// An abstract 64-bit key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u64);

impl KeyCode {
    pub fn from_raw(value: u64) -> Self {
        KeyCode(value)
    }

    pub fn from_hi_lo(hi: u32, lo: u32) -> Self {
        KeyCode(((hi as u64) << 32) | lo as u64)
    }

    pub fn hi_lo(self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }

    pub fn flags(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn type_byte(self) -> u8 {
        ((self.0 >> 24) & 0xFF) as u8
    }

    pub fn group(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub fn argument(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn key_type(self) -> Result<KeyType> {
        KeyType::from_byte(self.type_byte())
            .ok_or_else(|| BapError::InvalidParameter("unrecognized key type".into()))
    }

    pub fn with_flags(self, extra: u32) -> KeyCode {
        KeyCode(self.0 | ((extra as u64) << 32))
    }

    pub fn without_flags(self) -> KeyCode {
        KeyCode(self.0 & 0x0000_0000_FFFF_FFFF)
    }

    /// Builds a `CMD` key code.
    pub fn command(group: u8, argument: u16, flags: u32) -> KeyCode {
        let lo = ((KeyType::Cmd.to_byte() as u32) << 24) | ((group as u32) << 16) | argument as u32;
        KeyCode(((flags as u64) << 32) | lo as u64)
    }

    /// Builds a `SYM` key code for an ASCII character.
    pub fn ascii(ch: u8, flags: u32) -> KeyCode {
        debug_assert!(ch <= 0x7F);
        let lo =
            ((KeyType::Sym.to_byte() as u32) << 24) | ((SYM_ASCII_PAGE as u32) << 16) | ch as u32;
        KeyCode(((flags as u64) << 32) | lo as u64)
    }

    /// Builds a `SYM` key code for a non-Unicode keyboard page.
    pub fn keyboard_sym(page: u8, code: u8, flags: u32) -> KeyCode {
        let lo = ((KeyType::Sym.to_byte() as u32) << 24) | ((page as u32) << 16) | code as u32;
        KeyCode(((flags as u64) << 32) | lo as u64)
    }

    /// Builds a `SYM` key code for a Unicode code point in the BMP
    /// (`codepoint <= 0xFFFF`, per our resolution of the reserved-page
    /// design in DESIGN.md).
    pub fn unicode(codepoint: u16, flags: u32) -> KeyCode {
        let lo = ((KeyType::Sym.to_byte() as u32) << 24)
            | ((SYM_UNICODE_PAGE as u32) << 16)
            | codepoint as u32;
        KeyCode(((flags as u64) << 32) | lo as u64)
    }

    /// `argument_width(code)`: the number of significant low bits of the
    /// `group`+`argument` region.
    pub fn argument_width(self) -> Result<u8> {
        match self.key_type()? {
            KeyType::Sym => {
                if self.group() == SYM_UNICODE_PAGE {
                    Ok(24)
                } else {
                    Ok(8)
                }
            }
            KeyType::Cmd => {
                if self.group() & 0xF0 == cmd_family::SIMPLE << 4 {
                    Ok(0)
                } else {
                    Ok(16)
                }
            }
        }
    }

    /// Internal server command "blocked" value: `CMD` only, group shifted
    /// into bits 23..16 with the argument concatenated below it, 24 bits
    /// total. Bijective with `(group, argument)` for the `CMD` type.
    pub fn command_blocked_value(self) -> Result<u32> {
        match self.key_type()? {
            KeyType::Cmd => Ok(((self.group() as u32) << 16) | self.argument() as u32),
            KeyType::Sym => Err(BapError::InvalidParameter(
                "command_blocked_value is only defined for CMD codes".into(),
            )),
        }
    }

    pub fn from_command_blocked_value(value: u32, flags: u32) -> KeyCode {
        let group = ((value >> 16) & 0xFF) as u8;
        let argument = (value & 0xFFFF) as u16;
        KeyCode::command(group, argument, flags)
    }

    /// The Unicode code point this `SYM` code denotes, if it lies in the
    /// reserved Unicode page.
    pub fn unicode_codepoint(self) -> Result<Option<u16>> {
        match self.key_type()? {
            KeyType::Sym if self.group() == SYM_UNICODE_PAGE => Ok(Some(self.argument())),
            KeyType::Sym => Ok(None),
            KeyType::Cmd => Err(BapError::InvalidParameter(
                "unicode_codepoint is only defined for SYM codes".into(),
            )),
        }
    }
}

/// `describe(code) -> (type_name, command_name, argument, flag_names[])`.
/// Table lookup keyed first by code-with-argument, falling back to
/// code-without-argument; fails when neither matches.
pub struct DescribeEntry {
    pub code_without_argument: KeyCode,
    pub command_name: &'static str,
    /// Whether this entry is parameterized by the argument (if so, the
    /// matched argument is reported verbatim; otherwise 0).
    pub has_argument: bool,
}

pub struct DescribeTable {
    entries: Vec<DescribeEntry>,
}

impl DescribeTable {
    pub fn new(entries: Vec<DescribeEntry>) -> Self {
        DescribeTable { entries }
    }

    pub fn describe(&self, code: KeyCode) -> Result<(&'static str, &'static str, u16, Vec<&'static str>)> {
        let key_type = code.key_type()?;
        let type_name = match key_type {
            KeyType::Cmd => "CMD",
            KeyType::Sym => "SYM",
        };
        let stripped = code.without_flags();
        let without_argument = KeyCode(stripped.0 & !0xFFFFu64);

        let found = self
            .entries
            .iter()
            .find(|e| e.code_without_argument == stripped)
            .or_else(|| self.entries.iter().find(|e| e.code_without_argument == without_argument));

        let entry = found.ok_or_else(|| {
            BapError::InvalidParameter("no description for this key code".into())
        })?;

        let argument = if entry.has_argument { code.argument() } else { 0 };
        Ok((type_name, entry.command_name, argument, flags::names(code.flags())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hi_lo_round_trips() {
        let code = KeyCode::command(cmd_family::ROUTING, 7, flags::MOD_SHIFT);
        let (hi, lo) = code.hi_lo();
        assert_eq!(KeyCode::from_hi_lo(hi, lo), code);
    }

    #[test]
    fn argument_width_simple_cmd_is_zero() {
        let code = KeyCode::command(cmd_family::SIMPLE, 0, 0);
        assert_eq!(code.argument_width().unwrap(), 0);
    }

    #[test]
    fn argument_width_routing_cmd_is_sixteen() {
        let code = KeyCode::command(cmd_family::ROUTING << 4, 3, 0);
        assert_eq!(code.argument_width().unwrap(), 16);
    }

    #[test]
    fn argument_width_ascii_sym_is_eight() {
        let code = KeyCode::ascii(b'a', 0);
        assert_eq!(code.argument_width().unwrap(), 8);
    }

    #[test]
    fn argument_width_unicode_sym_is_24() {
        let code = KeyCode::unicode(0x20AC, 0);
        assert_eq!(code.argument_width().unwrap(), 24);
        assert_eq!(code.unicode_codepoint().unwrap(), Some(0x20AC));
    }

    #[test]
    fn command_blocked_value_is_bijective() {
        let code = KeyCode::command(0x23, 0x1234, flags::ROUTING);
        let value = code.command_blocked_value().unwrap();
        let back = KeyCode::from_command_blocked_value(value, code.flags());
        assert_eq!(back, code);
    }

    #[test]
    fn describe_falls_back_to_argument_less_entry() {
        let base = KeyCode::command(cmd_family::GOTO_LINE << 4, 0, 0).without_flags();
        let base = KeyCode(base.0 & !0xFFFFu64);
        let table = DescribeTable::new(vec![DescribeEntry {
            code_without_argument: base,
            command_name: "GOTO_LINE",
            has_argument: true,
        }]);
        let code = KeyCode::command(cmd_family::GOTO_LINE << 4, 42, flags::MOD_META);
        let (type_name, cmd_name, arg, fl) = table.describe(code).unwrap();
        assert_eq!(type_name, "CMD");
        assert_eq!(cmd_name, "GOTO_LINE");
        assert_eq!(arg, 42);
        assert_eq!(fl, vec!["meta"]);
    }

    #[test]
    fn describe_unknown_code_fails() {
        let table = DescribeTable::new(vec![]);
        let code = KeyCode::command(cmd_family::SIMPLE, 0, 0);
        assert!(table.describe(code).is_err());
    }
}
