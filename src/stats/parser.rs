//! Generic parser for key/value cgroup statistic files such as `cpu.stat`
//! and `memory.stat`.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use cgroup_limits::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct PidsEvents {
//!     max: u64,
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut PidsEvents, u64)>> =
//!     LazyLock::new(|| {
//!         let mut map: HashMap<&'static str, fn(&mut PidsEvents, u64)> = HashMap::new();
//!         map.insert("max", |stat, v| stat.max = v);
//!         map
//!     });
//!
//! impl KeyValueStat for PidsEvents {
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let stat = PidsEvents::from_reader(&mut "max 3\n".as_bytes()).unwrap();
//! assert_eq!(stat.max, 3);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A stat file made of `<key> <value>` lines.
///
/// Implementors name the keys they care about and how each value is
/// stored; every other key is ignored.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// If `false`, a key seen twice is an error and parsing stops as soon as
    /// every known key has been seen.
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Map of known field names to the setter applying the parsed value.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses a key/value buffer into `Self`.
    ///
    /// # Errors
    /// Returns an `io::Error` if reading fails, or a [`StatParseError`]
    /// wrapped in `io::Error` (kind `InvalidData`) if parsing fails.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let field_count = handlers.len();
        let mut seen_keys = HashSet::with_capacity(field_count);

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                Self::parse_and_set(key, val, &mut stat, lineno, handlers, &mut seen_keys)?;
            }
            if !Self::ALLOW_DUPLICATE_KEYS && seen_keys.len() == field_count {
                break;
            }

            line.clear();
        }

        Ok(stat)
    }

    /// Parses a single key-value pair and applies it through its handler.
    ///
    /// # Errors
    /// [`StatParseError::InvalidKeyValue`] if the value is not a `u64`,
    /// [`StatParseError::DuplicateField`] if the key repeats and duplicates
    /// are disallowed.
    fn parse_and_set(
        key: &str,
        val: &str,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        let Some((k, handler)) = handlers.get_key_value(key) else {
            return Ok(());
        };
        let parsed = val
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidKeyValue {
                key: key.to_string(),
                value: val.to_string(),
                line: lineno,
                source,
            })?;
        if !Self::ALLOW_DUPLICATE_KEYS && !seen_keys.insert(k) {
            return Err(StatParseError::DuplicateField {
                field: key.to_string(),
                line: lineno,
            }
            .into());
        }
        handler(stat, parsed);
        Ok(())
    }
}
