//! Invitee list parsing
//!
//! Turns the free-form text an inviter pastes into a set of bare addresses.
//! No address validation happens here.

use std::collections::BTreeSet;

lazy_static::lazy_static! {
    static ref ENTRY_SEPARATOR: regex::Regex = regex::Regex::new(r"[,\n]").unwrap();
    static ref ANGLE_ADDRESS: regex::Regex = regex::Regex::new(r"<(.*)>").unwrap();
}

/// Parse comma and/or newline separated entries, each either a bare address
/// or `Display Name <address>`.
///
/// Entries are trimmed and empty entries dropped. Duplicates collapse by
/// exact string; case is preserved.
pub fn parse_invitee_emails(text: &str) -> BTreeSet<String> {
    ENTRY_SEPARATOR
        .split(text)
        .filter_map(|entry| {
            let address = match ANGLE_ADDRESS.captures(entry) {
                Some(captures) => captures.get(1).map_or("", |m| m.as_str()),
                None => entry,
            };
            let address = address.trim();
            (!address.is_empty()).then(|| address.to_string())
        })
        .collect()
}
