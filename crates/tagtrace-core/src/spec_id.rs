use facet::Facet;
use std::fmt::{Display, Formatter};

/// Prefix every spec identifier starts with.
pub const SPEC_PREFIX: &str = "SPEC-";

/// Number of digits in the numeric suffix of a spec identifier.
pub const SPEC_NUMBER_DIGITS: usize = 3;

/// A validated spec identifier of the form `SPEC-{DOMAIN}-{NNN}`.
///
/// The only way to obtain one is through [`parse_spec_id`], so holding a
/// `SpecId` means the string is safe to use in file paths and messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
pub struct SpecId {
    canonical: String,
}

impl SpecId {
    /// Canonical string form (`SPEC-AUTH-001`).
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Domain segment (`AUTH` for `SPEC-AUTH-001`).
    pub fn domain(&self) -> &str {
        let rest = &self.canonical[SPEC_PREFIX.len()..];
        &rest[..rest.len() - SPEC_NUMBER_DIGITS - 1]
    }

    /// Numeric segment (`1` for `SPEC-AUTH-001`).
    pub fn number(&self) -> u16 {
        self.canonical[self.canonical.len() - SPEC_NUMBER_DIGITS..]
            .parse()
            .unwrap_or(0)
    }

    /// Chain key shared by every stage of this spec's chain (`AUTH-001`).
    pub fn chain_key(&self) -> &str {
        &self.canonical[SPEC_PREFIX.len()..]
    }

    pub fn into_string(self) -> String {
        self.canonical
    }
}

impl Display for SpecId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl AsRef<str> for SpecId {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq<&str> for SpecId {
    fn eq(&self, other: &&str) -> bool {
        self.canonical == *other
    }
}

impl PartialEq<SpecId> for &str {
    fn eq(&self, other: &SpecId) -> bool {
        *self == other.canonical
    }
}

/// Parse a spec identifier with the exact grammar `SPEC-[A-Z0-9]+-\d{3}`.
///
/// Anything else is rejected: lowercase letters, extra separators, path
/// components, whitespace and shell metacharacters never survive this check.
pub fn parse_spec_id(id: &str) -> Option<SpecId> {
    let rest = id.strip_prefix(SPEC_PREFIX)?;
    let (domain, number) = rest.split_once('-')?;

    if domain.is_empty()
        || !domain
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return None;
    }

    if number.len() != SPEC_NUMBER_DIGITS || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(SpecId {
        canonical: id.to_string(),
    })
}

/// Returns true when `id` is a well-formed spec identifier.
pub fn validate_spec_id_format(id: &str) -> bool {
    parse_spec_id(id).is_some()
}

/// Chain key of an arbitrary stage identifier: its trailing `DOMAIN-NNN`.
///
/// `SPEC-AUTH-001` and `API-AUTH-001` both map to `AUTH-001`, which is what
/// lets the stages of one chain carry different prefixes. Identifiers without
/// a numeric tail are their own key.
pub fn chain_key(id: &str) -> &str {
    let Some((head, number)) = id.rsplit_once('-') else {
        return id;
    };
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return id;
    }
    match head.rfind('-') {
        Some(pos) => &id[pos + 1..],
        None => id,
    }
}
