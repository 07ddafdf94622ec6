//! Role -> Quotas canonical table (spec §3). The single source of truth;
//! nothing else in the codebase may define a competing copy.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Spec §3 puts the Access token's `role` claim on the wire as the numeric
/// value, not the variant name — `serde_repr` gives the derive that shape
/// instead of the default string tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    Anonym = 0,
    RegisteredNotVerified = 1,
    RegisteredVerified = 2,
    Admin = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    pub prompt_length_max: u32,
    pub rpm: u32,
    pub rpd: u32,
}

impl Role {
    pub fn canonical_quotas(&self) -> Quotas {
        match self {
            Role::Anonym => Quotas {
                prompt_length_max: 100,
                rpm: 1,
                rpd: 10,
            },
            Role::RegisteredNotVerified => Quotas {
                prompt_length_max: 300,
                rpm: 2,
                rpd: 30,
            },
            Role::RegisteredVerified => Quotas {
                prompt_length_max: 1000,
                rpm: 5,
                rpd: 100,
            },
            Role::Admin => Quotas {
                prompt_length_max: 4000,
                rpm: 60,
                rpd: 10000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_quotas_match_table() {
        assert_eq!(
            Role::Anonym.canonical_quotas(),
            Quotas {
                prompt_length_max: 100,
                rpm: 1,
                rpd: 10
            }
        );
        assert_eq!(
            Role::Admin.canonical_quotas(),
            Quotas {
                prompt_length_max: 4000,
                rpm: 60,
                rpd: 10000
            }
        );
    }

    #[test]
    fn role_serializes_as_numeric_value() {
        assert_eq!(serde_json::to_string(&Role::Anonym).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Role::RegisteredNotVerified).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Role::RegisteredVerified).unwrap(), "2");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "3");
    }
}
