/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Posting identities: who a news article is from.

mod registry;

pub use registry::{IdentityMap, IdentityRegistry};

/// Name of the identity used where nobody is signed in.
pub const ANONYMOUS_NAME: &str = "anonymous";

/// A named posting persona. `name` is the key in the registry; the other fields are free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub real_name: String,
    pub mail_address: String,
    pub organization: String,
    pub response_address: String,
    pub referrer_url: String,
    pub signature: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// The anonymous identity: name and real name "anonymous", everything else empty.
pub fn anonymous_identity() -> Identity {
    Identity {
        name: ANONYMOUS_NAME.to_string(),
        real_name: ANONYMOUS_NAME.to_string(),
        ..Identity::default()
    }
}

/// Identity as stored by older releases, kept for migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyIdentity {
    pub name: String,
    pub real_name: String,
    pub mail_address: String,
    pub organization: String,
    pub response_address: String,
    pub referrer_url: String,
    pub signature: String,
}

impl From<&LegacyIdentity> for Identity {
    fn from(old: &LegacyIdentity) -> Self {
        Self {
            name: old.name.clone(),
            real_name: old.real_name.clone(),
            mail_address: old.mail_address.clone(),
            organization: old.organization.clone(),
            response_address: old.response_address.clone(),
            referrer_url: old.referrer_url.clone(),
            signature: old.signature.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_contact_details() {
        let anon = anonymous_identity();
        assert_eq!(anon.name, "anonymous");
        assert_eq!(anon.real_name, "anonymous");
        assert!(anon.mail_address.is_empty());
        assert!(anon.response_address.is_empty());
        assert!(anon.organization.is_empty());
        assert!(anon.referrer_url.is_empty());
        assert!(anon.signature.is_empty());
        assert_eq!(anon, anonymous_identity());
    }

    #[test]
    fn legacy_fields_copied_one_to_one() {
        let old = LegacyIdentity {
            name: "work".into(),
            real_name: "Ada".into(),
            mail_address: "ada@example.com".into(),
            organization: "Engines Ltd".into(),
            response_address: "noreply@example.com".into(),
            referrer_url: "https://example.com".into(),
            signature: "-- \nAda".into(),
        };
        let id = Identity::from(&old);
        assert_eq!(id.name, old.name);
        assert_eq!(id.real_name, old.real_name);
        assert_eq!(id.mail_address, old.mail_address);
        assert_eq!(id.organization, old.organization);
        assert_eq!(id.response_address, old.response_address);
        assert_eq!(id.referrer_url, old.referrer_url);
        assert_eq!(id.signature, old.signature);
    }
}
