//! Ordered session-field builders.
//!
//! A `Session` is assembled by applying an ordered list of
//! `(SessionField, value)` writes: later builders run after earlier ones
//! and may read fields an earlier builder already set (e.g. the tenant
//! builder reads the credentials id the credentials builder wrote). This
//! mirrors the "assemble from scope, credentials, authentication, tenants"
//! description of the Session Builder component, expressed as a typed enum
//! instead of string attribute paths since Rust has no dynamic setattr.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::session::Session;

/// One field a builder may set on a session under construction.
#[derive(Debug, Clone)]
pub enum SessionField {
    CredentialsId(String),
    LoginDescriptor(String),
    Factors(BTreeSet<String>),
    AuthenticatedAt(DateTime<Utc>),
    Scope(BTreeSet<String>),
    ClientId(String),
    Nonce(String),
    AssignedTenants(BTreeSet<String>),
    Authz(String, BTreeSet<String>),
    ExpiresAt(DateTime<Utc>),
}

impl SessionField {
    pub fn apply(self, session: &mut Session) {
        match self {
            SessionField::CredentialsId(v) => session.credentials_id = Some(v),
            SessionField::LoginDescriptor(v) => session.authentication.login_descriptor = Some(v),
            SessionField::Factors(v) => session.authentication.factors = v,
            SessionField::AuthenticatedAt(v) => session.authentication.authenticated_at = Some(v),
            SessionField::Scope(v) => session.oauth2.scope = v,
            SessionField::ClientId(v) => session.oauth2.client_id = Some(v),
            SessionField::Nonce(v) => session.oauth2.nonce = Some(v),
            SessionField::AssignedTenants(v) => session.assigned_tenants = v,
            SessionField::Authz(tenant, resources) => {
                session.authz.entry(tenant).or_default().extend(resources);
            }
            SessionField::ExpiresAt(v) => session.expires_at = v,
        }
    }
}

/// A named, ordered batch of field writes. Builders run in list order;
/// within a builder, fields apply in the order given. Last write to a
/// given field wins.
pub struct SessionBuilder {
    pub name: &'static str,
    pub fields: Vec<SessionField>,
}

impl SessionBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, field: SessionField) -> Self {
        self.fields.push(field);
        self
    }
}

/// Apply an ordered list of builders to a session, in order.
pub fn apply_builders(session: &mut Session, builders: Vec<SessionBuilder>) {
    for builder in builders {
        for field in builder.fields {
            field.apply(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use chrono::Duration;

    #[test]
    fn later_builder_overrides_earlier_same_field() {
        let mut session = Session::new_root("alice".to_string(), Utc::now() + Duration::hours(1));
        let builders = vec![
            SessionBuilder::new("credentials").with(SessionField::CredentialsId("alice".into())),
            SessionBuilder::new("override").with(SessionField::CredentialsId("bob".into())),
        ];
        apply_builders(&mut session, builders);
        assert_eq!(session.credentials_id, Some("bob".to_string()));
    }

    #[test]
    fn authz_entries_accumulate_per_tenant() {
        let mut session = Session::new_root("alice".to_string(), Utc::now() + Duration::hours(1));
        let builders = vec![
            SessionBuilder::new("authz").with(SessionField::Authz(
                "acme".into(),
                BTreeSet::from(["read".to_string()]),
            )),
            SessionBuilder::new("authz-more").with(SessionField::Authz(
                "acme".into(),
                BTreeSet::from(["write".to_string()]),
            )),
        ];
        apply_builders(&mut session, builders);
        let resources = session.authz.get("acme").unwrap();
        assert!(resources.contains("read"));
        assert!(resources.contains("write"));
    }
}
