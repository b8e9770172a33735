//! Request authentication and authorization (spec §4.7): IP/CIDR allow-listing, privileged-port
//! gating, credential parsing, and identity squashing.

use std::net::IpAddr;

use crate::rpc_msg::{AuthSysCredential, OpaqueAuth};
use crate::status::AuthFlavor;

/// An anonymous identity used for `AUTH_NONE` and the `"all"` squash mode.
pub const ANONYMOUS_UID: u32 = 65534;
pub const ANONYMOUS_GID: u32 = 65534;

/// A literal IP or a CIDR block in the export's allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowEntry {
    Literal(IpAddr),
    Cidr(IpAddr, u8),
}

impl AllowEntry {
    pub fn matches(&self, addr: IpAddr) -> bool {
        match *self {
            AllowEntry::Literal(ip) => ip == addr,
            AllowEntry::Cidr(network, prefix) => cidr_contains(network, prefix, addr),
        }
    }
}

fn cidr_contains(network: IpAddr, prefix: u8, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpAddr::V4(net), IpAddr::V4(a)) => {
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix as u32) };
            (u32::from(net) & mask) == (u32::from(a) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(a)) => {
            let mask = if prefix == 0 { 0u128 } else { u128::MAX << (128 - prefix as u32) };
            (u128::from(net) & mask) == (u128::from(a) & mask)
        }
        _ => false,
    }
}

/// Squash mode applied to the effective identity after credential parsing (spec §4.7 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SquashMode {
    #[default]
    None,
    Root,
    All,
}

impl SquashMode {
    /// Unknown configured values are treated as `"none"` (spec §4.7 step 4).
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "root" => SquashMode::Root,
            "all" => SquashMode::All,
            "none" | "" => SquashMode::None,
            _ => SquashMode::None,
        }
    }

    fn apply(&self, uid: u32, gid: u32) -> (u32, u32) {
        match self {
            SquashMode::None => (uid, gid),
            SquashMode::All => (ANONYMOUS_UID, ANONYMOUS_GID),
            SquashMode::Root => (
                if uid == 0 { ANONYMOUS_UID } else { uid },
                if gid == 0 { ANONYMOUS_GID } else { gid },
            ),
        }
    }
}

/// The resolved identity and outcome of authenticating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub allowed: bool,
    pub effective_uid: u32,
    pub effective_gid: u32,
    pub reason: Option<String>,
}

impl AuthDecision {
    fn deny(reason: &str) -> Self {
        AuthDecision { allowed: false, effective_uid: ANONYMOUS_UID, effective_gid: ANONYMOUS_GID, reason: Some(reason.to_string()) }
    }

    fn allow(uid: u32, gid: u32) -> Self {
        AuthDecision { allowed: true, effective_uid: uid, effective_gid: gid, reason: None }
    }
}

/// The export-level policy an incoming request is checked against.
pub struct AuthPolicy {
    pub allow_list: Vec<AllowEntry>,
    pub require_secure_port: bool,
    pub squash: SquashMode,
}

impl AuthPolicy {
    pub fn check(&self, client_addr: IpAddr, client_port: u16, credential: &OpaqueAuth) -> AuthDecision {
        if !self.allow_list.is_empty() && !self.allow_list.iter().any(|e| e.matches(client_addr)) {
            return AuthDecision::deny("client address not in export allow-list");
        }
        if self.require_secure_port && client_port >= 1024 {
            return AuthDecision::deny("client port is not a privileged (secure) port");
        }
        let (uid, gid) = match credential.flavor {
            AuthFlavor::AUTH_NONE => (ANONYMOUS_UID, ANONYMOUS_GID),
            AuthFlavor::AUTH_SYS => match AuthSysCredential::decode(&credential.body) {
                Ok(cred) => (cred.uid, cred.gid),
                Err(_) => return AuthDecision::deny("malformed AUTH_SYS credential"),
            },
            _ => return AuthDecision::deny("unsupported authentication flavor"),
        };
        let (uid, gid) = self.squash.apply(uid, gid);
        AuthDecision::allow(uid, gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_none() -> OpaqueAuth {
        OpaqueAuth { flavor: AuthFlavor::AUTH_NONE, body: Vec::new() }
    }

    fn policy(allow: Vec<AllowEntry>, secure: bool, squash: SquashMode) -> AuthPolicy {
        AuthPolicy { allow_list: allow, require_secure_port: secure, squash }
    }

    #[test]
    fn denies_clients_outside_the_allow_list() {
        let p = policy(vec![AllowEntry::Literal("10.0.0.1".parse().unwrap())], false, SquashMode::None);
        let decision = p.check("10.0.0.2".parse().unwrap(), 2000, &auth_none());
        assert!(!decision.allowed);
    }

    #[test]
    fn cidr_entry_matches_addresses_in_range() {
        let p = policy(vec![AllowEntry::Cidr("10.0.0.0".parse().unwrap(), 24)], false, SquashMode::None);
        let decision = p.check("10.0.0.200".parse().unwrap(), 2000, &auth_none());
        assert!(decision.allowed);
        let denied = p.check("10.0.1.1".parse().unwrap(), 2000, &auth_none());
        assert!(!denied.allowed);
    }

    #[test]
    fn secure_port_requirement_rejects_unprivileged_ports() {
        let p = policy(vec![], true, SquashMode::None);
        assert!(!p.check("10.0.0.1".parse().unwrap(), 2049, &auth_none()).allowed);
        assert!(p.check("10.0.0.1".parse().unwrap(), 900, &auth_none()).allowed);
    }

    #[test]
    fn auth_none_gets_the_anonymous_identity() {
        let p = policy(vec![], false, SquashMode::None);
        let decision = p.check("127.0.0.1".parse().unwrap(), 900, &auth_none());
        assert_eq!((decision.effective_uid, decision.effective_gid), (ANONYMOUS_UID, ANONYMOUS_GID));
    }

    #[test]
    fn root_squash_only_remaps_root_identity() {
        let mut body = Vec::new();
        crate::xdr::encode::u32(&mut body, 0).unwrap();
        crate::xdr::encode::string(&mut body, "client").unwrap();
        crate::xdr::encode::u32(&mut body, 0).unwrap();
        crate::xdr::encode::u32(&mut body, 0).unwrap();
        crate::xdr::encode::u32(&mut body, 0).unwrap();
        let cred = OpaqueAuth { flavor: AuthFlavor::AUTH_SYS, body };
        let p = policy(vec![], false, SquashMode::Root);
        let decision = p.check("127.0.0.1".parse().unwrap(), 900, &cred);
        assert_eq!((decision.effective_uid, decision.effective_gid), (ANONYMOUS_UID, ANONYMOUS_GID));
    }

    #[test]
    fn unknown_flavor_is_denied() {
        let p = policy(vec![], false, SquashMode::None);
        let cred = OpaqueAuth { flavor: AuthFlavor::AUTH_DH, body: Vec::new() };
        assert!(!p.check("127.0.0.1".parse().unwrap(), 900, &cred).allowed);
    }

    #[test]
    fn unknown_squash_string_behaves_as_none() {
        assert_eq!(SquashMode::from_config_str("bogus"), SquashMode::None);
    }
}
