//! RPC v2 envelope (RFC 1831 §9-10): the `rpc_msg`/`call_body`/`opaque_auth` structures that
//! wrap every NFS and MOUNT procedure call, and the reply encoders for every outcome the
//! dispatcher can produce.

use std::io::{Cursor, Read, Write};

use crate::status::{AcceptStat, AuthFlavor, RejectStat, RPC_VERSION};
use crate::xdr::{decode, encode};

const MAX_AUTH_BODY_LEN: usize = 400;
/// RFC 1813 §4.7: at most 16 auxiliary group ids in an `AUTH_SYS` credential.
const MAX_AUX_GIDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcMsgError {
    Decode(decode::DecodeError),
    NotACall,
}

impl From<decode::DecodeError> for RpcMsgError {
    fn from(err: decode::DecodeError) -> Self {
        RpcMsgError::Decode(err)
    }
}

/// Opaque authentication, undecoded beyond its flavor — the body is parsed on demand by
/// [`AuthSysCredential::decode`] only when the flavor is `AUTH_SYS`.
#[derive(Debug, Clone)]
pub struct OpaqueAuth {
    pub flavor: AuthFlavor,
    pub body: Vec<u8>,
}

pub fn decode_opaque_auth(src: &mut impl Read) -> Result<OpaqueAuth, RpcMsgError> {
    let flavor = decode::variant::<AuthFlavor>(src)?;
    let body = decode::opaque_max(src, MAX_AUTH_BODY_LEN)?;
    Ok(OpaqueAuth { flavor, body })
}

pub fn encode_opaque_auth_none(dest: &mut impl Write) -> std::io::Result<()> {
    encode::variant(dest, AuthFlavor::AUTH_NONE)?;
    encode::opaque(dest, &[])
}

/// `AUTH_SYS` credential body (RFC 1831 §9.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSysCredential {
    pub stamp: u32,
    pub machine_name: String,
    pub uid: u32,
    pub gid: u32,
    pub aux_gids: Vec<u32>,
}

impl AuthSysCredential {
    pub fn decode(body: &[u8]) -> Result<Self, RpcMsgError> {
        let mut cursor = Cursor::new(body);
        let stamp = decode::u32(&mut cursor)?;
        let machine_name = decode::string_max(&mut cursor, 255)?;
        let uid = decode::u32(&mut cursor)?;
        let gid = decode::u32(&mut cursor)?;
        let count = decode::u32_as_usize(&mut cursor)?;
        if count > MAX_AUX_GIDS {
            return Err(RpcMsgError::Decode(decode::DecodeError::LengthExceeded));
        }
        let mut aux_gids = Vec::with_capacity(count);
        for _ in 0..count {
            aux_gids.push(decode::u32(&mut cursor)?);
        }
        Ok(AuthSysCredential { stamp, machine_name, uid, gid, aux_gids })
    }
}

/// The decoded `call_body` of an accepted RPC request.
#[derive(Debug, Clone)]
pub struct CallBody {
    pub rpc_version: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub credential: OpaqueAuth,
    pub verifier: OpaqueAuth,
}

/// A fully decoded RPC call: the envelope plus the not-yet-parsed procedure argument bytes.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub xid: u32,
    pub body: CallBody,
    pub args: Vec<u8>,
}

const MSG_CALL: u32 = 0;
const MSG_REPLY: u32 = 1;

pub fn decode_call(record: &[u8]) -> Result<RpcCall, RpcMsgError> {
    let mut cursor = Cursor::new(record);
    let xid = decode::u32(&mut cursor)?;
    let msg_type = decode::u32(&mut cursor)?;
    if msg_type != MSG_CALL {
        return Err(RpcMsgError::NotACall);
    }
    let rpc_version = decode::u32(&mut cursor)?;
    let program = decode::u32(&mut cursor)?;
    let version = decode::u32(&mut cursor)?;
    let procedure = decode::u32(&mut cursor)?;
    let credential = decode_opaque_auth(&mut cursor)?;
    let verifier = decode_opaque_auth(&mut cursor)?;
    let pos = cursor.position() as usize;
    let args = record[pos..].to_vec();
    Ok(RpcCall {
        xid,
        body: CallBody { rpc_version, program, version, procedure, credential, verifier },
        args,
    })
}

/// Builds a `MSG_ACCEPTED` reply with `accept_stat == SUCCESS`, followed by `results` (the
/// already-XDR-encoded procedure reply body).
pub fn encode_accepted_success(xid: u32, results: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(results.len() + 32);
    encode::u32(&mut out, xid).unwrap();
    encode::u32(&mut out, MSG_REPLY).unwrap();
    encode::u32(&mut out, RejectOrAccept::Accepted as u32).unwrap();
    encode_opaque_auth_none(&mut out).unwrap();
    encode::variant(&mut out, AcceptStat::SUCCESS).unwrap();
    out.extend_from_slice(results);
    out
}

/// Builds a `MSG_ACCEPTED` reply with a non-`SUCCESS` `accept_stat` (PROG_UNAVAIL, PROG_MISMATCH,
/// PROC_UNAVAIL, GARBAGE_ARGS, SYSTEM_ERR). `PROG_MISMATCH` additionally carries the server's
/// supported version range.
pub fn encode_accepted_failure(xid: u32, stat: AcceptStat, mismatch_range: Option<(u32, u32)>) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    encode::u32(&mut out, xid).unwrap();
    encode::u32(&mut out, MSG_REPLY).unwrap();
    encode::u32(&mut out, RejectOrAccept::Accepted as u32).unwrap();
    encode_opaque_auth_none(&mut out).unwrap();
    encode::variant(&mut out, stat).unwrap();
    if let Some((low, high)) = mismatch_range {
        encode::u32(&mut out, low).unwrap();
        encode::u32(&mut out, high).unwrap();
    }
    out
}

/// Builds a `MSG_DENIED` reply for an RPC version mismatch.
pub fn encode_rpc_mismatch(xid: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    encode::u32(&mut out, xid).unwrap();
    encode::u32(&mut out, MSG_REPLY).unwrap();
    encode::u32(&mut out, RejectOrAccept::Denied as u32).unwrap();
    encode::variant(&mut out, RejectStat::RPC_MISMATCH).unwrap();
    encode::u32(&mut out, RPC_VERSION).unwrap();
    encode::u32(&mut out, RPC_VERSION).unwrap();
    out
}

/// Builds a `MSG_DENIED` reply for an authentication failure.
pub fn encode_auth_error(xid: u32, stat: crate::status::AuthStat) -> Vec<u8> {
    let mut out = Vec::with_capacity(20);
    encode::u32(&mut out, xid).unwrap();
    encode::u32(&mut out, MSG_REPLY).unwrap();
    encode::u32(&mut out, RejectOrAccept::Denied as u32).unwrap();
    encode::variant(&mut out, RejectStat::AUTH_ERROR).unwrap();
    encode::variant(&mut out, stat).unwrap();
    out
}

#[repr(u32)]
enum RejectOrAccept {
    Accepted = 0,
    Denied = 1,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_call(xid: u32, program: u32, version: u32, procedure: u32, args: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode::u32(&mut out, xid).unwrap();
        encode::u32(&mut out, MSG_CALL).unwrap();
        encode::u32(&mut out, RPC_VERSION).unwrap();
        encode::u32(&mut out, program).unwrap();
        encode::u32(&mut out, version).unwrap();
        encode::u32(&mut out, procedure).unwrap();
        encode_opaque_auth_none(&mut out).unwrap();
        encode_opaque_auth_none(&mut out).unwrap();
        out.extend_from_slice(args);
        out
    }

    #[test]
    fn decodes_a_well_formed_call_and_recovers_its_argument_bytes() {
        let record = encode_call(42, 100003, 3, 1, b"abcd");
        let call = decode_call(&record).unwrap();
        assert_eq!(call.xid, 42);
        assert_eq!(call.body.program, 100003);
        assert_eq!(call.body.procedure, 1);
        assert_eq!(call.args, b"abcd");
    }

    #[test]
    fn rejects_a_reply_message_decoded_as_a_call() {
        let mut out = Vec::new();
        encode::u32(&mut out, 1).unwrap();
        encode::u32(&mut out, MSG_REPLY).unwrap();
        assert!(matches!(decode_call(&out), Err(RpcMsgError::NotACall)));
    }

    #[test]
    fn auth_sys_credential_round_trips_aux_gids() {
        let mut body = Vec::new();
        encode::u32(&mut body, 7).unwrap();
        encode::string(&mut body, "client").unwrap();
        encode::u32(&mut body, 1000).unwrap();
        encode::u32(&mut body, 1000).unwrap();
        encode::u32(&mut body, 2).unwrap();
        encode::u32(&mut body, 10).unwrap();
        encode::u32(&mut body, 20).unwrap();
        let cred = AuthSysCredential::decode(&body).unwrap();
        assert_eq!(cred.uid, 1000);
        assert_eq!(cred.aux_gids, vec![10, 20]);
    }

    #[test]
    fn auth_sys_credential_rejects_too_many_aux_gids() {
        let mut body = Vec::new();
        encode::u32(&mut body, 0).unwrap();
        encode::string(&mut body, "x").unwrap();
        encode::u32(&mut body, 0).unwrap();
        encode::u32(&mut body, 0).unwrap();
        encode::u32(&mut body, 17).unwrap();
        for g in 0..17u32 {
            encode::u32(&mut body, g).unwrap();
        }
        assert!(AuthSysCredential::decode(&body).is_err());
    }
}
