//! XDR (RFC 4506) primitive codec, split into decode and encode halves.

pub mod decode;
pub mod encode;
