//! Peer-address parsing. Connect strings come in four grammars (tried in
//! order): `<pubkey>@<host>:<port>`, `<pubkey>@<host>` (port defaults to
//! 9735), a bare `<pubkey>` with no host (caller supplies one later), or a
//! bolt11 invoice decoded through an externally supplied decoder.

use bech32::FromBase32;
use bitcoin::secp256k1::PublicKey;
use regex::Regex;

use crate::error::Error;

const DEFAULT_PORT: u16 = 9735;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LnPeerAddr {
    pub pubkey: PublicKey,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Decodes a bolt11 invoice down to the node id it was signed by. The
/// crate carries no invoice parser of its own (see the external invoice
/// parser named in the peer-address external interfaces) — callers supply
/// one, or pass `None` to skip the invoice grammar entirely.
pub trait InvoiceDecoder {
    fn decode_pubkey(&self, invoice: &str) -> Option<PublicKey>;
}

fn parse_pubkey(s: &str) -> Result<PublicKey, Error> {
    if let Ok(bytes) = hex::decode(s) {
        if let Ok(pk) = PublicKey::from_slice(&bytes) {
            return Ok(pk);
        }
    }
    decode_bech32_pubkey(s)
}

/// Decode a bech32 string under the `ln` human-readable part into a
/// compressed public key.
pub fn decode_bech32_pubkey(s: &str) -> Result<PublicKey, Error> {
    let (hrp, data, _variant) =
        bech32::decode(s).map_err(|_| Error::ConnStringFormatError(s.to_string()))?;
    if hrp != "ln" {
        return Err(Error::ConnStringFormatError(s.to_string()));
    }
    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|_| Error::ConnStringFormatError(s.to_string()))?;
    PublicKey::from_slice(&bytes).map_err(|_| Error::ConnStringFormatError(s.to_string()))
}

/// Split `host:port`, accepting either a plain hostname/IPv4 address or a
/// bracketed IPv6 literal (`[::1]:9735`). The port is optional in both
/// grammars and defaults to 9735.
fn split_host_port(s: &str) -> Result<(String, u16), Error> {
    let ipv6 = Regex::new(r"^\[(?P<host>[:0-9a-fA-F]+)\](?P<port>:\d+)?$").unwrap();
    let plain = Regex::new(r"^(?P<host>[^:]+)(?P<port>:\d+)?$").unwrap();

    let caps = ipv6
        .captures(s)
        .or_else(|| plain.captures(s))
        .ok_or_else(|| Error::ConnStringFormatError(s.to_string()))?;

    let host = caps["host"].to_string();
    let port = match caps.name("port") {
        Some(m) => m.as_str()[1..]
            .parse()
            .map_err(|_| Error::ConnStringFormatError(s.to_string()))?,
        None => DEFAULT_PORT,
    };
    Ok((host, port))
}

/// Extract the node id and the leftover `host[:port]` suffix (empty if
/// none was supplied) from a connect string, trying the `@`-delimited
/// grammar first, then the bolt11-invoice grammar, then a bare pubkey.
fn extract_nodeid(
    s: &str,
    invoice_decoder: Option<&dyn InvoiceDecoder>,
) -> Result<(PublicKey, String), Error> {
    if let Some((nodeid_part, rest)) = s.split_once('@') {
        if rest.is_empty() {
            return Err(Error::ConnStringFormatError(
                "at least a hostname must be supplied after the at symbol".to_string(),
            ));
        }
        let pubkey = parse_pubkey(nodeid_part)?;
        return Ok((pubkey, rest.to_string()));
    }

    if let Some(decoder) = invoice_decoder {
        if let Some(pubkey) = decoder.decode_pubkey(s) {
            return Ok((pubkey, String::new()));
        }
    }

    let pubkey = parse_pubkey(s)?;
    Ok((pubkey, String::new()))
}

/// Parse a full connect string under any of the four grammars named in
/// the module doc comment.
pub fn parse_conn_string(
    s: &str,
    invoice_decoder: Option<&dyn InvoiceDecoder>,
) -> Result<LnPeerAddr, Error> {
    let (pubkey, rest) = extract_nodeid(s, invoice_decoder)?;
    if rest.is_empty() {
        return Ok(LnPeerAddr { pubkey, host: None, port: None });
    }
    let (host, port) = split_host_port(&rest)?;
    Ok(LnPeerAddr { pubkey, host: Some(host), port: Some(port) })
}
