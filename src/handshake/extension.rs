//! `Sec-WebSocket-Extensions` offer parsing.
//!
//! The header may appear multiple times; each value is a comma-separated
//! list of offers of the form `name ( ";" param ( "=" value )? )*` with
//! optional whitespace. Offers are parsed and surfaced to the upgrade
//! predicate, but no extension is applied to frames; compression is
//! detected and left inert.

/// One parsed extension offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub params: Vec<(String, Option<String>)>,
}

impl Extension {
    /// Whether this offer asks for `permessage-deflate`.
    #[inline]
    pub fn is_permessage_deflate(&self) -> bool {
        self.name.eq_ignore_ascii_case("permessage-deflate")
    }
}

/// Parse one header value into its list of offers.
///
/// Malformed pieces (empty names) are skipped rather than failing the
/// handshake; extensions are advisory.
pub fn parse_extension_header(value: &str) -> Vec<Extension> {
    let mut extensions = Vec::new();

    for offer in value.split(',') {
        let mut pieces = offer.split(';');

        let name = match pieces.next() {
            Some(name) => name.trim(),
            None => continue,
        };
        if name.is_empty() {
            continue;
        }

        let mut params = Vec::new();
        for piece in pieces {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match piece.split_once('=') {
                Some((k, v)) => {
                    params.push((k.trim().to_owned(), Some(v.trim().to_owned())));
                }
                None => params.push((piece.to_owned(), None)),
            }
        }

        extensions.push(Extension {
            name: name.to_owned(),
            params,
        });
    }

    extensions
}
