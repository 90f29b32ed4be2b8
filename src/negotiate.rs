//! `Accept-Encoding` negotiation.

use crate::codec::Codec;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

const WILDCARD: &str = "*";

/// Quality value in thousandths, the precision an HTTP qvalue carries.
type Quality = u16;

const MAX_QUALITY: Quality = 1000;

/// Picks the codec to use for a response.
///
/// Client quality always wins over server order; among names requested at the
/// same quality, the first codec in `supported` wins. A nonzero `*` falls back
/// to the first supported codec the client did not explicitly reject.
pub fn resolve_codec(accept_encoding: &str, supported: &[Codec]) -> Option<Codec> {
    let preferences = Preferences::parse(accept_encoding);

    for names in preferences.by_quality.values() {
        if let Some(codec) = supported
            .iter()
            .find(|codec| names.contains(codec.content_encoding()))
        {
            return Some(*codec);
        }
    }

    if preferences.wildcard {
        return supported
            .iter()
            .find(|codec| !preferences.rejected.contains(codec.content_encoding()))
            .copied();
    }

    None
}

/// The client's stated preferences, grouped from highest to lowest quality.
#[derive(Debug, Default)]
struct Preferences {
    by_quality: BTreeMap<Reverse<Quality>, HashSet<String>>,
    rejected: HashSet<String>,
    wildcard: bool,
}

impl Preferences {
    fn parse(header: &str) -> Self {
        // A repeated name keeps its last quality.
        let mut entries: HashMap<String, Quality> = HashMap::new();
        for token in header.split(',') {
            if let Some((name, quality)) = parse_token(token) {
                entries.insert(name, quality);
            }
        }

        let mut preferences = Preferences::default();
        for (name, quality) in entries {
            if quality == 0 {
                preferences.rejected.insert(name);
            } else if name == WILDCARD {
                preferences.wildcard = true;
            } else {
                preferences
                    .by_quality
                    .entry(Reverse(quality))
                    .or_default()
                    .insert(name);
            }
        }
        preferences
    }
}

/// Parses one `name[;q=value]` token into a normalized name and its quality.
fn parse_token(token: &str) -> Option<(String, Quality)> {
    let mut parts = token.split(';');
    let name = parts.next()?.trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let name = match Codec::from_name(&name) {
        Some(codec) => codec.content_encoding().to_owned(),
        None => name,
    };

    let mut quality = MAX_QUALITY;
    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("q") {
            quality = parse_quality(value.trim());
        }
    }

    Some((name, quality))
}

/// Parses a qvalue; anything unparsable or outside `[0, 1]` counts as a rejection.
fn parse_quality(value: &str) -> Quality {
    match value.parse::<f32>() {
        Ok(q) if (0.0..=1.0).contains(&q) => {
            (q * f32::from(MAX_QUALITY)).round() as Quality
        }
        _ => 0,
    }
}

#[cfg(test)]
#[cfg(all(feature = "gzip", feature = "deflate", feature = "brotli"))]
mod tests {
    use super::*;

    const GZIP: Codec = Codec::Gzip;
    const BR: Codec = Codec::Brotli;
    const DEFLATE: Codec = Codec::Deflate;

    #[test]
    fn test_simple() {
        assert_eq!(resolve_codec("gzip", &[GZIP, BR]), Some(GZIP));
        assert_eq!(resolve_codec("br", &[GZIP, BR]), Some(BR));
        assert_eq!(resolve_codec("deflate", &[DEFLATE]), Some(DEFLATE));
    }

    #[test]
    fn test_server_order_breaks_ties() {
        assert_eq!(
            resolve_codec("br,gzip,deflate", &Codec::default_order()),
            Some(GZIP)
        );
        assert_eq!(resolve_codec("br,gzip,deflate", &[GZIP]), Some(GZIP));
        assert_eq!(resolve_codec("br,gzip,deflate", &[BR, GZIP]), Some(BR));
        assert_eq!(resolve_codec("br,gzip,deflate", &[GZIP, BR]), Some(GZIP));
        assert_eq!(resolve_codec("br;q=1.0, gzip;q=1.0", &[GZIP, BR]), Some(GZIP));
        assert_eq!(resolve_codec("br;q=1.0, gzip;q=1.0", &[BR, GZIP]), Some(BR));
    }

    #[test]
    fn test_client_quality_wins() {
        // deflate preferred but only gzip available
        assert_eq!(resolve_codec("deflate, gzip;q=0.8", &[GZIP]), Some(GZIP));
        // deflate preferred and available
        assert_eq!(resolve_codec("deflate, gzip;q=0.8", &[GZIP, DEFLATE]), Some(DEFLATE));
        // br preferred and available
        assert_eq!(
            resolve_codec("br;q=1.0, gzip;q=0.8", &[GZIP, BR, DEFLATE]),
            Some(BR)
        );
        assert_eq!(resolve_codec("gzip;q=0.5, br;q=0.51", &[GZIP, BR]), Some(BR));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(resolve_codec("deflate, gzip;q=0.8", &[BR]), None);
        assert_eq!(resolve_codec("", &[BR]), None);
        assert_eq!(resolve_codec("identity", &Codec::default_order()), None);
        assert_eq!(resolve_codec("compress", &Codec::default_order()), None);
        assert_eq!(resolve_codec("gzip", &[]), None);
    }

    #[test]
    fn test_wildcard() {
        assert_eq!(resolve_codec("*;q=1.0", &[BR, GZIP]), Some(BR));
        assert_eq!(resolve_codec("*", &[DEFLATE, GZIP]), Some(DEFLATE));
        assert_eq!(resolve_codec("*;q=0", &[BR, GZIP]), None);
        assert_eq!(resolve_codec("*;q=1.0", &[]), None);
        // a named match beats the wildcard even at lower quality
        assert_eq!(resolve_codec("*;q=1.0, gzip;q=0.1", &[BR, GZIP]), Some(GZIP));
        // explicitly rejected codecs are not picked through the wildcard
        assert_eq!(resolve_codec("*, br;q=0", &[BR, GZIP]), Some(GZIP));
    }

    #[test]
    fn test_invalid_quality_is_rejection() {
        assert_eq!(resolve_codec("br;q=aaa, gzip", &[BR, GZIP]), Some(GZIP));
        assert_eq!(resolve_codec("br;q=aaa", &[BR, GZIP]), None);
        assert_eq!(resolve_codec("br;q=1.5", &[BR, GZIP]), None);
        assert_eq!(resolve_codec("br;q=-0.5", &[BR, GZIP]), None);
        assert_eq!(resolve_codec("br;q=NaN", &[BR, GZIP]), None);

        // identical to br being absent
        for header in ["br;q=aaa, deflate", "deflate"] {
            assert_eq!(resolve_codec(header, &[BR, DEFLATE]), Some(DEFLATE));
        }
    }

    #[test]
    fn test_quality_zero_ignores_case_and_whitespace() {
        let headers = [
            "br;q=0.0, gzip",
            "BR;Q=0, gzip",
            "  Br ; q = 0 ,gzip",
            "br;q=0.000,gzip",
        ];
        for header in headers {
            assert_eq!(resolve_codec(header, &[BR, GZIP]), Some(GZIP), "{header}");
        }
        assert_eq!(resolve_codec("gzip;q=0", &[GZIP]), None);
    }

    #[test]
    fn test_last_duplicate_wins() {
        assert_eq!(resolve_codec("br, br;q=0, gzip", &[BR, GZIP]), Some(GZIP));
        assert_eq!(resolve_codec("br;q=0, br, gzip", &[BR, GZIP]), Some(BR));
        assert_eq!(resolve_codec("gzip;q=0.2, br;q=0.5, gzip;q=0.9", &[BR, GZIP]), Some(GZIP));
    }

    #[test]
    fn test_alias_and_extra_params() {
        assert_eq!(resolve_codec("x-gzip", &[BR, GZIP]), Some(GZIP));
        assert_eq!(resolve_codec("brotli, gzip;q=0.5", &[GZIP, BR]), Some(BR));
        assert_eq!(resolve_codec("gzip;level=9", &[BR, GZIP]), Some(GZIP));
        assert_eq!(resolve_codec("gzip;", &[BR, GZIP]), Some(GZIP));
        assert_eq!(resolve_codec(" , ,br", &[BR, GZIP]), Some(BR));
    }

    #[test]
    fn test_parse_quality() {
        assert_eq!(parse_quality("1"), 1000);
        assert_eq!(parse_quality("0.8"), 800);
        assert_eq!(parse_quality("0.001"), 1);
        assert_eq!(parse_quality("abc"), 0);
        assert_eq!(parse_quality("2"), 0);
    }
}
