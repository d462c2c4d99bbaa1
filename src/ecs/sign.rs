//! RPC-style request signing for the Aliyun API (signature version 1.0).
//!
//! Every query parameter is percent-encoded with the RFC 3986 unreserved
//! set, the encoded `k=v` pairs are sorted and joined into the canonicalized
//! query string, and the signature is the base64-encoded HMAC-SHA1 of
//! `GET&%2F&<encoded canonicalized query>` keyed with `<secret_key>&`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;

/// Everything outside `A-Z a-z 0-9 - _ . ~` gets percent-encoded.
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, ENCODE_SET).to_string()
}

/// Builds the canonicalized query string from unsorted parameters.
fn canonicalized_query(params: &[(String, String)]) -> String {
    let mut encoded: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort_unstable();
    encoded.join("&")
}

fn string_to_sign(canonicalized: &str) -> String {
    format!("GET&%2F&{}", percent_encode(canonicalized))
}

/// Signs the given parameters and returns the full, sorted query string
/// with the `Signature` parameter appended, ready to be attached to the
/// request URL.
pub fn signed_query(params: &[(String, String)], secret_key: &str) -> String {
    let canonicalized = canonicalized_query(params);
    let to_sign = string_to_sign(&canonicalized);

    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret_key}&").as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    format!(
        "{}&Signature={}",
        canonicalized,
        percent_encode(&signature)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode_unreserved() {
        assert_eq!(percent_encode("AZaz09-_.~"), "AZaz09-_.~");
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("a*b"), "a%2Ab");
        assert_eq!(percent_encode("k:v,x"), "k%3Av%2Cx");
        assert_eq!(percent_encode("a/b&c=d"), "a%2Fb%26c%3Dd");
    }

    #[test]
    fn test_canonicalized_query_is_sorted() {
        let params = vec![
            ("Timestamp".to_owned(), "2024-01-01T00:00:00Z".to_owned()),
            ("Action".to_owned(), "DescribeInstances".to_owned()),
            ("PageSize".to_owned(), "100".to_owned()),
        ];
        assert_eq!(
            canonicalized_query(&params),
            "Action=DescribeInstances&PageSize=100&Timestamp=2024-01-01T00%3A00%3A00Z"
        );
    }

    #[test]
    fn test_string_to_sign_shape() {
        let to_sign = string_to_sign("Action=DescribeInstances&PageSize=100");
        assert_eq!(
            to_sign,
            "GET&%2F&Action%3DDescribeInstances%26PageSize%3D100"
        );
    }

    #[test]
    fn test_signed_query_appends_signature() {
        let params = vec![
            ("Action".to_owned(), "DescribeInstances".to_owned()),
            ("PageSize".to_owned(), "100".to_owned()),
        ];
        let query = signed_query(&params, "testsecret");
        let (rest, signature) = query.rsplit_once("&Signature=").unwrap();
        assert_eq!(rest, "Action=DescribeInstances&PageSize=100");
        // base64 of a 20 byte SHA1 digest is 28 characters, padded with '='.
        let decoded = percent_encoding::percent_decode_str(signature)
            .decode_utf8()
            .unwrap();
        assert_eq!(decoded.len(), 28);
        assert!(decoded.ends_with('='));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let params = vec![("Action".to_owned(), "DescribeInstances".to_owned())];
        assert_eq!(
            signed_query(&params, "secret"),
            signed_query(&params, "secret")
        );
        assert_ne!(
            signed_query(&params, "secret"),
            signed_query(&params, "other")
        );
    }
}
