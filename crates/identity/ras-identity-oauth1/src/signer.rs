//! OAuth 1.0a request signing (HMAC-SHA1, RFC 5849 section 3.4).

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use http::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{Rng, thread_rng};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Everything except the RFC 3986 unreserved characters.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// Percent-encode a value the way the signature base string requires.
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Token credentials used to sign a request on behalf of a user.
#[derive(Debug, Clone, Copy)]
pub struct TokenCredentials<'a> {
    pub token: &'a str,
    pub secret: &'a str,
}

/// The `oauth_*` protocol parameters of a signed request, signature included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParameters {
    params: Vec<(String, String)>,
}

impl SignedParameters {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn signature(&self) -> &str {
        self.get("oauth_signature").unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value for the `Authorization` request header.
    pub fn authorization_header(&self) -> String {
        let fields: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }
}

/// Signs backchannel requests with the consumer credentials.
#[derive(Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl std::fmt::Debug for OAuth1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Signer")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Sign a request with a fresh nonce and the current time.
    ///
    /// `parameters` are the extra parameters of the request. Entries whose key
    /// starts with `oauth_` (callback, verifier) become protocol parameters;
    /// everything else is only covered by the signature and must be sent with
    /// the request body by the caller. Query parameters of `url` are always
    /// covered.
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        parameters: &[(String, String)],
        token: Option<TokenCredentials<'_>>,
    ) -> SignedParameters {
        let nonce = generate_nonce();
        let timestamp = Utc::now().timestamp();
        self.sign_with(method, url, parameters, token, &nonce, timestamp)
    }

    pub fn sign_with(
        &self,
        method: &Method,
        url: &Url,
        parameters: &[(String, String)],
        token: Option<TokenCredentials<'_>>,
        nonce: &str,
        timestamp: i64,
    ) -> SignedParameters {
        let mut oauth_params = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            (
                "oauth_signature_method".to_string(),
                SIGNATURE_METHOD.to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
        ];
        if let Some(token) = token {
            oauth_params.push(("oauth_token".to_string(), token.token.to_string()));
        }
        oauth_params.extend(
            parameters
                .iter()
                .filter(|(k, _)| k.starts_with("oauth_"))
                .cloned(),
        );

        let mut all_params = oauth_params.clone();
        all_params.extend(
            parameters
                .iter()
                .filter(|(k, _)| !k.starts_with("oauth_"))
                .cloned(),
        );
        all_params.extend(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())));

        let base = signature_base_string(method, url, &all_params);
        let signature = self.compute_signature(&base, token.map(|t| t.secret));

        oauth_params.push(("oauth_signature".to_string(), signature));
        SignedParameters {
            params: oauth_params,
        }
    }

    fn compute_signature(&self, base_string: &str, token_secret: Option<&str>) -> String {
        let key = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(token_secret.unwrap_or_default())
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(base_string.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn generate_nonce() -> String {
    let mut rng = thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.r#gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Scheme, authority and path without query or fragment; default ports dropped.
pub fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    // `Url::port` is already `None` for the scheme's default port
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Encoded `key=value` pairs sorted by encoded key, then encoded value.
pub fn normalize_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn signature_base_string(method: &Method, url: &Url, params: &[(String, String)]) -> String {
    format!(
        "{}&{}&{}",
        method.as_str().to_ascii_uppercase(),
        percent_encode(&base_string_uri(url)),
        percent_encode(&normalize_parameters(params))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_percent_encoding_keeps_unreserved() {
        assert_eq!(percent_encode("AZaz09-._~"), "AZaz09-._~");
        assert_eq!(percent_encode("a b+c/d"), "a%20b%2Bc%2Fd");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
        assert_eq!(percent_encode("!*'()"), "%21%2A%27%28%29");
    }

    #[test]
    fn test_base_string_uri() {
        let url = Url::parse("HTTP://Example.COM:80/r%20v/X?id=123").unwrap();
        assert_eq!(base_string_uri(&url), "http://example.com/r%20v/X");

        let url = Url::parse("https://www.example.net:8080/?q=1#frag").unwrap();
        assert_eq!(base_string_uri(&url), "https://www.example.net:8080/");
    }

    #[test]
    fn test_rfc5849_example_signature() {
        let signer = OAuth1Signer::new("dpf43f3p2l4k3l03", "kd94hf93k423kf44");
        let url =
            Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original").unwrap();

        let signed = signer.sign_with(
            &Method::GET,
            &url,
            &[],
            Some(TokenCredentials {
                token: "nnch734d00sl2jdk",
                secret: "pfkkdhi9sl3r4s00",
            }),
            "kllo9940pd9333jh",
            1191242096,
        );

        assert_eq!(signed.signature(), "tR3+Ty81lMeYAr/Fid0kMTYa/WM=");
        assert_eq!(signed.get("oauth_token"), Some("nnch734d00sl2jdk"));
        assert_eq!(signed.get("file"), None);
    }

    #[test]
    fn test_body_parameters_are_signed() {
        let signer = OAuth1Signer::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
        );
        let url =
            Url::parse("https://api.twitter.com/1.1/statuses/update.json?include_entities=true")
                .unwrap();
        let body = pairs(&[("status", "Hello Ladies + Gentlemen, a signed OAuth request!")]);
        let token = TokenCredentials {
            token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        };

        let signed = signer.sign_with(
            &Method::POST,
            &url,
            &body,
            Some(token),
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            1318622958,
        );

        assert_eq!(signed.signature(), "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
        assert_eq!(signed.get("status"), None);
    }

    #[test]
    fn test_base_string_for_request_token_call() {
        let url =
            Url::parse("https://secure.tmsandbox.co.nz/Oauth/RequestToken?scope=MyTradeMeRead")
                .unwrap();
        let mut params = pairs(&[
            ("oauth_version", "1.0"),
            ("oauth_callback", "http://localhost:3000/signin-trademe"),
            ("oauth_timestamp", "1700000000"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_nonce", "n1"),
            ("oauth_consumer_key", "ck"),
        ]);
        params.extend(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())));

        assert_eq!(
            signature_base_string(&Method::POST, &url, &params),
            "POST&https%3A%2F%2Fsecure.tmsandbox.co.nz%2FOauth%2FRequestToken&\
             oauth_callback%3Dhttp%253A%252F%252Flocalhost%253A3000%252Fsignin-trademe\
             %26oauth_consumer_key%3Dck%26oauth_nonce%3Dn1%26oauth_signature_method%3DHMAC-SHA1\
             %26oauth_timestamp%3D1700000000%26oauth_version%3D1.0%26scope%3DMyTradeMeRead"
        );

        let signer = OAuth1Signer::new("ck", "cs");
        let signed = signer.sign_with(
            &Method::POST,
            &url,
            &pairs(&[("oauth_callback", "http://localhost:3000/signin-trademe")]),
            None,
            "n1",
            1700000000,
        );
        assert_eq!(signed.signature(), "B4abDPSKpScSPUytEqZwv18Ysbo=");
        assert_eq!(
            signed.get("oauth_callback"),
            Some("http://localhost:3000/signin-trademe")
        );
        assert_eq!(signed.get("oauth_token"), None);
    }

    #[test]
    fn test_parameter_order_is_independent_of_insertion() {
        let forward = pairs(&[("b", "2"), ("a", "3"), ("a", "1"), ("c d", "x")]);
        let mut reversed = forward.clone();
        reversed.reverse();

        let normalized = normalize_parameters(&forward);
        assert_eq!(normalized, normalize_parameters(&reversed));
        assert_eq!(normalized, "a=1&a=3&b=2&c%20d=x");
    }

    #[test]
    fn test_signing_is_deterministic_for_fixed_nonce_and_timestamp() {
        let signer = OAuth1Signer::new("key", "secret");
        let url = Url::parse("https://api.example.com/profile").unwrap();
        let token = Some(TokenCredentials {
            token: "tok",
            secret: "tok-secret",
        });

        let a = signer.sign_with(&Method::GET, &url, &[], token, "nonce", 1);
        let b = signer.sign_with(&Method::GET, &url, &[], token, "nonce", 1);
        assert_eq!(a, b);

        let other_nonce = signer.sign_with(&Method::GET, &url, &[], token, "nonce2", 1);
        let other_time = signer.sign_with(&Method::GET, &url, &[], token, "nonce", 2);
        assert_ne!(a.signature(), other_nonce.signature());
        assert_ne!(a.signature(), other_time.signature());
    }

    #[test]
    fn test_token_secret_changes_signature() {
        let signer = OAuth1Signer::new("key", "secret");
        let url = Url::parse("https://api.example.com/profile").unwrap();
        let with = |secret| {
            signer.sign_with(
                &Method::GET,
                &url,
                &[],
                Some(TokenCredentials {
                    token: "tok",
                    secret,
                }),
                "n",
                1,
            )
        };
        assert_ne!(with("one").signature(), with("two").signature());
    }

    #[test]
    fn test_fresh_nonces_differ() {
        let signer = OAuth1Signer::new("key", "secret");
        let url = Url::parse("https://api.example.com/profile").unwrap();

        let a = signer.sign(&Method::GET, &url, &[], None);
        let b = signer.sign(&Method::GET, &url, &[], None);
        assert_ne!(a.get("oauth_nonce"), b.get("oauth_nonce"));
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.get("oauth_nonce").unwrap().len(), 43);
    }

    #[test]
    fn test_authorization_header_format() {
        let signer = OAuth1Signer::new("key", "secret");
        let url = Url::parse("https://api.example.com/profile").unwrap();
        let signed = signer.sign_with(
            &Method::GET,
            &url,
            &pairs(&[("oauth_verifier", "12 3")]),
            None,
            "n",
            7,
        );

        let header = signed.authorization_header();
        assert!(header.starts_with("OAuth oauth_consumer_key=\"key\", "));
        assert!(header.contains("oauth_verifier=\"12%203\""));
        assert!(header.contains("oauth_timestamp=\"7\""));
        assert!(header.contains(&format!(
            "oauth_signature=\"{}\"",
            percent_encode(signed.signature())
        )));
    }
}
