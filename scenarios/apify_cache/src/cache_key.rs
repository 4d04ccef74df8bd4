use cache_tunnel_runner::prelude::InvalidInputError;
use url::Url;

/// Query parameter that carries the nonce in the cache-busting URL.
pub const NONCE_QUERY_PARAM: &str = "ts";

/// Identifies the cache slot that an iteration reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    nonce: String,
    derived_url: String,
    content_hash: String,
}

impl CacheKey {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// The resource URL with the nonce added as the [NONCE_QUERY_PARAM] query parameter.
    ///
    /// The resource URL is parsed first, so this is its normalised form and not always the input
    /// text with `?ts=<nonce>` appended: the scheme and host are lowercased, a default port is
    /// removed, an empty path becomes `/` and any fragment stays after the query. Canonical URLs,
    /// such as data.gouv.fr resource links, are unchanged apart from the added parameter.
    pub fn derived_url(&self) -> &str {
        &self.derived_url
    }

    /// Lowercase hex MD5 of [CacheKey::derived_url].
    ///
    /// The apify service names its cache slot with the same digest of the URL it is asked to
    /// parse, so this is also the id of the slot on the server.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

/// Builds [CacheKey]s. Has no state, the same inputs always give the same key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyGenerator;

impl CacheKeyGenerator {
    pub fn generate(&self, base_url: &str, nonce: &str) -> anyhow::Result<CacheKey> {
        if nonce.is_empty() {
            return Err(InvalidInputError::new("nonce must not be empty").into());
        }

        let mut url = Url::parse(base_url).map_err(|e| {
            InvalidInputError::new(format!("resource URL [{base_url}] is not a valid URL: {e}"))
        })?;
        if !url.has_host() {
            return Err(InvalidInputError::new(format!("resource URL [{base_url}] has no host")).into());
        }

        url.query_pairs_mut().append_pair(NONCE_QUERY_PARAM, nonce);
        let derived_url = String::from(url);
        let content_hash = format!("{:x}", md5::compute(derived_url.as_bytes()));

        Ok(CacheKey {
            nonce: nonce.to_string(),
            derived_url,
            content_hash,
        })
    }
}
