//! OAuth callback URL inspection.

use crate::{AuthError, AuthResult};
use url::Url;

/// Query keys the provider appends on a code-flow callback.
const QUERY_MARKERS: [&str; 3] = ["code", "error", "error_description"];
/// Fragment keys the provider appends on an implicit-flow callback.
const FRAGMENT_MARKERS: [&str; 3] = ["access_token", "error", "error_description"];

/// Whether `raw` looks like a URL the provider redirected back to.
///
/// Unparseable input is treated as an ordinary page.
pub fn is_oauth_callback_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };

    let in_query = url
        .query_pairs()
        .any(|(key, _)| QUERY_MARKERS.contains(&key.as_ref()));
    let in_fragment = url.fragment().is_some_and(|fragment| {
        url::form_urlencoded::parse(fragment.as_bytes())
            .any(|(key, _)| FRAGMENT_MARKERS.contains(&key.as_ref()))
    });

    in_query || in_fragment
}

/// Tokens carried in an implicit-flow callback fragment.
#[derive(Clone, PartialEq, Eq)]
pub struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl std::fmt::Debug for CallbackTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTokens")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Extract tokens from a callback URL, surfacing provider errors.
pub fn parse_callback_tokens(raw: &str) -> AuthResult<CallbackTokens> {
    let url = Url::parse(raw)?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(fragment) = url.fragment() {
        pairs.extend(
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
    let lookup = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    if let Some(error) = lookup("error_description").or_else(|| lookup("error")) {
        return Err(AuthError::OAuth(error));
    }
    if lookup("code").is_some() {
        return Err(AuthError::OAuth(
            "Callback carries an authorization code; only implicit-flow callbacks are supported"
                .to_string(),
        ));
    }

    let access_token = lookup("access_token")
        .ok_or_else(|| AuthError::OAuth("Callback is missing access_token".to_string()))?;
    let refresh_token = lookup("refresh_token")
        .ok_or_else(|| AuthError::OAuth("Callback is missing refresh_token".to_string()))?;
    let expires_in = lookup("expires_in")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(3600);

    Ok(CallbackTokens {
        access_token,
        refresh_token,
        expires_in,
    })
}
