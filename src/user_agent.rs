//! User-Agent string for listing and download requests.

/// Project URL advertised in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/bucketdl";

/// Default User-Agent (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bucketdl/{version} (bucket-mirror; +{PROJECT_UA_URL})")
}
