//! Helpers shared by the integration test binaries.

#![allow(dead_code)]

pub mod socket_guard;

use md5::{Digest, Md5};
use wiremock::ResponseTemplate;

/// Quoted MD5 entity tag, the way an object store reports single-part uploads.
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{:x}\"", Md5::digest(body))
}

/// 200 response carrying `body` and its matching `ETag`.
pub fn object_response(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("ETag", etag_for(body).as_str())
        .set_body_bytes(body.to_vec())
}

/// Minimal `ListBucketResult` document for `keys`.
pub fn listing_xml(keys: &[&str], truncated: bool) -> String {
    let contents: String = keys
        .iter()
        .map(|key| format!("<Contents><Key>{key}</Key></Contents>"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult><Name>uploads</Name>\
         <IsTruncated>{truncated}</IsTruncated>{contents}</ListBucketResult>"
    )
}
