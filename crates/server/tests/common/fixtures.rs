//! Test fixtures for store definitions and package metadata.

use serde_json::{Value, json};

/// A hosted store definition body.
#[allow(dead_code)]
pub fn hosted_definition() -> Value {
    json!({ "type": "hosted" })
}

/// A remote store definition body proxying `url`.
#[allow(dead_code)]
pub fn remote_definition(url: &str) -> Value {
    json!({ "type": "remote", "url": url })
}

/// A group definition body over `members`, in order.
#[allow(dead_code)]
pub fn group_definition(members: &[&str]) -> Value {
    json!({ "type": "group", "constituents": members })
}

/// A minimal `maven-metadata.xml` listing `versions`.
#[allow(dead_code)]
pub fn maven_metadata(group: &str, artifact: &str, versions: &[&str]) -> String {
    let versions: String = versions
        .iter()
        .map(|v| format!("<version>{v}</version>"))
        .collect();
    format!(
        "<metadata><groupId>{group}</groupId><artifactId>{artifact}</artifactId>\
         <versioning><versions>{versions}</versions></versioning></metadata>"
    )
}
