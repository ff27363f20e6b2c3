//! Info.plist reading
//!
//! XML and binary property lists are decoded with the `plist` crate. XML that
//! it rejects (stray entities, missing prolog, truncated trailers) falls back
//! to scanning top-level `<key>`/`<string>` pairs, which is all the scanner
//! needs.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{FairError, Result};

static KEY_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<key>([^<]+)</key>\s*<string>([^<]*)</string>")
        .expect("static plist pattern is valid")
});

/// Identity fields read from a bundle's Info.plist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub identifier: String,
    pub name: Option<String>,
    pub short_version: Option<String>,
    pub build_version: Option<String>,
}

/// Location of a bundle's Info.plist, if any
pub fn info_plist_path(bundle: &Path) -> Option<PathBuf> {
    [
        bundle.join("Contents").join("Info.plist"),
        bundle.join("Info.plist"),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// Read and parse a bundle's Info.plist
pub fn read_bundle_info(bundle: &Path) -> Result<BundleInfo> {
    let path = info_plist_path(bundle).ok_or_else(|| FairError::BundleMetadata {
        path: bundle.to_path_buf(),
        reason: "no Info.plist".to_string(),
    })?;

    let bytes = std::fs::read(&path).map_err(|e| FairError::io("Failed to read Info.plist", &path, e))?;
    parse_info_plist(&bytes).map_err(|reason| FairError::BundleMetadata { path, reason })
}

/// Parse Info.plist bytes
pub fn parse_info_plist(bytes: &[u8]) -> std::result::Result<BundleInfo, String> {
    match plist::Value::from_reader(std::io::Cursor::new(bytes)) {
        Ok(value) => {
            let dict = value
                .as_dictionary()
                .ok_or("property list root is not a dictionary")?;
            bundle_info(|key| dict.get(key).and_then(plist::Value::as_string).map(str::to_string))
        }
        Err(e) if bytes.starts_with(b"bplist") => Err(format!("malformed binary property list: {e}")),
        Err(e) => {
            tracing::debug!("Strict plist parse failed ({}); scanning XML keys", e);
            parse_xml_keys(bytes)
        }
    }
}

fn parse_xml_keys(bytes: &[u8]) -> std::result::Result<BundleInfo, String> {
    let content = std::str::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
    if !content.contains("<plist") {
        return Err("not a property list".to_string());
    }

    let values = string_values(content);
    bundle_info(|key| values.get(key).cloned())
}

fn bundle_info(
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<BundleInfo, String> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let identifier = get("CFBundleIdentifier").ok_or("missing CFBundleIdentifier")?;
    Ok(BundleInfo {
        identifier,
        name: get("CFBundleDisplayName").or_else(|| get("CFBundleName")),
        short_version: get("CFBundleShortVersionString"),
        build_version: get("CFBundleVersion"),
    })
}

/// First occurrence of each key wins; nested dictionaries come after the
/// top-level identity keys in every plist Xcode writes.
fn string_values(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for captures in KEY_STRING.captures_iter(content) {
        let key = captures[1].trim().to_string();
        values
            .entry(key)
            .or_insert_with(|| unescape(captures[2].trim()));
    }
    values
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>app.Foo</string>
    <key>CFBundleName</key>
    <string>Foo &amp; Co</string>
    <key>CFBundleShortVersionString</key>
    <string>1.0</string>
    <key>CFBundleVersion</key>
    <string>42</string>
</dict>
</plist>"#;

    #[test]
    fn test_parse_identity_fields() {
        let info = parse_info_plist(FOO_PLIST.as_bytes()).unwrap();
        assert_eq!(info.identifier, "app.Foo");
        assert_eq!(info.name.as_deref(), Some("Foo & Co"));
        assert_eq!(info.short_version.as_deref(), Some("1.0"));
        assert_eq!(info.build_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_binary_plist() {
        let mut dict = plist::Dictionary::new();
        dict.insert(
            "CFBundleIdentifier".to_string(),
            plist::Value::String("com.apple.Safari".to_string()),
        );
        dict.insert(
            "CFBundleName".to_string(),
            plist::Value::String("Safari".to_string()),
        );
        dict.insert(
            "CFBundleShortVersionString".to_string(),
            plist::Value::String("17.4".to_string()),
        );
        dict.insert(
            "LSRequiresNativeExecution".to_string(),
            plist::Value::Boolean(true),
        );
        let mut bytes = Vec::new();
        plist::Value::Dictionary(dict)
            .to_writer_binary(&mut bytes)
            .unwrap();
        assert!(bytes.starts_with(b"bplist00"));

        let info = parse_info_plist(&bytes).unwrap();
        assert_eq!(info.identifier, "com.apple.Safari");
        assert_eq!(info.name.as_deref(), Some("Safari"));
        assert_eq!(info.short_version.as_deref(), Some("17.4"));
        assert_eq!(info.build_version, None);
    }

    #[test]
    fn test_loose_xml_falls_back_to_key_scan() {
        // No prolog and an entity the strict parser rejects
        let loose = "<plist><dict><key>CFBundleIdentifier</key><string>app.Loose</string>\
                     <key>CFBundleName</key><string>Loose &nbsp;</string></dict></plist>";
        let info = parse_info_plist(loose.as_bytes()).unwrap();
        assert_eq!(info.identifier, "app.Loose");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_info_plist(b"garbage").is_err());
        assert!(parse_info_plist(b"bplist00\x01\x02").is_err());

        let no_id = "<plist><dict><key>CFBundleName</key><string>X</string></dict></plist>";
        let err = parse_info_plist(no_id.as_bytes()).unwrap_err();
        assert!(err.contains("CFBundleIdentifier"));
    }
}
