// crates/core/src/keys.rs
//! Job-key derivation from uploaded filenames.
//!
//! A job key doubles as the stored filename on disk, so it must be safe to
//! join onto the data directory: no path separators, no parent components,
//! nothing outside a conservative character set. A Unix-timestamp prefix
//! keeps repeated uploads of the same file from colliding.

/// Derive a collision-resistant job key from an uploaded filename.
///
/// The raw name is reduced to its final path component, sanitized to
/// `[A-Za-z0-9._-]`, and prefixed with `{timestamp}_`.
pub fn derive_job_key(raw_filename: &str, unix_timestamp: u64) -> String {
    let base = raw_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw_filename);

    let mut sanitized = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            sanitized.push(c);
        } else {
            sanitized.push('_');
        }
    }
    // ".." must not survive sanitization as a whole name
    let sanitized = sanitized.trim_matches('.');
    let sanitized = if sanitized.is_empty() {
        "upload"
    } else {
        sanitized
    };

    format!("{unix_timestamp}_{sanitized}")
}

/// Key minus its extension; artifact filenames hang off this.
pub fn job_base_name(key: &str) -> &str {
    match key.rfind('.') {
        Some(idx) if idx > 0 => &key[..idx],
        _ => key,
    }
}

/// File extension of the key, lowercased, if any.
pub fn key_extension(key: &str) -> Option<String> {
    match key.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < key.len() => Some(key[idx + 1..].to_lowercase()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_job_key_sanitizes() {
        let key = derive_job_key("my model (v2).ifc", 1700000000);
        assert_eq!(key, "1700000000_my_model__v2_.ifc");
    }

    #[test]
    fn test_derive_job_key_strips_directories() {
        let key = derive_job_key("../../etc/passwd", 1700000000);
        assert!(!key.contains('/'));
        assert_eq!(key, "1700000000_passwd");

        let key = derive_job_key("C:\\Users\\x\\tower.ifc", 1700000000);
        assert_eq!(key, "1700000000_tower.ifc");
    }

    #[test]
    fn test_derive_job_key_empty_name_falls_back() {
        let key = derive_job_key("...", 42);
        assert_eq!(key, "42_upload");
    }

    #[test]
    fn test_job_base_name() {
        assert_eq!(job_base_name("1700_tower.ifc"), "1700_tower");
        assert_eq!(job_base_name("noext"), "noext");
        assert_eq!(job_base_name(".hidden"), ".hidden");
    }

    #[test]
    fn test_key_extension() {
        assert_eq!(key_extension("1700_tower.ifc"), Some("ifc".to_string()));
        assert_eq!(key_extension("1700_tower.IFC"), Some("ifc".to_string()));
        assert_eq!(key_extension("noext"), None);
    }
}
