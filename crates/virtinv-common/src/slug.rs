pub const MAX_SLUG_LEN: usize = 50;

/// Derive a slug from a display name: lowercase ASCII alphanumerics, everything
/// else folded into single dashes.
pub fn slugify(name: &str) -> String {
    let mut result = String::new();
    let mut prev_dash = true;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            result.push('-');
            prev_dash = true;
        }
    }
    if result.len() > MAX_SLUG_LEN {
        result.truncate(MAX_SLUG_LEN);
    }
    result.trim_end_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
