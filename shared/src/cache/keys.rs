use murmur_types::PostId;

/// Pattern covering every cached listing page
pub const LISTING_PATTERN: &str = "listing:*";

pub fn item_key(id: &PostId) -> String {
    format!("item:{}", id)
}

pub fn listing_key(page: u32, limit: u32) -> String {
    format!("listing:{}:{}", page, limit)
}

/// Key family, used as a metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Item,
    Listing,
}

impl KeyFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFamily::Item => "item",
            KeyFamily::Listing => "listing",
        }
    }
}

/// Redis-style glob match supporting `*` (any run) and `?` (one char)
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((star_pi, star_ki)) = star {
            pi = star_pi + 1;
            ki = star_ki + 1;
            star = Some((star_pi, star_ki + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(item_key(&PostId::new("42")), "item:42");
        assert_eq!(listing_key(2, 10), "listing:2:10");
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(LISTING_PATTERN, "listing:1:10"));
        assert!(glob_match(LISTING_PATTERN, "listing:"));
        assert!(!glob_match(LISTING_PATTERN, "item:1"));
        assert!(glob_match("item:?", "item:1"));
        assert!(!glob_match("item:?", "item:12"));
        assert!(glob_match("*:10", "listing:3:10"));
        assert!(glob_match("*", ""));
    }
}
