pub mod http;

/// Convert a string to a safe filename. Account emails become file names,
/// so '@' and '.' are mapped too.
pub fn safe_filename(name: &str) -> String {
    const UNSAFE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '@'];
    let mut result = name.to_string();
    for &c in UNSAFE {
        result = result.replace(c, "_");
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("hello"), "hello");
        assert_eq!(safe_filename("owner@example.com"), "owner_example.com");
        assert_eq!(safe_filename("path/to\\file"), "path_to_file");
        assert_eq!(safe_filename("a:b|c?d*e"), "a_b_c_d_e");
    }

}
