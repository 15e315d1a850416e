/// Lower-cased whitespace tokens. Punctuation stays attached to its word.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|token| token.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_any_whitespace_and_lowercases() {
        assert_eq!(tokenize("  Alpha\tBETA\ngamma, "), vec!["alpha", "beta", "gamma,"]);
        assert!(tokenize(" \n ").is_empty());
    }
}
