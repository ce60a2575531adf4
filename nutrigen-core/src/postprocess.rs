//! Display cleanup for decoded recipe text. Purely cosmetic.

/// Capitalize the first character, and after every sentence-terminal
/// mark re-capitalize the following letter with exactly one space in
/// between. `"hello. world"` and `"hello.world"` both become
/// `"Hello. World"`.
pub fn clean(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if i == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        i += 1;

        if matches!(c, '.' | '!' | '?') {
            // Only rewrite when a lowercase letter follows the mark,
            // with any amount of whitespace in between.
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && chars[j].is_ascii_lowercase() {
                out.push(' ');
                out.push(chars[j].to_ascii_uppercase());
                i = j + 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalizes_sentences() {
        assert_eq!(
            clean("hello world. this is nutrigen."),
            "Hello world. This is nutrigen."
        );
    }

    #[test]
    fn inserts_missing_space_after_mark() {
        assert_eq!(clean("stir well.add salt!then serve"), "Stir well. Add salt! Then serve");
    }

    #[test]
    fn collapses_extra_whitespace_after_mark() {
        assert_eq!(clean("boil.   drain"), "Boil. Drain");
    }

    #[test]
    fn uppercase_after_mark_is_untouched() {
        assert_eq!(clean("preheat oven. Serve hot"), "Preheat oven. Serve hot");
    }

    #[test]
    fn empty_and_trailing_mark_are_safe() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("done."), "Done.");
    }
}
